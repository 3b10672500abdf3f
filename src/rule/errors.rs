//! # Rule Errors
//!
//! Error types for rule documents, fact access and fact resolution.

use thiserror::Error;

/// Result type for rule operations
pub type RuleResult<T> = Result<T, RuleError>;

/// Rule errors
#[derive(Debug, Clone, Error)]
pub enum RuleError {
    // ==================
    // Document Errors
    // ==================
    /// A non-last condition has no next logic operator
    #[error("next logic operator is not provided for condition at index {0}")]
    NoNextLogicOp(usize),

    /// Unknown condition type tag
    #[error("unsupported condition type: {0}")]
    ConditionUnsupported(String),

    /// Unknown action type tag
    #[error("unsupported action type: {0}")]
    ActionUnsupported(String),

    /// Unknown param type tag
    #[error("unsupported param type: {0}")]
    ParamUnsupported(String),

    /// Unknown comparison or logic operator
    #[error("invalid operator: {0}")]
    InvalidOperator(String),

    /// Options object did not decode
    #[error("invalid options for {kind}: {message}")]
    InvalidOptions { kind: String, message: String },

    /// Rule document is not valid JSON
    #[error("malformed rule document: {0}")]
    Malformed(String),

    // ==================
    // Fact Errors
    // ==================
    /// Fact is not present in the fact map
    #[error("fact not found: {0}")]
    FactNotFound(String),

    /// Fact holds an invalid value or a value of another type
    #[error("cannot {getter} from fact (name={name}, type={kind})")]
    InvalidValue {
        getter: &'static str,
        name: String,
        kind: String,
    },

    /// Fact does not support the requested mutation
    #[error("fact {name} does not support {capability} operations")]
    Unsupported {
        name: String,
        capability: &'static str,
    },

    // ==================
    // Resolution Errors
    // ==================
    /// No fact finder registered for a required param
    #[error("fact finder for param is not registered: {0}")]
    FinderNotRegistered(String),

    /// A fact finder returned an error
    #[error("fact finder {finder} failed: {message}")]
    FinderFailed { finder: String, message: String },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RuleError {
    /// Whether this error came out of fact resolution
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            RuleError::FinderNotRegistered(_) | RuleError::FinderFailed { .. }
        )
    }

    pub(crate) fn invalid_options(kind: &str, message: impl ToString) -> Self {
        RuleError::InvalidOptions {
            kind: kind.to_string(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_classification() {
        assert!(RuleError::FinderNotRegistered("distance".into()).is_resolution());
        assert!(!RuleError::FactNotFound("distance".into()).is_resolution());
    }
}
