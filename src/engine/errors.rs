//! # Engine Errors

use thiserror::Error;

use crate::rule::RuleError;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Rule engine errors
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("Syntax error at {line}:{column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("Duplicate rule name: {0}")]
    DuplicateRule(String),

    #[error("Variable is not bound in data context: {0}")]
    UnknownVariable(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Fact error: {0}")]
    Fact(#[from] RuleError),

    #[error("Rule engine exceeded {0} cycles")]
    CycleLimit(usize),
}

impl EngineError {
    pub(crate) fn syntax(line: usize, column: usize, message: impl Into<String>) -> Self {
        EngineError::Syntax {
            line,
            column,
            message: message.into(),
        }
    }

    /// Whether the error was raised while compiling rather than executing
    pub fn is_compile_error(&self) -> bool {
        matches!(
            self,
            EngineError::Syntax { .. } | EngineError::DuplicateRule(_)
        )
    }

    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            EngineError::Syntax { .. } => 400,
            EngineError::DuplicateRule(_) => 400,
            EngineError::UnknownVariable(_) => 500,
            EngineError::TypeMismatch(_) => 422,
            EngineError::Fact(_) => 422,
            EngineError::CycleLimit(_) => 500,
        }
    }
}
