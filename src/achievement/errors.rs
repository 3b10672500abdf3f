//! # Achievement Errors

use thiserror::Error;

use crate::engine::EngineError;
use crate::ledger::LedgerError;
use crate::rule::RuleError;

/// Result type for achievement operations
pub type AchievementResult<T> = Result<T, AchievementError>;

/// Achievement errors
#[derive(Debug, Clone, Error)]
pub enum AchievementError {
    #[error("Validation error: {0}")]
    Validation(String),

    /// No active milestone, challenge or user challenge
    #[error("Not found: {0}")]
    NotFound(String),

    /// User challenge exists but is not in a claimable state
    #[error("Challenge not yet achieved: {0}")]
    NotYetAchieved(String),

    #[error("Challenge reward already claimed: {0}")]
    AlreadyClaimed(String),

    /// A user challenge row already exists for (user, challenge)
    #[error("Challenge already recorded: {0}")]
    Duplicate(String),

    /// Rule document failed to render or compile
    #[error("Rule compilation failed for challenge {challenge_id}: {message}")]
    Compile {
        challenge_id: String,
        message: String,
    },

    #[error("Fact resolution failed: {0}")]
    Resolution(RuleError),

    #[error("Fact error: {0}")]
    Rule(RuleError),

    #[error("Rule execution failed: {0}")]
    Engine(EngineError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Repository error: {0}")]
    Store(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AchievementError {
    pub(crate) fn compile(challenge_id: &str, message: impl ToString) -> Self {
        AchievementError::Compile {
            challenge_id: challenge_id.to_string(),
            message: message.to_string(),
        }
    }

    /// Wrong user challenge status for the requested transition
    pub fn is_invalid_state(&self) -> bool {
        matches!(
            self,
            AchievementError::NotYetAchieved(_) | AchievementError::AlreadyClaimed(_)
        )
    }

    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            AchievementError::NotFound(_) => "CLG001",
            AchievementError::NotYetAchieved(_) => "CLG002",
            AchievementError::AlreadyClaimed(_) => "CLG003",
            AchievementError::Duplicate(_) => "CLG004",
            AchievementError::Compile { .. } => "CLG005",
            AchievementError::Resolution(_) => "CLG006",
            AchievementError::Rule(_) => "CLG007",
            AchievementError::Engine(_) => "CLG008",
            AchievementError::Ledger(e) => e.code(),
            AchievementError::Validation(_) => "CLG400",
            AchievementError::Store(_) => "CLG500",
            AchievementError::Internal(_) => "CLG500",
        }
    }

    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            AchievementError::Validation(_) => 400,
            AchievementError::NotFound(_) => 404,
            AchievementError::NotYetAchieved(_) => 409,
            AchievementError::AlreadyClaimed(_) => 409,
            AchievementError::Duplicate(_) => 409,
            AchievementError::Compile { .. } => 500,
            AchievementError::Resolution(_) => 502,
            AchievementError::Rule(_) => 500,
            AchievementError::Engine(_) => 500,
            AchievementError::Ledger(e) => e.status_code(),
            AchievementError::Store(_) => 500,
            AchievementError::Internal(_) => 500,
        }
    }
}

impl From<RuleError> for AchievementError {
    fn from(err: RuleError) -> Self {
        if err.is_resolution() {
            AchievementError::Resolution(err)
        } else {
            AchievementError::Rule(err)
        }
    }
}

impl From<EngineError> for AchievementError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Fact(e) => e.into(),
            other => AchievementError::Engine(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(AchievementError::NotFound("c1".into()).code(), "CLG001");
        assert_eq!(AchievementError::NotYetAchieved("c1".into()).code(), "CLG002");
        assert_eq!(AchievementError::AlreadyClaimed("c1".into()).code(), "CLG003");
        assert_eq!(AchievementError::AlreadyClaimed("c1".into()).status_code(), 409);
        assert!(AchievementError::AlreadyClaimed("c1".into()).is_invalid_state());
    }

    #[test]
    fn test_ledger_errors_keep_their_code() {
        let err: AchievementError = LedgerError::PendingEmpty.into();
        assert_eq!(err.code(), "CRD004");
        assert_eq!(err.status_code(), 422);
    }

    #[test]
    fn test_rule_error_classification() {
        let err: AchievementError = RuleError::FinderNotRegistered("Distance".into()).into();
        assert!(matches!(err, AchievementError::Resolution(_)));

        let err: AchievementError = RuleError::FactNotFound("credit".into()).into();
        assert!(matches!(err, AchievementError::Rule(_)));
    }
}
