//! # Ledger Errors

use thiserror::Error;
use uuid::Uuid;

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Credit ledger errors
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Credit transaction not found: {0}")]
    TrxNotFound(Uuid),

    #[error("Credit transaction is not pending: {0}")]
    NotPending(Uuid),

    #[error("Credit transaction has unsupported entry type: {0}")]
    InvalidEntryType(Uuid),

    #[error("Wallet has no pending balance")]
    PendingEmpty,

    #[error("Wallet pending balance {pending} is less than {amount}")]
    PendingInsufficient { pending: f64, amount: f64 },

    #[error("Credit transaction already settled: {0}")]
    AlreadySettled(Uuid),

    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(f64),

    #[error("Credit transaction expired: {0}")]
    Expired(Uuid),

    #[error("Insufficient balance: have {balance}, need {amount}")]
    InsufficientBalance { balance: f64, amount: f64 },

    #[error("Concurrent wallet update (wallet={wallet_id}, expected version {expected})")]
    ConcurrencyConflict { wallet_id: Uuid, expected: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::TrxNotFound(_) => "CRD001",
            LedgerError::NotPending(_) => "CRD002",
            LedgerError::InvalidEntryType(_) => "CRD003",
            LedgerError::PendingEmpty => "CRD004",
            LedgerError::PendingInsufficient { .. } => "CRD005",
            LedgerError::AlreadySettled(_) => "CRD006",
            LedgerError::WalletNotFound(_) => "CRD007",
            LedgerError::InvalidAmount(_) => "CRD008",
            LedgerError::Expired(_) => "CRD009",
            LedgerError::InsufficientBalance { .. } => "CRD010",
            LedgerError::ConcurrencyConflict { .. } => "CRD011",
            LedgerError::Validation(_) => "CRD400",
            LedgerError::Internal(_) => "CRD500",
        }
    }

    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            LedgerError::Validation(_) => 400,
            LedgerError::InvalidAmount(_) => 400,
            LedgerError::InvalidEntryType(_) => 400,
            LedgerError::TrxNotFound(_) => 404,
            LedgerError::WalletNotFound(_) => 404,
            LedgerError::NotPending(_) => 409,
            LedgerError::AlreadySettled(_) => 409,
            LedgerError::ConcurrencyConflict { .. } => 409,
            LedgerError::PendingEmpty => 422,
            LedgerError::PendingInsufficient { .. } => 422,
            LedgerError::InsufficientBalance { .. } => 422,
            LedgerError::Expired(_) => 410,
            LedgerError::Internal(_) => 500,
        }
    }
}
