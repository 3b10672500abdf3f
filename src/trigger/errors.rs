//! # Trigger Errors

use thiserror::Error;

/// Result type for trigger operations
pub type TriggerResult<T> = Result<T, TriggerError>;

/// Trigger channel errors
#[derive(Debug, Clone, Error)]
pub enum TriggerError {
    /// Topic queue is at capacity; the message was dropped
    #[error("Topic queue full: {0}")]
    QueueFull(String),

    /// Topic worker has stopped
    #[error("Topic closed: {0}")]
    Closed(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),
}

impl TriggerError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            TriggerError::QueueFull(_) => "TRG001",
            TriggerError::Closed(_) => "TRG002",
            TriggerError::InvalidEvent(_) => "TRG400",
        }
    }

    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            TriggerError::QueueFull(_) => 503,
            TriggerError::Closed(_) => 503,
            TriggerError::InvalidEvent(_) => 400,
        }
    }
}
