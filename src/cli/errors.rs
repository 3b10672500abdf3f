//! CLI errors
//!
//! Module errors are folded into a small set of exit categories; the
//! originating code (CLG*, CRD*) is kept in the message.

use std::fmt;
use std::io;

use crate::achievement::AchievementError;
use crate::config::ConfigError;
use crate::ledger::LedgerError;
use crate::rule::RuleError;

/// Exit categories reported in the error line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Config file missing, unparsable or invalid
    ConfigError,
    /// Reading an input file or writing stdout failed
    IoError,
    /// Bad argument or input document
    InvalidInput,
    /// A rule failed to render or compile
    CompileFailed,
    /// A service operation failed
    CommandFailed,
}

impl CliErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "RUNLEDGER_CLI_CONFIG_ERROR",
            Self::IoError => "RUNLEDGER_CLI_IO_ERROR",
            Self::InvalidInput => "RUNLEDGER_CLI_INVALID_INPUT",
            Self::CompileFailed => "RUNLEDGER_CLI_COMPILE_FAILED",
            Self::CommandFailed => "RUNLEDGER_CLI_COMMAND_FAILED",
        }
    }
}

/// Error returned by every command
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    /// Error in the given category
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Bad `--config` file
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    /// Bad argument or input document
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::InvalidInput, msg)
    }

    /// Rule render or compile failure
    pub fn compile_failed(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::CompileFailed, msg)
    }

    pub fn code(&self) -> CliErrorCode {
        self.code
    }

    /// Category string printed in the error line
    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::invalid_input(format!("JSON error: {}", e))
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::config_error(e.to_string())
    }
}

impl From<RuleError> for CliError {
    fn from(e: RuleError) -> Self {
        Self::compile_failed(e.to_string())
    }
}

impl From<AchievementError> for CliError {
    fn from(e: AchievementError) -> Self {
        let code = match &e {
            AchievementError::Compile { .. } => CliErrorCode::CompileFailed,
            AchievementError::Validation(_) => CliErrorCode::InvalidInput,
            _ => CliErrorCode::CommandFailed,
        };
        Self::new(code, format!("{} ({})", e, e.code()))
    }
}

impl From<LedgerError> for CliError {
    fn from(e: LedgerError) -> Self {
        Self::new(
            CliErrorCode::CommandFailed,
            format!("{} ({})", e, e.code()),
        )
    }
}

pub type CliResult<T> = Result<T, CliError>;
