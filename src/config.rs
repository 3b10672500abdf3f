//! # Service Configuration
//!
//! JSON configuration for the reward service. Every key is optional; a
//! missing file section falls back to the defaults below.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rule::DEFAULT_VARIABLE;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Read(#[from] std::io::Error),

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardsConfig {
    /// Hours a pending reward stays claimable
    #[serde(default = "default_claim_expiry_hours")]
    pub claim_expiry_hours: i64,

    /// Hours a claimed reward stays spendable
    #[serde(default = "default_credit_expiry_hours")]
    pub credit_expiry_hours: i64,

    /// Reward multiplier for premium users
    #[serde(default = "default_premium_multiplier")]
    pub premium_multiplier: i64,

    /// Variable rule text binds facts to
    #[serde(default = "default_rule_variable")]
    pub rule_variable: String,

    /// Upper bound on rule firings per execution
    #[serde(default = "default_max_engine_cycles")]
    pub max_engine_cycles: usize,

    /// Queue capacity per trigger topic
    #[serde(default = "default_trigger_queue_capacity")]
    pub trigger_queue_capacity: usize,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_filter")]
    pub filter: String,

    /// Emit JSON lines instead of text
    #[serde(default)]
    pub json: bool,
}

fn default_claim_expiry_hours() -> i64 {
    168
} // 7 days
fn default_credit_expiry_hours() -> i64 {
    720
} // 30 days
fn default_premium_multiplier() -> i64 {
    2
}
fn default_rule_variable() -> String {
    DEFAULT_VARIABLE.to_string()
}
fn default_max_engine_cycles() -> usize {
    crate::engine::DEFAULT_MAX_CYCLES
}
fn default_trigger_queue_capacity() -> usize {
    1024
}
fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            claim_expiry_hours: default_claim_expiry_hours(),
            credit_expiry_hours: default_credit_expiry_hours(),
            premium_multiplier: default_premium_multiplier(),
            rule_variable: default_rule_variable(),
            max_engine_cycles: default_max_engine_cycles(),
            trigger_queue_capacity: default_trigger_queue_capacity(),
            logging: LoggingConfig::default(),
        }
    }
}

impl RewardsConfig {
    /// Load and validate configuration from a JSON file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: RewardsConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.claim_expiry_hours <= 0 {
            return Err(ConfigError::Invalid("claim_expiry_hours must be > 0".into()));
        }
        if self.credit_expiry_hours <= 0 {
            return Err(ConfigError::Invalid("credit_expiry_hours must be > 0".into()));
        }
        if self.premium_multiplier < 1 {
            return Err(ConfigError::Invalid("premium_multiplier must be >= 1".into()));
        }
        if !is_identifier(&self.rule_variable) {
            return Err(ConfigError::Invalid(format!(
                "rule_variable is not an identifier: '{}'",
                self.rule_variable
            )));
        }
        if self.max_engine_cycles == 0 {
            return Err(ConfigError::Invalid("max_engine_cycles must be > 0".into()));
        }
        if self.trigger_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "trigger_queue_capacity must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn claim_expiry(&self) -> chrono::Duration {
        chrono::Duration::hours(self.claim_expiry_hours)
    }

    pub fn credit_expiry(&self) -> chrono::Duration {
        chrono::Duration::hours(self.credit_expiry_hours)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
