//! # Rule
//!
//! A declarative rule document and its rendering into engine source.

use serde::{Deserialize, Serialize};

use super::action::ActionArray;
use super::condition::{quote, ConditionArray};
use super::errors::{RuleError, RuleResult};
use super::param::{merge_params, FactParam, ParamArray};

/// Variable name facts are bound to when none is set
pub const DEFAULT_VARIABLE: &str = "Var";

fn default_variable() -> String {
    DEFAULT_VARIABLE.to_string()
}

/// A rule as persisted on a challenge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub conditions: ConditionArray,
    #[serde(default)]
    pub actions: ActionArray,
    #[serde(default)]
    pub params: ParamArray,
    #[serde(skip, default = "default_variable")]
    pub variable_name: String,
    #[serde(skip)]
    pub skip_retract: bool,
}

impl Rule {
    /// Parse a rule document with the global type registry
    pub fn from_json(json: &str) -> RuleResult<Self> {
        serde_json::from_str(json).map_err(|e| RuleError::Malformed(e.to_string()))
    }

    /// Render the rule as engine source
    pub fn render(&self) -> RuleResult<String> {
        if !is_identifier(&self.code) {
            return Err(RuleError::Malformed(format!(
                "rule code is not an identifier: {:?}",
                self.code
            )));
        }

        let when = self.conditions.render(&self.variable_name)?;
        let mut then = self.actions.render(&self.variable_name)?;
        if !self.skip_retract {
            if !then.is_empty() {
                then.push_str("\n    ");
            }
            then.push_str(&format!("Retract({});", quote(&self.code)));
        }

        Ok(format!(
            "rule {} {} salience {} {{\n  when\n    {}\n  then\n    {}\n}}",
            self.code,
            quote(&self.description),
            self.priority,
            when,
            then
        ))
    }

    /// Facts read by the conditions plus the declared params
    pub fn params(&self) -> Vec<Box<dyn FactParam>> {
        merge_params(self.conditions.params(), self.params.items())
    }

    /// Facts written by the actions
    pub fn targets(&self) -> Vec<Box<dyn FactParam>> {
        self.actions.targets()
    }
}

fn is_identifier(code: &str) -> bool {
    let mut chars = code.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
