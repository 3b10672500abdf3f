//! # Fact Values
//!
//! Dynamically-typed values flowing into and out of fact params and the
//! rule engine.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A dynamically-typed fact value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FactValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    StrArray(Vec<String>),
    Null,
}

impl FactValue {
    /// Convert a JSON value. Objects and mixed arrays become `Null`.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Bool(b) => FactValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FactValue::Int(i),
                None => n.as_f64().map(FactValue::Float).unwrap_or(FactValue::Null),
            },
            Value::String(s) => FactValue::Str(s.clone()),
            Value::Array(items) => items
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .map(FactValue::StrArray)
                .unwrap_or(FactValue::Null),
            Value::Null | Value::Object(_) => FactValue::Null,
        }
    }

    /// Integer conversion. Only integers convert.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            FactValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Float conversion. Integers widen.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            FactValue::Float(f) => Some(*f),
            FactValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FactValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, FactValue::Int(_) | FactValue::Float(_))
    }

    /// Type name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            FactValue::Bool(_) => "boolean",
            FactValue::Int(_) => "int",
            FactValue::Float(_) => "float",
            FactValue::Str(_) => "string",
            FactValue::StrArray(_) => "string_array",
            FactValue::Null => "null",
        }
    }
}

impl fmt::Display for FactValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactValue::Bool(b) => write!(f, "{}", b),
            FactValue::Int(i) => write!(f, "{}", i),
            FactValue::Float(v) => write!(f, "{}", v),
            FactValue::Str(s) => write!(f, "{}", s),
            FactValue::StrArray(items) => write!(f, "[{}]", items.join(" ")),
            FactValue::Null => write!(f, "<nil>"),
        }
    }
}

impl From<i64> for FactValue {
    fn from(v: i64) -> Self {
        FactValue::Int(v)
    }
}

impl From<f64> for FactValue {
    fn from(v: f64) -> Self {
        FactValue::Float(v)
    }
}

impl From<bool> for FactValue {
    fn from(v: bool) -> Self {
        FactValue::Bool(v)
    }
}

impl From<&str> for FactValue {
    fn from(v: &str) -> Self {
        FactValue::Str(v.to_string())
    }
}

impl From<String> for FactValue {
    fn from(v: String) -> Self {
        FactValue::Str(v)
    }
}

impl From<Vec<String>> for FactValue {
    fn from(v: Vec<String>) -> Self {
        FactValue::StrArray(v)
    }
}
