//! # Fact Map
//!
//! Per-evaluation name → fact mapping. Reads of missing or invalid facts
//! return a [`RuleError`] rather than panicking.

use std::collections::HashMap;

use super::action::MathOp;
use super::errors::{RuleError, RuleResult};
use super::param::FactParam;
use super::value::FactValue;

/// Facts available to one evaluation
#[derive(Debug, Clone, Default)]
pub struct FactMap {
    params: HashMap<String, Box<dyn FactParam>>,
}

impl FactMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map keyed by each param's name
    pub fn from_params(params: Vec<Box<dyn FactParam>>) -> Self {
        let mut map = Self::new();
        for param in params {
            map.assign(param);
        }
        map
    }

    /// Insert or replace a fact
    pub fn assign(&mut self, param: Box<dyn FactParam>) {
        self.params.insert(param.name().to_string(), param);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&dyn FactParam> {
        self.params.get(name).map(|p| &**p)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Box<dyn FactParam>> {
        self.params.get_mut(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.params.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    // ==================
    // Getters
    // ==================

    fn valid_value(&self, getter: &'static str, name: &str) -> RuleResult<FactValue> {
        let param = self
            .get(name)
            .ok_or_else(|| RuleError::FactNotFound(name.to_string()))?;
        if !param.is_valid() {
            return Err(invalid(getter, param));
        }
        Ok(param.value())
    }

    fn typed<T>(
        &self,
        getter: &'static str,
        name: &str,
        extract: impl FnOnce(FactValue) -> Option<T>,
    ) -> RuleResult<T> {
        let value = self.valid_value(getter, name)?;
        extract(value).ok_or_else(|| match self.get(name) {
            Some(param) => invalid(getter, param),
            None => RuleError::FactNotFound(name.to_string()),
        })
    }

    pub fn get_int(&self, name: &str) -> RuleResult<i64> {
        self.typed("GetInt", name, |v| match v {
            FactValue::Int(i) => Some(i),
            _ => None,
        })
    }

    pub fn get_float(&self, name: &str) -> RuleResult<f64> {
        self.typed("GetFloat", name, |v| match v {
            FactValue::Float(f) => Some(f),
            _ => None,
        })
    }

    /// Any valid fact reads as its display form
    pub fn get_string(&self, name: &str) -> RuleResult<String> {
        self.typed("GetString", name, |v| match v {
            FactValue::Str(s) => Some(s),
            FactValue::Null => None,
            other => Some(other.to_string()),
        })
    }

    pub fn get_bool(&self, name: &str) -> RuleResult<bool> {
        self.typed("GetBool", name, |v| match v {
            FactValue::Bool(b) => Some(b),
            _ => None,
        })
    }

    // ==================
    // Mutations
    // ==================

    /// Convert and store a value into an existing fact
    pub fn set(&mut self, name: &str, value: &FactValue) -> RuleResult<()> {
        let param = self
            .params
            .get_mut(name)
            .ok_or_else(|| RuleError::FactNotFound(name.to_string()))?;
        param.set_value(value);
        if !param.is_valid() {
            return Err(invalid("Set", &**param));
        }
        Ok(())
    }

    pub fn add(&mut self, name: &str, value: &FactValue) -> RuleResult<()> {
        self.math(name, MathOp::Add, value)
    }

    pub fn subtract(&mut self, name: &str, value: &FactValue) -> RuleResult<()> {
        self.math(name, MathOp::Subtract, value)
    }

    pub fn multiply(&mut self, name: &str, value: &FactValue) -> RuleResult<()> {
        self.math(name, MathOp::Multiply, value)
    }

    pub fn divide(&mut self, name: &str, value: &FactValue) -> RuleResult<()> {
        self.math(name, MathOp::Divide, value)
    }

    /// Apply a math op to a numeric fact
    pub fn math(&mut self, name: &str, op: MathOp, value: &FactValue) -> RuleResult<()> {
        if op == MathOp::Assign {
            return self.set(name, value);
        }

        let param = self
            .params
            .get_mut(name)
            .ok_or_else(|| RuleError::FactNotFound(name.to_string()))?;
        if !value.is_numeric() {
            return Err(RuleError::InvalidValue {
                getter: op.func(),
                name: name.to_string(),
                kind: value.type_name().to_string(),
            });
        }

        let math = param.as_math().ok_or_else(|| RuleError::Unsupported {
            name: name.to_string(),
            capability: "math",
        })?;
        match op {
            MathOp::Add => math.add(value),
            MathOp::Subtract => math.subtract(value),
            MathOp::Multiply => math.multiply(value),
            MathOp::Divide => math.divide(value),
            MathOp::Assign => {}
        }

        if !param.is_valid() {
            return Err(invalid(op.func(), &**param));
        }
        Ok(())
    }

    /// Append to an array fact
    pub fn array_push(&mut self, name: &str, value: &FactValue) -> RuleResult<()> {
        let param = self
            .params
            .get_mut(name)
            .ok_or_else(|| RuleError::FactNotFound(name.to_string()))?;
        let array = param.as_array().ok_or_else(|| RuleError::Unsupported {
            name: name.to_string(),
            capability: "array",
        })?;
        array.push(value);
        if !param.is_valid() {
            return Err(invalid("Push", &**param));
        }
        Ok(())
    }
}

fn invalid(getter: &'static str, param: &dyn FactParam) -> RuleError {
    RuleError::InvalidValue {
        getter,
        name: param.name().to_string(),
        kind: param.type_tag().to_string(),
    }
}
