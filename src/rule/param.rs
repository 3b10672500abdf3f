//! # Fact Params
//!
//! Named, typed, mutable values with a validity flag. A failed conversion
//! or mutation never raises: it flips `valid` to false and readers of the
//! param treat that as a defect.
//!
//! Capabilities are exposed through `as_math`/`as_array` instead of a type
//! hierarchy, so a param type registered at runtime opts into exactly the
//! operations it supports.

use std::collections::HashSet;
use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::registry::TypeRegistry;
use super::value::FactValue;

pub const INT_TYPE: &str = "int";
pub const FLOAT_TYPE: &str = "float";
pub const STRING_TYPE: &str = "string";
pub const BOOLEAN_TYPE: &str = "boolean";
pub const STRING_ARRAY_TYPE: &str = "string_array";

/// A named, typed fact value
pub trait FactParam: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;
    fn set_name(&mut self, name: &str);
    fn type_tag(&self) -> &str;
    fn is_valid(&self) -> bool;

    /// Convert and store. Sets validity.
    fn set_value(&mut self, value: &FactValue);

    fn value(&self) -> FactValue;

    /// Numeric mutation capability
    fn as_math(&mut self) -> Option<&mut dyn MathParam> {
        None
    }

    /// Array mutation capability
    fn as_array(&mut self) -> Option<&mut dyn ArrayParam> {
        None
    }

    fn clone_box(&self) -> Box<dyn FactParam>;
}

impl Clone for Box<dyn FactParam> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Arithmetic mutations
pub trait MathParam {
    fn add(&mut self, value: &FactValue);
    fn subtract(&mut self, value: &FactValue);
    fn multiply(&mut self, value: &FactValue);
    fn divide(&mut self, value: &FactValue);
}

/// Array mutations
pub trait ArrayParam {
    fn get_at(&self, index: usize) -> Option<FactValue>;
    fn push(&mut self, value: &FactValue);
    fn set_at(&mut self, index: usize, value: &FactValue);
    fn remove_at(&mut self, index: usize);
    /// Append items not already present
    fn union(&mut self, value: &FactValue);
    /// Append all items
    fn merge(&mut self, value: &FactValue);
}

// ==================
// Int
// ==================

#[derive(Debug, Clone, PartialEq)]
pub struct IntParam {
    pub name: String,
    pub value: i64,
    pub valid: bool,
}

impl IntParam {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: 0,
            valid: true,
        }
    }

    fn apply(&mut self, value: &FactValue, op: fn(i64, i64) -> Option<i64>) {
        match value.as_int().and_then(|v| op(self.value, v)) {
            Some(result) => {
                self.value = result;
                self.valid = true;
            }
            None => self.valid = false,
        }
    }
}

impl FactParam for IntParam {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn type_tag(&self) -> &str {
        INT_TYPE
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn set_value(&mut self, value: &FactValue) {
        match value.as_int() {
            Some(v) => {
                self.value = v;
                self.valid = true;
            }
            None => {
                self.value = 0;
                self.valid = false;
            }
        }
    }

    fn value(&self) -> FactValue {
        FactValue::Int(self.value)
    }

    fn as_math(&mut self) -> Option<&mut dyn MathParam> {
        Some(self)
    }

    fn clone_box(&self) -> Box<dyn FactParam> {
        Box::new(self.clone())
    }
}

impl MathParam for IntParam {
    fn add(&mut self, value: &FactValue) {
        self.apply(value, i64::checked_add);
    }

    fn subtract(&mut self, value: &FactValue) {
        self.apply(value, i64::checked_sub);
    }

    fn multiply(&mut self, value: &FactValue) {
        self.apply(value, i64::checked_mul);
    }

    // Division by zero yields None and invalidates the param.
    fn divide(&mut self, value: &FactValue) {
        self.apply(value, i64::checked_div);
    }
}

// ==================
// Float
// ==================

#[derive(Debug, Clone, PartialEq)]
pub struct FloatParam {
    pub name: String,
    pub value: f64,
    pub valid: bool,
}

impl FloatParam {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: 0.0,
            valid: true,
        }
    }

    fn apply(&mut self, value: &FactValue, op: fn(f64, f64) -> f64) {
        match value.as_float() {
            Some(v) => {
                self.value = op(self.value, v);
                self.valid = self.value.is_finite();
            }
            None => self.valid = false,
        }
    }
}

impl FactParam for FloatParam {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn type_tag(&self) -> &str {
        FLOAT_TYPE
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn set_value(&mut self, value: &FactValue) {
        match value.as_float() {
            Some(v) => {
                self.value = v;
                self.valid = true;
            }
            None => {
                self.value = 0.0;
                self.valid = false;
            }
        }
    }

    fn value(&self) -> FactValue {
        FactValue::Float(self.value)
    }

    fn as_math(&mut self) -> Option<&mut dyn MathParam> {
        Some(self)
    }

    fn clone_box(&self) -> Box<dyn FactParam> {
        Box::new(self.clone())
    }
}

impl MathParam for FloatParam {
    fn add(&mut self, value: &FactValue) {
        self.apply(value, |a, b| a + b);
    }

    fn subtract(&mut self, value: &FactValue) {
        self.apply(value, |a, b| a - b);
    }

    fn multiply(&mut self, value: &FactValue) {
        self.apply(value, |a, b| a * b);
    }

    fn divide(&mut self, value: &FactValue) {
        self.apply(value, |a, b| a / b);
    }
}

// ==================
// String / Boolean
// ==================

#[derive(Debug, Clone, PartialEq)]
pub struct StringParam {
    pub name: String,
    pub value: String,
    pub valid: bool,
}

impl StringParam {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: String::new(),
            valid: true,
        }
    }
}

impl FactParam for StringParam {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn type_tag(&self) -> &str {
        STRING_TYPE
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn set_value(&mut self, value: &FactValue) {
        match value {
            FactValue::Str(s) => {
                self.value = s.clone();
                self.valid = true;
            }
            _ => self.valid = false,
        }
    }

    fn value(&self) -> FactValue {
        FactValue::Str(self.value.clone())
    }

    fn clone_box(&self) -> Box<dyn FactParam> {
        Box::new(self.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BooleanParam {
    pub name: String,
    pub value: bool,
    pub valid: bool,
}

impl BooleanParam {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: false,
            valid: true,
        }
    }
}

impl FactParam for BooleanParam {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn type_tag(&self) -> &str {
        BOOLEAN_TYPE
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn set_value(&mut self, value: &FactValue) {
        match value {
            FactValue::Bool(b) => self.value = *b,
            FactValue::Str(s) => self.value = s.eq_ignore_ascii_case("true"),
            _ => {
                self.valid = false;
                return;
            }
        }
        self.valid = true;
    }

    fn value(&self) -> FactValue {
        FactValue::Bool(self.value)
    }

    fn clone_box(&self) -> Box<dyn FactParam> {
        Box::new(self.clone())
    }
}

// ==================
// String Array
// ==================

#[derive(Debug, Clone, PartialEq)]
pub struct StringArrayParam {
    pub name: String,
    pub value: Vec<String>,
    pub valid: bool,
}

impl StringArrayParam {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Vec::new(),
            valid: true,
        }
    }
}

impl FactParam for StringArrayParam {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn type_tag(&self) -> &str {
        STRING_ARRAY_TYPE
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn set_value(&mut self, value: &FactValue) {
        match value {
            FactValue::StrArray(items) => {
                self.value = items.clone();
                self.valid = true;
            }
            _ => self.valid = false,
        }
    }

    fn value(&self) -> FactValue {
        FactValue::StrArray(self.value.clone())
    }

    fn as_array(&mut self) -> Option<&mut dyn ArrayParam> {
        Some(self)
    }

    fn clone_box(&self) -> Box<dyn FactParam> {
        Box::new(self.clone())
    }
}

impl ArrayParam for StringArrayParam {
    fn get_at(&self, index: usize) -> Option<FactValue> {
        self.value.get(index).cloned().map(FactValue::Str)
    }

    fn push(&mut self, value: &FactValue) {
        match value.as_str() {
            Some(s) => {
                self.value.push(s.to_string());
                self.valid = true;
            }
            None => self.valid = false,
        }
    }

    fn set_at(&mut self, index: usize, value: &FactValue) {
        match (value.as_str(), self.value.get_mut(index)) {
            (Some(s), Some(slot)) => {
                *slot = s.to_string();
                self.valid = true;
            }
            _ => self.valid = false,
        }
    }

    // Swap-remove: order is not preserved.
    fn remove_at(&mut self, index: usize) {
        if index >= self.value.len() {
            self.valid = false;
            return;
        }
        self.value.swap_remove(index);
        self.valid = true;
    }

    fn union(&mut self, value: &FactValue) {
        let FactValue::StrArray(items) = value else {
            self.valid = false;
            return;
        };
        let mut seen: HashSet<String> = self.value.iter().cloned().collect();
        for item in items {
            if seen.insert(item.clone()) {
                self.value.push(item.clone());
            }
        }
        self.valid = true;
    }

    fn merge(&mut self, value: &FactValue) {
        let FactValue::StrArray(items) = value else {
            self.valid = false;
            return;
        };
        self.value.extend(items.iter().cloned());
        self.valid = true;
    }
}

// ==================
// Param Array
// ==================

/// Extra params declared by a rule: `[{"name": .., "type": ..}]`
#[derive(Debug, Clone, Default)]
pub struct ParamArray {
    items: Vec<Box<dyn FactParam>>,
}

#[derive(Serialize, Deserialize)]
struct ParamDecl {
    name: String,
    #[serde(rename = "type")]
    kind: String,
}

impl ParamArray {
    pub fn new(items: Vec<Box<dyn FactParam>>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[Box<dyn FactParam>] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Serialize for ParamArray {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let decls: Vec<ParamDecl> = self
            .items
            .iter()
            .map(|p| ParamDecl {
                name: p.name().to_string(),
                kind: p.type_tag().to_string(),
            })
            .collect();
        decls.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ParamArray {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let decls = Vec::<ParamDecl>::deserialize(deserializer)?;
        let registry = TypeRegistry::global();
        let mut items = Vec::with_capacity(decls.len());
        for decl in decls {
            let mut param = registry.new_param(&decl.kind).map_err(D::Error::custom)?;
            param.set_name(&decl.name);
            items.push(param);
        }
        Ok(Self { items })
    }
}

/// Union two param lists by name. Entries from `a` win.
pub fn merge_params(
    a: Vec<Box<dyn FactParam>>,
    b: &[Box<dyn FactParam>],
) -> Vec<Box<dyn FactParam>> {
    let mut names: HashSet<String> = a.iter().map(|p| p.name().to_string()).collect();
    let mut merged = a;
    for param in b {
        if names.insert(param.name().to_string()) {
            merged.push(param.clone_box());
        }
    }
    merged
}
