//! # Conditions
//!
//! Typed condition leaves and the ordered condition array a rule's `when`
//! clause is rendered from.

use std::fmt;
use std::sync::Arc;

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::errors::{RuleError, RuleResult};
use super::param::{
    merge_params, BooleanParam, FactParam, FloatParam, IntParam, StringParam, BOOLEAN_TYPE,
    FLOAT_TYPE, INT_TYPE, STRING_TYPE,
};
use super::registry::{TypeRegistry, BETWEEN_INT_CONDITION, GROUP_CONDITION};

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    /// Accepts both the word and the symbol form (`gte` / `>=`)
    pub fn parse(op: &str) -> RuleResult<Self> {
        match op.to_ascii_lowercase().as_str() {
            "eq" | "==" => Ok(CompareOp::Eq),
            "neq" | "!=" => Ok(CompareOp::Neq),
            "gt" | ">" => Ok(CompareOp::Gt),
            "gte" | ">=" => Ok(CompareOp::Gte),
            "lt" | "<" => Ok(CompareOp::Lt),
            "lte" | "<=" => Ok(CompareOp::Lte),
            _ => Err(RuleError::InvalidOperator(op.to_string())),
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Neq => "!=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
        }
    }
}

/// Logic operators joining consecutive conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
    And,
    Or,
}

impl LogicOp {
    /// Empty means "no operator"
    pub fn parse(op: &str) -> RuleResult<Option<Self>> {
        match op.to_ascii_lowercase().as_str() {
            "" => Ok(None),
            "and" | "&&" => Ok(Some(LogicOp::And)),
            "or" | "||" => Ok(Some(LogicOp::Or)),
            _ => Err(RuleError::InvalidOperator(op.to_string())),
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            LogicOp::And => "&&",
            LogicOp::Or => "||",
        }
    }
}

/// A renderable boolean condition
pub trait Condition: fmt::Debug + Send + Sync {
    /// Render as an engine expression reading facts from `var`
    fn render(&self, var: &str) -> RuleResult<String>;

    /// Operator joining this condition to the next one
    fn next_logic(&self) -> Option<LogicOp>;

    /// Facts this condition reads
    fn params(&self) -> Vec<Box<dyn FactParam>>;
}

fn decode_options<T: DeserializeOwned>(kind: &str, options: &Value) -> RuleResult<T> {
    serde_json::from_value(options.clone()).map_err(|e| RuleError::invalid_options(kind, e))
}

pub(crate) fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[derive(Debug, Deserialize)]
struct PrimitiveOptions<T> {
    param: String,
    operator: String,
    ref_value: T,
    #[serde(default)]
    next_op: String,
}

/// Shared shape of the single-fact comparisons
#[derive(Debug, Clone, PartialEq)]
pub struct PrimitiveCondition {
    pub param: String,
    pub operator: CompareOp,
    pub next_op: Option<LogicOp>,
}

impl PrimitiveCondition {
    fn from_options<T>(options: &PrimitiveOptions<T>) -> RuleResult<Self> {
        Ok(Self {
            param: options.param.clone(),
            operator: CompareOp::parse(&options.operator)?,
            next_op: LogicOp::parse(&options.next_op)?,
        })
    }

    fn render_exp(&self, var: &str, getter: &str) -> String {
        format!(
            "{}.Get{}({}) {}",
            var,
            getter,
            quote(&self.param),
            self.operator.symbol()
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntCondition {
    pub base: PrimitiveCondition,
    pub ref_value: i64,
}

impl IntCondition {
    pub fn decode(_: &TypeRegistry, options: &Value) -> RuleResult<Arc<dyn Condition>> {
        let opts: PrimitiveOptions<i64> = decode_options(INT_TYPE, options)?;
        Ok(Arc::new(Self {
            base: PrimitiveCondition::from_options(&opts)?,
            ref_value: opts.ref_value,
        }))
    }
}

impl Condition for IntCondition {
    fn render(&self, var: &str) -> RuleResult<String> {
        Ok(format!("{} {}", self.base.render_exp(var, "Int"), self.ref_value))
    }

    fn next_logic(&self) -> Option<LogicOp> {
        self.base.next_op
    }

    fn params(&self) -> Vec<Box<dyn FactParam>> {
        vec![Box::new(IntParam::named(&self.base.param))]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FloatCondition {
    pub base: PrimitiveCondition,
    pub ref_value: f64,
}

impl FloatCondition {
    pub fn decode(_: &TypeRegistry, options: &Value) -> RuleResult<Arc<dyn Condition>> {
        let opts: PrimitiveOptions<f64> = decode_options(FLOAT_TYPE, options)?;
        Ok(Arc::new(Self {
            base: PrimitiveCondition::from_options(&opts)?,
            ref_value: opts.ref_value,
        }))
    }
}

impl Condition for FloatCondition {
    fn render(&self, var: &str) -> RuleResult<String> {
        Ok(format!(
            "{} {:.6}",
            self.base.render_exp(var, "Float"),
            self.ref_value
        ))
    }

    fn next_logic(&self) -> Option<LogicOp> {
        self.base.next_op
    }

    fn params(&self) -> Vec<Box<dyn FactParam>> {
        vec![Box::new(FloatParam::named(&self.base.param))]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StringCondition {
    pub base: PrimitiveCondition,
    pub ref_value: String,
}

impl StringCondition {
    pub fn decode(_: &TypeRegistry, options: &Value) -> RuleResult<Arc<dyn Condition>> {
        let opts: PrimitiveOptions<String> = decode_options(STRING_TYPE, options)?;
        Ok(Arc::new(Self {
            base: PrimitiveCondition::from_options(&opts)?,
            ref_value: opts.ref_value,
        }))
    }
}

impl Condition for StringCondition {
    fn render(&self, var: &str) -> RuleResult<String> {
        Ok(format!(
            "{} {}",
            self.base.render_exp(var, "String"),
            quote(&self.ref_value)
        ))
    }

    fn next_logic(&self) -> Option<LogicOp> {
        self.base.next_op
    }

    fn params(&self) -> Vec<Box<dyn FactParam>> {
        vec![Box::new(StringParam::named(&self.base.param))]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BooleanCondition {
    pub base: PrimitiveCondition,
    pub ref_value: bool,
}

impl BooleanCondition {
    pub fn decode(_: &TypeRegistry, options: &Value) -> RuleResult<Arc<dyn Condition>> {
        let opts: PrimitiveOptions<bool> = decode_options(BOOLEAN_TYPE, options)?;
        Ok(Arc::new(Self {
            base: PrimitiveCondition::from_options(&opts)?,
            ref_value: opts.ref_value,
        }))
    }
}

impl Condition for BooleanCondition {
    fn render(&self, var: &str) -> RuleResult<String> {
        Ok(format!(
            "{} {}",
            self.base.render_exp(var, "Bool"),
            self.ref_value
        ))
    }

    fn next_logic(&self) -> Option<LogicOp> {
        self.base.next_op
    }

    fn params(&self) -> Vec<Box<dyn FactParam>> {
        vec![Box::new(BooleanParam::named(&self.base.param))]
    }
}

/// `<prefix>_start <= <prefix>_ref <= <prefix>_end`
#[derive(Debug, Clone, PartialEq)]
pub struct BetweenIntCondition {
    pub param_prefix: String,
    pub next_op: Option<LogicOp>,
}

#[derive(Debug, Deserialize)]
struct BetweenIntOptions {
    param_prefix: String,
    #[serde(default)]
    next_op: String,
}

impl BetweenIntCondition {
    pub fn decode(_: &TypeRegistry, options: &Value) -> RuleResult<Arc<dyn Condition>> {
        let opts: BetweenIntOptions = decode_options(BETWEEN_INT_CONDITION, options)?;
        Ok(Arc::new(Self {
            param_prefix: opts.param_prefix,
            next_op: LogicOp::parse(&opts.next_op)?,
        }))
    }

    fn param_name(&self, suffix: &str) -> String {
        format!("{}_{}", self.param_prefix, suffix)
    }
}

impl Condition for BetweenIntCondition {
    fn render(&self, var: &str) -> RuleResult<String> {
        let start = quote(&self.param_name("start"));
        let end = quote(&self.param_name("end"));
        let reference = quote(&self.param_name("ref"));
        Ok(format!(
            "({v}.GetInt({r}) >= {v}.GetInt({s}) && {v}.GetInt({r}) <= {v}.GetInt({e}))",
            v = var,
            r = reference,
            s = start,
            e = end,
        ))
    }

    fn next_logic(&self) -> Option<LogicOp> {
        self.next_op
    }

    fn params(&self) -> Vec<Box<dyn FactParam>> {
        vec![
            Box::new(IntParam::named(self.param_name("start"))),
            Box::new(IntParam::named(self.param_name("end"))),
            Box::new(IntParam::named(self.param_name("ref"))),
        ]
    }
}

/// Parenthesized nested conditions
#[derive(Debug, Clone)]
pub struct GroupCondition {
    pub inner: ConditionArray,
    pub next_op: Option<LogicOp>,
}

#[derive(Debug, Deserialize)]
struct GroupOptions {
    #[serde(default)]
    conditions: Vec<ConditionItemDoc>,
    #[serde(default)]
    next_op: String,
}

impl GroupCondition {
    pub fn decode(registry: &TypeRegistry, options: &Value) -> RuleResult<Arc<dyn Condition>> {
        let opts: GroupOptions = decode_options(GROUP_CONDITION, options)?;
        Ok(Arc::new(Self {
            inner: ConditionArray::decode(registry, opts.conditions)?,
            next_op: LogicOp::parse(&opts.next_op)?,
        }))
    }
}

impl Condition for GroupCondition {
    fn render(&self, var: &str) -> RuleResult<String> {
        Ok(format!("({})", self.inner.render(var)?))
    }

    fn next_logic(&self) -> Option<LogicOp> {
        self.next_op
    }

    fn params(&self) -> Vec<Box<dyn FactParam>> {
        self.inner.params()
    }
}

// ==================
// Condition Array
// ==================

/// `{"type": .., "options": ..}` as it appears in rule documents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ConditionItemDoc {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    options: Value,
}

/// A decoded condition together with the document it came from
#[derive(Debug, Clone)]
struct ConditionItem {
    doc: ConditionItemDoc,
    condition: Arc<dyn Condition>,
}

/// Ordered conditions joined by their next-logic operators
#[derive(Debug, Clone, Default)]
pub struct ConditionArray {
    items: Vec<ConditionItem>,
}

impl ConditionArray {
    fn decode(registry: &TypeRegistry, docs: Vec<ConditionItemDoc>) -> RuleResult<Self> {
        let mut items = Vec::with_capacity(docs.len());
        for doc in docs {
            let condition = registry.decode_condition(&doc.kind, &doc.options)?;
            items.push(ConditionItem { doc, condition });
        }
        Ok(Self { items })
    }

    /// Parse a JSON condition list against a registry
    pub fn from_json(registry: &TypeRegistry, json: &str) -> RuleResult<Self> {
        let docs: Vec<ConditionItemDoc> =
            serde_json::from_str(json).map_err(|e| RuleError::Malformed(e.to_string()))?;
        Self::decode(registry, docs)
    }

    /// Concatenate rendered conditions, inserting each non-last item's
    /// next-logic operator
    pub fn render(&self, var: &str) -> RuleResult<String> {
        let end = self.items.len().saturating_sub(1);
        let mut result = String::new();
        for (idx, item) in self.items.iter().enumerate() {
            result.push_str(&item.condition.render(var)?);
            if idx < end {
                let op = item
                    .condition
                    .next_logic()
                    .ok_or(RuleError::NoNextLogicOp(idx))?;
                result.push(' ');
                result.push_str(op.symbol());
                result.push(' ');
            }
        }
        Ok(result)
    }

    /// Union of params read by every condition
    pub fn params(&self) -> Vec<Box<dyn FactParam>> {
        self.items.iter().fold(Vec::new(), |acc, item| {
            merge_params(acc, &item.condition.params())
        })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Serialize for ConditionArray {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let docs: Vec<&ConditionItemDoc> = self.items.iter().map(|i| &i.doc).collect();
        docs.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ConditionArray {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let docs = Vec::<ConditionItemDoc>::deserialize(deserializer)?;
        Self::decode(TypeRegistry::global(), docs).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(input: &str) -> RuleResult<String> {
        let registry = TypeRegistry::with_builtins();
        ConditionArray::from_json(&registry, input)?.render("Var")
    }

    #[test]
    fn test_render_int_condition() {
        let input = r#"[{"type":"int","options":{"param":"Count","operator":"gte","ref_value":12000}}]"#;
        assert_eq!(render(input).unwrap(), r#"Var.GetInt("Count") >= 12000"#);
    }

    #[test]
    fn test_render_float_condition() {
        let input = r#"[{"type":"float","options":{"param":"Percent","operator":"lte","ref_value":2.5}}]"#;
        assert_eq!(render(input).unwrap(), r#"Var.GetFloat("Percent") <= 2.500000"#);
    }

    #[test]
    fn test_render_string_condition() {
        let input = r#"[{"type":"string","options":{"param":"Access","operator":"eq","ref_value":"GRANTED"}}]"#;
        assert_eq!(render(input).unwrap(), r#"Var.GetString("Access") == "GRANTED""#);
    }

    #[test]
    fn test_render_neq_condition() {
        let input = r#"[{"type":"boolean","options":{"param":"Banned","operator":"neq","ref_value":true}}]"#;
        assert_eq!(render(input).unwrap(), r#"Var.GetBool("Banned") != true"#);
    }

    #[test]
    fn test_render_between_int_condition() {
        let input = r#"[{"type":"between_int","options":{"param_prefix":"period","ref_value":1589303132}}]"#;
        assert_eq!(
            render(input).unwrap(),
            r#"(Var.GetInt("period_ref") >= Var.GetInt("period_start") && Var.GetInt("period_ref") <= Var.GetInt("period_end"))"#
        );
    }

    #[test]
    fn test_render_multiple_conditions() {
        let input = r#"[{"type":"string","options":{"param":"UserId","operator":"eq","ref_value":"12345","next_op":"and"}},{"type":"int","options":{"param":"Level","operator":"gte","ref_value":2,"next_op":"or"}},{"type":"float","options":{"param":"Completion","operator":"lte","ref_value":99.9}}]"#;
        assert_eq!(
            render(input).unwrap(),
            r#"Var.GetString("UserId") == "12345" && Var.GetInt("Level") >= 2 || Var.GetFloat("Completion") <= 99.900000"#
        );
    }

    #[test]
    fn test_render_group_condition() {
        let input = r#"[{"type":"group","options":{"conditions":[{"type":"string","options":{"param":"UserId","operator":"eq","ref_value":"12345","next_op":"and"}},{"type":"int","options":{"param":"Level","operator":"gte","ref_value":2}}],"next_op":"or"}},{"type":"float","options":{"param":"Completion","operator":"lte","ref_value":99.9}}]"#;
        assert_eq!(
            render(input).unwrap(),
            r#"(Var.GetString("UserId") == "12345" && Var.GetInt("Level") >= 2) || Var.GetFloat("Completion") <= 99.900000"#
        );
    }

    #[test]
    fn test_missing_next_logic_is_error() {
        let input = r#"[{"type":"int","options":{"param":"a","operator":"gt","ref_value":1}},{"type":"int","options":{"param":"b","operator":"gt","ref_value":1}}]"#;
        assert!(matches!(render(input), Err(RuleError::NoNextLogicOp(0))));
    }

    #[test]
    fn test_unknown_operator_is_rejected() {
        let input = r#"[{"type":"int","options":{"param":"a","operator":"approx","ref_value":1}}]"#;
        assert!(matches!(render(input), Err(RuleError::InvalidOperator(_))));
    }

    #[test]
    fn test_params_are_unioned() {
        let registry = TypeRegistry::with_builtins();
        let input = r#"[{"type":"between_int","options":{"param_prefix":"period","next_op":"and"}},{"type":"group","options":{"conditions":[{"type":"int","options":{"param":"period_ref","operator":">","ref_value":0}}]}}]"#;
        let conditions = ConditionArray::from_json(&registry, input).unwrap();
        let mut names: Vec<String> = conditions
            .params()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["period_end", "period_ref", "period_start"]);
    }

    #[test]
    fn test_serialize_preserves_document() {
        let input = r#"[{"type":"int","options":{"param":"distance","operator":">=","ref_value":10000}}]"#;
        let conditions: ConditionArray = serde_json::from_str(input).unwrap();
        let back = serde_json::to_value(&conditions).unwrap();
        assert_eq!(back, serde_json::from_str::<Value>(input).unwrap());
    }
}
