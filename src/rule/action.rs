//! # Actions
//!
//! Math actions applied to the fact map when a rule fires.

use std::fmt;
use std::sync::Arc;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::condition::quote;
use super::errors::{RuleError, RuleResult};
use super::param::{
    merge_params, FactParam, BOOLEAN_TYPE, FLOAT_TYPE, INT_TYPE, STRING_ARRAY_TYPE, STRING_TYPE,
};
use super::registry::TypeRegistry;

/// Values with this prefix reference another fact instead of a literal
pub const PARAM_REF_PREFIX: &str = "$param:";

/// Mutation applied to an action's target fact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MathOp {
    Assign,
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl MathOp {
    pub const ALL: [MathOp; 5] = [
        MathOp::Assign,
        MathOp::Add,
        MathOp::Subtract,
        MathOp::Multiply,
        MathOp::Divide,
    ];

    /// Type tag used in rule documents
    pub fn tag(&self) -> &'static str {
        match self {
            MathOp::Assign => "assign",
            MathOp::Add => "add",
            MathOp::Subtract => "subtract",
            MathOp::Multiply => "multiply",
            MathOp::Divide => "divide",
        }
    }

    /// Fact map function the op renders to
    pub fn func(&self) -> &'static str {
        match self {
            MathOp::Assign => "Set",
            MathOp::Add => "Add",
            MathOp::Subtract => "Subtract",
            MathOp::Multiply => "Multiply",
            MathOp::Divide => "Divide",
        }
    }
}

impl fmt::Display for MathOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A renderable rule action
pub trait Action: fmt::Debug + Send + Sync {
    /// Name of the fact this action mutates
    fn target_name(&self) -> &str;

    /// Literal value (or `$param:` reference) as written in the document
    fn value(&self) -> &Value;

    /// Render as an engine statement, without the trailing `;`
    fn render(&self, var: &str) -> RuleResult<String>;

    /// Empty params for every fact this action writes
    fn targets(&self) -> Vec<Box<dyn FactParam>>;
}

/// Getter used to read a fact of the given type
pub fn getter_for(type_tag: &str) -> Option<&'static str> {
    match type_tag {
        INT_TYPE => Some("GetInt"),
        FLOAT_TYPE => Some("GetFloat"),
        STRING_TYPE => Some("GetString"),
        BOOLEAN_TYPE => Some("GetBool"),
        _ => None,
    }
}

fn infer_type(value: &Value) -> &'static str {
    match value {
        Value::Bool(_) => BOOLEAN_TYPE,
        Value::Number(n) if n.is_i64() || n.is_u64() => INT_TYPE,
        Value::Number(_) => FLOAT_TYPE,
        Value::Array(_) => STRING_ARRAY_TYPE,
        _ => STRING_TYPE,
    }
}

#[derive(Debug, Deserialize)]
struct FactMapActionOptions {
    target: String,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    value_type: String,
}

/// `<var>.<Op>("<target>", <value>)`
#[derive(Debug)]
pub struct FactMapAction {
    pub target: String,
    pub op: MathOp,
    pub value: Value,
    pub value_type: String,
    template: Option<Box<dyn FactParam>>,
}

impl FactMapAction {
    pub fn decode(
        registry: &TypeRegistry,
        op: MathOp,
        options: &Value,
    ) -> RuleResult<Arc<dyn Action>> {
        let opts: FactMapActionOptions = serde_json::from_value(options.clone())
            .map_err(|e| RuleError::invalid_options(op.tag(), e))?;

        let value_type = if opts.value_type.is_empty() {
            infer_type(&opts.value).to_string()
        } else {
            opts.value_type
        };

        // Unknown value types still render; they just contribute no target
        let template = registry.new_param(&value_type).ok().map(|mut param| {
            param.set_name(&opts.target);
            param
        });

        Ok(Arc::new(Self {
            target: opts.target,
            op,
            value: opts.value,
            value_type,
            template,
        }))
    }

    /// Name of the referenced fact, if the value is a `$param:` reference
    pub fn param_ref(&self) -> Option<&str> {
        self.value
            .as_str()
            .and_then(|s| s.strip_prefix(PARAM_REF_PREFIX))
    }

    fn render_value(&self, var: &str) -> RuleResult<String> {
        match self.param_ref() {
            Some(name) => {
                let getter = getter_for(&self.value_type).ok_or_else(|| {
                    RuleError::invalid_options(
                        self.op.tag(),
                        format!("cannot reference a fact of type {}", self.value_type),
                    )
                })?;
                Ok(format!("{}.{}({})", var, getter, quote(name)))
            }
            None => Ok(match &self.value {
                Value::String(s) => quote(s),
                other => other.to_string(),
            }),
        }
    }
}

impl Action for FactMapAction {
    fn target_name(&self) -> &str {
        &self.target
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn render(&self, var: &str) -> RuleResult<String> {
        Ok(format!(
            "{}.{}({}, {})",
            var,
            self.op.func(),
            quote(&self.target),
            self.render_value(var)?
        ))
    }

    fn targets(&self) -> Vec<Box<dyn FactParam>> {
        self.template.iter().map(|p| p.clone_box()).collect()
    }
}

// ==================
// Action Array
// ==================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ActionItemDoc {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    options: Value,
}

#[derive(Debug, Clone)]
struct ActionItem {
    doc: ActionItemDoc,
    action: Arc<dyn Action>,
}

/// Ordered actions of a rule's `then` clause
#[derive(Debug, Clone, Default)]
pub struct ActionArray {
    items: Vec<ActionItem>,
}

impl ActionArray {
    fn decode(registry: &TypeRegistry, docs: Vec<ActionItemDoc>) -> RuleResult<Self> {
        let mut items = Vec::with_capacity(docs.len());
        for doc in docs {
            let action = registry.decode_action(&doc.kind, &doc.options)?;
            items.push(ActionItem { doc, action });
        }
        Ok(Self { items })
    }

    /// Parse a JSON action list against a registry
    pub fn from_json(registry: &TypeRegistry, json: &str) -> RuleResult<Self> {
        let docs: Vec<ActionItemDoc> =
            serde_json::from_str(json).map_err(|e| RuleError::Malformed(e.to_string()))?;
        Self::decode(registry, docs)
    }

    /// One statement per action, each terminated by `;`
    pub fn render(&self, var: &str) -> RuleResult<String> {
        let mut lines = Vec::with_capacity(self.items.len());
        for item in &self.items {
            lines.push(format!("{};", item.action.render(var)?));
        }
        Ok(lines.join("\n    "))
    }

    /// Union of every action's target params
    pub fn targets(&self) -> Vec<Box<dyn FactParam>> {
        self.items.iter().fold(Vec::new(), |acc, item| {
            merge_params(acc, &item.action.targets())
        })
    }

    /// First action writing `target`
    pub fn find_by_target_name(&self, target: &str) -> Option<&dyn Action> {
        self.items
            .iter()
            .find(|item| item.action.target_name() == target)
            .map(|item| &*item.action)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Serialize for ActionArray {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let docs: Vec<&ActionItemDoc> = self.items.iter().map(|i| &i.doc).collect();
        docs.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ActionArray {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let docs = Vec::<ActionItemDoc>::deserialize(deserializer)?;
        Self::decode(TypeRegistry::global(), docs).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(input: &str) -> RuleResult<String> {
        let registry = TypeRegistry::with_builtins();
        ActionArray::from_json(&registry, input)?.render("Var")
    }

    #[test]
    fn test_render_math_actions() {
        for (tag, func) in [
            ("add", "Add"),
            ("subtract", "Subtract"),
            ("multiply", "Multiply"),
            ("divide", "Divide"),
            ("assign", "Set"),
        ] {
            let input = format!(
                r#"[{{"type":"{}","options":{{"target":"credit","value":1,"value_type":"int"}}}}]"#,
                tag
            );
            assert_eq!(render(&input).unwrap(), format!(r#"Var.{}("credit", 1);"#, func));
        }
    }

    #[test]
    fn test_render_param_reference() {
        let input = r#"[{"type":"assign","options":{"target":"credit","value":"$param:bonus","value_type":"float"}}]"#;
        assert_eq!(
            render(input).unwrap(),
            r#"Var.Set("credit", Var.GetFloat("bonus"));"#
        );
    }

    #[test]
    fn test_render_string_literal_is_quoted() {
        let input = r#"[{"type":"assign","options":{"target":"tier","value":"gold","value_type":"string"}}]"#;
        assert_eq!(render(input).unwrap(), r#"Var.Set("tier", "gold");"#);
    }

    #[test]
    fn test_render_string_literal_control_chars() {
        let input = r#"[{"type":"assign","options":{"target":"tier","value":"a\b\"c\\d","value_type":"string"}}]"#;
        assert_eq!(
            render(input).unwrap(),
            "Var.Set(\"tier\", \"a\u{8}b\\\"c\\\\d\");"
        );
    }

    #[test]
    fn test_render_multiple_actions() {
        let input = r#"[{"type":"add","options":{"target":"credit","value":1,"value_type":"int"}},{"type":"multiply","options":{"target":"score","value":1.5,"value_type":"float"}}]"#;
        assert_eq!(
            render(input).unwrap(),
            "Var.Add(\"credit\", 1);\n    Var.Multiply(\"score\", 1.5);"
        );
    }

    #[test]
    fn test_targets_and_lookup() {
        let registry = TypeRegistry::with_builtins();
        let input = r#"[{"type":"add","options":{"target":"credit","value":3}}]"#;
        let actions = ActionArray::from_json(&registry, input).unwrap();

        let targets = actions.targets();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].name(), "credit");
        assert_eq!(targets[0].type_tag(), INT_TYPE);

        let credit = actions.find_by_target_name("credit").unwrap();
        assert_eq!(credit.value(), &serde_json::json!(3));
        assert!(actions.find_by_target_name("distance").is_none());
    }

    #[test]
    fn test_unknown_action_type() {
        let input = r#"[{"type":"modulo","options":{"target":"credit","value":2}}]"#;
        assert!(matches!(render(input), Err(RuleError::ActionUnsupported(_))));
    }
}
