//! # Type Registry
//!
//! Maps type tags in rule documents to param constructors and to
//! condition/action decoders.
//!
//! The global registry is process-wide shared state. It is initialized
//! with the built-in types on first access and may be extended or pruned
//! at runtime; every map is guarded by its own `RwLock`. Decoders are
//! cloned out of the map before they run, so a decoder may recurse into
//! the registry (group conditions do).

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use serde_json::Value;

use super::action::{Action, FactMapAction, MathOp};
use super::condition::{
    BetweenIntCondition, BooleanCondition, Condition, FloatCondition, GroupCondition,
    IntCondition, StringCondition,
};
use super::errors::{RuleError, RuleResult};
use super::param::{
    BooleanParam, FactParam, FloatParam, IntParam, StringArrayParam, StringParam, BOOLEAN_TYPE,
    FLOAT_TYPE, INT_TYPE, STRING_ARRAY_TYPE, STRING_TYPE,
};

pub const GROUP_CONDITION: &str = "group";
pub const BETWEEN_INT_CONDITION: &str = "between_int";

/// Builds an empty param of one type
pub type ParamConstructor = Arc<dyn Fn() -> Box<dyn FactParam> + Send + Sync>;

/// Decodes a condition from its `options` object
pub type ConditionDecoder =
    Arc<dyn Fn(&TypeRegistry, &Value) -> RuleResult<Arc<dyn Condition>> + Send + Sync>;

/// Decodes an action from its `options` object
pub type ActionDecoder =
    Arc<dyn Fn(&TypeRegistry, &Value) -> RuleResult<Arc<dyn Action>> + Send + Sync>;

static GLOBAL: OnceLock<TypeRegistry> = OnceLock::new();

/// Wrap a concrete param factory as a registry constructor
pub fn param_constructor<P, F>(make: F) -> ParamConstructor
where
    P: FactParam + 'static,
    F: Fn() -> P + Send + Sync + 'static,
{
    Arc::new(move || Box::new(make()) as Box<dyn FactParam>)
}

/// Registry of param, condition and action types
pub struct TypeRegistry {
    params: RwLock<HashMap<String, ParamConstructor>>,
    conditions: RwLock<HashMap<String, ConditionDecoder>>,
    actions: RwLock<HashMap<String, ActionDecoder>>,
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("params", &self.param_types())
            .finish_non_exhaustive()
    }
}

impl TypeRegistry {
    /// Create an empty registry
    pub fn empty() -> Self {
        Self {
            params: RwLock::new(HashMap::new()),
            conditions: RwLock::new(HashMap::new()),
            actions: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry holding the built-in types
    pub fn with_builtins() -> Self {
        let mut params: HashMap<String, ParamConstructor> = HashMap::new();
        params.insert(INT_TYPE.into(), param_constructor(|| IntParam::named("")));
        params.insert(FLOAT_TYPE.into(), param_constructor(|| FloatParam::named("")));
        params.insert(STRING_TYPE.into(), param_constructor(|| StringParam::named("")));
        params.insert(BOOLEAN_TYPE.into(), param_constructor(|| BooleanParam::named("")));
        params.insert(
            STRING_ARRAY_TYPE.into(),
            param_constructor(|| StringArrayParam::named("")),
        );

        let mut conditions: HashMap<String, ConditionDecoder> = HashMap::new();
        conditions.insert(INT_TYPE.into(), Arc::new(IntCondition::decode));
        conditions.insert(FLOAT_TYPE.into(), Arc::new(FloatCondition::decode));
        conditions.insert(STRING_TYPE.into(), Arc::new(StringCondition::decode));
        conditions.insert(BOOLEAN_TYPE.into(), Arc::new(BooleanCondition::decode));
        conditions.insert(BETWEEN_INT_CONDITION.into(), Arc::new(BetweenIntCondition::decode));
        conditions.insert(GROUP_CONDITION.into(), Arc::new(GroupCondition::decode));

        let mut actions: HashMap<String, ActionDecoder> = HashMap::new();
        for op in MathOp::ALL {
            actions.insert(
                op.tag().into(),
                Arc::new(move |reg: &TypeRegistry, options: &Value| {
                    FactMapAction::decode(reg, op, options)
                }),
            );
        }

        Self {
            params: RwLock::new(params),
            conditions: RwLock::new(conditions),
            actions: RwLock::new(actions),
        }
    }

    /// The process-wide registry
    pub fn global() -> &'static TypeRegistry {
        GLOBAL.get_or_init(TypeRegistry::with_builtins)
    }

    // ==================
    // Params
    // ==================

    pub fn register_param(&self, tag: &str, constructor: ParamConstructor) -> RuleResult<()> {
        self.params
            .write()
            .map_err(|_| RuleError::Internal("Lock poisoned".into()))?
            .insert(tag.to_string(), constructor);
        Ok(())
    }

    pub fn remove_param(&self, tag: &str) -> bool {
        self.params
            .write()
            .map(|mut params| params.remove(tag).is_some())
            .unwrap_or(false)
    }

    /// Construct an empty param for a type tag
    pub fn new_param(&self, tag: &str) -> RuleResult<Box<dyn FactParam>> {
        let constructor = {
            let params = self
                .params
                .read()
                .map_err(|_| RuleError::Internal("Lock poisoned".into()))?;
            params
                .get(tag)
                .cloned()
                .ok_or_else(|| RuleError::ParamUnsupported(tag.to_string()))?
        };
        Ok(constructor())
    }

    pub fn param_types(&self) -> Vec<String> {
        let mut tags: Vec<String> = self
            .params
            .read()
            .map(|p| p.keys().cloned().collect())
            .unwrap_or_default();
        tags.sort();
        tags
    }

    // ==================
    // Conditions
    // ==================

    pub fn register_condition(&self, tag: &str, decoder: ConditionDecoder) -> RuleResult<()> {
        self.conditions
            .write()
            .map_err(|_| RuleError::Internal("Lock poisoned".into()))?
            .insert(tag.to_string(), decoder);
        Ok(())
    }

    pub fn remove_condition(&self, tag: &str) -> bool {
        self.conditions
            .write()
            .map(|mut conditions| conditions.remove(tag).is_some())
            .unwrap_or(false)
    }

    pub fn decode_condition(&self, tag: &str, options: &Value) -> RuleResult<Arc<dyn Condition>> {
        let decoder = {
            let conditions = self
                .conditions
                .read()
                .map_err(|_| RuleError::Internal("Lock poisoned".into()))?;
            conditions
                .get(tag)
                .cloned()
                .ok_or_else(|| RuleError::ConditionUnsupported(tag.to_string()))?
        };
        decoder(self, options)
    }

    // ==================
    // Actions
    // ==================

    pub fn register_action(&self, tag: &str, decoder: ActionDecoder) -> RuleResult<()> {
        self.actions
            .write()
            .map_err(|_| RuleError::Internal("Lock poisoned".into()))?
            .insert(tag.to_string(), decoder);
        Ok(())
    }

    pub fn remove_action(&self, tag: &str) -> bool {
        self.actions
            .write()
            .map(|mut actions| actions.remove(tag).is_some())
            .unwrap_or(false)
    }

    pub fn decode_action(&self, tag: &str, options: &Value) -> RuleResult<Arc<dyn Action>> {
        let decoder = {
            let actions = self
                .actions
                .read()
                .map_err(|_| RuleError::Internal("Lock poisoned".into()))?;
            actions
                .get(tag)
                .cloned()
                .ok_or_else(|| RuleError::ActionUnsupported(tag.to_string()))?
        };
        decoder(self, options)
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::value::FactValue;
    use serde_json::json;

    #[derive(Debug, Clone)]
    struct CounterParam {
        name: String,
        hits: i64,
    }

    impl FactParam for CounterParam {
        fn name(&self) -> &str {
            &self.name
        }
        fn set_name(&mut self, name: &str) {
            self.name = name.to_string();
        }
        fn type_tag(&self) -> &str {
            "counter"
        }
        fn is_valid(&self) -> bool {
            true
        }
        fn set_value(&mut self, _value: &FactValue) {
            self.hits += 1;
        }
        fn value(&self) -> FactValue {
            FactValue::Int(self.hits)
        }
        fn clone_box(&self) -> Box<dyn FactParam> {
            Box::new(self.clone())
        }
    }

    #[test]
    fn test_builtin_params() {
        let registry = TypeRegistry::with_builtins();
        assert_eq!(
            registry.param_types(),
            vec!["boolean", "float", "int", "string", "string_array"]
        );
        assert_eq!(registry.new_param("int").unwrap().type_tag(), "int");
        assert!(matches!(
            registry.new_param("matrix"),
            Err(RuleError::ParamUnsupported(_))
        ));
    }

    #[test]
    fn test_register_and_remove_param_type() {
        let registry = TypeRegistry::with_builtins();
        registry.register_param(
            "counter",
            param_constructor(|| CounterParam {
                name: String::new(),
                hits: 0,
            }),
        )
        .unwrap();

        let mut param = registry.new_param("counter").unwrap();
        param.set_value(&FactValue::Null);
        assert_eq!(param.value(), FactValue::Int(1));
        assert!(param.as_math().is_none());

        assert!(registry.remove_param("counter"));
        assert!(registry.new_param("counter").is_err());
    }

    #[test]
    fn test_unknown_condition_and_action() {
        let registry = TypeRegistry::with_builtins();
        assert!(matches!(
            registry.decode_condition("regex", &json!({})),
            Err(RuleError::ConditionUnsupported(_))
        ));
        assert!(matches!(
            registry.decode_action("modulo", &json!({})),
            Err(RuleError::ActionUnsupported(_))
        ));
    }

    #[test]
    fn test_remove_condition_type() {
        let registry = TypeRegistry::with_builtins();
        assert!(registry.remove_condition("boolean"));
        assert!(!registry.remove_condition("boolean"));
        let options = json!({"param": "premium", "operator": "eq", "ref_value": true});
        assert!(registry.decode_condition("boolean", &options).is_err());
    }

    #[test]
    fn test_register_on_poisoned_lock() {
        let registry = TypeRegistry::with_builtins();
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = registry.actions.write().unwrap();
            panic!("writer died");
        }));

        let decoder: ActionDecoder = Arc::new(|reg: &TypeRegistry, options: &Value| {
            FactMapAction::decode(reg, MathOp::Add, options)
        });
        let err = registry.register_action("increment", decoder).unwrap_err();
        assert!(matches!(err, RuleError::Internal(_)));

        // Other tables are unaffected
        assert!(registry
            .register_condition("flag", Arc::new(BooleanCondition::decode))
            .is_ok());
    }
}
