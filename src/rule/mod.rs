//! # Rule Model
//!
//! Declarative challenge rules: typed facts, conditions and actions, the
//! registries that decode them, and the resolvers that populate facts
//! before a rule runs.

pub mod action;
pub mod condition;
pub mod errors;
pub mod fact_map;
pub mod finder;
pub mod param;
pub mod registry;
#[allow(clippy::module_inception)]
pub mod rule;
pub mod value;

pub use action::{Action, ActionArray, FactMapAction, MathOp, PARAM_REF_PREFIX};
pub use condition::{CompareOp, Condition, ConditionArray, LogicOp};
pub use errors::{RuleError, RuleResult};
pub use fact_map::FactMap;
pub use finder::{param_key, FactFinder, FactQuery, FinderFn, ResolveError};
pub use param::{
    merge_params, ArrayParam, BooleanParam, FactParam, FloatParam, IntParam, MathParam,
    ParamArray, StringArrayParam, StringParam,
};
pub use registry::{param_constructor, TypeRegistry};
pub use rule::{Rule, DEFAULT_VARIABLE};
pub use value::FactValue;
