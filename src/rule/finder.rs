//! # Fact Finder Registry
//!
//! Maps fact names to resolver functions. Resolution runs each distinct
//! resolver at most once, however many of the requested facts it covers.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tracing::debug;

use super::errors::{RuleError, RuleResult};
use super::fact_map::FactMap;
use super::param::FactParam;

/// Error type resolvers may return
pub type ResolveError = Box<dyn std::error::Error + Send + Sync>;

/// Populates one or more facts for a user
pub type FinderFn =
    Arc<dyn Fn(&mut FactMap, &FactQuery) -> Result<(), ResolveError> + Send + Sync>;

/// Who and when facts are resolved for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactQuery {
    pub user_id: String,
    pub at: DateTime<Utc>,
}

impl FactQuery {
    pub fn new(user_id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            at,
        }
    }
}

/// Normalized registry key: UpperCamelCase of the fact name
pub fn param_key(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// Registry of fact resolvers
#[derive(Default)]
pub struct FactFinder {
    finders: RwLock<HashMap<String, FinderFn>>,
}

impl std::fmt::Debug for FactFinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<String> = self
            .finders
            .read()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        f.debug_struct("FactFinder").field("keys", &keys).finish()
    }
}

impl FactFinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with `finders`
    pub fn with_finders<'a>(finders: impl IntoIterator<Item = (&'a str, FinderFn)>) -> Self {
        let finders = finders
            .into_iter()
            .map(|(name, finder)| (param_key(name), finder))
            .collect();
        Self {
            finders: RwLock::new(finders),
        }
    }

    /// Register `finder` as the resolver for `param_name`
    pub fn register(&self, param_name: &str, finder: FinderFn) -> RuleResult<()> {
        self.finders
            .write()
            .map_err(|_| RuleError::Internal("Lock poisoned".into()))?
            .insert(param_key(param_name), finder);
        Ok(())
    }

    pub fn is_registered(&self, param_name: &str) -> bool {
        self.finders
            .read()
            .map(|f| f.contains_key(&param_key(param_name)))
            .unwrap_or(false)
    }

    /// Distinct resolvers covering `params`, with the key each was found under
    pub fn unique_finders(
        &self,
        params: &[Box<dyn FactParam>],
    ) -> RuleResult<Vec<(String, FinderFn)>> {
        let finders = self
            .finders
            .read()
            .map_err(|_| RuleError::Internal("Lock poisoned".into()))?;

        let mut unique: Vec<(String, FinderFn)> = Vec::new();
        for param in params {
            let key = param_key(param.name());
            let finder = finders
                .get(&key)
                .ok_or_else(|| RuleError::FinderNotRegistered(param.name().to_string()))?;
            if !unique.iter().any(|(_, f)| Arc::ptr_eq(f, finder)) {
                unique.push((key, Arc::clone(finder)));
            }
        }
        Ok(unique)
    }

    /// Run every resolver needed for `params` once against `facts`
    pub fn find_facts(
        &self,
        facts: &mut FactMap,
        params: &[Box<dyn FactParam>],
        query: &FactQuery,
    ) -> RuleResult<()> {
        let finders = self.unique_finders(params)?;
        for (key, finder) in finders {
            debug!(finder = %key, user_id = %query.user_id, "Resolving facts");
            finder(facts, query).map_err(|e| RuleError::FinderFailed {
                finder: key.clone(),
                message: e.to_string(),
            })?;
        }
        Ok(())
    }
}
