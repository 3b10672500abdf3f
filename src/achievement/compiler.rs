//! # Rule Compiler
//!
//! Turns a challenge's rule document into a compiled knowledge base and
//! caches the result by challenge id.
//!
//! The cache map is immutable once published. Inserts and reloads build a
//! new map and swap the `Arc` under a write lock, so a reader holding a
//! snapshot never sees a partially rebuilt cache.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, error, info};

use crate::engine::KnowledgeBase;
use crate::rule::{FactParam, DEFAULT_VARIABLE};

use super::errors::{AchievementError, AchievementResult};
use super::model::Challenge;

/// A challenge rule ready for execution
#[derive(Debug)]
pub struct CompiledRule {
    pub code: String,
    pub challenge_id: String,
    pub version: u32,
    pub knowledge_base: KnowledgeBase,
    /// Facts the rule reads
    pub params: Vec<Box<dyn FactParam>>,
    /// Facts the rule writes
    pub targets: Vec<Box<dyn FactParam>>,
    /// Rendered rule text
    pub source: String,
}

/// Rule code used when a challenge's rule leaves it empty
pub fn default_rule_code(challenge_id: &str) -> String {
    let id: String = challenge_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("Rule{}", id)
}

#[derive(Debug, Clone)]
pub struct RuleCompiler {
    variable: String,
}

impl Default for RuleCompiler {
    fn default() -> Self {
        Self::new(DEFAULT_VARIABLE)
    }
}

impl RuleCompiler {
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
        }
    }

    /// Variable facts are bound to during execution
    pub fn variable(&self) -> &str {
        &self.variable
    }

    /// Render and compile a challenge's rule
    pub fn prepare_rule(&self, challenge: &Challenge) -> AchievementResult<CompiledRule> {
        let mut rule = challenge.rule.clone();
        if rule.code.is_empty() {
            rule.code = default_rule_code(&challenge.id);
        }
        rule.variable_name = self.variable.clone();

        let source = rule
            .render()
            .map_err(|e| AchievementError::compile(&challenge.id, e))?;

        let knowledge_base =
            KnowledgeBase::compile(&rule.code, challenge.version.to_string(), &source)
                .map_err(|e| AchievementError::compile(&challenge.id, e))?;

        debug!(
            challenge_id = %challenge.id,
            code = %rule.code,
            version = challenge.version,
            "Compiled challenge rule"
        );

        Ok(CompiledRule {
            params: rule.params(),
            targets: rule.targets(),
            code: rule.code,
            challenge_id: challenge.id.clone(),
            version: challenge.version,
            knowledge_base,
            source,
        })
    }
}

type RuleMap = HashMap<String, Arc<CompiledRule>>;

/// Compiled rules keyed by challenge id
#[derive(Debug, Default)]
pub struct RuleCache {
    compiler: RuleCompiler,
    rules: RwLock<Arc<RuleMap>>,
}

impl RuleCache {
    pub fn new(compiler: RuleCompiler) -> Self {
        Self {
            compiler,
            rules: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    pub fn compiler(&self) -> &RuleCompiler {
        &self.compiler
    }

    /// Current published map
    pub fn snapshot(&self) -> AchievementResult<Arc<RuleMap>> {
        self.rules
            .read()
            .map(|rules| Arc::clone(&*rules))
            .map_err(|_| AchievementError::Internal("Lock poisoned".into()))
    }

    pub fn get(&self, challenge_id: &str) -> AchievementResult<Option<Arc<CompiledRule>>> {
        Ok(self.snapshot()?.get(challenge_id).cloned())
    }

    pub fn len(&self) -> usize {
        self.snapshot().map(|rules| rules.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached rule for the challenge, compiling it when missing or when the
    /// challenge version moved on
    pub fn get_or_compile(&self, challenge: &Challenge) -> AchievementResult<Arc<CompiledRule>> {
        if let Some(rule) = self.get(&challenge.id)? {
            if rule.version == challenge.version {
                return Ok(rule);
            }
        }

        let compiled = Arc::new(self.compiler.prepare_rule(challenge)?);

        let mut guard = self
            .rules
            .write()
            .map_err(|_| AchievementError::Internal("Lock poisoned".into()))?;
        let mut next = (**guard).clone();
        next.insert(challenge.id.clone(), Arc::clone(&compiled));
        *guard = Arc::new(next);

        Ok(compiled)
    }

    /// Rebuild the whole cache from `challenges` and publish it in one swap.
    /// On the first compile failure the previous cache stays in place.
    pub fn reload_all(&self, challenges: &[Challenge]) -> AchievementResult<usize> {
        let mut next = RuleMap::with_capacity(challenges.len());
        for challenge in challenges {
            let compiled = self.compiler.prepare_rule(challenge).map_err(|e| {
                error!(challenge_id = %challenge.id, error = %e, "Failed to compile challenge rule");
                e
            })?;
            next.insert(challenge.id.clone(), Arc::new(compiled));
        }

        let count = next.len();
        *self
            .rules
            .write()
            .map_err(|_| AchievementError::Internal("Lock poisoned".into()))? = Arc::new(next);

        info!(rules = count, "Reloaded challenge rules");
        Ok(count)
    }
}
