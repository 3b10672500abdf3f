//! # Knowledge Base
//!
//! Compiled, immutable rule sets. A knowledge base is safe to share across
//! threads; all mutable execution state lives in the executor's working
//! memory.

use std::collections::HashSet;

use super::ast::RuleDecl;
use super::errors::{EngineError, EngineResult};
use super::parser::parse;

#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    name: String,
    version: String,
    rules: Vec<RuleDecl>,
}

impl KnowledgeBase {
    /// Compile rule source into a named, versioned knowledge base
    pub fn compile(
        name: impl Into<String>,
        version: impl Into<String>,
        source: &str,
    ) -> EngineResult<Self> {
        let rules = parse(source)?;

        let mut seen = HashSet::new();
        for rule in &rules {
            if !seen.insert(rule.name.as_str()) {
                return Err(EngineError::DuplicateRule(rule.name.clone()));
            }
        }

        Ok(Self {
            name: name.into(),
            version: version.into(),
            rules,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Rules in declaration order
    pub fn rules(&self) -> &[RuleDecl] {
        &self.rules
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
