//! # Executor
//!
//! Forward-chaining execution of a knowledge base against bound fact maps.
//!
//! Each cycle evaluates every non-retracted rule; the true rule with the
//! highest salience fires (declaration order breaks ties). Execution ends
//! when no rule matches. Every call to [`Engine::execute`] gets its own
//! [`WorkingMemory`], so one knowledge base can serve concurrent callers.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};

use super::ast::{Expr, Getter, RuleDecl, Stmt};
use super::errors::{EngineError, EngineResult};
use super::knowledge::KnowledgeBase;
use crate::rule::{CompareOp, FactMap, FactValue, LogicOp};

/// Default upper bound on match-resolve-act cycles
pub const DEFAULT_MAX_CYCLES: usize = 5000;

/// Fact maps bound to the variable names rules refer to
#[derive(Debug, Default)]
pub struct DataContext<'a> {
    bindings: HashMap<String, &'a mut FactMap>,
}

impl<'a> DataContext<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, var: impl Into<String>, facts: &'a mut FactMap) {
        self.bindings.insert(var.into(), facts);
    }

    fn facts(&self, var: &str) -> EngineResult<&FactMap> {
        self.bindings
            .get(var)
            .map(|facts| &**facts)
            .ok_or_else(|| EngineError::UnknownVariable(var.to_string()))
    }

    fn facts_mut(&mut self, var: &str) -> EngineResult<&mut FactMap> {
        self.bindings
            .get_mut(var)
            .map(|facts| &mut **facts)
            .ok_or_else(|| EngineError::UnknownVariable(var.to_string()))
    }
}

/// Per-execution state
#[derive(Debug, Default)]
pub struct WorkingMemory {
    retracted: HashSet<String>,
}

impl WorkingMemory {
    pub fn retract(&mut self, rule: &str) {
        self.retracted.insert(rule.to_string());
    }

    pub fn is_retracted(&self, rule: &str) -> bool {
        self.retracted.contains(rule)
    }
}

/// Outcome of one execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub cycles: usize,
    /// Rule names in firing order
    pub fired: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct Engine {
    max_cycles: usize,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CYCLES)
    }
}

impl Engine {
    pub fn new(max_cycles: usize) -> Self {
        Self { max_cycles }
    }

    pub fn max_cycles(&self) -> usize {
        self.max_cycles
    }

    /// Run the knowledge base until no rule matches
    pub fn execute(
        &self,
        kb: &KnowledgeBase,
        ctx: &mut DataContext<'_>,
    ) -> EngineResult<ExecutionReport> {
        let mut memory = WorkingMemory::default();
        let mut report = ExecutionReport::default();

        loop {
            let Some(rule) = self.select(kb, ctx, &memory)? else {
                debug!(
                    knowledge_base = kb.name(),
                    cycles = report.cycles,
                    fired = report.fired.len(),
                    "Rule execution finished"
                );
                return Ok(report);
            };

            report.cycles += 1;
            if report.cycles > self.max_cycles {
                return Err(EngineError::CycleLimit(self.max_cycles));
            }

            trace!(rule = %rule.name, salience = rule.salience, "Firing rule");
            for stmt in &rule.then {
                apply(stmt, ctx, &mut memory)?;
            }
            report.fired.push(rule.name.clone());
        }
    }

    fn select<'k>(
        &self,
        kb: &'k KnowledgeBase,
        ctx: &DataContext<'_>,
        memory: &WorkingMemory,
    ) -> EngineResult<Option<&'k RuleDecl>> {
        let mut selected: Option<&RuleDecl> = None;
        for rule in kb.rules() {
            if memory.is_retracted(&rule.name) {
                continue;
            }
            if !truthy(&evaluate(&rule.when, ctx)?, &rule.name)? {
                continue;
            }
            match selected {
                Some(current) if current.salience >= rule.salience => {}
                _ => selected = Some(rule),
            }
        }
        Ok(selected)
    }
}

fn truthy(value: &FactValue, rule: &str) -> EngineResult<bool> {
    match value {
        FactValue::Bool(b) => Ok(*b),
        other => Err(EngineError::TypeMismatch(format!(
            "condition of rule {} is {}, expected boolean",
            rule,
            other.type_name()
        ))),
    }
}

fn apply(
    stmt: &Stmt,
    ctx: &mut DataContext<'_>,
    memory: &mut WorkingMemory,
) -> EngineResult<()> {
    match stmt {
        Stmt::Retract(rule) => memory.retract(rule),
        Stmt::Mutate {
            var,
            op,
            name,
            value,
        } => {
            let value = evaluate(value, ctx)?;
            ctx.facts_mut(var)?.math(name, *op, &value)?;
        }
    }
    Ok(())
}

/// Evaluate an expression against the bound facts
pub fn evaluate(expr: &Expr, ctx: &DataContext<'_>) -> EngineResult<FactValue> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Fact { var, getter, name } => {
            let facts = ctx.facts(var)?;
            Ok(match getter {
                Getter::Int => FactValue::Int(facts.get_int(name)?),
                Getter::Float => FactValue::Float(facts.get_float(name)?),
                Getter::String => FactValue::Str(facts.get_string(name)?),
                Getter::Bool => FactValue::Bool(facts.get_bool(name)?),
            })
        }
        Expr::Not(inner) => match evaluate(inner, ctx)? {
            FactValue::Bool(b) => Ok(FactValue::Bool(!b)),
            other => Err(EngineError::TypeMismatch(format!(
                "cannot negate {}",
                other.type_name()
            ))),
        },
        Expr::Logic { op, lhs, rhs } => {
            let left = as_bool(evaluate(lhs, ctx)?, *op)?;
            let short_circuit = match op {
                LogicOp::And => !left,
                LogicOp::Or => left,
            };
            if short_circuit {
                return Ok(FactValue::Bool(left));
            }
            Ok(FactValue::Bool(as_bool(evaluate(rhs, ctx)?, *op)?))
        }
        Expr::Compare { op, lhs, rhs } => {
            let left = evaluate(lhs, ctx)?;
            let right = evaluate(rhs, ctx)?;
            compare(*op, &left, &right).map(FactValue::Bool)
        }
    }
}

fn as_bool(value: FactValue, op: LogicOp) -> EngineResult<bool> {
    match value {
        FactValue::Bool(b) => Ok(b),
        other => Err(EngineError::TypeMismatch(format!(
            "operand of {} is {}, expected boolean",
            op.symbol(),
            other.type_name()
        ))),
    }
}

fn compare(op: CompareOp, left: &FactValue, right: &FactValue) -> EngineResult<bool> {
    let ordering = match (left, right) {
        (FactValue::Int(a), FactValue::Int(b)) => Some(a.cmp(b)),
        (FactValue::Str(a), FactValue::Str(b)) => Some(a.cmp(b)),
        (FactValue::Bool(a), FactValue::Bool(b)) => {
            return match op {
                CompareOp::Eq => Ok(a == b),
                CompareOp::Neq => Ok(a != b),
                _ => Err(mismatch(op, left, right)),
            };
        }
        (a, b) if a.is_numeric() && b.is_numeric() => {
            match (a.as_float(), b.as_float()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            }
        }
        _ => return Err(mismatch(op, left, right)),
    };

    // NaN compares unequal to everything
    let Some(ordering) = ordering else {
        return Ok(op == CompareOp::Neq);
    };

    Ok(match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Neq => ordering != Ordering::Equal,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Gte => ordering != Ordering::Less,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Lte => ordering != Ordering::Greater,
    })
}

fn mismatch(op: CompareOp, left: &FactValue, right: &FactValue) -> EngineError {
    EngineError::TypeMismatch(format!(
        "cannot compare {} {} {}",
        left.type_name(),
        op.symbol(),
        right.type_name()
    ))
}
