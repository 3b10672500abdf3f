//! # Rule AST

use crate::rule::{CompareOp, FactValue, LogicOp, MathOp};

/// Typed fact getter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Getter {
    Int,
    Float,
    String,
    Bool,
}

impl Getter {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "GetInt" => Some(Getter::Int),
            "GetFloat" => Some(Getter::Float),
            "GetString" => Some(Getter::String),
            "GetBool" => Some(Getter::Bool),
            _ => None,
        }
    }
}

/// Expressions in a `when` clause or an action argument
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(FactValue),
    Fact {
        var: String,
        getter: Getter,
        name: String,
    },
    Not(Box<Expr>),
    Compare {
        op: CompareOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Logic {
        op: LogicOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

/// Statements in a `then` clause
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Mutate {
        var: String,
        op: MathOp,
        name: String,
        value: Expr,
    },
    Retract(String),
}

/// One compiled rule
#[derive(Debug, Clone, PartialEq)]
pub struct RuleDecl {
    pub name: String,
    pub description: String,
    pub salience: i64,
    pub when: Expr,
    pub then: Vec<Stmt>,
}

pub(crate) fn mutation_op(name: &str) -> Option<MathOp> {
    match name {
        "Set" => Some(MathOp::Assign),
        "Add" => Some(MathOp::Add),
        "Subtract" => Some(MathOp::Subtract),
        "Multiply" => Some(MathOp::Multiply),
        "Divide" => Some(MathOp::Divide),
        _ => None,
    }
}
