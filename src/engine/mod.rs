//! # Rule Engine
//!
//! Compiles rendered rule source into knowledge bases and executes them
//! against fact maps.

pub mod ast;
pub mod errors;
pub mod executor;
pub mod knowledge;
pub mod lexer;
pub mod parser;

pub use ast::{Expr, Getter, RuleDecl, Stmt};
pub use errors::{EngineError, EngineResult};
pub use executor::{evaluate, DataContext, Engine, ExecutionReport, WorkingMemory, DEFAULT_MAX_CYCLES};
pub use knowledge::KnowledgeBase;
pub use parser::parse;
