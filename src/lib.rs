//! runledger - milestone challenge rewards
//!
//! Challenges carry declarative rules that are rendered to rule text,
//! compiled, and evaluated against lazily resolved user facts. Rewards are
//! opened as pending transactions on a versioned credit ledger and settled
//! when claimed.

pub mod achievement;
pub mod cli;
pub mod config;
pub mod engine;
pub mod ledger;
pub mod logging;
pub mod rule;
pub mod trigger;
