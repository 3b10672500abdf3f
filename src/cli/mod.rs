//! CLI module for runledger
//!
//! Provides command-line interface for:
//! - render: Render a rule document into rule text
//! - compile: Compile every active challenge of a fixture
//! - simulate: Run an achievement check (and claims) against a fixture
//! - replay: Feed activity events through the async achievement trigger

mod args;
mod commands;
mod errors;
mod fixture;
mod io;

pub use args::{Cli, Command};
pub use commands::{compile, render, replay, run, run_command, simulate};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use fixture::Fixture;
pub use io::{write_error, write_response};
