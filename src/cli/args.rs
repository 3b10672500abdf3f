//! CLI argument definitions using clap
//!
//! Commands:
//! - runledger render --rule <path>
//! - runledger compile --fixture <path>
//! - runledger simulate --fixture <path> --user <id> [--at <rfc3339>] [--claim]
//! - runledger replay --fixture <path> --events <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// runledger - milestone challenge rewards
#[derive(Parser, Debug)]
#[command(name = "runledger")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render a rule document into rule text
    Render {
        /// Path to the rule JSON document
        #[arg(long)]
        rule: PathBuf,
    },

    /// Compile every active challenge of a fixture
    Compile {
        /// Path to the fixture JSON file
        #[arg(long)]
        fixture: PathBuf,
    },

    /// Run an achievement check against a fixture
    Simulate {
        /// Path to the fixture JSON file
        #[arg(long)]
        fixture: PathBuf,

        /// User to evaluate
        #[arg(long)]
        user: String,

        /// Evaluation time (RFC 3339), now when omitted
        #[arg(long)]
        at: Option<String>,

        /// Claim every challenge achieved in this pass
        #[arg(long)]
        claim: bool,
    },

    /// Push activity events through the async achievement trigger
    Replay {
        /// Path to the fixture JSON file
        #[arg(long)]
        fixture: PathBuf,

        /// Path to a JSON array of activity events
        #[arg(long)]
        events: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
