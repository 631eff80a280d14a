//! CLI argument definitions using clap
//!
//! Commands:
//! - walhook shell [--config <path>]
//! - walhook check-config --config <path>

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// walhook - WAL replication hook test shell
#[derive(Parser, Debug)]
#[command(name = "walhook")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log verbosity on stderr (-v info, -vv debug, -vvv trace)
    #[arg(long, short, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Drive a leader and a follower connection with JSON requests on stdin
    Shell {
        /// Path to engine configuration file; defaults apply when omitted
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate a configuration file and print the effective settings
    CheckConfig {
        /// Path to engine configuration file
        #[arg(long, default_value = "./walhook.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
