//! CLI module for walhook
//!
//! Provides command-line interface for:
//! - shell: JSON-line test shell driving a leader and a follower
//! - check-config: configuration validation

mod args;
mod commands;
mod errors;
mod io;
mod shell;

pub use args::{Cli, Command};
pub use commands::{check_config, load_config, run_command, shell};
pub use errors::{CliError, CliResult};
pub use shell::{run_shell, Request, Role, Shell};
