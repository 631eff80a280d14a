//! CLI command implementations

use std::io;
use std::path::Path;

use tracing::info;

use crate::engine::EngineConfig;

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::write_response;
use super::shell::{run_shell, Shell};

/// Run a CLI command
pub fn run_command(command: Command) -> CliResult<()> {
    match command {
        Command::Shell { config } => shell(config.as_deref()),
        Command::CheckConfig { config } => check_config(&config),
    }
}

/// Load the engine configuration, or the defaults without a path.
pub fn load_config(path: Option<&Path>) -> CliResult<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path).map_err(CliError::Config),
        None => Ok(EngineConfig::default()),
    }
}

/// Serve shell requests from stdin until it closes
pub fn shell(config_path: Option<&Path>) -> CliResult<()> {
    let config = load_config(config_path)?;
    let mut shell = Shell::new(config).map_err(CliError::Config)?;
    info!("walhook shell ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    run_shell(&mut shell, stdin.lock(), &mut stdout)
}

/// Validate a configuration file and print it with defaults filled in
pub fn check_config(config_path: &Path) -> CliResult<()> {
    let config = load_config(Some(config_path))?;
    write_response(&mut io::stdout(), serde_json::to_value(&config)?)
}
