//! walhook CLI entry point
//!
//! Parses arguments, installs the stderr log subscriber and hands over to
//! the CLI module. stdout carries JSON responses only.

use tracing_subscriber::EnvFilter;
use walhook::cli::{self, Cli};

fn main() {
    let cli = Cli::parse_args();
    init_tracing(cli.verbose);

    if let Err(e) = cli::run_command(cli.command) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn init_tracing(verbosity: u8) {
    // RUST_LOG wins over -v
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        })
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
