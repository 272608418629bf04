//! build-domain: build and publish one release domain under SFP server
//! resource locks, with crash-safe release from a separate post step.
//!
//! This is the main entry point for the `build-domain` CLI. It parses
//! arguments, sets up logging, dispatches to the appropriate command handler,
//! and handles errors with proper exit codes.

mod ci;
mod cli;
mod commands;
pub mod config;
pub mod error;
pub mod exit_codes;
pub mod lock;
pub mod pipeline;
pub mod process;
pub mod state;
pub mod toolchain;

#[cfg(test)]
mod test_support;

use cli::Cli;
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::EnvFilter;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_logging();

    match commands::dispatch(cli.command) {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(err) => {
            // Print user-actionable error message to stderr
            eprintln!("Error: {}", err);

            // Return appropriate exit code
            ExitCode::from(err.exit_code() as u8)
        }
    }
}
