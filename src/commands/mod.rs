//! Command implementations for build-domain.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations.

mod cleanup;
mod run;

use crate::cli::Command;
use crate::error::Result;

/// Dispatch a command to its implementation.
pub fn dispatch(command: Command) -> Result<()> {
    match command {
        Command::Run(args) => run::cmd_run(args),
        Command::Cleanup(args) => cleanup::cmd_cleanup(args),
    }
}
