//! Git helpers used around the build: history depth and tag sync.
//!
//! Tag fetches are best-effort: a failed fetch is logged and the build goes on,
//! since the build tool reports missing history itself.

use crate::error::Result;
use crate::process::{self, CommandOutput};
use tracing::{info, warn};

fn run_git(args: &[&str]) -> Result<CommandOutput> {
    process::run_captured("git", &process::args(args.iter().copied()), &[])
}

/// Returns true when the checkout is a shallow clone.
pub fn is_shallow_repository() -> Result<bool> {
    let output = run_git(&["rev-parse", "--is-shallow-repository"])?;
    Ok(output.success() && output.stdout == "true")
}

/// Fetch the full history and tags of a shallow clone.
pub fn unshallow() -> Result<()> {
    info!("fetching full history for diff-check");
    warn_on_failure("fetch --unshallow --tags", run_git(&["fetch", "--unshallow", "--tags"])?);
    Ok(())
}

/// Fetch all tags from the default remote.
pub fn fetch_tags() -> Result<()> {
    info!("fetching tags");
    warn_on_failure("fetch --tags", run_git(&["fetch", "--tags"])?);
    Ok(())
}

fn warn_on_failure(what: &str, output: CommandOutput) {
    if !output.success() {
        warn!(
            exit_code = output.exit_code,
            "git {} failed: {}",
            what,
            output.diagnostics()
        );
    }
}
