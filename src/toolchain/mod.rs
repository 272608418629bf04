//! Protected external operations.
//!
//! The lock coordinator treats these as opaque steps with a success/failure
//! outcome (plus an artifact count for the build). [`SfpToolchain`] runs them
//! through the `sfp` CLI; tests substitute a recording fake.

pub mod git;
pub mod sfp;

pub use sfp::{BuildJob, SfpToolchain};

use crate::error::{BuildDomainError, Result};
use globset::Glob;
use std::fs;
use std::path::Path;

/// What the build step produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOutcome {
    pub artifact_count: usize,
}

impl BuildOutcome {
    pub fn has_artifacts(&self) -> bool {
        self.artifact_count > 0
    }
}

/// The protected steps of a build-domain run, in execution order.
pub trait Toolchain {
    /// Sync history/tags and authenticate against the DevHub.
    fn prepare(&self) -> Result<()>;

    /// Build packages and count the artifacts produced.
    fn build(&self) -> Result<BuildOutcome>;

    /// Publish the built artifacts (may create and push tags).
    fn publish(&self) -> Result<()>;

    /// Pull the tags created by `publish` back into the checkout.
    fn sync_tags(&self) -> Result<()>;

    /// Generate a release candidate and return its name.
    fn generate_release_candidate(&self) -> Result<String>;
}

/// Count files directly inside `dir` whose names match `pattern`.
///
/// The directory is created when missing, so a build that produced nothing
/// still leaves a (empty) artifacts directory behind for later steps.
pub fn count_artifacts(dir: &Path, pattern: &str) -> Result<usize> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|e| {
            BuildDomainError::OperationFailed(format!(
                "failed to create artifacts directory '{}': {}",
                dir.display(),
                e
            ))
        })?;
    }

    let matcher = Glob::new(pattern)
        .map_err(|e| {
            BuildDomainError::UserError(format!("invalid artifact pattern '{}': {}", pattern, e))
        })?
        .compile_matcher();

    let entries = fs::read_dir(dir).map_err(|e| {
        BuildDomainError::OperationFailed(format!(
            "failed to read artifacts directory '{}': {}",
            dir.display(),
            e
        ))
    })?;

    let mut count = 0;
    for entry in entries {
        let entry = entry.map_err(|e| {
            BuildDomainError::OperationFailed(format!("failed to read directory entry: {}", e))
        })?;
        if entry.path().is_file() && matcher.is_match(entry.file_name()) {
            count += 1;
        }
    }

    Ok(count)
}
