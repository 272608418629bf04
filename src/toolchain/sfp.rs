//! `sfp`-backed implementation of the protected steps.
//!
//! Long-running steps stream their output straight to the job log. A non-zero
//! exit is an [`BuildDomainError::OperationFailed`] carrying the step's
//! user-facing message; the git fetches around them are best-effort.

use crate::error::{BuildDomainError, Result};
use crate::process;
use crate::toolchain::{BuildOutcome, Toolchain, count_artifacts, git};
use std::path::Path;
use tracing::{info, warn};

/// Everything the build, publish and release-candidate steps need.
#[derive(Debug, Clone)]
pub struct BuildJob {
    pub sfp_bin: String,
    pub server_url: String,
    pub server_token: String,
    pub repository: String,
    pub branch: String,
    pub build_number: String,
    pub release_config: String,
    /// Release candidate name; `<branch>-<build_number>` when unset.
    pub release_name: Option<String>,
    pub diff_check: bool,
    pub npm_scope: Option<String>,
    pub npm: bool,
    pub git_tag: bool,
    pub push_git_tag: bool,
    pub artifact_dir: String,
    pub artifact_pattern: String,
    pub devhub_alias: String,
}

impl BuildJob {
    pub fn release_candidate_name(&self) -> String {
        match self.release_name.as_deref().filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => format!("{}-{}", self.branch, self.build_number),
        }
    }

    fn scope(&self) -> Option<&str> {
        self.npm_scope.as_deref().filter(|s| !s.is_empty())
    }

    /// Arguments for `sfp org login` against the server's default DevHub.
    pub fn login_args(&self) -> Vec<String> {
        process::args([
            "org",
            "login",
            "--server",
            "--default-devhub",
            "--alias",
            self.devhub_alias.as_str(),
            "--sfp-server-url",
            self.server_url.as_str(),
            "-t",
            self.server_token.as_str(),
        ])
    }

    /// Arguments for `sfp build`.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = process::args([
            "build",
            "-v",
            self.devhub_alias.as_str(),
            "--branch",
            self.branch.as_str(),
            "--buildnumber",
            self.build_number.as_str(),
            "--artifactdir",
            self.artifact_dir.as_str(),
            "--sfp-server-url",
            self.server_url.as_str(),
            "-t",
            self.server_token.as_str(),
            "--repository",
            self.repository.as_str(),
            "--releaseconfig",
            self.release_config.as_str(),
        ]);
        if self.diff_check {
            args.push("--diffcheck".to_string());
        }
        args
    }

    /// Arguments for `sfp publish`.
    pub fn publish_args(&self) -> Vec<String> {
        let mut args = process::args([
            "publish",
            "-d",
            self.artifact_dir.as_str(),
            "--repository",
            self.repository.as_str(),
            "--sfp-server-url",
            self.server_url.as_str(),
            "-t",
            self.server_token.as_str(),
        ]);
        if let Some(scope) = self.scope() {
            args.extend(process::args(["--scope", scope]));
        }
        args.push(if self.npm { "--npm" } else { "--internal-only" }.to_string());
        if self.git_tag {
            args.push("--gittag".to_string());
        }
        if self.push_git_tag {
            args.push("--pushgittag".to_string());
        }
        args
    }

    /// Arguments for `sfp releasecandidate generate`.
    pub fn release_candidate_args(&self) -> Vec<String> {
        let name = self.release_candidate_name();
        let mut args = process::args([
            "releasecandidate",
            "generate",
            "-n",
            name.as_str(),
            "-c",
            "HEAD",
            "-b",
            self.branch.as_str(),
            "-f",
            self.release_config.as_str(),
            "--repository",
            self.repository.as_str(),
            "--sfp-server-url",
            self.server_url.as_str(),
            "-t",
            self.server_token.as_str(),
        ]);
        if let Some(scope) = self.scope() {
            args.extend(process::args(["--scope".to_string(), format!("@{}", scope)]));
        }
        args
    }
}

/// [`Toolchain`] that shells out to `sfp` and `git`.
#[derive(Debug, Clone)]
pub struct SfpToolchain {
    job: BuildJob,
}

impl SfpToolchain {
    pub fn new(job: BuildJob) -> Self {
        Self { job }
    }

    fn run_sfp(&self, args: Vec<String>, failure: &str) -> Result<()> {
        let code = process::run_streaming(&self.job.sfp_bin, &args, &[&self.job.server_token])?;
        if code != 0 {
            return Err(BuildDomainError::OperationFailed(failure.to_string()));
        }
        Ok(())
    }
}

impl Toolchain for SfpToolchain {
    fn prepare(&self) -> Result<()> {
        if git::is_shallow_repository()? {
            if self.job.diff_check {
                git::unshallow()?;
            } else {
                info!("shallow clone detected; diff-check is off, keeping shallow history");
            }
        }
        git::fetch_tags()?;

        info!("authenticating to default DevHub via SFP Server");
        self.run_sfp(self.job.login_args(), "Failed to authenticate to DevHub")?;
        info!("DevHub authentication successful");
        Ok(())
    }

    fn build(&self) -> Result<BuildOutcome> {
        info!(
            branch = %self.job.branch,
            build_number = %self.job.build_number,
            "building packages"
        );
        self.run_sfp(self.job.build_args(), "Build failed")?;
        info!("build completed");

        let artifact_count =
            count_artifacts(Path::new(&self.job.artifact_dir), &self.job.artifact_pattern)?;
        if artifact_count == 0 {
            warn!("no artifacts were produced by the build");
        } else {
            info!(artifact_count, "found artifacts");
        }
        Ok(BuildOutcome { artifact_count })
    }

    fn publish(&self) -> Result<()> {
        info!(npm = self.job.npm, "publishing artifacts");
        self.run_sfp(self.job.publish_args(), "Publish failed")?;
        info!("publish completed");
        Ok(())
    }

    fn sync_tags(&self) -> Result<()> {
        git::fetch_tags()
    }

    fn generate_release_candidate(&self) -> Result<String> {
        let name = self.job.release_candidate_name();
        info!(release_candidate = %name, "generating release candidate");
        self.run_sfp(
            self.job.release_candidate_args(),
            "Release candidate generation failed",
        )?;
        info!(release_candidate = %name, "release candidate generated");
        Ok(name)
    }
}
