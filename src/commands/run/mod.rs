//! Implementation of the `build-domain run` command.
//!
//! The acquiring invocation: resolves inputs, checks that acquired locks can
//! be handed off to `cleanup`, then runs the build and publish phases against
//! the SFP server.
//!
//! # Outputs
//!
//! Sets `has-artifacts`, `artifact-count` and `artifacts-dir` as soon as the
//! build phase finishes, so they survive a failed publish.

mod display;

use crate::ci;
use crate::cli::RunArgs;
use crate::config::{Config, ConfigOverrides, ReleaseConfig};
use crate::error::{BuildDomainError, Result};
use crate::lock::SfpLockService;
use crate::pipeline::{Pipeline, RunSummary, RunTarget};
use crate::state::{self, HandoffStore};
use crate::toolchain::{BuildJob, BuildOutcome, SfpToolchain};
use tracing::warn;

use display::{HeaderInfo, print_header, print_summary};

/// Execute the `build-domain run` command.
pub fn cmd_run(args: RunArgs) -> Result<()> {
    // Register the token before anything can echo it.
    ci::mask_secret(&args.sfp_server_token);

    let repository = resolve_repository(args.repository.as_deref())?;
    let config = Config::resolve(args.common.config.as_deref(), &overrides(&args))?;
    let release = ReleaseConfig::load(&args.release_config)?;

    print_header(&HeaderInfo {
        repository: &repository,
        branch: &args.branch,
        build_number: &args.build_number,
        release_config: &args.release_config.display().to_string(),
        release_name: &release.release_name,
        diff_check: args.diff_check,
        serialize: config.serialize,
        server_url: &args.sfp_server_url,
    });

    let mut store = state::open_store(args.common.state_file.as_deref())?;
    require_handoff(&config, store.as_ref())?;

    let service = SfpLockService::new(
        config.sfp_bin.as_str(),
        args.sfp_server_url.as_str(),
        args.sfp_server_token.as_str(),
    );
    let toolchain = SfpToolchain::new(build_job(&args, &config, &repository));
    let target = RunTarget {
        repository,
        release_name: release.release_name,
        server_url: args.sfp_server_url.clone(),
        server_token: args.sfp_server_token.clone(),
    };

    let mut pipeline = Pipeline::new(&service, store.as_mut(), &toolchain, &config, target);
    let summary = execute(&mut pipeline, &config.artifact_dir).inspect_err(|e| {
        if e.is_acquisition_failure() {
            warn!("lock was not acquired; nothing is left for cleanup to release");
        }
    })?;

    print_summary(&summary);
    Ok(())
}

fn overrides(args: &RunArgs) -> ConfigOverrides {
    ConfigOverrides {
        serialize: args.serialize,
        serialize_timeout: args.serialize_timeout,
        serialize_lease: args.serialize_lease,
        publish_lock: args.publish_lock,
    }
}

fn resolve_repository(repository: Option<&str>) -> Result<String> {
    repository
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            BuildDomainError::UserError(
                "Repository not specified and GITHUB_REPOSITORY not set".to_string(),
            )
        })
}

/// Serialized runs must be able to hand their locks to `cleanup`.
fn require_handoff(config: &Config, store: &dyn HandoffStore) -> Result<()> {
    if config.serialize && !store.is_writable() {
        return Err(BuildDomainError::UserError(
            "serialization is enabled but there is no job state to hand locks to cleanup\n\
             Fix: run inside GitHub Actions (GITHUB_STATE set), pass --state-file, \
             or disable with --serialize false."
                .to_string(),
        ));
    }
    Ok(())
}

fn build_job(args: &RunArgs, config: &Config, repository: &str) -> BuildJob {
    BuildJob {
        sfp_bin: config.sfp_bin.clone(),
        server_url: args.sfp_server_url.clone(),
        server_token: args.sfp_server_token.clone(),
        repository: repository.to_string(),
        branch: args.branch.clone(),
        build_number: args.build_number.clone(),
        release_config: args.release_config.display().to_string(),
        release_name: args.release_name.clone(),
        diff_check: args.diff_check,
        npm_scope: args.npm_scope.clone(),
        npm: args.npm,
        git_tag: args.git_tag,
        push_git_tag: args.push_git_tag,
        artifact_dir: config.artifact_dir.clone(),
        artifact_pattern: config.artifact_pattern.clone(),
        devhub_alias: config.devhub_alias.clone(),
    }
}

/// Build, set the artifact outputs, then run the publish phase.
fn execute(pipeline: &mut Pipeline<'_>, artifact_dir: &str) -> Result<RunSummary> {
    let outcome = pipeline.build()?;
    set_outputs(&outcome, artifact_dir)?;
    pipeline.publish(outcome)
}

fn set_outputs(outcome: &BuildOutcome, artifact_dir: &str) -> Result<()> {
    ci::set_output("has-artifacts", &outcome.has_artifacts().to_string())?;
    ci::set_output("artifact-count", &outcome.artifact_count.to_string())?;
    ci::set_output("artifacts-dir", artifact_dir)
}
