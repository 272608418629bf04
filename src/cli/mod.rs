//! CLI argument parsing for build-domain.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.
//!
//! Every input can also come from the environment, so the binary can be
//! driven directly by a CI step without a wrapper script.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Build and publish one release domain, serialized through the SFP server's
/// resource locks.
///
/// A job runs `build-domain run` as its main step and `build-domain cleanup`
/// as an always-run post step. Locks acquired by `run` are handed to `cleanup`
/// through the job state, so they are released even if `run` crashes.
#[derive(Parser, Debug)]
#[command(name = "build-domain")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for build-domain.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Acquire the build lock, build, then publish under the repository lock.
    ///
    /// Saves each acquired lock to the job state before running the
    /// protected step, and releases it as soon as the step finishes.
    Run(RunArgs),

    /// Release any lock a crashed or cancelled `run` left behind.
    ///
    /// Never fails the job: release problems are reported as warnings.
    Cleanup(CleanupArgs),
}

/// Arguments for the `run` command.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// SFP server URL.
    #[arg(long, env = "SFP_SERVER_URL")]
    pub sfp_server_url: String,

    /// SFP server application token.
    #[arg(long, env = "SFP_SERVER_TOKEN", hide_env_values = true)]
    pub sfp_server_token: String,

    /// Release config file; its `releaseName` names the build lock.
    #[arg(long, env = "RELEASE_CONFIG")]
    pub release_config: PathBuf,

    /// Repository identifier (owner/name).
    #[arg(long, env = "GITHUB_REPOSITORY")]
    pub repository: Option<String>,

    /// Branch being built.
    #[arg(long, env = "GITHUB_REF_NAME", default_value = "main")]
    pub branch: String,

    /// Build number passed to the build.
    #[arg(long, env = "GITHUB_RUN_ID", default_value = "1")]
    pub build_number: String,

    /// Release candidate name (default: <branch>-<build-number>).
    #[arg(long)]
    pub release_name: Option<String>,

    /// Only build packages changed since their last published version.
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub diff_check: bool,

    /// Package scope used for publishing and the release candidate.
    #[arg(long, env = "GITHUB_REPOSITORY_OWNER")]
    pub npm_scope: Option<String>,

    /// Publish to the npm registry instead of internal-only.
    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    pub npm: bool,

    /// Create git tags for published packages.
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub git_tag: bool,

    /// Push the created git tags.
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub push_git_tag: bool,

    /// Serialize builds of this release domain (overrides config).
    #[arg(long, action = ArgAction::Set)]
    pub serialize: Option<bool>,

    /// Seconds to wait for the build lock (overrides config).
    #[arg(long)]
    pub serialize_timeout: Option<u64>,

    /// Build lock lease in seconds (overrides config).
    #[arg(long)]
    pub serialize_lease: Option<u64>,

    /// Serialize publishing repository-wide (overrides config).
    #[arg(long, action = ArgAction::Set)]
    pub publish_lock: Option<bool>,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Arguments for the `cleanup` command.
#[derive(Parser, Debug)]
pub struct CleanupArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

/// Arguments shared by `run` and `cleanup`.
#[derive(Parser, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Optional YAML config file.
    #[arg(long, env = "BUILD_DOMAIN_CONFIG")]
    pub config: Option<PathBuf>,

    /// JSON file used to hand lock state from `run` to `cleanup`
    /// (default: the GitHub Actions job state).
    #[arg(long, env = "BUILD_DOMAIN_STATE_FILE")]
    pub state_file: Option<PathBuf>,
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    const REQUIRED: [&str; 7] = [
        "build-domain",
        "run",
        "--sfp-server-url",
        "https://sfp.example.com",
        "--sfp-server-token",
        "s3cret",
        "--release-config=config/release-widgets.yaml",
    ];

    fn parse_run(extra: &[&str]) -> RunArgs {
        let argv: Vec<&str> = REQUIRED.iter().chain(extra.iter()).copied().collect();
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Run(args) => args,
            other => panic!("Expected Run command, got {other:?}"),
        }
    }

    #[test]
    fn cli_debug_assert() {
        // Verifies the CLI arguments configuration is valid
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_run_defaults() {
        let args = parse_run(&[]);
        assert_eq!(args.sfp_server_url, "https://sfp.example.com");
        assert_eq!(args.release_config, PathBuf::from("config/release-widgets.yaml"));
        assert!(args.diff_check);
        assert!(!args.npm);
        assert!(args.git_tag);
        assert!(args.push_git_tag);
        assert_eq!(args.serialize, None);
        assert_eq!(args.serialize_timeout, None);
        assert_eq!(args.publish_lock, None);
        assert_eq!(args.release_name, None);
    }

    #[test]
    fn parse_run_explicit_booleans() {
        let args = parse_run(&[
            "--diff-check",
            "false",
            "--npm",
            "true",
            "--push-git-tag",
            "false",
            "--serialize",
            "false",
            "--publish-lock",
            "true",
        ]);
        assert!(!args.diff_check);
        assert!(args.npm);
        assert!(args.git_tag);
        assert!(!args.push_git_tag);
        assert_eq!(args.serialize, Some(false));
        assert_eq!(args.publish_lock, Some(true));
    }

    #[test]
    fn parse_run_full() {
        let args = parse_run(&[
            "--repository",
            "org/app",
            "--branch",
            "release/1.2",
            "--build-number",
            "42",
            "--release-name",
            "widgets-rc",
            "--npm-scope",
            "org",
            "--serialize-timeout",
            "60",
            "--serialize-lease",
            "600",
            "--config",
            "build-domain.yaml",
            "--state-file",
            "/tmp/build-domain-state.json",
        ]);
        assert_eq!(args.repository.as_deref(), Some("org/app"));
        assert_eq!(args.branch, "release/1.2");
        assert_eq!(args.build_number, "42");
        assert_eq!(args.release_name.as_deref(), Some("widgets-rc"));
        assert_eq!(args.npm_scope.as_deref(), Some("org"));
        assert_eq!(args.serialize_timeout, Some(60));
        assert_eq!(args.serialize_lease, Some(600));
        assert_eq!(args.common.config, Some(PathBuf::from("build-domain.yaml")));
        assert_eq!(
            args.common.state_file,
            Some(PathBuf::from("/tmp/build-domain-state.json"))
        );
    }

    #[test]
    fn parse_run_rejects_non_boolean() {
        let argv: Vec<&str> = REQUIRED
            .iter()
            .copied()
            .chain(["--serialize", "maybe"])
            .collect();
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn parse_cleanup() {
        let cli =
            Cli::try_parse_from(["build-domain", "cleanup", "--state-file", "state.json"]).unwrap();
        if let Command::Cleanup(args) = cli.command {
            assert_eq!(args.common.state_file, Some(PathBuf::from("state.json")));
        } else {
            panic!("Expected Cleanup command");
        }
    }
}
