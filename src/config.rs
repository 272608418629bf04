//! Configuration model for build-domain.
//!
//! `Config` tunes the lock cycles and the toolchain. It is read from an
//! optional YAML file; unknown fields are ignored and every field has a
//! default, so an empty or absent file is valid. CLI flags override individual
//! values before validation.
//!
//! `ReleaseConfig` is the release definition file the build is driven by;
//! only its `releaseName` is read here.

use crate::error::{BuildDomainError, Result};
use globset::Glob;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Tuning for lock cycles and protected steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Toolchain
    // =========================================================================
    /// Program used for both the lock service and the build steps.
    #[serde(default = "default_sfp_bin")]
    pub sfp_bin: String,

    /// Directory the build writes artifacts to.
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: String,

    /// Glob (relative to `artifact_dir`) identifying produced artifacts.
    #[serde(default = "default_artifact_pattern")]
    pub artifact_pattern: String,

    /// Alias under which the DevHub org is logged in.
    #[serde(default = "default_devhub_alias")]
    pub devhub_alias: String,

    // =========================================================================
    // Build lock
    // =========================================================================
    /// Serialize builds of the same release domain through the lock service.
    #[serde(default = "default_true")]
    pub serialize: bool,

    /// Seconds to wait for the build lock.
    #[serde(default = "default_timeout")]
    pub serialize_timeout: u64,

    /// Lease requested for the build lock, in seconds.
    #[serde(default = "default_lease")]
    pub serialize_lease: u64,

    // =========================================================================
    // Publish lock
    // =========================================================================
    /// Serialize publish/tag mutation repository-wide (only when `serialize`).
    #[serde(default = "default_true")]
    pub publish_lock: bool,

    /// Seconds to wait for the publish lock.
    #[serde(default = "default_timeout")]
    pub publish_timeout: u64,

    /// Lease requested for the publish lock, in seconds.
    #[serde(default = "default_lease")]
    pub publish_lease: u64,
}

fn default_sfp_bin() -> String {
    "sfp".to_string()
}
fn default_artifact_dir() -> String {
    "artifacts".to_string()
}
fn default_artifact_pattern() -> String {
    "*.zip".to_string()
}
fn default_devhub_alias() -> String {
    "devhub".to_string()
}
fn default_true() -> bool {
    true
}
fn default_timeout() -> u64 {
    900
}
fn default_lease() -> u64 {
    1800
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sfp_bin: default_sfp_bin(),
            artifact_dir: default_artifact_dir(),
            artifact_pattern: default_artifact_pattern(),
            devhub_alias: default_devhub_alias(),
            serialize: default_true(),
            serialize_timeout: default_timeout(),
            serialize_lease: default_lease(),
            publish_lock: default_true(),
            publish_timeout: default_timeout(),
            publish_lease: default_lease(),
        }
    }
}

/// Per-invocation overrides taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub serialize: Option<bool>,
    pub serialize_timeout: Option<u64>,
    pub serialize_lease: Option<u64>,
    pub publish_lock: Option<bool>,
}

impl Config {
    /// Load config from a YAML file, without validating it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            BuildDomainError::UserError(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::parse_yaml(&content)
    }

    /// Load from `path` when given, otherwise defaults; apply overrides; validate.
    pub fn resolve(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    fn parse_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml)
            .map_err(|e| BuildDomainError::UserError(format!("failed to parse config YAML: {}", e)))
    }

    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(v) = overrides.serialize {
            self.serialize = v;
        }
        if let Some(v) = overrides.serialize_timeout {
            self.serialize_timeout = v;
        }
        if let Some(v) = overrides.serialize_lease {
            self.serialize_lease = v;
        }
        if let Some(v) = overrides.publish_lock {
            self.publish_lock = v;
        }
    }

    /// Whether the repository-wide publish lock is in effect.
    pub fn publish_lock_enabled(&self) -> bool {
        self.serialize && self.publish_lock
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - timeouts and leases must be positive
    /// - `sfp_bin` and `artifact_dir` must be non-empty
    /// - `artifact_pattern` must be a valid glob
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("serialize_timeout", self.serialize_timeout),
            ("serialize_lease", self.serialize_lease),
            ("publish_timeout", self.publish_timeout),
            ("publish_lease", self.publish_lease),
        ] {
            if value == 0 {
                return Err(BuildDomainError::UserError(format!(
                    "config validation failed: {} must be greater than 0",
                    name
                )));
            }
        }

        if self.sfp_bin.trim().is_empty() {
            return Err(BuildDomainError::UserError(
                "config validation failed: sfp_bin must be non-empty".to_string(),
            ));
        }

        if self.artifact_dir.trim().is_empty() {
            return Err(BuildDomainError::UserError(
                "config validation failed: artifact_dir must be non-empty".to_string(),
            ));
        }

        Glob::new(&self.artifact_pattern).map_err(|e| {
            BuildDomainError::UserError(format!(
                "config validation failed: artifact_pattern '{}' is not a valid glob: {}",
                self.artifact_pattern, e
            ))
        })?;

        Ok(())
    }
}

/// The release definition driving the build.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseConfig {
    #[serde(rename = "releaseName", default)]
    pub release_name: String,
}

impl ReleaseConfig {
    /// Read a release config file, requiring a non-empty `releaseName`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let full_path = std::path::absolute(path).unwrap_or_else(|_| PathBuf::from(path));

        if !full_path.exists() {
            return Err(BuildDomainError::UserError(format!(
                "Release config file not found: {}",
                full_path.display()
            )));
        }

        let content = std::fs::read_to_string(&full_path).map_err(|e| {
            BuildDomainError::UserError(format!(
                "failed to read release config '{}': {}",
                full_path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content, path)
    }

    fn from_yaml(yaml: &str, path: &Path) -> Result<Self> {
        let config: ReleaseConfig = serde_yaml::from_str(yaml).map_err(|e| {
            BuildDomainError::UserError(format!(
                "failed to parse release config '{}': {}",
                path.display(),
                e
            ))
        })?;

        if config.release_name.trim().is_empty() {
            return Err(BuildDomainError::UserError(format!(
                "releaseName not found in release config: {}",
                path.display()
            )));
        }

        Ok(config)
    }
}
