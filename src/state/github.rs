//! GitHub Actions state channel.
//!
//! The main step appends `KEY<<DELIM / value / DELIM` blocks to the file named
//! by `GITHUB_STATE`; the runner then hands them to the post step as
//! `STATE_<KEY>` environment variables.

use crate::error::{BuildDomainError, Result};
use crate::state::HandoffStore;
use chrono::Utc;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

/// Environment variable naming the state file of the current step.
pub const GITHUB_STATE_ENV: &str = "GITHUB_STATE";

/// Prefix under which saved state reaches the post step.
pub const STATE_ENV_PREFIX: &str = "STATE_";

#[derive(Debug, Default)]
pub struct GithubStateStore {
    state_file: Option<PathBuf>,
    saved: HashMap<String, String>,
}

impl GithubStateStore {
    /// Use `GITHUB_STATE` for writes, if set.
    pub fn from_env() -> Self {
        let state_file = std::env::var_os(GITHUB_STATE_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        Self::with_state_file(state_file)
    }

    pub fn with_state_file(state_file: Option<PathBuf>) -> Self {
        Self {
            state_file,
            saved: HashMap::new(),
        }
    }
}

impl HandoffStore for GithubStateStore {
    fn save(&mut self, key: &str, value: &str) -> Result<()> {
        let Some(path) = &self.state_file else {
            return Err(BuildDomainError::StateError(format!(
                "cannot save state '{}': {} is not set",
                key, GITHUB_STATE_ENV
            )));
        };

        let block = format_state_block(key, value, &delimiter())?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                BuildDomainError::StateError(format!(
                    "failed to open state file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        file.write_all(block.as_bytes()).map_err(|e| {
            BuildDomainError::StateError(format!(
                "failed to write state file '{}': {}",
                path.display(),
                e
            ))
        })?;

        self.saved.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Option<String> {
        self.saved
            .get(key)
            .cloned()
            .or_else(|| std::env::var(format!("{}{}", STATE_ENV_PREFIX, key)).ok())
    }

    fn is_writable(&self) -> bool {
        self.state_file.is_some()
    }
}

fn delimiter() -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("ghadelimiter_{}_{}", std::process::id(), nanos)
}

/// Render one multi-line-safe state block.
fn format_state_block(key: &str, value: &str, delimiter: &str) -> Result<String> {
    if key.contains(delimiter) || value.contains(delimiter) {
        return Err(BuildDomainError::StateError(format!(
            "state '{}' collides with its delimiter",
            key
        )));
    }
    Ok(format!("{key}<<{delimiter}\n{value}\n{delimiter}\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn state_block_format() {
        let block = format_state_block("TICKET_ID", "5-1-aaaa-bbbb", "EOF_X").unwrap();
        assert_eq!(block, "TICKET_ID<<EOF_X\n5-1-aaaa-bbbb\nEOF_X\n");
    }

    #[test]
    fn state_block_rejects_delimiter_collision() {
        assert!(format_state_block("K", "a EOF_X b", "EOF_X").is_err());
    }

    #[test]
    fn save_appends_blocks_and_is_readable_in_process() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state");

        let mut store = GithubStateStore::with_state_file(Some(path.clone()));
        store.save("RESOURCE", "build-widgets").unwrap();
        store.save("SERIALIZE", "true").unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("RESOURCE<<ghadelimiter_"));
        assert!(content.contains("\nbuild-widgets\n"));
        assert!(content.contains("SERIALIZE<<ghadelimiter_"));
        assert_eq!(store.get("RESOURCE").as_deref(), Some("build-widgets"));
    }

    #[test]
    fn save_without_state_file_fails() {
        let mut store = GithubStateStore::with_state_file(None);
        assert!(!store.is_writable());
        let err = store.save("TICKET_ID", "x").unwrap_err();
        assert!(matches!(err, BuildDomainError::StateError(_)));
    }

    #[test]
    #[serial]
    fn get_reads_post_step_environment() {
        // SAFETY: serialized with other env-mutating tests.
        unsafe {
            std::env::set_var("STATE_BUILD_DOMAIN_TEST_KEY", "5-1-aaaa-bbbb");
        }
        let store = GithubStateStore::with_state_file(None);
        assert_eq!(
            store.get("BUILD_DOMAIN_TEST_KEY").as_deref(),
            Some("5-1-aaaa-bbbb")
        );
        unsafe {
            std::env::remove_var("STATE_BUILD_DOMAIN_TEST_KEY");
        }
        assert!(store.get("BUILD_DOMAIN_TEST_KEY").is_none());
    }
}
