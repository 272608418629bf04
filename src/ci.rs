//! GitHub Actions workflow commands: secret masking and step outputs.
//!
//! Outside Actions both are harmless: the mask command is just an unused log
//! line and outputs fall back to the log.

use crate::error::{BuildDomainError, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Environment variable naming the step output file.
pub const GITHUB_OUTPUT_ENV: &str = "GITHUB_OUTPUT";

/// Ask the runner to redact `secret` from all later log output.
pub fn mask_secret(secret: &str) {
    if !secret.is_empty() {
        println!("::add-mask::{}", secret);
    }
}

/// Set a step output, or log it when not running under Actions.
pub fn set_output(name: &str, value: &str) -> Result<()> {
    match std::env::var_os(GITHUB_OUTPUT_ENV).filter(|v| !v.is_empty()) {
        Some(path) => append_output(Path::new(&path), name, value),
        None => {
            info!(output = name, value, "step output");
            Ok(())
        }
    }
}

/// Append one `name=value` line to an output file.
pub fn append_output(path: &Path, name: &str, value: &str) -> Result<()> {
    if name.contains('=') || name.contains('\n') || value.contains('\n') {
        return Err(BuildDomainError::UserError(format!(
            "invalid step output '{}': names may not contain '=' and values must be single-line",
            name
        )));
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| {
            BuildDomainError::OperationFailed(format!(
                "failed to open output file '{}': {}",
                path.display(),
                e
            ))
        })?;
    writeln!(file, "{}={}", name, value).map_err(|e| {
        BuildDomainError::OperationFailed(format!(
            "failed to write output file '{}': {}",
            path.display(),
            e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn append_output_writes_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("output");

        append_output(&path, "has-artifacts", "true").unwrap();
        append_output(&path, "artifact-count", "3").unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "has-artifacts=true\nartifact-count=3\n");
    }

    #[test]
    fn append_output_rejects_multiline_value() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("output");

        assert!(append_output(&path, "artifacts-dir", "a\nb").is_err());
        assert!(!path.exists());
    }

    #[test]
    #[serial]
    fn set_output_uses_github_output_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("output");

        // SAFETY: serialized with other env-mutating tests.
        unsafe {
            std::env::set_var(GITHUB_OUTPUT_ENV, &path);
        }
        let result = set_output("artifacts-dir", "artifacts");
        unsafe {
            std::env::remove_var(GITHUB_OUTPUT_ENV);
        }

        result.unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "artifacts-dir=artifacts\n"
        );
    }

    #[test]
    #[serial]
    fn set_output_without_github_output_is_ok() {
        unsafe {
            std::env::remove_var(GITHUB_OUTPUT_ENV);
        }
        assert!(set_output("artifact-count", "0").is_ok());
    }
}
