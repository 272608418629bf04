//! JSON-file handoff store, for runners without a native state channel.
//!
//! Every save rewrites the whole file through a temp file + fsync + rename,
//! so a crash never leaves a half-written record behind. A stale temp file
//! (`.{name}.tmp`) may remain after a crash and is overwritten on next save.

use crate::error::{BuildDomainError, Result};
use crate::state::HandoffStore;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Handoff store backed by a JSON object file.
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl FileStateStore {
    /// Open the store at `path`, loading the record if the file exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let values = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| {
                BuildDomainError::StateError(format!(
                    "failed to read state file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content).map_err(|e| {
                    BuildDomainError::StateError(format!(
                        "failed to parse state file '{}': {}",
                        path.display(),
                        e
                    ))
                })?
            }
        } else {
            BTreeMap::new()
        };

        Ok(Self { path, values })
    }

    fn flush(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.values).map_err(|e| {
            BuildDomainError::StateError(format!("failed to serialize state: {}", e))
        })?;
        write_atomically(&self.path, json.as_bytes())
    }
}

impl HandoffStore for FileStateStore {
    fn save(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        self.flush()
    }

    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn is_writable(&self) -> bool {
        true
    }

    fn discard(&mut self) -> Result<()> {
        self.values.clear();
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BuildDomainError::StateError(format!(
                "failed to remove state file '{}': {}",
                self.path.display(),
                e
            ))),
        }
    }
}

fn write_atomically(path: &Path, content: &[u8]) -> Result<()> {
    let state_error = |what: &str, target: &Path, e: std::io::Error| {
        BuildDomainError::StateError(format!("failed to {} '{}': {}", what, target.display(), e))
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| state_error("create directory", parent, e))?;
    }

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| BuildDomainError::StateError("invalid state file path".to_string()))?;
    let temp_path = path.with_file_name(format!(".{}.tmp", file_name));

    let mut file = File::create(&temp_path).map_err(|e| state_error("create", &temp_path, e))?;
    if let Err(e) = file.write_all(content).and_then(|_| file.sync_all()) {
        let _ = fs::remove_file(&temp_path);
        return Err(state_error("write", &temp_path, e));
    }

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        state_error("replace", path, e)
    })
}
