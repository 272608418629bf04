//! Handoff of acquired locks from the acquiring invocation to the releasing one.
//!
//! The two run as separate processes. The releasing (`cleanup`) invocation is
//! scheduled by the CI host whenever the acquiring (`run`) invocation started,
//! even if it later failed or crashed, so anything recorded here gets a
//! release attempt.
//!
//! # Record layout
//!
//! A flat string map, one record per [`StateSlot`]:
//!
//! | key               | value                                 |
//! |-------------------|---------------------------------------|
//! | `SERIALIZE`       | `"true"` once the record is complete  |
//! | `TICKET_ID`       | ticket, emptied once handled in-process |
//! | `RESOURCE`        | resource name                         |
//! | `REPOSITORY`      | repository identifier                 |
//! | `SFP_SERVER_URL`  | lock service endpoint                 |
//! | `SFP_SERVER_TOKEN`| credential                            |
//!
//! The publish slot uses the same keys prefixed with `PUBLISH_`.

pub mod file;
pub mod github;

pub use file::FileStateStore;
pub use github::GithubStateStore;

use crate::error::{BuildDomainError, Result};
use crate::lock::{LockHandle, Resource, Ticket};
use std::path::Path;

const KEY_SERIALIZE: &str = "SERIALIZE";
const KEY_TICKET: &str = "TICKET_ID";
const KEY_RESOURCE: &str = "RESOURCE";
const KEY_REPOSITORY: &str = "REPOSITORY";
const KEY_SERVER_URL: &str = "SFP_SERVER_URL";
const KEY_SERVER_TOKEN: &str = "SFP_SERVER_TOKEN";

/// Flat string key-value storage visible only within one logical job.
pub trait HandoffStore {
    /// Record `value` under `key`; later saves of the same key win.
    fn save(&mut self, key: &str, value: &str) -> Result<()>;

    /// Read a value; `None` when absent.
    fn get(&self, key: &str) -> Option<String>;

    /// Whether `save` can succeed in this environment.
    fn is_writable(&self) -> bool;

    /// Drop the whole record once the releasing invocation is done with it.
    fn discard(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Which lock cycle a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateSlot {
    /// Per-release-domain build lock.
    Build,
    /// Repository-wide publish lock.
    Publish,
}

impl StateSlot {
    pub const ALL: [StateSlot; 2] = [StateSlot::Build, StateSlot::Publish];

    fn prefix(&self) -> &'static str {
        match self {
            StateSlot::Build => "",
            StateSlot::Publish => "PUBLISH_",
        }
    }

    /// Full store key for `field` in this slot.
    pub fn key(&self, field: &str) -> String {
        format!("{}{}", self.prefix(), field)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StateSlot::Build => "build",
            StateSlot::Publish => "publish",
        }
    }
}

/// Write the record for an acquired handle.
///
/// `SERIALIZE` is written last: a crash part-way through leaves a record
/// that cleanup reads as "acquisition never completed" or "incomplete".
pub fn persist(
    store: &mut dyn HandoffStore,
    slot: StateSlot,
    handle: &LockHandle,
    server_url: &str,
    server_token: &str,
) -> Result<()> {
    let ticket = match (handle.is_acquired(), handle.ticket()) {
        (true, Some(ticket)) => ticket,
        _ => {
            return Err(BuildDomainError::StateError(format!(
                "refusing to persist {} lock for '{}' in state {}",
                slot.as_str(),
                handle.resource().name,
                handle.state()
            )));
        }
    };

    store.save(&slot.key(KEY_TICKET), ticket.as_str())?;
    store.save(&slot.key(KEY_RESOURCE), &handle.resource().name)?;
    store.save(&slot.key(KEY_REPOSITORY), &handle.resource().repository)?;
    store.save(&slot.key(KEY_SERVER_URL), server_url)?;
    store.save(&slot.key(KEY_SERVER_TOKEN), server_token)?;
    store.save(&slot.key(KEY_SERIALIZE), "true")
}

/// Mark a slot as handled in-process so cleanup does not release it again.
pub fn mark_consumed(store: &mut dyn HandoffStore, slot: StateSlot) -> Result<()> {
    store.save(&slot.key(KEY_TICKET), "")
}

/// Blank every ticket already in the store, returning the slots that had one.
///
/// A record belongs to the job that acquired it; anything present before this
/// job enqueues was left by another job and must not reach this job's cleanup.
pub fn clear_stale(store: &mut dyn HandoffStore) -> Result<Vec<StateSlot>> {
    let mut cleared = Vec::new();
    for slot in StateSlot::ALL {
        if store
            .get(&slot.key(KEY_TICKET))
            .is_some_and(|ticket| !ticket.is_empty())
        {
            mark_consumed(store, slot)?;
            cleared.push(slot);
        }
    }
    Ok(cleared)
}

/// The record as read back by the releasing invocation.
///
/// Empty strings are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedLockState {
    pub serialize: bool,
    pub ticket: Option<String>,
    pub resource: Option<String>,
    pub repository: Option<String>,
    pub server_url: Option<String>,
    pub server_token: Option<String>,
}

impl PersistedLockState {
    /// Read the record for `slot`; `None` when nothing at all was recorded.
    pub fn load(store: &dyn HandoffStore, slot: StateSlot) -> Option<Self> {
        let read = |field: &str| store.get(&slot.key(field)).filter(|v| !v.is_empty());

        let state = Self {
            serialize: read(KEY_SERIALIZE).is_some_and(|v| v == "true"),
            ticket: read(KEY_TICKET),
            resource: read(KEY_RESOURCE),
            repository: read(KEY_REPOSITORY),
            server_url: read(KEY_SERVER_URL),
            server_token: read(KEY_SERVER_TOKEN),
        };

        if state == Self::default() {
            None
        } else {
            Some(state)
        }
    }

    /// Apply the release decision table.
    pub fn decide(&self) -> ReleaseDecision {
        if !self.serialize {
            return ReleaseDecision::NotSerialized;
        }
        let Some(ticket) = &self.ticket else {
            return ReleaseDecision::NotAcquired;
        };

        let missing: Vec<&'static str> = [
            ("resource", self.resource.is_none()),
            ("repository", self.repository.is_none()),
            ("server_url", self.server_url.is_none()),
            ("server_token", self.server_token.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();

        match (
            &self.resource,
            &self.repository,
            &self.server_url,
            &self.server_token,
        ) {
            (Some(resource), Some(repository), Some(server_url), Some(server_token)) => {
                ReleaseDecision::Release(ReleaseTarget {
                    resource: Resource::new(resource.clone(), repository.clone()),
                    ticket: Ticket::new(ticket.clone()),
                    server_url: server_url.clone(),
                    server_token: server_token.clone(),
                })
            }
            _ => ReleaseDecision::Incomplete { missing },
        }
    }
}

/// What the releasing invocation should do with a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseDecision {
    /// Serialization was never enabled: nothing to do.
    NotSerialized,
    /// Acquisition never completed (or was already handled): nothing to do.
    NotAcquired,
    /// A ticket exists but the record cannot address it: warn only.
    Incomplete { missing: Vec<&'static str> },
    /// Attempt the release; failures are warnings.
    Release(ReleaseTarget),
}

/// Everything needed to issue one release from a fresh process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseTarget {
    pub resource: Resource,
    pub ticket: Ticket,
    pub server_url: String,
    pub server_token: String,
}

/// Open the handoff store for this job.
///
/// An explicit state file wins; otherwise the GitHub Actions state channel
/// is used (writable only when `GITHUB_STATE` is set).
pub fn open_store(state_file: Option<&Path>) -> Result<Box<dyn HandoffStore>> {
    match state_file {
        Some(path) => Ok(Box::new(FileStateStore::open(path)?)),
        None => Ok(Box::new(GithubStateStore::from_env())),
    }
}
