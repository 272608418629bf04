//! Implementation of the `build-domain cleanup` command.
//!
//! The releasing invocation. It runs as an always-run post step, reads what
//! `run` left in the job state and releases any lock still marked as held.
//! Nothing here fails the job: every problem is a warning, and the lease
//! expiry on the server frees whatever could not be released.

use crate::ci;
use crate::cli::CleanupArgs;
use crate::config::{Config, ConfigOverrides};
use crate::error::Result;
use crate::lock::{LockService, SfpLockService};
use crate::state::{
    self, HandoffStore, PersistedLockState, ReleaseDecision, ReleaseTarget, StateSlot,
};
use tracing::{debug, info, warn};

/// What cleanup did for one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotOutcome {
    NothingRecorded,
    NotSerialized,
    NotAcquired,
    Incomplete,
    Released,
    ReleaseFailed,
}

/// Execute the `build-domain cleanup` command.
///
/// Always returns `Ok(())`.
pub fn cmd_cleanup(args: CleanupArgs) -> Result<()> {
    let sfp_bin = match Config::resolve(args.common.config.as_deref(), &ConfigOverrides::default())
    {
        Ok(config) => config.sfp_bin,
        Err(e) => {
            warn!(error = %e, "could not load config; using defaults");
            Config::default().sfp_bin
        }
    };

    let mut store = match state::open_store(args.common.state_file.as_deref()) {
        Ok(store) => store,
        Err(e) => {
            warn!(
                error = %e,
                "could not read lock state. The lock may need to be manually released or will expire after lease duration."
            );
            return Ok(());
        }
    };

    cleanup_all(store.as_mut(), |target| {
        ci::mask_secret(&target.server_token);
        SfpLockService::new(
            sfp_bin.as_str(),
            target.server_url.as_str(),
            target.server_token.as_str(),
        )
        .release(&target.resource, &target.ticket)
    });

    Ok(())
}

/// Clean up every slot, then discard the store.
fn cleanup_all<F>(store: &mut dyn HandoffStore, mut release: F) -> Vec<SlotOutcome>
where
    F: FnMut(&ReleaseTarget) -> Result<()>,
{
    let outcomes = StateSlot::ALL
        .into_iter()
        .map(|slot| cleanup_slot(&*store, slot, &mut release))
        .collect();

    if let Err(e) = store.discard() {
        warn!(error = %e, "could not discard lock state");
    }

    outcomes
}

/// Apply the release decision table to one slot.
fn cleanup_slot<F>(store: &dyn HandoffStore, slot: StateSlot, release: F) -> SlotOutcome
where
    F: FnOnce(&ReleaseTarget) -> Result<()>,
{
    let Some(persisted) = PersistedLockState::load(store, slot) else {
        debug!(slot = slot.as_str(), "no lock state recorded");
        return SlotOutcome::NothingRecorded;
    };

    match persisted.decide() {
        ReleaseDecision::NotSerialized => {
            info!(slot = slot.as_str(), "Serialization was not enabled, skipping cleanup");
            SlotOutcome::NotSerialized
        }
        ReleaseDecision::NotAcquired => {
            info!(slot = slot.as_str(), "No ticket ID found in state, skipping cleanup");
            SlotOutcome::NotAcquired
        }
        ReleaseDecision::Incomplete { missing } => {
            warn!(
                slot = slot.as_str(),
                "Missing required state for dequeue. The lock may need to be manually released."
            );
            for field in ["resource", "repository", "server_url", "server_token"] {
                let status = if missing.contains(&field) { "missing" } else { "present" };
                debug!(slot = slot.as_str(), field, status);
            }
            SlotOutcome::Incomplete
        }
        ReleaseDecision::Release(target) => {
            info!(
                slot = slot.as_str(),
                resource = %target.resource.name,
                ticket = %target.ticket,
                "releasing lock left by run"
            );
            match release(&target) {
                Ok(()) => SlotOutcome::Released,
                Err(e) => {
                    warn!(
                        slot = slot.as_str(),
                        resource = %target.resource.name,
                        error = %e,
                        "The lock may need to be manually released or will expire after lease duration."
                    );
                    SlotOutcome::ReleaseFailed
                }
            }
        }
    }
}
