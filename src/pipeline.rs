//! Build and publish phases with their lock cycles.
//!
//! Two independent scoped acquisitions run in strict sequence:
//!
//! 1. The per-release-domain lock (`build-<releaseName>`) brackets prepare and
//!    build only.
//! 2. The repository-wide lock (`publish-<repository>`) brackets publish and
//!    tag sync, and is enqueued only after the build lock has been released.
//!
//! Each cycle persists its handoff slot as soon as the lock is held, so the
//! cleanup invocation can release it if this process dies. Once the in-process
//! release has been attempted (also when unwinding from a panic) the slot is
//! consumed, leaving cleanup nothing to do.

use crate::config::Config;
use crate::error::Result;
use crate::lock::{LockCoordinator, LockRequest, LockService, Resource};
use crate::state::{self, HandoffStore, StateSlot};
use crate::toolchain::{BuildOutcome, Toolchain};
use tracing::{info, warn};

/// Identity of this run as seen by the lock service.
#[derive(Debug, Clone)]
pub struct RunTarget {
    pub repository: String,
    /// `releaseName` from the release config; names the build resource.
    pub release_name: String,
    pub server_url: String,
    pub server_token: String,
}

/// What a completed run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub artifact_count: usize,
    pub published: bool,
    pub release_candidate: Option<String>,
}

impl RunSummary {
    pub fn has_artifacts(&self) -> bool {
        self.artifact_count > 0
    }
}

pub struct Pipeline<'a> {
    service: &'a dyn LockService,
    store: &'a mut dyn HandoffStore,
    toolchain: &'a dyn Toolchain,
    config: &'a Config,
    target: RunTarget,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        service: &'a dyn LockService,
        store: &'a mut dyn HandoffStore,
        toolchain: &'a dyn Toolchain,
        config: &'a Config,
        target: RunTarget,
    ) -> Self {
        Self {
            service,
            store,
            toolchain,
            config,
            target,
        }
    }

    /// Build phase: prepare and build, under the build lock when serialized.
    ///
    /// Tickets left in the store by an earlier job are blanked first, so this
    /// job's cleanup never releases a lock it did not acquire.
    pub fn build(&mut self) -> Result<BuildOutcome> {
        if self.store.is_writable() {
            for slot in state::clear_stale(&mut *self.store)? {
                warn!(
                    slot = slot.as_str(),
                    "ignoring lock state left by a previous job"
                );
            }
        }

        if !self.config.serialize {
            info!("serialization disabled; building without a lock");
            self.toolchain.prepare()?;
            return self.toolchain.build();
        }

        let request = LockRequest::new(
            Resource::build(&self.target.release_name, &self.target.repository),
            self.config.serialize_lease,
        );
        self.locked(
            StateSlot::Build,
            &request,
            self.config.serialize_timeout,
            |toolchain| {
                toolchain.prepare()?;
                toolchain.build()
            },
        )
    }

    /// Publish phase: publish and tag sync under the repository lock, then
    /// the release candidate. Skipped when the build produced nothing.
    pub fn publish(&mut self, outcome: BuildOutcome) -> Result<RunSummary> {
        if !outcome.has_artifacts() {
            info!("no artifacts to publish; skipping publish and release candidate");
            return Ok(RunSummary {
                artifact_count: 0,
                published: false,
                release_candidate: None,
            });
        }

        if self.config.publish_lock_enabled() {
            let request = LockRequest::new(
                Resource::publish(&self.target.repository),
                self.config.publish_lease,
            );
            self.locked(
                StateSlot::Publish,
                &request,
                self.config.publish_timeout,
                |toolchain| {
                    toolchain.publish()?;
                    toolchain.sync_tags()
                },
            )?;
        } else {
            self.toolchain.publish()?;
            self.toolchain.sync_tags()?;
        }

        let release_candidate = self.toolchain.generate_release_candidate()?;

        Ok(RunSummary {
            artifact_count: outcome.artifact_count,
            published: true,
            release_candidate: Some(release_candidate),
        })
    }

    /// One scoped lock cycle around `protected`, with handoff bookkeeping.
    fn locked<T, F>(
        &mut self,
        slot: StateSlot,
        request: &LockRequest,
        timeout_seconds: u64,
        protected: F,
    ) -> Result<T>
    where
        F: FnOnce(&dyn Toolchain) -> Result<T>,
    {
        let coordinator = LockCoordinator::new(self.service);
        let toolchain = self.toolchain;
        let target = &self.target;
        // Declared before the lock is taken, so it drops after the release on
        // every exit path, unwinding included.
        let mut slot_guard = ConsumeOnDrop {
            store: &mut *self.store,
            slot,
            recorded: false,
        };

        coordinator.with_lock(request, timeout_seconds, |handle| {
            slot_guard.recorded = true;
            match state::persist(
                &mut *slot_guard.store,
                slot,
                handle,
                &target.server_url,
                &target.server_token,
            ) {
                Ok(()) => info!(slot = slot.as_str(), "saved lock state for cleanup"),
                Err(e) => warn!(
                    slot = slot.as_str(),
                    error = %e,
                    "could not save lock state; cleanup will not be able to release this lock"
                ),
            }
            protected(toolchain)
        })
    }
}

/// Marks a recorded slot as handled when dropped.
struct ConsumeOnDrop<'s> {
    store: &'s mut dyn HandoffStore,
    slot: StateSlot,
    recorded: bool,
}

impl Drop for ConsumeOnDrop<'_> {
    fn drop(&mut self) {
        if self.recorded
            && let Err(e) = state::mark_consumed(&mut *self.store, self.slot)
        {
            warn!(
                slot = self.slot.as_str(),
                error = %e,
                "could not mark lock state as released"
            );
        }
    }
}
