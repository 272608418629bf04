//! Enqueue -> wait -> critical section -> release.
//!
//! # Scoped acquisition
//!
//! [`LockCoordinator::acquire`] returns a [`HeldLock`] guard only once the wait
//! has returned `Acquired`. The guard issues exactly one release: explicitly
//! through [`HeldLock::release`], or from `Drop` on any other exit path
//! (early return, `?`, panic unwind). Release failures are logged as warnings
//! and never propagated; the lease expiry on the service frees the resource.
//!
//! Acquisition failures (enqueue error, missing ticket, wait error, timeout)
//! are returned to the caller and no release is issued for them.

use crate::error::{BuildDomainError, Result};
use crate::lock::client::{LockService, WaitOutcome};
use crate::lock::handle::LockHandle;
use crate::lock::resource::LockRequest;
use tracing::{info, warn};

/// Drives lock cycles against one lock service.
pub struct LockCoordinator<'a> {
    service: &'a dyn LockService,
}

impl<'a> LockCoordinator<'a> {
    pub fn new(service: &'a dyn LockService) -> Self {
        Self { service }
    }

    /// Enqueue and wait for `request`, returning a guard once the lock is held.
    ///
    /// # Returns
    ///
    /// * `Ok(HeldLock)` - The lock is held; dropping the guard releases it
    /// * `Err(AcquisitionError | ExtractionError)` - Enqueue failed
    /// * `Err(AcquisitionError)` - The wait itself failed
    /// * `Err(TimeoutError)` - The wait elapsed without a grant
    pub fn acquire(&self, request: &LockRequest, timeout_seconds: u64) -> Result<HeldLock<'a>> {
        let mut handle = LockHandle::new(request.resource.clone(), request.lease_seconds);

        let ticket = self.service.enqueue(request)?;
        handle.mark_enqueued(ticket.clone())?;
        handle.begin_wait()?;

        let outcome = match self.service.wait(&request.resource, &ticket, timeout_seconds) {
            Ok(outcome) => outcome,
            Err(e) => {
                handle.abandon()?;
                return Err(e);
            }
        };

        match outcome {
            WaitOutcome::Acquired => {
                handle.mark_acquired()?;
                if let Some(expires) = handle.lease_expires_at() {
                    info!(
                        resource = %request.resource.name,
                        lease_expires_at = %expires.to_rfc3339(),
                        "holding lock"
                    );
                }
                Ok(HeldLock::new(self.service, handle))
            }
            WaitOutcome::TimedOut => {
                handle.abandon()?;
                Err(BuildDomainError::TimeoutError {
                    resource: request.resource.name.clone(),
                    timeout_seconds,
                })
            }
        }
    }

    /// Run `critical` while holding the lock for `request`.
    ///
    /// The release is issued whether `critical` succeeds, fails, or panics.
    /// Acquisition errors are returned without running `critical`.
    pub fn with_lock<T, F>(
        &self,
        request: &LockRequest,
        timeout_seconds: u64,
        critical: F,
    ) -> Result<T>
    where
        F: FnOnce(&LockHandle) -> Result<T>,
    {
        let held = self.acquire(request, timeout_seconds)?;
        let result = critical(held.handle());
        held.release();
        result
    }
}

/// Guard for a lock that reached `Acquired`.
pub struct HeldLock<'a> {
    service: &'a dyn LockService,
    handle: LockHandle,
    released: bool,
}

impl std::fmt::Debug for HeldLock<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeldLock")
            .field("handle", &self.handle)
            .field("released", &self.released)
            .finish()
    }
}

impl<'a> HeldLock<'a> {
    fn new(service: &'a dyn LockService, handle: LockHandle) -> Self {
        Self {
            service,
            handle,
            released: false,
        }
    }

    pub fn handle(&self) -> &LockHandle {
        &self.handle
    }

    /// Release now and return the handle in its terminal state
    /// (`Released`, or `Abandoned` if the service refused).
    pub fn release(mut self) -> LockHandle {
        self.released = true;
        release_best_effort(self.service, &mut self.handle);
        debug_assert!(self.handle.state().is_terminal());
        self.handle.clone()
    }
}

impl Drop for HeldLock<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            release_best_effort(self.service, &mut self.handle);
        }
    }
}

/// Release an acquired handle, downgrading any failure to a warning.
///
/// Handles that are not `Acquired` are left untouched: nothing was granted,
/// so there is nothing to release.
pub fn release_best_effort(service: &dyn LockService, handle: &mut LockHandle) {
    if !handle.is_acquired() {
        return;
    }
    let Some(ticket) = handle.ticket().cloned() else {
        return;
    };

    match service.release(handle.resource(), &ticket) {
        Ok(()) => {
            // Acquired -> Released cannot fail here.
            let _ = handle.mark_released();
        }
        Err(e) => {
            let _ = handle.abandon();
            warn!(
                resource = %handle.resource().name,
                error = %e,
                "release failed; the lock may need to be manually released or will expire after the lease duration"
            );
        }
    }
}
