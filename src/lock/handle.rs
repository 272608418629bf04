//! Acquisition lifecycle of a single resource.
//!
//! ```text
//! Unacquired -> Enqueued -> Waiting -> Acquired -> Released
//!                              |           |
//!                              +-----------+--> Abandoned
//! ```
//!
//! `Released` and `Abandoned` are terminal. A handle only ever reaches
//! `Released` from `Acquired`, so a release is never attempted for a ticket
//! that was not granted.

use crate::error::{BuildDomainError, Result};
use crate::lock::resource::{Resource, Ticket};
use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// Lifecycle state of a [`LockHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Unacquired,
    Enqueued,
    Waiting,
    Acquired,
    Released,
    Abandoned,
}

impl LockState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockState::Unacquired => "unacquired",
            LockState::Enqueued => "enqueued",
            LockState::Waiting => "waiting",
            LockState::Acquired => "acquired",
            LockState::Released => "released",
            LockState::Abandoned => "abandoned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LockState::Released | LockState::Abandoned)
    }
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to release one resource, plus where it is in its lifecycle.
#[derive(Debug, Clone)]
pub struct LockHandle {
    resource: Resource,
    lease_seconds: u64,
    ticket: Option<Ticket>,
    state: LockState,
    acquired_at: Option<DateTime<Utc>>,
}

impl LockHandle {
    pub fn new(resource: Resource, lease_seconds: u64) -> Self {
        Self {
            resource,
            lease_seconds,
            ticket: None,
            state: LockState::Unacquired,
            acquired_at: None,
        }
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn ticket(&self) -> Option<&Ticket> {
        self.ticket.as_ref()
    }

    pub fn state(&self) -> LockState {
        self.state
    }

    pub fn is_acquired(&self) -> bool {
        self.state == LockState::Acquired
    }

    /// When the service will expire the lease on its own, if acquired.
    pub fn lease_expires_at(&self) -> Option<DateTime<Utc>> {
        let lease = i64::try_from(self.lease_seconds)
            .ok()
            .and_then(Duration::try_seconds)?;
        self.acquired_at
            .and_then(|at| at.checked_add_signed(lease))
    }

    /// `Unacquired -> Enqueued`, recording the issued ticket.
    pub fn mark_enqueued(&mut self, ticket: Ticket) -> Result<()> {
        self.transition(LockState::Unacquired, LockState::Enqueued)?;
        self.ticket = Some(ticket);
        Ok(())
    }

    /// `Enqueued -> Waiting`.
    pub fn begin_wait(&mut self) -> Result<()> {
        self.transition(LockState::Enqueued, LockState::Waiting)
    }

    /// `Waiting -> Acquired`.
    pub fn mark_acquired(&mut self) -> Result<()> {
        self.transition(LockState::Waiting, LockState::Acquired)?;
        self.acquired_at = Some(Utc::now());
        Ok(())
    }

    /// `Acquired -> Released`.
    pub fn mark_released(&mut self) -> Result<()> {
        self.transition(LockState::Acquired, LockState::Released)
    }

    /// `Waiting | Acquired -> Abandoned`.
    ///
    /// From `Waiting` the lock was never granted; from `Acquired` the release
    /// failed and the lease expiry is left to free the resource.
    pub fn abandon(&mut self) -> Result<()> {
        match self.state {
            LockState::Waiting | LockState::Acquired => {
                self.state = LockState::Abandoned;
                Ok(())
            }
            other => Err(self.illegal(other, LockState::Abandoned)),
        }
    }

    fn transition(&mut self, from: LockState, to: LockState) -> Result<()> {
        if self.state != from {
            return Err(self.illegal(self.state, to));
        }
        self.state = to;
        Ok(())
    }

    fn illegal(&self, from: LockState, to: LockState) -> BuildDomainError {
        BuildDomainError::StateError(format!(
            "illegal transition {} -> {} for resource '{}'",
            from, to, self.resource.name
        ))
    }
}

impl fmt::Display for LockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}", self.resource, self.state)?;
        if let Some(ticket) = &self.ticket {
            write!(f, ", ticket {}", ticket)?;
        }
        write!(f, "]")
    }
}
