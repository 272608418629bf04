//! Lease-based lock coordination against the remote lock service.
//!
//! - [`resource`]: resource naming, tickets, lock requests
//! - [`ticket`]: ticket recovery from free-form enqueue output
//! - [`handle`]: per-resource acquisition state machine
//! - [`client`]: the `LockService` seam and its `sfp`-backed implementation
//! - [`coordinator`]: scoped acquisition with guaranteed release
//!
//! Mutual exclusion itself is the lock service's job. This side only has to
//! be faithful to the protocol: never treat a resource as held without an
//! `Acquired` wait, always attempt one release for a handle that got there,
//! and never attempt one for a handle that did not.

pub mod client;
pub mod coordinator;
pub mod handle;
pub mod resource;
pub mod ticket;

pub use client::{LockService, SfpLockService, WaitOutcome};
pub use coordinator::{HeldLock, LockCoordinator, release_best_effort};
pub use handle::{LockHandle, LockState};
pub use resource::{LockRequest, Resource, Ticket, global_resource_name};
