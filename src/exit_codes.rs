//! Exit code constants for the build-domain CLI.
//!
//! - 0: Success
//! - 1: User error (bad inputs, invalid config)
//! - 2: Protected operation failure (build/publish/release candidate)
//! - 3: External command could not be executed
//! - 4: Lock acquisition failure (enqueue, ticket extraction, wait timeout)

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad inputs, missing release config, invalid configuration.
pub const USER_ERROR: i32 = 1;

/// A protected step (build, publish, release candidate) reported failure.
pub const OPERATION_FAILURE: i32 = 2;

/// An external program (`sfp`, `git`) could not be spawned.
pub const COMMAND_FAILURE: i32 = 3;

/// Lock acquisition failure: the resource was never held.
pub const LOCK_FAILURE: i32 = 4;
