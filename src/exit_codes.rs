//! Exit code constants for the cmdgpt CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, bad config, malformed cache key)
//! - 2: Backend failure (the configured backend command failed)
//! - 3: Rate limited (no budget within the allowed wait)
//! - 4: Lock failure (timeout or OS error while locking)
//! - 5: State corruption (rate-limiter state or an atomic write failed)

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, invalid configuration, or invalid input.
pub const USER_ERROR: i32 = 1;

/// Backend failure: the backend command could not run, timed out, or exited non-zero.
pub const BACKEND_FAILURE: i32 = 2;

/// Rate limited: the shared token bucket had no budget within the wait window.
pub const RATE_LIMITED: i32 = 3;

/// Lock failure: a file lock could not be acquired in time or the OS refused it.
pub const LOCK_FAILURE: i32 = 4;

/// State corruption: persisted shared state is unreadable or could not be replaced.
pub const STATE_CORRUPTION: i32 = 5;
