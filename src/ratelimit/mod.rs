//! Cross-process rate limiting.
//!
//! A token bucket persisted in a small binary file (see [`TokenBucketState`])
//! and mutated only under an exclusive lock on its `.lck` sidecar. Every
//! process pointing at the same file shares one budget.

mod limiter;
mod state;


pub use limiter::{Acquisition, FileRateLimiter, STATE_EXTENSION};
pub use state::{STATE_LEN, STATE_VERSION, TokenBucketState};
