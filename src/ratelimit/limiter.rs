//! File-backed token bucket limiter.

use super::state::TokenBucketState;
use crate::error::{CmdGptError, Result};
use crate::fs::atomic_write;
use crate::locks::{FileLock, LockMode, sidecar_path};
use chrono::Utc;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, warn};

/// Extension of limiter state files.
pub const STATE_EXTENSION: &str = "ratelimit";

const MIN_BACKOFF: Duration = Duration::from_millis(10);
const MAX_BACKOFF: Duration = Duration::from_millis(100);

/// Outcome of one acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Acquisition {
    /// Tokens were deducted; `remaining` are left in the bucket.
    Granted { remaining: f64 },
    /// Not enough tokens; nothing was deducted.
    Insufficient { available: f64 },
    /// The cost is larger than the shared bucket can ever hold.
    Exceeds { capacity: u64 },
}

impl Acquisition {
    pub fn is_granted(&self) -> bool {
        matches!(self, Acquisition::Granted { .. })
    }
}

/// Token bucket limiter whose state lives in one file shared by all
/// cooperating processes.
///
/// Every attempt loads, refills, checks and saves the state while holding
/// an exclusive lock on the `<state_file>.lck` sidecar, so concurrent
/// processes never grant more than one bucket's worth of tokens. Refill uses
/// the rate and capacity stored in the file.
#[derive(Debug)]
pub struct FileRateLimiter {
    state_file: PathBuf,
    lock_file: PathBuf,
    rate: f64,
    capacity: u64,
    lock_timeout: Duration,
}

impl FileRateLimiter {
    /// Open the limiter at `state_file`, creating a full bucket if absent.
    ///
    /// If the file already exists with a different rate or capacity, the
    /// persisted values stay in force and a warning is logged.
    ///
    /// # Errors
    ///
    /// * `CmdGptError::UserError` - `rate` is not positive or `capacity` is zero
    /// * `CmdGptError::RateLimiterStateError` - the existing state file is invalid
    /// * `CmdGptError::LockTimeout` / `LockIoError` - the state lock was unavailable
    pub fn new<P: AsRef<Path>>(
        state_file: P,
        rate: f64,
        capacity: u64,
        lock_timeout: Duration,
    ) -> Result<Self> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(CmdGptError::UserError(format!(
                "rate limit must be a positive number of requests per second, got {}",
                rate
            )));
        }
        if capacity == 0 {
            return Err(CmdGptError::UserError(
                "rate limit burst must be at least 1".to_string(),
            ));
        }

        let state_file = state_file.as_ref().to_path_buf();
        let limiter = Self {
            lock_file: sidecar_path(&state_file),
            state_file,
            rate,
            capacity,
            lock_timeout,
        };

        let lock = FileLock::exclusive(&limiter.lock_file, limiter.lock_timeout)?;
        match limiter.load()? {
            None => {
                limiter.save(&TokenBucketState::full(rate, capacity, now_ms()))?;
                debug!(path = %limiter.state_file.display(), rate, capacity, "rate limiter initialized");
            }
            Some(state) => {
                if state.rate != rate || state.capacity != capacity {
                    warn!(
                        path = %limiter.state_file.display(),
                        persisted_rate = state.rate,
                        persisted_capacity = state.capacity,
                        rate,
                        capacity,
                        "rate limiter configuration differs from shared state; keeping shared values until reset"
                    );
                }
            }
        }
        drop(lock);

        Ok(limiter)
    }

    pub fn state_file(&self) -> &Path {
        &self.state_file
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    fn load(&self) -> Result<Option<TokenBucketState>> {
        match fs::read(&self.state_file) {
            Ok(bytes) => TokenBucketState::decode(&bytes)
                .map(Some)
                .map_err(|e| match e {
                    CmdGptError::RateLimiterStateError(msg) => CmdGptError::RateLimiterStateError(
                        format!("'{}': {}", self.state_file.display(), msg),
                    ),
                    other => other,
                }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CmdGptError::RateLimiterStateError(format!(
                "failed to read '{}': {}",
                self.state_file.display(),
                e
            ))),
        }
    }

    fn save(&self, state: &TokenBucketState) -> Result<()> {
        atomic_write(&self.state_file, &state.encode())
    }

    /// Current state, or a full bucket with the configured parameters if the
    /// file is missing.
    fn load_or_full(&self, now: i64) -> Result<(TokenBucketState, bool)> {
        Ok(match self.load()? {
            Some(state) => (state, true),
            None => (TokenBucketState::full(self.rate, self.capacity, now), false),
        })
    }

    /// One non-blocking attempt to take `cost` tokens.
    ///
    /// The refill is persisted even when the attempt is refused, so elapsed
    /// time is never credited twice. Lock and state failures are returned.
    /// The cost is checked against the persisted capacity, not the one this
    /// instance was opened with.
    pub fn try_acquire_detailed(&self, cost: u64) -> Result<Acquisition> {
        let _lock = FileLock::exclusive(&self.lock_file, self.lock_timeout)?;

        let now = now_ms();
        let (mut state, existed) = self.load_or_full(now)?;
        let before = state;
        state.refill(now);

        if cost > state.capacity {
            if !existed || state != before {
                self.save(&state)?;
            }
            return Ok(Acquisition::Exceeds {
                capacity: state.capacity,
            });
        }

        let cost = cost as f64;
        if state.tokens >= cost {
            state.tokens -= cost;
            self.save(&state)?;
            debug!(remaining = state.tokens, "rate limit tokens granted");
            Ok(Acquisition::Granted {
                remaining: state.tokens,
            })
        } else {
            if !existed || state != before {
                self.save(&state)?;
            }
            Ok(Acquisition::Insufficient {
                available: state.tokens,
            })
        }
    }

    /// One attempt that reports any failure as a denial.
    pub fn try_acquire(&self, cost: u64) -> bool {
        match self.try_acquire_detailed(cost) {
            Ok(outcome) => outcome.is_granted(),
            Err(e) => {
                warn!(error = %e, "rate limiter attempt failed, denying");
                false
            }
        }
    }

    /// Wait for `cost` tokens for at most `max_wait` (zero waits without bound).
    ///
    /// Returns `Ok(false)` when the wait expires or `cost` exceeds the
    /// shared capacity. Lock timeouts and write failures count as refused
    /// attempts and are retried; an invalid state file is returned as an error.
    pub fn acquire(&self, cost: u64, max_wait: Duration) -> Result<bool> {
        let start = Instant::now();
        loop {
            match self.try_acquire_detailed(cost) {
                Ok(Acquisition::Granted { .. }) => return Ok(true),
                Ok(Acquisition::Insufficient { .. }) => {}
                Ok(Acquisition::Exceeds { capacity }) => {
                    warn!(cost, capacity, "requested tokens exceed bucket capacity");
                    return Ok(false);
                }
                Err(e @ CmdGptError::RateLimiterStateError(_)) => return Err(e),
                Err(e) if e.is_retryable() => debug!(error = %e, "rate limiter busy, retrying"),
                Err(e) => warn!(error = %e, "rate limiter attempt failed, retrying"),
            }

            if !max_wait.is_zero() && start.elapsed() >= max_wait {
                return Ok(false);
            }

            let wait = self.time_until(cost).unwrap_or(Duration::ZERO);
            let backoff = if wait.is_zero() {
                MIN_BACKOFF
            } else {
                wait.min(MAX_BACKOFF)
            };
            thread::sleep(backoff);
        }
    }

    /// Tokens available now, without modifying the shared state.
    pub fn get_available_tokens(&self) -> Result<f64> {
        let _lock = FileLock::shared(&self.lock_file, self.lock_timeout)?;
        let now = now_ms();
        let (state, _) = self.load_or_full(now)?;
        Ok(state.projected(now))
    }

    /// Time until one token is available.
    pub fn time_until_available(&self) -> Result<Duration> {
        self.time_until(1)
    }

    /// Time until `cost` tokens are available, without modifying the shared state.
    pub fn time_until(&self, cost: u64) -> Result<Duration> {
        let _lock = FileLock::shared(&self.lock_file, self.lock_timeout)?;
        let now = now_ms();
        let (state, _) = self.load_or_full(now)?;
        Ok(state.time_until(cost as f64, now))
    }

    /// Empty the bucket and adopt this instance's rate and capacity.
    pub fn reset(&self) -> Result<()> {
        let _lock = FileLock::exclusive(&self.lock_file, self.lock_timeout)?;
        self.save(&TokenBucketState::empty(self.rate, self.capacity, now_ms()))?;
        info!(path = %self.state_file.display(), "rate limiter reset");
        Ok(())
    }

    /// Remove `*.ratelimit` files in `dir` not modified for longer than
    /// `max_age`. Returns the number removed.
    ///
    /// Files whose lock is currently held are left alone. The empty `.lck`
    /// sidecar stays: a waiter may already have it open, and a fresh sidecar
    /// would be a second, unrelated lock.
    pub fn cleanup_stale_files<P: AsRef<Path>>(dir: P, max_age: Duration) -> Result<usize> {
        let dir = dir.as_ref();
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(CmdGptError::RateLimiterStateError(format!(
                    "failed to read directory '{}': {}",
                    dir.display(),
                    e
                )));
            }
        };

        let now = SystemTime::now();
        let mut removed = 0;

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(STATE_EXTENSION) {
                continue;
            }

            let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
                continue;
            };
            match now.duration_since(modified) {
                Ok(age) if age > max_age => {}
                _ => continue,
            }

            let lock_path = sidecar_path(&path);
            let lock = match FileLock::try_acquire(&lock_path, LockMode::Exclusive) {
                Ok(Some(lock)) => lock,
                Ok(None) => {
                    debug!(path = %path.display(), "state file in use, not removed");
                    continue;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot lock state file");
                    continue;
                }
            };

            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove state file"),
            }
            if let Err(e) = lock.release() {
                warn!(path = %lock_path.display(), error = %e, "failed to release state lock");
            }
        }

        if removed > 0 {
            info!(dir = %dir.display(), removed, "removed stale rate limiter files");
        }
        Ok(removed)
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
