//! Error types for the cmdgpt CLI.
//!
//! Uses thiserror for derive macros and provides user-actionable error messages.

use crate::exit_codes;
use thiserror::Error;

/// Main error type for cmdgpt operations.
///
/// Each variant maps to a specific exit code. Cache I/O failures are normally
/// swallowed inside the cache and turned into misses; the variant exists so the
/// cache can report setup failures to the context, which then disables caching.
#[derive(Error, Debug)]
pub enum CmdGptError {
    /// User provided invalid arguments, input, or configuration.
    #[error("{0}")]
    UserError(String),

    /// A file lock was not acquired before its deadline. Retryable.
    #[error("Lock timeout: {0}")]
    LockTimeout(String),

    /// The OS failed to open or lock a lock file.
    #[error("Lock I/O error: {0}")]
    LockIoError(String),

    /// A cache key failed validation.
    #[error("Invalid cache key: {0}")]
    CacheValidationError(String),

    /// A resolved cache path escaped the cache directory.
    #[error("Security violation: {0}")]
    SecurityViolation(String),

    /// Cache storage could not be read or prepared.
    #[error("Cache I/O error: {0}")]
    CacheIoError(String),

    /// The shared rate-limiter state is corrupt or has an unknown version.
    #[error("Rate limiter state error: {0}")]
    RateLimiterStateError(String),

    /// A temp file could not be created, written, or renamed into place.
    #[error("Atomic write failed: {0}")]
    AtomicWriteError(String),

    /// No rate budget was available within the allowed wait.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// The backend command failed.
    #[error("Backend failed: {0}")]
    BackendError(String),
}

impl CmdGptError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            CmdGptError::UserError(_) => exit_codes::USER_ERROR,
            CmdGptError::CacheValidationError(_) => exit_codes::USER_ERROR,
            CmdGptError::SecurityViolation(_) => exit_codes::USER_ERROR,
            CmdGptError::CacheIoError(_) => exit_codes::USER_ERROR,
            CmdGptError::LockTimeout(_) => exit_codes::LOCK_FAILURE,
            CmdGptError::LockIoError(_) => exit_codes::LOCK_FAILURE,
            CmdGptError::RateLimiterStateError(_) => exit_codes::STATE_CORRUPTION,
            CmdGptError::AtomicWriteError(_) => exit_codes::STATE_CORRUPTION,
            CmdGptError::RateLimited(_) => exit_codes::RATE_LIMITED,
            CmdGptError::BackendError(_) => exit_codes::BACKEND_FAILURE,
        }
    }

    /// Whether retrying the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CmdGptError::LockTimeout(_) | CmdGptError::RateLimited(_)
        )
    }
}

/// Result type alias for cmdgpt operations.
pub type Result<T> = std::result::Result<T, CmdGptError>;
