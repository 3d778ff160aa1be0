//! Cache key generation and validation.

use crate::error::{CmdGptError, Result};
use sha2::{Digest, Sha256};

/// Length of a cache key in hex characters.
pub const KEY_LEN: usize = 64;

/// Derive a cache key from the fields identifying a request.
///
/// Each field is hashed with its byte length prefixed (u64, little-endian),
/// so `["ab", "c"]` and `["a", "bc"]` produce different keys. The result is
/// a lowercase SHA-256 hex digest.
///
/// # Examples
///
/// ```no_run
/// use cmdgpt::cache::generate_key;
///
/// let key = generate_key(&["What is Rust?", "gpt-4", "You are a helpful assistant!"]);
/// assert_eq!(key.len(), 64);
/// ```
pub fn generate_key<S: AsRef<str>>(fields: &[S]) -> String {
    let mut hasher = Sha256::new();
    for field in fields {
        let bytes = field.as_ref().as_bytes();
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    }
    hex::encode(hasher.finalize())
}

/// Check that `key` is exactly [`KEY_LEN`] hexadecimal characters.
pub fn validate_key(key: &str) -> Result<()> {
    if key.len() != KEY_LEN {
        return Err(CmdGptError::CacheValidationError(format!(
            "expected {} hex characters, got {}",
            KEY_LEN,
            key.len()
        )));
    }

    if let Some(bad) = key.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(CmdGptError::CacheValidationError(format!(
            "non-hex character {:?}",
            bad
        )));
    }

    Ok(())
}
