//! On-disk cache entry format.

use crate::error::{CmdGptError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Current entry format version.
pub const ENTRY_FORMAT_VERSION: u32 = 1;

/// One cached response, stored as `<key>.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub payload: String,

    /// Unix timestamp (seconds) when the entry was written.
    pub created_at: i64,

    pub format_version: u32,
}

impl CacheEntry {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            created_at: Utc::now().timestamp(),
            format_version: ENTRY_FORMAT_VERSION,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| CmdGptError::CacheIoError(format!("failed to serialize entry: {}", e)))
    }

    /// Parse an entry, rejecting unknown format versions.
    pub fn from_json(content: &str) -> Result<Self> {
        let entry: Self = serde_json::from_str(content)
            .map_err(|e| CmdGptError::CacheIoError(format!("failed to parse entry: {}", e)))?;

        if entry.format_version != ENTRY_FORMAT_VERSION {
            return Err(CmdGptError::CacheIoError(format!(
                "unsupported entry format version {}",
                entry.format_version
            )));
        }

        Ok(entry)
    }
}
