//! Lock mode and marker information structures.

use super::metadata::MarkerMetadata;
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Mode of an advisory [`super::FileLock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Coexists with other shared locks on the same path.
    Shared,
    /// Excludes every other lock on the same path.
    Exclusive,
}

impl LockMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockMode::Shared => "shared",
            LockMode::Exclusive => "exclusive",
        }
    }
}

impl std::fmt::Display for LockMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Information about a lock marker found on disk.
#[derive(Debug, Clone)]
pub struct MarkerInfo {
    /// The marker file path.
    pub path: PathBuf,

    /// The marker file name (e.g., `.maintenance.lock`).
    pub name: String,

    /// Holder details parsed from the marker contents.
    pub metadata: MarkerMetadata,

    /// Last modification time of the marker, used as its creation time.
    pub modified: DateTime<Utc>,

    /// Whether the marker is older than the stale threshold.
    pub is_stale: bool,
}

impl MarkerInfo {
    /// Format the marker age as a human-readable string.
    pub fn age_string(&self) -> String {
        let age = Utc::now().signed_duration_since(self.modified);
        let minutes = age.num_minutes();
        let hours = age.num_hours();
        let days = age.num_days();

        if days > 0 {
            format!("{}d {}h", days, hours % 24)
        } else if hours > 0 {
            format!("{}h {}m", hours, minutes % 60)
        } else {
            format!("{}m", minutes)
        }
    }
}

impl std::fmt::Display for MarkerInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pid = self
            .metadata
            .pid
            .map(|p| p.to_string())
            .unwrap_or_else(|| "?".to_string());
        write!(
            f,
            "{} (pid: {}, owner: {}, age: {}{})",
            self.name,
            pid,
            self.metadata.owner.as_deref().unwrap_or("unknown"),
            self.age_string(),
            if self.is_stale { ", STALE" } else { "" }
        )
    }
}
