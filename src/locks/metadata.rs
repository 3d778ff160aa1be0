//! Lock marker contents.
//!
//! A marker holds the holder's process id on the first line and, on the
//! second, an owner string of the form `user@HOST`. Both are informational;
//! the marker's existence alone is what marks the section as busy.

use std::fs;
use std::path::Path;

/// Holder details stored in a marker file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkerMetadata {
    /// Process ID of the holder.
    pub pid: Option<u32>,

    /// Owner of the marker (e.g., `user@HOST`).
    pub owner: Option<String>,
}

impl MarkerMetadata {
    /// Metadata describing the current process.
    pub fn current() -> Self {
        Self {
            pid: Some(std::process::id()),
            owner: Some(get_owner_string()),
        }
    }

    /// Parse marker contents. Missing or malformed lines become `None`.
    pub fn parse(content: &str) -> Self {
        let mut lines = content.lines().map(str::trim);
        let pid = lines.next().and_then(|l| l.parse().ok());
        let owner = lines
            .next()
            .filter(|l| !l.is_empty())
            .map(str::to_string);
        Self { pid, owner }
    }

    /// Read and parse a marker file, treating unreadable files as empty.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Self {
        fs::read_to_string(path.as_ref())
            .map(|content| Self::parse(&content))
            .unwrap_or_default()
    }

    /// Render the marker contents.
    pub fn to_text(&self) -> String {
        let mut text = String::new();
        if let Some(pid) = self.pid {
            text.push_str(&pid.to_string());
        }
        text.push('\n');
        if let Some(owner) = &self.owner {
            text.push_str(owner);
            text.push('\n');
        }
        text
    }

    /// Short description of the holder for error messages.
    pub fn describe(&self) -> String {
        match (self.pid, &self.owner) {
            (Some(pid), Some(owner)) => format!("pid {} ({})", pid, owner),
            (Some(pid), None) => format!("pid {}", pid),
            (None, Some(owner)) => owner.clone(),
            (None, None) => "an unknown holder".to_string(),
        }
    }
}

/// Get the owner string for marker metadata.
pub(crate) fn get_owner_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}
