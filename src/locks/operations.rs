//! Marker listing and clearing.

use super::metadata::MarkerMetadata;
use super::types::MarkerInfo;
use crate::error::{CmdGptError, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::Path;

/// List lock markers (`*.lock`) directly inside each of `dirs`.
///
/// Missing directories are skipped. Markers whose modification time is more
/// than `stale_minutes` old are flagged stale.
pub fn list_markers(dirs: &[&Path], stale_minutes: u32) -> Result<Vec<MarkerInfo>> {
    let mut markers = Vec::new();

    for dir in dirs {
        if !dir.exists() {
            continue;
        }

        let entries = fs::read_dir(dir).map_err(|e| {
            CmdGptError::UserError(format!(
                "failed to read directory '{}': {}",
                dir.display(),
                e
            ))
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| {
                CmdGptError::UserError(format!("failed to read directory entry: {}", e))
            })?;

            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("lock") || !path.is_file() {
                continue;
            }

            // The marker may vanish between listing and inspection
            if let Some(info) = inspect(&path, stale_minutes) {
                markers.push(info);
            }
        }
    }

    markers.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(markers)
}

/// Remove the marker called `name` from the first of `dirs` that holds it.
///
/// The caller is responsible for confirming the removal (`--force`). Returns
/// the information read just before deletion.
pub fn clear_marker(dirs: &[&Path], name: &str, stale_minutes: u32) -> Result<MarkerInfo> {
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(CmdGptError::UserError(format!(
            "invalid marker name '{}': expected a file name such as '.maintenance.lock'",
            name
        )));
    }
    if !name.ends_with(".lock") {
        return Err(CmdGptError::UserError(format!(
            "'{}' is not a lock marker (expected a '.lock' file)",
            name
        )));
    }

    let found = dirs
        .iter()
        .map(|dir| dir.join(name))
        .find(|path| path.is_file());

    let Some(path) = found else {
        return Err(CmdGptError::UserError(format!(
            "lock marker '{}' does not exist",
            name
        )));
    };

    let info = inspect(&path, stale_minutes).ok_or_else(|| {
        CmdGptError::UserError(format!("lock marker '{}' disappeared", path.display()))
    })?;

    fs::remove_file(&path).map_err(|e| {
        CmdGptError::UserError(format!(
            "failed to clear marker '{}': {}",
            path.display(),
            e
        ))
    })?;

    Ok(info)
}

fn inspect(path: &Path, stale_minutes: u32) -> Option<MarkerInfo> {
    let modified: DateTime<Utc> = fs::metadata(path).ok()?.modified().ok()?.into();
    let age = Utc::now().signed_duration_since(modified);

    Some(MarkerInfo {
        path: path.to_path_buf(),
        name: path.file_name()?.to_string_lossy().into_owned(),
        metadata: MarkerMetadata::from_file(path),
        modified,
        is_stale: age.num_minutes() > i64::from(stale_minutes),
    })
}
