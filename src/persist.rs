//! Whole-document JSON persistence.
//!
//! Every hub document is read and written as one root value. Writes are
//! atomic (temp file → fsync → rename) so a crash mid-write never leaves a
//! truncated document behind.

use crate::error::{HubError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Read and deserialize a JSON document.
///
/// Returns `Ok(None)` when the file does not exist.
///
/// # Errors
/// Returns `HubError::State` if the file cannot be read or parsed.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(HubError::State(format!(
                "cannot read {}: {e}",
                path.display()
            )));
        }
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| HubError::State(format!("cannot parse {}: {e}", path.display())))
}

/// Serialize `value` and write it atomically to `path`.
///
/// # Errors
/// Returns `HubError::State` on serialization, write, or rename failure.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| HubError::State(format!("cannot serialize {}: {e}", path.display())))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            HubError::State(format!(
                "cannot create directory {}: {e}",
                parent.display()
            ))
        })?;
    }

    let tmp_path = temp_path_for(path);
    let mut file = std::fs::File::create(&tmp_path).map_err(|e| {
        HubError::State(format!(
            "cannot create temp file {}: {e}",
            tmp_path.display()
        ))
    })?;
    file.write_all(&json)
        .map_err(|e| HubError::State(format!("cannot write temp file: {e}")))?;
    file.sync_all()
        .map_err(|e| HubError::State(format!("cannot sync temp file: {e}")))?;

    drop(file);

    std::fs::rename(&tmp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp_path);
        HubError::State(format!(
            "cannot rename {} to {}: {e}",
            tmp_path.display(),
            path.display()
        ))
    })
}

/// Temp file next to `path`, unique to this process and write. Writers never
/// share one, even when they write without the document lock.
fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(
        ".{name}.{}.{}.tmp",
        std::process::id(),
        Uuid::new_v4().simple()
    ))
}

/// Size of a file in bytes, or 0 when it does not exist.
pub fn file_len(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}
