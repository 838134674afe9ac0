//! Atomic JSON persistence for run reports.
//!
//! Writes go to a temp file in the destination directory, are synced, then
//! renamed over the target, so an interrupted write never leaves a truncated
//! report behind.

use crate::report::FetchReport;
use crate::{FetchError, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Read and parse a JSON file.
///
/// Returns `None` if the file doesn't exist.
pub fn atomic_read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(FetchError::io_with_path(e, path)),
    };

    let data = serde_json::from_str(&contents).map_err(|e| FetchError::Json {
        message: format!("Failed to parse {}: {}", path.display(), e),
        source: Some(e),
    })?;
    Ok(Some(data))
}

/// Write `data` as pretty JSON to `path` atomically.
pub fn atomic_write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if !parent.exists() {
        fs::create_dir_all(parent).map_err(|e| FetchError::Io {
            message: format!("Failed to create directory {}", parent.display()),
            path: Some(parent.to_path_buf()),
            source: Some(e),
        })?;
    }

    let serialized = serde_json::to_string_pretty(data)?;

    let mut temp = NamedTempFile::new_in(parent).map_err(|e| FetchError::Io {
        message: format!("Failed to create temp file in {}", parent.display()),
        path: Some(parent.to_path_buf()),
        source: Some(e),
    })?;
    temp.write_all(serialized.as_bytes())
        .and_then(|_| temp.flush())
        .and_then(|_| temp.as_file().sync_all())
        .map_err(|e| FetchError::io_with_path(e, temp.path()))?;

    temp.persist(path).map_err(|e| FetchError::Io {
        message: format!("Failed to rename temp file to {}", path.display()),
        path: Some(path.to_path_buf()),
        source: Some(e.error),
    })?;

    debug!("Atomically wrote {}", path.display());
    Ok(())
}

/// Persist a run report.
pub fn write_report(path: &Path, report: &FetchReport) -> Result<()> {
    atomic_write_json(path, report)
}

/// Load a report written by [`write_report`]; a missing file is an error.
pub fn read_report(path: &Path) -> Result<FetchReport> {
    atomic_read_json(path)?.ok_or_else(|| FetchError::Config {
        message: format!("report {} does not exist", path.display()),
    })
}
