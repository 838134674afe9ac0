//! Output directory layout.
//!
//! Each song owns at most one `<song_id>.<ext>` artifact in the directory,
//! plus a `<song_id>.<ext>.part` temp file while its download is running.
//! Files that do not follow this scheme, or belong to songs outside the
//! current run, are never touched.

use crate::config::NetworkConfig;
use crate::index::artifact_song_id;
use crate::{FetchError, Result};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Create `dir` if needed and make sure files can be written in it.
pub fn prepare_output_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        if !dir.is_dir() {
            return Err(FetchError::NotADirectory(dir.to_path_buf()));
        }
    } else {
        std::fs::create_dir_all(dir).map_err(|e| FetchError::NotWritable {
            path: dir.to_path_buf(),
            message: format!("failed to create directory: {}", e),
        })?;
        debug!("Created output directory {}", dir.display());
    }

    tempfile::NamedTempFile::new_in(dir).map_err(|e| FetchError::NotWritable {
        path: dir.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(())
}

/// Files already in the output directory for the songs of one run.
#[derive(Debug, Default)]
pub struct OutputScan {
    /// Finished artifacts by song id, sorted by path.
    pub artifacts: HashMap<String, Vec<PathBuf>>,
    /// Temp files left behind by an interrupted run.
    pub stale_partials: Vec<PathBuf>,
}

/// List the artifacts and temp files in `dir` that belong to `song_ids`.
pub async fn scan_output_dir(dir: &Path, song_ids: &HashSet<&str>) -> Result<OutputScan> {
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|e| FetchError::io_with_path(e, dir))?;
    let mut scan = OutputScan::default();

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| FetchError::io_with_path(e, dir))?
    {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        let (artifact_name, is_partial) =
            match name.strip_suffix(NetworkConfig::DOWNLOAD_TEMP_SUFFIX) {
                Some(stripped) => (stripped, true),
                None => (name, false),
            };
        let Some(song_id) = artifact_song_id(artifact_name) else {
            continue;
        };
        if !song_ids.contains(song_id) {
            continue;
        }
        let song_id = song_id.to_string();

        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => continue,
            Err(e) => {
                warn!("Cannot inspect {}: {}", path.display(), e);
                continue;
            }
        }

        if is_partial {
            scan.stale_partials.push(path);
        } else {
            scan.artifacts.entry(song_id).or_default().push(path);
        }
    }

    for paths in scan.artifacts.values_mut() {
        paths.sort();
    }
    scan.stale_partials.sort();
    Ok(scan)
}

/// Delete temp files found by [`scan_output_dir`].
///
/// Returns how many were removed.
pub async fn remove_stale_partials(paths: &[PathBuf]) -> usize {
    let mut removed = 0;
    for path in paths {
        match fs::remove_file(path).await {
            Ok(()) => {
                removed += 1;
                debug!("Removed stale partial download {}", path.display());
            }
            Err(e) => warn!("Failed to remove stale partial {}: {}", path.display(), e),
        }
    }
    removed
}

/// Remove a song's older artifacts once `kept` is in place.
pub async fn remove_replaced(kept: &Path, artifacts: &[PathBuf]) {
    for path in artifacts.iter().filter(|p| p.as_path() != kept) {
        match fs::remove_file(path).await {
            Ok(()) => debug!("Removed replaced artifact {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove replaced artifact {}: {}", path.display(), e),
        }
    }
}
