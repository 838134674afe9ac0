//! CSV index loading.
//!
//! The header is checked once, up front: a file without a song id or source
//! URL column is a configuration error. Individual rows that cannot be
//! scheduled become [`RowError`]s and loading carries on.

use crate::config::{FetchConfig, NetworkConfig};
use crate::report::{RowError, RowErrorKind};
use crate::{FetchError, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};
use url::Url;

/// One schedulable row of the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRecord {
    /// 1-based CSV line, the header being line 1.
    pub line: u64,
    pub song_id: String,
    pub source_url: Url,
}

impl IndexRecord {
    /// File name of this record's artifact: `<song_id>.<ext>`.
    pub fn file_name(&self, default_extension: &str) -> String {
        let ext = url_extension(&self.source_url).unwrap_or_else(|| default_extension.to_string());
        format!("{}.{}", self.song_id, ext)
    }
}

/// Result of reading an index file.
#[derive(Debug, Default)]
pub struct LoadedIndex {
    /// Valid records in file order, duplicates removed.
    pub records: Vec<IndexRecord>,
    pub row_errors: Vec<RowError>,
}

/// Read and validate the index at `path`.
pub fn load_index(path: &Path) -> Result<LoadedIndex> {
    if !path.is_file() {
        return Err(FetchError::IndexNotFound(path.to_path_buf()));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| csv_error(path, "failed to open index", e))?;

    let headers = reader
        .headers()
        .map_err(|e| csv_error(path, "failed to read header row", e))?
        .clone();
    let columns = resolve_columns(path, &headers)?;
    debug!(
        "Index {} columns: song_id={} source_url={}",
        path.display(),
        columns.song_id,
        columns.source_url
    );

    let mut loaded = LoadedIndex::default();
    let mut first_seen: HashMap<String, u64> = HashMap::new();

    for (offset, result) in reader.records().enumerate() {
        // Fallback when the record carries no position: header plus offset.
        let fallback_line = offset as u64 + 2;
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                if matches!(e.kind(), csv::ErrorKind::Io(_)) {
                    return Err(csv_error(path, "failed to read index", e));
                }
                let line = e
                    .position()
                    .map(|p| p.line())
                    .unwrap_or(fallback_line);
                loaded.row_errors.push(RowError {
                    line,
                    song_id: None,
                    kind: RowErrorKind::Malformed {
                        message: e.to_string(),
                    },
                });
                continue;
            }
        };

        let line = record
            .position()
            .map(|p| p.line())
            .unwrap_or(fallback_line);
        let song_id = record.get(columns.song_id).unwrap_or("").to_string();
        let source_url = record.get(columns.source_url).unwrap_or("");

        match parse_row(line, &song_id, source_url) {
            Ok(parsed) => {
                if let Some(&first_line) = first_seen.get(&parsed.song_id) {
                    loaded.row_errors.push(RowError {
                        line,
                        song_id: Some(parsed.song_id),
                        kind: RowErrorKind::DuplicateSongId { first_line },
                    });
                    continue;
                }
                first_seen.insert(parsed.song_id.clone(), line);
                loaded.records.push(parsed);
            }
            Err(err) => loaded.row_errors.push(err),
        }
    }

    for err in &loaded.row_errors {
        warn!("Skipping index row: {}", err);
    }
    debug!(
        "Loaded {} records ({} row errors) from {}",
        loaded.records.len(),
        loaded.row_errors.len(),
        path.display()
    );

    Ok(loaded)
}

struct Columns {
    song_id: usize,
    source_url: usize,
}

fn resolve_columns(path: &Path, headers: &csv::StringRecord) -> Result<Columns> {
    let names: Vec<String> = headers.iter().map(normalize_header).collect();
    let find = |canonical: &str, aliases: &[&str]| {
        names.iter().position(|n| n == canonical).or_else(|| {
            aliases
                .iter()
                .find_map(|alias| names.iter().position(|n| n == alias))
        })
    };

    let song_id = find(FetchConfig::SONG_ID_COLUMN, FetchConfig::SONG_ID_ALIASES);
    let source_url = find(FetchConfig::SOURCE_URL_COLUMN, FetchConfig::SOURCE_URL_ALIASES);

    match (song_id, source_url) {
        (Some(song_id), Some(source_url)) => Ok(Columns { song_id, source_url }),
        (song_id, source_url) => {
            let mut missing = Vec::new();
            if song_id.is_none() {
                missing.push(FetchConfig::SONG_ID_COLUMN.to_string());
            }
            if source_url.is_none() {
                missing.push(FetchConfig::SOURCE_URL_COLUMN.to_string());
            }
            Err(FetchError::MissingColumns {
                path: path.to_path_buf(),
                missing,
                found: headers.iter().map(str::to_string).collect(),
            })
        }
    }
}

fn normalize_header(name: &str) -> String {
    name.trim_start_matches('\u{feff}').trim().to_ascii_lowercase()
}

fn parse_row(line: u64, song_id: &str, source_url: &str) -> std::result::Result<IndexRecord, RowError> {
    let row_error = |song_id: Option<&str>, kind| RowError {
        line,
        song_id: song_id.map(str::to_string),
        kind,
    };

    if song_id.is_empty() {
        return Err(row_error(None, RowErrorKind::MissingSongId));
    }
    if let Err(reason) = validate_song_id(song_id) {
        return Err(row_error(Some(song_id), RowErrorKind::InvalidSongId { reason }));
    }
    if source_url.is_empty() {
        return Err(row_error(Some(song_id), RowErrorKind::MissingSourceUrl));
    }
    let url = validate_url(source_url)
        .map_err(|reason| row_error(Some(song_id), RowErrorKind::InvalidUrl { reason }))?;

    Ok(IndexRecord {
        line,
        song_id: song_id.to_string(),
        source_url: url,
    })
}

/// A song id must work as a file stem inside the output directory.
pub fn validate_song_id(song_id: &str) -> std::result::Result<(), String> {
    if song_id == "." || song_id == ".." {
        return Err("reserved path component".into());
    }
    if song_id.starts_with('.') {
        return Err("must not start with '.'".into());
    }
    if let Some(c) = song_id
        .chars()
        .find(|c| matches!(c, '/' | '\\' | ':') || c.is_control())
    {
        return Err(format!("contains forbidden character {:?}", c));
    }
    Ok(())
}

fn validate_url(raw: &str) -> std::result::Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| e.to_string())?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(format!("unsupported scheme {:?}", other)),
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err("missing host".into());
    }
    Ok(url)
}

/// Lowercased extension of the URL's last path segment, if it looks like one.
fn url_extension(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.next_back()?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || !is_artifact_extension(ext) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Whether `ext` may end an artifact name.
///
/// The temp-file suffix is excluded so a finished file is never mistaken for
/// an interrupted download.
pub fn is_artifact_extension(ext: &str) -> bool {
    let temp_ext = NetworkConfig::DOWNLOAD_TEMP_SUFFIX.trim_start_matches('.');
    !ext.is_empty()
        && ext.len() <= FetchConfig::MAX_EXTENSION_LEN
        && ext.chars().all(|c| c.is_ascii_alphanumeric())
        && !ext.eq_ignore_ascii_case(temp_ext)
}

/// Song id of an artifact file name `<song_id>.<ext>`, if `name` is one.
pub fn artifact_song_id(name: &str) -> Option<&str> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || !is_artifact_extension(ext) {
        return None;
    }
    Some(stem)
}

fn csv_error(path: &Path, context: &str, err: csv::Error) -> FetchError {
    FetchError::Csv {
        path: path.to_path_buf(),
        message: format!("{}: {}", context, err),
        source: Some(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_index(dir: &TempDir, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join("index.csv");
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_valid_index() {
        let dir = TempDir::new().unwrap();
        let path = write_index(
            &dir,
            "song_id,source_url,title\n\
             1,http://example.org/a.mp3,First\n\
             2,https://example.org/b.ogg,Second\n",
        );

        let loaded = load_index(&path).unwrap();
        assert!(loaded.row_errors.is_empty());
        assert_eq!(loaded.records.len(), 2);
        assert_eq!(loaded.records[0].song_id, "1");
        assert_eq!(loaded.records[0].line, 2);
        assert_eq!(loaded.records[1].source_url.as_str(), "https://example.org/b.ogg");
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = load_index(&dir.path().join("nope.csv")).unwrap_err();
        assert!(matches!(err, FetchError::IndexNotFound(_)));
        assert!(err.is_config_error());
    }

    #[test]
    fn test_missing_columns() {
        let dir = TempDir::new().unwrap();
        let path = write_index(&dir, "id,link\n1,http://example.org/a.mp3\n");

        match load_index(&path).unwrap_err() {
            FetchError::MissingColumns { missing, found, .. } => {
                assert_eq!(missing, vec!["song_id", "source_url"]);
                assert_eq!(found, vec!["id", "link"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_file_is_missing_columns() {
        let dir = TempDir::new().unwrap();
        let path = write_index(&dir, "");
        assert!(matches!(
            load_index(&path).unwrap_err(),
            FetchError::MissingColumns { .. }
        ));
    }

    #[test]
    fn test_header_aliases_and_case() {
        let dir = TempDir::new().unwrap();
        let path = write_index(&dir, " SALAMI_ID , URL \n1004,http://example.org/x.mp3\n");

        let loaded = load_index(&path).unwrap();
        assert_eq!(loaded.records.len(), 1);
        assert_eq!(loaded.records[0].song_id, "1004");
    }

    #[test]
    fn test_canonical_column_preferred_over_alias() {
        let dir = TempDir::new().unwrap();
        let path = write_index(
            &dir,
            "url,source_url,song_id\nhttp://wrong.example/a,http://example.org/a.mp3,1\n",
        );

        let loaded = load_index(&path).unwrap();
        assert_eq!(loaded.records[0].source_url.as_str(), "http://example.org/a.mp3");
    }

    #[test]
    fn test_malformed_rows_are_row_errors() {
        let dir = TempDir::new().unwrap();
        let path = write_index(
            &dir,
            "song_id,source_url\n\
             ,http://example.org/a.mp3\n\
             2,\n\
             3\n\
             ../4,http://example.org/d.mp3\n\
             5,ftp://example.org/e.mp3\n\
             6,not a url\n\
             7,http://example.org/g.mp3\n",
        );

        let loaded = load_index(&path).unwrap();
        assert_eq!(loaded.records.len(), 1);
        assert_eq!(loaded.records[0].song_id, "7");

        let kinds: Vec<(u64, &RowErrorKind)> =
            loaded.row_errors.iter().map(|e| (e.line, &e.kind)).collect();
        assert_eq!(kinds.len(), 6);
        assert_eq!(kinds[0], (2, &RowErrorKind::MissingSongId));
        assert_eq!(kinds[1], (3, &RowErrorKind::MissingSourceUrl));
        assert_eq!(kinds[2], (4, &RowErrorKind::MissingSourceUrl));
        assert!(matches!(kinds[3], (5, RowErrorKind::InvalidSongId { .. })));
        assert!(matches!(kinds[4], (6, RowErrorKind::InvalidUrl { .. })));
        assert!(matches!(kinds[5], (7, RowErrorKind::InvalidUrl { .. })));
    }

    #[test]
    fn test_duplicate_song_id_first_wins() {
        let dir = TempDir::new().unwrap();
        let path = write_index(
            &dir,
            "song_id,source_url\n\
             9,http://example.org/first.mp3\n\
             10,http://example.org/other.mp3\n\
             9,http://example.org/second.mp3\n",
        );

        let loaded = load_index(&path).unwrap();
        assert_eq!(loaded.records.len(), 2);
        assert_eq!(loaded.records[0].source_url.path(), "/first.mp3");
        assert_eq!(
            loaded.row_errors,
            vec![RowError {
                line: 4,
                song_id: Some("9".into()),
                kind: RowErrorKind::DuplicateSongId { first_line: 2 },
            }]
        );
    }

    #[test]
    fn test_validate_song_id() {
        assert!(validate_song_id("1004").is_ok());
        assert!(validate_song_id("RWC_P_001").is_ok());
        assert!(validate_song_id("..").is_err());
        assert!(validate_song_id(".hidden").is_err());
        assert!(validate_song_id("a/b").is_err());
        assert!(validate_song_id("a\\b").is_err());
        assert!(validate_song_id("a\tb").is_err());
    }

    #[test]
    fn test_file_name_uses_url_extension() {
        let record = |url: &str| IndexRecord {
            line: 2,
            song_id: "42".into(),
            source_url: Url::parse(url).unwrap(),
        };

        assert_eq!(record("http://example.org/a.MP3").file_name("mp3"), "42.mp3");
        assert_eq!(record("http://example.org/dir/a.flac?x=1").file_name("mp3"), "42.flac");
        assert_eq!(record("http://example.org/download").file_name("mp3"), "42.mp3");
        assert_eq!(record("http://example.org/a.tar-gz").file_name("mp3"), "42.mp3");
        assert_eq!(record("http://example.org/.mp3").file_name("ogg"), "42.ogg");
        assert_eq!(record("http://example.org/").file_name("mp3"), "42.mp3");
        assert_eq!(record("http://example.org/a.part").file_name("mp3"), "42.mp3");
        assert_eq!(record("http://example.org/a.PART").file_name("ogg"), "42.ogg");
    }

    #[test]
    fn test_artifact_song_id() {
        assert_eq!(artifact_song_id("1004.mp3"), Some("1004"));
        assert_eq!(artifact_song_id("RWC.1.flac"), Some("RWC.1"));
        assert_eq!(artifact_song_id("1004.mp3.part"), None);
        assert_eq!(artifact_song_id("notes"), None);
        assert_eq!(artifact_song_id(".mp3"), None);
        assert_eq!(artifact_song_id("1004.tar-gz"), None);
    }
}
