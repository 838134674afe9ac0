//! Per-run outcome aggregation.
//!
//! Workers never touch the report directly: each one returns a
//! [`RecordOutcome`] and a single collector folds them in with
//! [`FetchReport::record`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;

/// Why an index row was not scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowErrorKind {
    MissingSongId,
    MissingSourceUrl,
    InvalidSongId { reason: String },
    InvalidUrl { reason: String },
    DuplicateSongId { first_line: u64 },
    Malformed { message: String },
}

impl fmt::Display for RowErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowErrorKind::MissingSongId => write!(f, "missing song_id"),
            RowErrorKind::MissingSourceUrl => write!(f, "missing source_url"),
            RowErrorKind::InvalidSongId { reason } => write!(f, "invalid song_id: {}", reason),
            RowErrorKind::InvalidUrl { reason } => write!(f, "invalid source_url: {}", reason),
            RowErrorKind::DuplicateSongId { first_line } => {
                write!(f, "duplicate song_id, first seen on line {}", first_line)
            }
            RowErrorKind::Malformed { message } => write!(f, "malformed row: {}", message),
        }
    }
}

/// A skipped index row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    /// 1-based line in the CSV file (the header is line 1).
    pub line: u64,
    pub song_id: Option<String>,
    #[serde(flatten)]
    pub kind: RowErrorKind,
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.song_id {
            Some(id) => write!(f, "line {} (song_id {}): {}", self.line, id, self.kind),
            None => write!(f, "line {}: {}", self.line, self.kind),
        }
    }
}

/// What happened to one scheduled record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Succeeded { bytes: u64, attempts: u32 },
    Skipped { reason: SkipReason },
    Failed { reason: String, attempts: u32 },
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Existing,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Existing => write!(f, "existing"),
        }
    }
}

/// Outcome of one record, attributable to its song id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOutcome {
    pub song_id: String,
    pub source_url: String,
    pub target: PathBuf,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Aggregate result of one fetch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchReport {
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub total_bytes: u64,
    pub was_cancelled: bool,
    pub outcomes: Vec<RecordOutcome>,
    pub row_errors: Vec<RowError>,
}

impl Default for FetchReport {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl FetchReport {
    /// Create an empty report for a run started at `started_at`.
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            elapsed_ms: 0,
            succeeded: 0,
            skipped: 0,
            failed: 0,
            cancelled: 0,
            total_bytes: 0,
            was_cancelled: false,
            outcomes: Vec::new(),
            row_errors: Vec::new(),
        }
    }

    /// Fold one completed record into the counts.
    pub fn record(&mut self, outcome: RecordOutcome) {
        match &outcome.outcome {
            Outcome::Succeeded { bytes, .. } => {
                self.succeeded += 1;
                self.total_bytes += bytes;
            }
            Outcome::Skipped { .. } => self.skipped += 1,
            Outcome::Failed { .. } => self.failed += 1,
            Outcome::Cancelled => self.cancelled += 1,
        }
        self.outcomes.push(outcome);
    }

    /// Append index rows that could not be scheduled.
    pub fn add_row_errors(&mut self, errors: impl IntoIterator<Item = RowError>) {
        self.row_errors.extend(errors);
    }

    /// Sort outcomes by song id and row errors by line.
    pub fn finalize(&mut self) {
        self.outcomes
            .sort_by(|a, b| compare_song_ids(&a.song_id, &b.song_id));
        self.row_errors.sort_by_key(|e| e.line);
        self.elapsed_ms = (Utc::now() - self.started_at)
            .num_milliseconds()
            .max(0) as u64;
    }

    /// Records that were scheduled, whatever their outcome.
    pub fn processed(&self) -> usize {
        self.succeeded + self.skipped + self.failed + self.cancelled
    }

    /// Records that ended in `Failed`.
    pub fn failures(&self) -> impl Iterator<Item = &RecordOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, Outcome::Failed { .. }))
    }

    /// Song ids that failed, in song id order.
    pub fn failed_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.failures().map(|o| o.song_id.clone()).collect();
        ids.sort_by(|a, b| compare_song_ids(a, b));
        ids
    }

    /// Outcome of `song_id`, if it was scheduled.
    pub fn outcome_for(&self, song_id: &str) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|o| o.song_id == song_id)
            .map(|o| &o.outcome)
    }
}

impl fmt::Display for FetchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Fetched {} ({} bytes), skipped {}, failed {}, cancelled {}, row errors {} in {:.1}s",
            self.succeeded,
            self.total_bytes,
            self.skipped,
            self.failed,
            self.cancelled,
            self.row_errors.len(),
            self.elapsed_ms as f64 / 1000.0
        )?;
        if self.was_cancelled {
            writeln!(f, "Run was cancelled before all records completed")?;
        }
        if self.failed > 0 {
            writeln!(f, "Failed songs:")?;
            for outcome in self.failures() {
                if let Outcome::Failed { reason, attempts } = &outcome.outcome {
                    writeln!(
                        f,
                        "  {} ({} attempts): {}",
                        outcome.song_id, attempts, reason
                    )?;
                }
            }
        }
        if !self.row_errors.is_empty() {
            writeln!(f, "Skipped rows:")?;
            for err in &self.row_errors {
                writeln!(f, "  {}", err)?;
            }
        }
        Ok(())
    }
}

/// Order numeric ids by value, numeric before non-numeric, then lexicographically.
pub fn compare_song_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
