//! The dataset fetch run.
//!
//! A run validates its inputs up front, then drives one future per index
//! record through a bounded pool. Each future resolves to a
//! [`RecordOutcome`]; the loop in [`Fetcher::run`] is the only place the
//! report is mutated.

use crate::cancel::CancellationToken;
use crate::config::FetchOptions;
use crate::index::{load_index, IndexRecord};
use crate::network::{Downloader, HttpClient, RetryConfig};
use crate::output::{prepare_output_dir, remove_replaced, remove_stale_partials, scan_output_dir};
use crate::report::{FetchReport, Outcome, RecordOutcome, SkipReason};
use crate::{FetchError, Result};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Download every record of an index into `output_dir`.
///
/// Only configuration errors are returned as `Err`; per-record problems are
/// collected in the report.
pub async fn fetch(
    index_csv: &Path,
    output_dir: &Path,
    options: &FetchOptions,
    cancel: &CancellationToken,
) -> Result<FetchReport> {
    Fetcher::new(options.clone())?
        .run(index_csv, output_dir, cancel)
        .await
}

/// A configured fetcher, reusable across runs.
#[derive(Debug, Clone)]
pub struct Fetcher {
    options: FetchOptions,
    downloader: Downloader,
    retry: RetryConfig,
}

impl Fetcher {
    /// Validate `options` and build the HTTP client.
    pub fn new(options: FetchOptions) -> Result<Self> {
        options.validate()?;
        let http = HttpClient::with_timeout(options.timeout, &options.user_agent).map_err(|e| {
            FetchError::Config {
                message: e.to_string(),
            }
        })?;
        let retry = RetryConfig::new()
            .with_max_attempts(options.max_attempts())
            .with_base_delay(options.retry_base_delay)
            .with_max_delay(options.retry_max_delay);

        let downloader =
            Downloader::new(http).with_client_error_retries(options.retry_client_errors);

        Ok(Self {
            options,
            downloader,
            retry,
        })
    }

    /// Options this fetcher was built with.
    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// Run one fetch over `index_csv`.
    pub async fn run(
        &self,
        index_csv: &Path,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<FetchReport> {
        let started_at = Utc::now();
        let index = load_index(index_csv)?;
        prepare_output_dir(output_dir)?;

        let records: Vec<IndexRecord> = match &self.options.only_ids {
            Some(ids) => index
                .records
                .into_iter()
                .filter(|r| ids.contains(&r.song_id))
                .collect(),
            None => index.records,
        };

        let mut scan = {
            let song_ids: HashSet<&str> = records.iter().map(|r| r.song_id.as_str()).collect();
            scan_output_dir(output_dir, &song_ids).await?
        };
        let stale = remove_stale_partials(&scan.stale_partials).await;
        if stale > 0 {
            info!("Removed {} stale partial downloads from {}", stale, output_dir.display());
        }

        info!(
            "Fetching {} songs into {} (overwrite: {}, concurrency: {}, max retries: {})",
            records.len(),
            output_dir.display(),
            self.options.overwrite,
            self.options.concurrency,
            self.options.max_retries
        );

        let mut report = FetchReport::new(started_at);
        report.add_row_errors(index.row_errors);

        let mut outcomes = stream::iter(records)
            .map(|record| {
                let existing = scan.artifacts.remove(&record.song_id).unwrap_or_default();
                self.process(record, existing, output_dir, cancel)
            })
            .buffer_unordered(self.options.concurrency);

        while let Some(outcome) = outcomes.next().await {
            report.record(outcome);
        }

        report.was_cancelled = cancel.is_cancelled();
        report.finalize();

        if report.was_cancelled {
            warn!(
                "Fetch cancelled: {} succeeded, {} skipped, {} failed, {} cancelled",
                report.succeeded, report.skipped, report.failed, report.cancelled
            );
        } else {
            info!(
                "Fetch complete: {} succeeded, {} skipped, {} failed, {} row errors",
                report.succeeded,
                report.skipped,
                report.failed,
                report.row_errors.len()
            );
        }

        Ok(report)
    }

    async fn process(
        &self,
        record: IndexRecord,
        existing: Vec<PathBuf>,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> RecordOutcome {
        let target = output_dir.join(record.file_name(&self.options.default_extension));
        let outcome = self.fetch_record(&record, &target, &existing, cancel).await;

        let target = match (&outcome, existing.first()) {
            (Outcome::Skipped { .. }, Some(found)) => found.clone(),
            _ => target,
        };

        RecordOutcome {
            song_id: record.song_id,
            source_url: record.source_url.to_string(),
            target,
            outcome,
        }
    }

    async fn fetch_record(
        &self,
        record: &IndexRecord,
        target: &Path,
        existing: &[PathBuf],
        cancel: &CancellationToken,
    ) -> Outcome {
        if cancel.is_cancelled() {
            return Outcome::Cancelled;
        }

        if !self.options.overwrite {
            if let Some(found) = existing.first() {
                debug!("Skipping {}: {} already exists", record.song_id, found.display());
                return Outcome::Skipped {
                    reason: SkipReason::Existing,
                };
            }
        }

        let (result, stats) = self
            .downloader
            .download_with_retry(record.source_url.as_str(), target, &self.retry, cancel)
            .await;

        match result {
            Ok(bytes) => {
                remove_replaced(target, existing).await;
                info!(
                    "Fetched song {} ({} bytes, {} attempts) to {}",
                    record.song_id,
                    bytes,
                    stats.attempts,
                    target.display()
                );
                Outcome::Succeeded {
                    bytes,
                    attempts: stats.attempts,
                }
            }
            Err(FetchError::Cancelled) => {
                debug!("Download of song {} cancelled", record.song_id);
                Outcome::Cancelled
            }
            // Backoff cut short by cancellation: retries were not exhausted.
            Err(e)
                if cancel.is_cancelled()
                    && self.downloader.should_retry(&e)
                    && stats.attempts < self.retry.max_attempts =>
            {
                debug!("Download of song {} cancelled during backoff: {}", record.song_id, e);
                Outcome::Cancelled
            }
            Err(e) => {
                warn!(
                    "Failed to fetch song {} from {} after {} attempts: {}",
                    record.song_id, record.source_url, stats.attempts, e
                );
                Outcome::Failed {
                    reason: e.to_string(),
                    attempts: stats.attempts,
                }
            }
        }
    }
}
