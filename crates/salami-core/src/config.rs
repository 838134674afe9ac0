//! Centralized configuration for the SALAMI fetcher.
//!
//! Constants live in unit structs; per-run settings are carried by
//! [`FetchOptions`].

use crate::index::is_artifact_extension;
use crate::{FetchError, Result};
use std::collections::HashSet;
use std::time::Duration;

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const DOWNLOAD_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
    pub const MAX_RETRIES: u32 = 3;
    pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
    pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(30);
    pub const DOWNLOAD_TEMP_SUFFIX: &'static str = ".part";
    pub const USER_AGENT: &'static str = concat!("salami-fetch/", env!("CARGO_PKG_VERSION"));
}

/// Index and output layout configuration.
pub struct FetchConfig;

impl FetchConfig {
    pub const SONG_ID_COLUMN: &'static str = "song_id";
    pub const SONG_ID_ALIASES: &'static [&'static str] = &["salami_id"];
    pub const SOURCE_URL_COLUMN: &'static str = "source_url";
    pub const SOURCE_URL_ALIASES: &'static [&'static str] = &["url"];
    pub const DEFAULT_EXTENSION: &'static str = "mp3";
    pub const MAX_EXTENSION_LEN: usize = 5;
    pub const DEFAULT_CONCURRENCY: usize = 4;
}

/// Per-run options for [`fetch`](crate::fetch).
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Re-download even if the target file already exists.
    pub overwrite: bool,
    /// Per-attempt network timeout, body included.
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Downloads in flight at once.
    pub concurrency: usize,
    /// Retry 4xx statuses too. When off, only transient statuses are retried.
    pub retry_client_errors: bool,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    /// When set, only these song ids are processed.
    pub only_ids: Option<HashSet<String>>,
    /// Extension used when the URL does not carry a usable one.
    pub default_extension: String,
    pub user_agent: String,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            overwrite: false,
            timeout: NetworkConfig::DOWNLOAD_REQUEST_TIMEOUT,
            max_retries: NetworkConfig::MAX_RETRIES,
            concurrency: FetchConfig::DEFAULT_CONCURRENCY,
            retry_client_errors: true,
            retry_base_delay: NetworkConfig::RETRY_BASE_DELAY,
            retry_max_delay: NetworkConfig::RETRY_MAX_DELAY,
            only_ids: None,
            default_extension: FetchConfig::DEFAULT_EXTENSION.to_string(),
            user_agent: NetworkConfig::USER_AGENT.to_string(),
        }
    }
}

impl FetchOptions {
    /// Create options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether existing files are downloaded again.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Set the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the number of retries after the first attempt.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the number of downloads in flight.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Enable or disable retries of 4xx statuses.
    pub fn with_retry_client_errors(mut self, retry: bool) -> Self {
        self.retry_client_errors = retry;
        self
    }

    /// Set the backoff base and cap.
    pub fn with_retry_delays(mut self, base: Duration, max: Duration) -> Self {
        self.retry_base_delay = base;
        self.retry_max_delay = max;
        self
    }

    /// Restrict the run to the given song ids.
    pub fn with_only_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.only_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Set the extension used when the URL has none.
    pub fn with_default_extension(mut self, extension: impl Into<String>) -> Self {
        self.default_extension = extension.into();
        self
    }

    /// Total attempts per record, the first one included.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Reject option combinations that cannot run.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(FetchError::Config {
                message: "concurrency must be at least 1".into(),
            });
        }
        if self.timeout.is_zero() {
            return Err(FetchError::Config {
                message: "timeout must be greater than zero".into(),
            });
        }
        if self.retry_max_delay < self.retry_base_delay {
            return Err(FetchError::Config {
                message: format!(
                    "retry max delay {:?} is below base delay {:?}",
                    self.retry_max_delay, self.retry_base_delay
                ),
            });
        }
        let ext = &self.default_extension;
        if !is_artifact_extension(ext) {
            return Err(FetchError::Config {
                message: format!("invalid default extension {:?}", ext),
            });
        }
        Ok(())
    }
}
