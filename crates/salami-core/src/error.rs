//! Error types for the SALAMI fetcher.
//!
//! Configuration errors are fatal and abort a run before any download starts.
//! Everything else describes a single download attempt and ends up in the
//! [`FetchReport`](crate::report::FetchReport) instead of being propagated.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the fetcher.
#[derive(Debug, Error)]
pub enum FetchError {
    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Index file not found: {0}")]
    IndexNotFound(PathBuf),

    #[error("Index {path} is missing required columns {missing:?} (found {found:?})")]
    MissingColumns {
        path: PathBuf,
        missing: Vec<String>,
        found: Vec<String>,
    },

    #[error("Path is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Output directory {path} is not writable: {message}")]
    NotWritable { path: PathBuf, message: String },

    #[error("CSV error in {path}: {message}")]
    Csv {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<csv::Error>,
    },

    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Download cancelled")]
    Cancelled,
}

/// Result type alias for fetcher operations.
pub type Result<T> = std::result::Result<T, FetchError>;

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        FetchError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl FetchError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        FetchError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Classify a reqwest error, keeping the configured timeout for reporting.
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(timeout)
        } else {
            FetchError::Network {
                message: err.to_string(),
                source: Some(err),
            }
        }
    }

    /// True for errors that abort a run before any download is attempted.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            FetchError::Config { .. }
                | FetchError::IndexNotFound(_)
                | FetchError::MissingColumns { .. }
                | FetchError::NotADirectory(_)
                | FetchError::NotWritable { .. }
                | FetchError::Csv { .. }
        )
    }

    /// Check if this error is transient: a transport failure, a timeout or a
    /// status from [`is_retryable_status`].
    pub fn is_retryable(&self) -> bool {
        self.should_retry(false)
    }

    /// Check if this error should trigger a retry.
    ///
    /// With `retry_client_errors` every non-success status is retried, not
    /// only the transient ones.
    pub fn should_retry(&self, retry_client_errors: bool) -> bool {
        match self {
            FetchError::Network { .. } | FetchError::Timeout(_) => true,
            FetchError::HttpStatus { status, .. } => {
                retry_client_errors || is_retryable_status(*status)
            }
            _ => false,
        }
    }
}

/// Statuses worth another attempt even when client errors are not retried:
/// request timeout, rate limiting and any server-side failure.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500..=599)
}
