use clap::{Parser, ValueEnum};
use salami_core::{FetchOptions, NetworkConfig};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "salami-fetch", version)]
#[command(about = "Download the SALAMI audio files listed in a CSV index")]
pub struct Args {
    /// CSV index with song_id and source_url columns
    pub index_csv: PathBuf,

    /// Directory that receives <song_id>.<ext> files
    pub output_dir: PathBuf,

    /// Re-download songs whose file already exists
    #[arg(long, env = "SALAMI_FETCH_OVERWRITE")]
    pub overwrite: bool,

    /// Per-download network timeout in seconds
    #[arg(long, env = "SALAMI_FETCH_TIMEOUT", default_value_t = NetworkConfig::DOWNLOAD_REQUEST_TIMEOUT.as_secs_f64())]
    pub timeout: f64,

    /// Retries per song after the first attempt
    #[arg(long, env = "SALAMI_FETCH_MAX_RETRIES", default_value_t = NetworkConfig::MAX_RETRIES)]
    pub max_retries: u32,

    /// Fail 4xx responses after one attempt instead of retrying them
    #[arg(long, env = "SALAMI_FETCH_NO_RETRY_CLIENT_ERRORS")]
    pub no_retry_client_errors: bool,

    /// Downloads running at once
    #[arg(long, env = "SALAMI_FETCH_CONCURRENCY", default_value_t = 4, value_parser = clap::value_parser!(u16).range(1..))]
    pub concurrency: u16,

    /// Write a JSON report of the run to this path
    #[arg(long, env = "SALAMI_FETCH_REPORT")]
    pub report: Option<PathBuf>,

    /// Only fetch the songs that failed in a previous JSON report
    #[arg(long, value_name = "REPORT")]
    pub retry_failed_from: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

impl Args {
    /// Options for the core fetcher built from the parsed flags.
    pub fn fetch_options(&self) -> FetchOptions {
        // Negative or NaN timeouts become zero and are rejected by validation.
        let timeout = Duration::try_from_secs_f64(self.timeout).unwrap_or(Duration::ZERO);

        FetchOptions::new()
            .with_overwrite(self.overwrite)
            .with_timeout(timeout)
            .with_max_retries(self.max_retries)
            .with_concurrency(usize::from(self.concurrency))
            .with_retry_client_errors(!self.no_retry_client_errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_command_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["salami-fetch", "index.csv", "audio"]).unwrap();
        assert_eq!(args.index_csv, PathBuf::from("index.csv"));
        assert!(!args.overwrite);
        assert_eq!(args.log_format, LogFormat::Text);

        let options = args.fetch_options();
        assert_eq!(options.timeout, Duration::from_secs(30));
        assert_eq!(options.max_retries, 3);
        assert_eq!(options.concurrency, 4);
        assert!(options.retry_client_errors);
    }

    #[test]
    fn test_flags() {
        let args = Args::try_parse_from([
            "salami-fetch",
            "index.csv",
            "audio",
            "--overwrite",
            "--timeout",
            "2.5",
            "--max-retries",
            "1",
            "--concurrency",
            "8",
            "--no-retry-client-errors",
            "--report",
            "run.json",
        ])
        .unwrap();

        let options = args.fetch_options();
        assert!(options.overwrite);
        assert_eq!(options.timeout, Duration::from_millis(2500));
        assert_eq!(options.max_retries, 1);
        assert_eq!(options.concurrency, 8);
        assert!(!options.retry_client_errors);
        assert_eq!(args.report, Some(PathBuf::from("run.json")));
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        assert!(Args::try_parse_from(["salami-fetch", "a.csv", "out", "--concurrency", "0"]).is_err());
    }

    #[test]
    fn test_negative_timeout_fails_validation() {
        let args =
            Args::try_parse_from(["salami-fetch", "a.csv", "out", "--timeout=-1"]).unwrap();
        assert!(args.fetch_options().validate().is_err());
    }

    #[test]
    fn test_requires_positional_arguments() {
        assert!(Args::try_parse_from(["salami-fetch", "index.csv"]).is_err());
    }
}
