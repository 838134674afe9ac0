//! Salami Core - headless fetcher for the SALAMI audio dataset.
//!
//! Reads a CSV index mapping `song_id` to a source URL and materializes one
//! audio file per song under an output directory, named `<song_id>.<ext>` so
//! downstream stages can join audio back to `annotations/<song_id>/`.
//!
//! # Example
//!
//! ```rust,no_run
//! use salami_core::{fetch, CancellationToken, FetchOptions};
//! use std::path::Path;
//!
//! # async fn run() -> salami_core::Result<()> {
//! let options = FetchOptions::new().with_max_retries(1);
//! let report = fetch(
//!     Path::new("id_index_internetarchive.csv"),
//!     Path::new("data/processed/audio_files"),
//!     &options,
//!     &CancellationToken::new(),
//! )
//! .await?;
//! println!("{}", report);
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod index;
pub mod network;
pub mod output;
pub mod persist;
pub mod report;

pub use cancel::CancellationToken;
pub use config::{FetchConfig, FetchOptions, NetworkConfig};
pub use error::{FetchError, Result};
pub use fetcher::{fetch, Fetcher};
pub use index::{load_index, IndexRecord, LoadedIndex};
pub use output::prepare_output_dir;
pub use persist::{read_report, write_report};
pub use report::{FetchReport, Outcome, RecordOutcome, RowError, RowErrorKind, SkipReason};
