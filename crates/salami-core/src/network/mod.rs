//! Network layer: HTTP client, retry policy and atomic downloads.

mod client;
mod download;
mod retry;

pub use client::{extract_domain, HttpClient};
pub use download::Downloader;
pub use retry::{retry_async, RetryConfig, RetryStats};
