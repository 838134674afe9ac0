//! salami-fetch - download SALAMI audio files listed in a CSV index.
//!
//! Exit codes: 0 when the run completed (per-song failures included),
//! 2 on configuration errors, 130 when interrupted.

mod args;

use anyhow::Context;
use args::{Args, LogFormat};
use clap::Parser;
use salami_core::{fetch, read_report, write_report, CancellationToken, FetchReport};
use std::process::ExitCode;
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.debug, args.log_format);

    match run(args).await {
        Ok(report) if report.was_cancelled => ExitCode::from(EXIT_INTERRUPTED),
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(EXIT_CONFIG_ERROR)
        }
    }
}

fn init_logging(debug: bool, format: LogFormat) {
    let default_level = if debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(args: Args) -> anyhow::Result<FetchReport> {
    let mut options = args.fetch_options();

    if let Some(previous) = &args.retry_failed_from {
        let failed = read_report(previous)
            .with_context(|| format!("failed to load report {}", previous.display()))?
            .failed_ids();
        info!(
            "Retrying {} failed songs from {}",
            failed.len(),
            previous.display()
        );
        options = options.with_only_ids(failed);
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing without starting new downloads");
            on_interrupt.cancel();
        }
    });

    let report = fetch(&args.index_csv, &args.output_dir, &options, &cancel)
        .await
        .with_context(|| format!("cannot fetch from {}", args.index_csv.display()))?;

    if let Some(path) = &args.report {
        write_report(path, &report)
            .with_context(|| format!("failed to write report {}", path.display()))?;
        info!("Wrote report to {}", path.display());
    }

    // Summary is the program's output, logs go to stderr.
    print!("{}", report);

    Ok(report)
}
