//! Common library for the offload tools: the replication engine and the plumbing shared by the
//! command-line front end.
//!
//! The engine copies a source directory tree to one or two destination roots, mirroring the
//! relative structure under each of them:
//!
//! - [`scan`] enumerates the regular files of the source tree
//! - [`plan`] maps each file to its destination paths
//! - [`copy`] transfers one file to one destination
//! - [`progress`] aggregates and publishes run progress
//! - [`replicate`] orchestrates a run and produces its [`RunResult`]
//!
//! # Example
//!
//! ```no_run
//! # async fn example() -> anyhow::Result<()> {
//! use std::path::{Path, PathBuf};
//!
//! let cancel = tokio_util::sync::CancellationToken::new();
//! let observer = |progress: &common::RunProgress| {
//!     println!("{:.0}% {}", progress.percent_complete, progress.current_item)
//! };
//! let result = common::replicate(
//!     Path::new("/media/card"),
//!     &[PathBuf::from("/backup/primary"), PathBuf::from("/backup/secondary")],
//!     common::Settings::default(),
//!     &observer,
//!     &cancel,
//! )
//! .await?;
//! for failure in result.errors() {
//!     eprintln!("{failure}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Logging
//!
//! Everything is logged through `tracing`. Failed copies are logged at ERROR level as they happen
//! and are also returned in [`RunResult::Failed`], so callers never need to scrape logs.

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod config;
pub mod copy;
pub mod filter;
pub mod plan;
pub mod preserve;
pub mod progress;
pub mod replicate;
pub mod scan;

#[cfg(test)]
mod testutils;

pub use config::{OutputConfig, RuntimeConfig, TracingConfig};
pub use progress::{
    NoProgress, ProgressObserver, ProgressPublisher, ProgressSettings, ProgressType, RunProgress,
};
pub use replicate::{
    ConfigurationError, Replicator, RunResult, RunState, Settings, Summary, UnitFailure,
};

/// Runs a single replication with a fresh [`Replicator`].
pub async fn replicate(
    source_root: &std::path::Path,
    destination_roots: &[std::path::PathBuf],
    settings: Settings,
    observer: &dyn ProgressObserver,
    cancel: &tokio_util::sync::CancellationToken,
) -> Result<RunResult, ConfigurationError> {
    Replicator::new(settings)
        .run(source_root, destination_roots, observer, cancel)
        .await
}

fn init_tracing(output: &OutputConfig, config: &TracingConfig) -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(output.level_filter().into())
        .from_env_lossy();
    let console_layer = if output.quiet {
        None
    } else {
        Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
    };
    let file_layer = match &config.debug_log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open debug log file {path:?}"))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file)),
            )
        }
        None => None,
    };
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("failed to install the tracing subscriber")?;
    Ok(())
}

fn build_runtime(config: &RuntimeConfig) -> anyhow::Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if config.max_workers > 0 {
        builder.worker_threads(config.max_workers);
    }
    if config.max_blocking_threads > 0 {
        builder.max_blocking_threads(config.max_blocking_threads);
    }
    builder.build().context("failed to build the tokio runtime")
}

/// Drives a command-line tool: sets up logging and the tokio runtime, renders progress while
/// `func` runs and prints its summary.
///
/// `func` receives the [`ProgressPublisher`] the display reads from. Returns `None` if anything
/// failed, the error is logged with its full context chain.
pub fn run<Fut, Summary>(
    progress: Option<ProgressSettings>,
    output: OutputConfig,
    runtime: RuntimeConfig,
    tracing: TracingConfig,
    func: impl FnOnce(ProgressPublisher) -> Fut,
) -> Option<Summary>
where
    Summary: std::fmt::Display,
    Fut: std::future::Future<Output = anyhow::Result<Summary>>,
{
    if let Err(error) = init_tracing(&output, &tracing) {
        eprintln!("{error:#}");
        return None;
    }
    let runtime = match build_runtime(&runtime) {
        Ok(runtime) => runtime,
        Err(error) => {
            tracing::error!("{:#}", error);
            return None;
        }
    };
    let res = runtime.block_on(async move {
        let publisher = ProgressPublisher::new();
        let done = tokio_util::sync::CancellationToken::new();
        let display = progress.map(|settings| {
            tokio::spawn(crate::progress::show_progress(
                settings,
                publisher.subscribe(),
                done.clone(),
            ))
        });
        let res = func(publisher).await;
        done.cancel();
        if let Some(display) = display {
            match display.await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => tracing::error!("progress display failed: {:#}", error),
                Err(error) => tracing::error!("progress display task failed: {}", error),
            }
        }
        res
    });
    match res {
        Ok(summary) => {
            if output.print_summary || output.verbose > 0 {
                println!("{summary}");
            }
            Some(summary)
        }
        Err(error) => {
            tracing::error!("{:#}", error);
            None
        }
    }
}
