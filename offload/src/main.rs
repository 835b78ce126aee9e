use anyhow::{Result, anyhow};
use clap::Parser;
use tracing::instrument;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "offload",
    version,
    about = "Copy a directory tree to one or two destinations",
    long_about = "`offload` copies every file under SOURCE to each DESTINATION, recreating the directory \
structure under every destination. A file that cannot be copied to one destination does not stop \
the copy of other files or of the same file to the other destination; all failures are reported \
at the end and the exit status is non-zero.

EXAMPLE:
    # Copy a memory card to two backup drives with progress
    offload /media/card /backup/primary /backup/secondary --progress --summary

Note: existing destination files with the same relative path are overwritten."
)]
struct Args {
    // Copy options
    /// Preserve file permissions and access/modification times
    #[arg(short, long, help_heading = "Copy options")]
    preserve: bool,

    /// Copy each file to all destinations at the same time instead of one after another
    #[arg(long, help_heading = "Copy options")]
    parallel_destinations: bool,

    /// Size of the buffer used to copy file contents, e.g. "64KiB" or "1MiB"
    #[arg(
        long,
        default_value = "128KiB",
        value_name = "SIZE",
        help_heading = "Copy options"
    )]
    chunk_size: bytesize::ByteSize,

    // Filtering options
    /// Glob pattern for files to include (can be specified multiple times)
    ///
    /// Only files matching at least one include pattern will be copied. Patterns use glob
    /// syntax: * matches anything except /, ** matches anything including /, ? matches single
    /// char, [...] for character classes. Leading / anchors to source root, trailing / matches
    /// only directories.
    #[arg(long, value_name = "PATTERN", action = clap::ArgAction::Append, help_heading = "Filtering")]
    include: Vec<String>,

    /// Glob pattern for files or directories to exclude (can be specified multiple times)
    ///
    /// Excludes are checked before includes. An excluded directory is not descended into.
    #[arg(long, value_name = "PATTERN", action = clap::ArgAction::Append, help_heading = "Filtering")]
    exclude: Vec<String>,

    // Progress & output
    /// Show progress
    #[arg(long, help_heading = "Progress & output")]
    progress: bool,

    /// Toggles the type of progress to show
    ///
    /// If specified, --progress flag is implied.
    ///
    /// Options are: `ProgressBar` (animated progress bar), `TextUpdates` (appropriate for logging), Auto (default, will
    /// choose between `ProgressBar` or `TextUpdates` depending on the type of terminal attached to stderr)
    #[arg(long, value_name = "TYPE", help_heading = "Progress & output")]
    progress_type: Option<common::ProgressType>,

    /// Sets the delay between progress updates
    ///
    /// - For the interactive (--progress-type=ProgressBar), the default is 200ms.
    /// - For the non-interactive (--progress-type=TextUpdates), the default is 10s.
    ///
    /// If specified, --progress flag is implied.
    ///
    /// This option accepts a human readable duration, e.g. "200ms", "10s", "5min" etc.
    #[arg(long, value_name = "DELAY", help_heading = "Progress & output")]
    progress_delay: Option<String>,

    /// Verbose level (implies "summary"): -v INFO / -vv DEBUG / -vvv TRACE (default: ERROR)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Progress & output")]
    verbose: u8,

    /// Print summary at the end
    #[arg(long, help_heading = "Progress & output")]
    summary: bool,

    /// Quiet mode, don't report errors
    #[arg(short = 'q', long = "quiet", help_heading = "Progress & output")]
    quiet: bool,

    /// Also write logs to this file (plain text, appended)
    #[arg(long, value_name = "PATH", help_heading = "Progress & output")]
    debug_log_file: Option<String>,

    // Advanced settings
    /// Number of worker threads, 0 means number of cores
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_workers: usize,

    /// Number of blocking worker threads, 0 means Tokio runtime default (512)
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_blocking_threads: usize,

    // ARGUMENTS
    /// Source directory
    #[arg()]
    source: std::path::PathBuf,

    /// Destination directories, one or two
    #[arg(required = true)]
    destinations: Vec<std::path::PathBuf>,
}

impl Args {
    fn wants_progress(&self) -> bool {
        self.progress || self.progress_type.is_some() || self.progress_delay.is_some()
    }
}

#[instrument(skip(publisher))]
async fn async_main(args: Args, publisher: common::ProgressPublisher) -> Result<common::Summary> {
    let filter = if !args.include.is_empty() || !args.exclude.is_empty() {
        let mut filter_settings = common::filter::FilterSettings::new();
        for p in &args.include {
            filter_settings.add_include(p)?;
        }
        for p in &args.exclude {
            filter_settings.add_exclude(p)?;
        }
        Some(filter_settings)
    } else {
        None
    };
    let settings = common::Settings {
        copy: common::copy::Settings {
            chunk_size: usize::try_from(args.chunk_size.0)?,
            preserve: if args.preserve {
                common::preserve::preserve_all()
            } else {
                common::preserve::preserve_default()
            },
        },
        filter,
        parallel_destinations: args.parallel_destinations,
    };
    let cancel = tokio_util::sync::CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, stopping after the file being copied");
                cancel.cancel();
            }
        })
    };
    let result = common::replicate(
        &args.source,
        &args.destinations,
        settings,
        &publisher,
        &cancel,
    )
    .await;
    interrupt.abort();
    match result? {
        common::RunResult::Empty => {
            println!("{:?} contains no files, nothing was copied", &args.source);
            Ok(common::Summary::default())
        }
        common::RunResult::Succeeded { summary } => Ok(summary),
        common::RunResult::Failed { errors, summary } => {
            let message = format!("offload encountered {} errors", errors.len());
            if args.summary {
                return Err(anyhow!("{}\n\n{}", message, &summary));
            }
            Err(anyhow!("{}", message))
        }
        common::RunResult::Cancelled { summary } => {
            if args.summary {
                return Err(anyhow!("offload was cancelled\n\n{}", &summary));
            }
            Err(anyhow!("offload was cancelled"))
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let progress = if args.wants_progress() {
        Some(common::ProgressSettings {
            progress_type: args.progress_type.unwrap_or_default(),
            progress_delay: args.progress_delay.clone(),
        })
    } else {
        None
    };
    let func = {
        let args = args.clone();
        |publisher: common::ProgressPublisher| async_main(args, publisher)
    };
    let output = common::OutputConfig {
        quiet: args.quiet,
        verbose: args.verbose,
        print_summary: args.summary,
    };
    let runtime = common::RuntimeConfig {
        max_workers: args.max_workers,
        max_blocking_threads: args.max_blocking_threads,
    };
    let tracing = common::TracingConfig {
        debug_log_file: args.debug_log_file.clone(),
    };
    let res = common::run(progress, output, runtime, tracing, func);
    if res.is_none() {
        std::process::exit(1);
    }
    Ok(())
}
