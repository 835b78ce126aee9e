//! Progress tracking for a replication run and its terminal display.
//!
//! The engine owns a [`ProgressAggregator`] for the duration of a run and pushes a
//! [`RunProgress`] snapshot to a [`ProgressObserver`] after every source file it finishes.
//! Observers only ever see the snapshot by reference for the duration of the call and clone it if
//! they want to keep it, so nothing outside the engine can change the engine's counters.

use std::io::IsTerminal;

/// Snapshot of a run's progress
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RunProgress {
    pub total_files: u64,
    pub processed_files: u64,
    /// label of the most recently handled file
    pub current_item: String,
    /// `processed_files / total_files * 100`, within [0, 100]
    pub percent_complete: f64,
    pub total_bytes: u64,
    pub processed_bytes: u64,
}

/// Percentage of `processed` out of `total`, 0 when there is nothing to process
pub fn percent_complete(processed: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (processed as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, progress: &RunProgress);
}

impl<F> ProgressObserver for F
where
    F: Fn(&RunProgress) + Send + Sync,
{
    fn on_progress(&self, progress: &RunProgress) {
        self(progress)
    }
}

/// Observer that discards every update
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&self, _progress: &RunProgress) {}
}

/// Observer publishing the latest snapshot to any number of readers
#[derive(Debug)]
pub struct ProgressPublisher {
    sender: tokio::sync::watch::Sender<RunProgress>,
}

impl ProgressPublisher {
    pub fn new() -> Self {
        let (sender, _) = tokio::sync::watch::channel(RunProgress::default());
        Self { sender }
    }

    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<RunProgress> {
        self.sender.subscribe()
    }

    pub fn latest(&self) -> RunProgress {
        self.sender.borrow().clone()
    }
}

impl Default for ProgressPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressObserver for ProgressPublisher {
    fn on_progress(&self, progress: &RunProgress) {
        self.sender.send_replace(progress.clone());
    }
}

pub struct ProgressAggregator<'a> {
    progress: RunProgress,
    observer: &'a dyn ProgressObserver,
}

impl<'a> ProgressAggregator<'a> {
    pub fn new(total_files: u64, total_bytes: u64, observer: &'a dyn ProgressObserver) -> Self {
        Self {
            progress: RunProgress {
                total_files,
                total_bytes,
                ..Default::default()
            },
            observer,
        }
    }

    /// Marks one more source file as handled and notifies the observer.
    pub fn advance(&mut self, label: &str, bytes: u64) {
        let progress = &mut self.progress;
        if progress.processed_files < progress.total_files {
            progress.processed_files += 1;
        } else {
            tracing::warn!(
                "progress advanced past the total of {} files",
                progress.total_files
            );
        }
        progress.processed_bytes = progress.processed_bytes.saturating_add(bytes);
        progress.current_item = label.to_string();
        progress.percent_complete =
            percent_complete(progress.processed_files, progress.total_files);
        tracing::trace!(
            "progress: {}/{} ({:.1}%)",
            progress.processed_files,
            progress.total_files,
            progress.percent_complete
        );
        self.observer.on_progress(&self.progress);
    }

    pub fn snapshot(&self) -> RunProgress {
        self.progress.clone()
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ProgressType {
    /// Progress bar when stderr is a terminal, text updates otherwise
    #[default]
    #[value(alias = "Auto")]
    Auto,
    /// Animated progress bar
    #[value(alias = "ProgressBar")]
    ProgressBar,
    /// Periodic text reports, appropriate for logs
    #[value(alias = "TextUpdates")]
    TextUpdates,
}

#[derive(Debug, Clone, Default)]
pub struct ProgressSettings {
    pub progress_type: ProgressType,
    /// human readable delay between updates, e.g. "200ms" or "10s"
    pub progress_delay: Option<String>,
}

impl ProgressSettings {
    fn resolve(&self) -> anyhow::Result<(ProgressType, std::time::Duration)> {
        let progress_type = match self.progress_type {
            ProgressType::Auto => {
                if std::io::stderr().is_terminal() {
                    ProgressType::ProgressBar
                } else {
                    ProgressType::TextUpdates
                }
            }
            other => other,
        };
        let delay = match &self.progress_delay {
            Some(delay) => humantime::parse_duration(delay)
                .map_err(|err| anyhow::anyhow!("invalid progress delay {delay:?}: {err}"))?,
            None if progress_type == ProgressType::ProgressBar => {
                std::time::Duration::from_millis(200)
            }
            None => std::time::Duration::from_secs(10),
        };
        if delay.is_zero() {
            return Err(anyhow::anyhow!("progress delay must be greater than zero"));
        }
        Ok((progress_type, delay))
    }
}

pub struct ProgressPrinter {
    last_bytes: u64,
    last_update: std::time::Instant,
    start_time: std::time::Instant,
}

impl ProgressPrinter {
    pub fn new() -> Self {
        let now = std::time::Instant::now();
        Self {
            last_bytes: 0,
            last_update: now,
            start_time: now,
        }
    }

    pub fn print(&mut self, progress: &RunProgress) -> String {
        let time_now = std::time::Instant::now();
        let rate = |bytes: u64, secs: f64| {
            if secs > 0.0 {
                (bytes as f64 / secs) as u64
            } else {
                0
            }
        };
        let average_bytes_rate = rate(
            progress.processed_bytes,
            (time_now - self.start_time).as_secs_f64(),
        );
        let current_bytes_rate = rate(
            progress.processed_bytes.saturating_sub(self.last_bytes),
            (time_now - self.last_update).as_secs_f64(),
        );
        self.last_bytes = progress.processed_bytes;
        self.last_update = time_now;
        format!(
            "-----------------------\n\
            PROGRESS: {:>10.1}%\n\
            files:    {:>10} / {}\n\
            current:  {}\n\
            -----------------------\n\
            COPIED:\n\
            average: {:>10}/s\n\
            current: {:>10}/s\n\
            total:   {:>10} / {}",
            progress.percent_complete,
            progress.processed_files,
            progress.total_files,
            progress.current_item,
            bytesize::ByteSize(average_bytes_rate),
            bytesize::ByteSize(current_bytes_rate),
            bytesize::ByteSize(progress.processed_bytes),
            bytesize::ByteSize(progress.total_bytes),
        )
    }
}

impl Default for ProgressPrinter {
    fn default() -> Self {
        Self::new()
    }
}

/// Renders progress from `receiver` until `done` is cancelled
pub async fn show_progress(
    settings: ProgressSettings,
    receiver: tokio::sync::watch::Receiver<RunProgress>,
    done: tokio_util::sync::CancellationToken,
) -> anyhow::Result<()> {
    let (progress_type, delay) = settings.resolve()?;
    if progress_type == ProgressType::ProgressBar {
        let bar = indicatif::ProgressBar::new(0);
        bar.set_style(
            indicatif::ProgressStyle::with_template(
                "[{elapsed_precise}] [{bar:40}] {pos}/{len} files ({percent}%) {msg}",
            )?
            .progress_chars("=> "),
        );
        loop {
            let progress = receiver.borrow().clone();
            bar.set_length(progress.total_files);
            bar.set_position(progress.processed_files);
            bar.set_message(progress.current_item);
            tokio::select! {
                _ = done.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        bar.finish_and_clear();
    } else {
        let mut printer = ProgressPrinter::new();
        loop {
            tokio::select! {
                _ = done.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            let progress = receiver.borrow().clone();
            eprintln!("{}", printer.print(&progress));
        }
    }
    Ok(())
}
