//! Replication run orchestration
//!
//! A [`Replicator`] drives one run: it validates the configuration, materializes the list of
//! source files, copies every file to each destination root and reports progress after each file.
//! Failures of individual copies are collected and reported with the result; they never stop the
//! run. Only configuration problems are returned as errors, before anything is written.
//!
//! ```text
//! Idle -> Scanning -> Copying -> Succeeded | Failed
//!            |
//!            +-> Empty | Failed (scan errors only)
//! any non-terminal state -> Cancelled
//! ```

use std::path::{Path, PathBuf};
use tracing::instrument;

use crate::copy;
use crate::filter::FilterSettings;
use crate::plan::{CopyUnit, Planner};
use crate::progress::{ProgressAggregator, ProgressObserver};
use crate::scan::{ScanError, ScannedFile, TreeScanner};

/// Maximum number of destination roots a run accepts
pub const MAX_DESTINATIONS: usize = 2;

#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RunState {
    Idle,
    Scanning,
    Copying,
    Succeeded,
    Failed,
    Empty,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunState::Succeeded | RunState::Failed | RunState::Empty | RunState::Cancelled
        )
    }

    /// True while a run is in progress
    pub fn is_active(self) -> bool {
        matches!(self, RunState::Scanning | RunState::Copying)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("source directory is not set")]
    MissingSource,
    #[error("source directory {0:?} does not exist or is not a directory")]
    SourceNotFound(PathBuf),
    #[error("cannot read source directory {path:?}: {source}")]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no destination directory configured")]
    NoDestination,
    #[error("at most {max} destination directories are supported, got {given}")]
    TooManyDestinations { given: usize, max: usize },
    #[error("destination {0:?} is the source directory")]
    DestinationIsSource(PathBuf),
    #[error("destination {destination:?} overlaps source directory {source_root:?}")]
    DestinationOverlapsSource {
        destination: PathBuf,
        source_root: PathBuf,
    },
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    #[error("replication was already started, a replicator runs only once")]
    AlreadyStarted,
}

impl From<ScanError> for ConfigurationError {
    fn from(error: ScanError) -> Self {
        match error {
            ScanError::SourceNotFound(path) => ConfigurationError::SourceNotFound(path),
            ScanError::Unreadable { path, source } => {
                ConfigurationError::SourceUnreadable { path, source }
            }
        }
    }
}

/// A failed (file x destination) pair, or a file that could not be read or planned at all
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct UnitFailure {
    pub relative_path: PathBuf,
    /// `None` when the failure happened before any destination was involved
    pub destination_root: Option<PathBuf>,
    pub kind: copy::ErrorKind,
    pub message: String,
}

impl std::fmt::Display for UnitFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match &self.destination_root {
            Some(root) => write!(
                f,
                "{} {:?} -> {:?}: {}",
                self.kind, self.relative_path, root, self.message
            ),
            None => write!(f, "{} {:?}: {}", self.kind, self.relative_path, self.message),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Summary {
    pub files_total: u64,
    pub files_processed: u64,
    /// (file x destination) copies that completed
    pub units_copied: u64,
    /// (file x destination) copies that failed, scan and planning failures are not counted
    pub units_failed: u64,
    pub bytes_copied: u64,
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "bytes copied: {}\n\
            files total: {}\n\
            files processed: {}\n\
            copies succeeded: {}\n\
            copies failed: {}",
            bytesize::ByteSize(self.bytes_copied),
            self.files_total,
            self.files_processed,
            self.units_copied,
            self.units_failed,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RunResult {
    /// the source tree contains no files, nothing was written
    Empty,
    Succeeded {
        summary: Summary,
    },
    Failed {
        errors: Vec<UnitFailure>,
        summary: Summary,
    },
    Cancelled {
        summary: Summary,
    },
}

impl RunResult {
    pub fn state(&self) -> RunState {
        match self {
            RunResult::Empty => RunState::Empty,
            RunResult::Succeeded { .. } => RunState::Succeeded,
            RunResult::Failed { .. } => RunState::Failed,
            RunResult::Cancelled { .. } => RunState::Cancelled,
        }
    }

    pub fn summary(&self) -> Summary {
        match self {
            RunResult::Empty => Summary::default(),
            RunResult::Succeeded { summary }
            | RunResult::Failed { summary, .. }
            | RunResult::Cancelled { summary } => *summary,
        }
    }

    pub fn errors(&self) -> &[UnitFailure] {
        match self {
            RunResult::Failed { errors, .. } => errors,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub copy: copy::Settings,
    pub filter: Option<FilterSettings>,
    /// copy a file to all destinations concurrently instead of one after another
    pub parallel_destinations: bool,
}

#[derive(Debug)]
pub struct Replicator {
    settings: Settings,
    state: tokio::sync::watch::Sender<RunState>,
}

impl Replicator {
    pub fn new(settings: Settings) -> Self {
        let (state, _) = tokio::sync::watch::channel(RunState::Idle);
        Self { settings, state }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<RunState> {
        self.state.subscribe()
    }

    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    /// Copies every file under `source_root` to each of `destination_roots`.
    ///
    /// Empty destination roots are ignored. Progress is reported to `observer` once per source
    /// file, after all of its copies were attempted. Cancellation is checked between files, a
    /// file being copied when `cancel` fires is finished first.
    #[instrument(skip(self, observer, cancel))]
    pub async fn run(
        &self,
        source_root: &Path,
        destination_roots: &[PathBuf],
        observer: &dyn ProgressObserver,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<RunResult, ConfigurationError> {
        let (mut scanner, planner) = self.start(source_root, destination_roots).await?;
        tracing::info!(
            "replicating {:?} to {:?}",
            source_root,
            planner.destination_roots()
        );
        let mut summary = Summary::default();
        let mut failures = vec![];
        let mut files = vec![];
        loop {
            if cancel.is_cancelled() {
                summary.files_total = files.len() as u64;
                return Ok(self.finish(RunResult::Cancelled { summary }));
            }
            match scanner.next_file().await {
                Some(Ok(file)) => files.push(file),
                Some(Err(error)) => {
                    let failure = scan_failure(source_root, error);
                    tracing::error!("{}", &failure);
                    failures.push(failure);
                }
                None => break,
            }
        }
        summary.files_total = files.len() as u64;
        if files.is_empty() {
            if failures.is_empty() {
                tracing::info!("source directory {:?} contains no files", source_root);
                return Ok(self.finish(RunResult::Empty));
            }
            return Ok(self.finish(RunResult::Failed {
                errors: failures,
                summary,
            }));
        }
        let total_bytes: u64 = files.iter().map(|file| file.size).sum();
        tracing::info!(
            "found {} files, {} total",
            files.len(),
            bytesize::ByteSize(total_bytes)
        );
        self.state.send_replace(RunState::Copying);
        let mut aggregator = ProgressAggregator::new(files.len() as u64, total_bytes, observer);
        for file in &files {
            if cancel.is_cancelled() {
                tracing::info!(
                    "replication cancelled after {} of {} files",
                    summary.files_processed,
                    summary.files_total
                );
                return Ok(self.finish(RunResult::Cancelled { summary }));
            }
            let label = self
                .replicate_file(&planner, file, &mut summary, &mut failures)
                .await;
            summary.files_processed += 1;
            aggregator.advance(&label, file.size);
        }
        if failures.is_empty() {
            Ok(self.finish(RunResult::Succeeded { summary }))
        } else {
            Ok(self.finish(RunResult::Failed {
                errors: failures,
                summary,
            }))
        }
    }

    async fn start(
        &self,
        source_root: &Path,
        destination_roots: &[PathBuf],
    ) -> Result<(TreeScanner, Planner), ConfigurationError> {
        if self.state() != RunState::Idle {
            return Err(ConfigurationError::AlreadyStarted);
        }
        if source_root.as_os_str().is_empty() {
            return Err(ConfigurationError::MissingSource);
        }
        if self.settings.copy.chunk_size == 0 {
            return Err(ConfigurationError::InvalidChunkSize);
        }
        let planner = Planner::new(source_root, destination_roots);
        match planner.destination_roots().len() {
            0 => return Err(ConfigurationError::NoDestination),
            given if given > MAX_DESTINATIONS => {
                return Err(ConfigurationError::TooManyDestinations {
                    given,
                    max: MAX_DESTINATIONS,
                });
            }
            _ => {}
        }
        let scanner = TreeScanner::open(source_root, self.settings.filter.clone()).await?;
        let source = canonical(source_root).await;
        for root in planner.destination_roots() {
            let destination = canonical(root).await;
            if destination == source {
                return Err(ConfigurationError::DestinationIsSource(root.clone()));
            }
            // a nested root lets a relative path resolve to a file inside the source
            if destination.starts_with(&source) || source.starts_with(&destination) {
                return Err(ConfigurationError::DestinationOverlapsSource {
                    destination: root.clone(),
                    source_root: source_root.to_path_buf(),
                });
            }
        }
        let started = self.state.send_if_modified(|state| {
            if *state == RunState::Idle {
                *state = RunState::Scanning;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(ConfigurationError::AlreadyStarted);
        }
        Ok((scanner, planner))
    }

    /// Attempts every copy of `file` and returns the label to report progress with.
    async fn replicate_file(
        &self,
        planner: &Planner,
        file: &ScannedFile,
        summary: &mut Summary,
        failures: &mut Vec<UnitFailure>,
    ) -> String {
        let units = match planner.plan(&file.path) {
            Ok(units) => units,
            Err(error) => {
                let failure = UnitFailure {
                    relative_path: file.path.clone(),
                    destination_root: None,
                    kind: copy::ErrorKind::InvalidRelativePath,
                    message: error.to_string(),
                };
                tracing::error!("{}", &failure);
                failures.push(failure);
                return file.path.to_string_lossy().into_owned();
            }
        };
        let results = self.copy_units(&units).await;
        for (unit, result) in units.iter().zip(results) {
            match result {
                Ok(bytes) => {
                    summary.units_copied += 1;
                    summary.bytes_copied += bytes;
                }
                Err(error) => {
                    tracing::error!(
                        "{:?} -> {:?} failed: {}",
                        &unit.source,
                        &unit.destination,
                        &error
                    );
                    summary.units_failed += 1;
                    failures.push(UnitFailure {
                        relative_path: unit.relative_path.clone(),
                        destination_root: Some(unit.destination_root.clone()),
                        kind: error.kind,
                        message: format!("{:#}", error.source),
                    });
                }
            }
        }
        units
            .first()
            .map(|unit| unit.relative_path.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    async fn copy_units(&self, units: &[CopyUnit]) -> Vec<Result<u64, copy::Error>> {
        let settings = &self.settings.copy;
        if self.settings.parallel_destinations && distinct_destinations(units) {
            return futures::future::join_all(
                units.iter().map(|unit| copy::copy_unit(unit, settings)),
            )
            .await;
        }
        let mut results = Vec::with_capacity(units.len());
        for unit in units {
            results.push(copy::copy_unit(unit, settings).await);
        }
        results
    }

    fn finish(&self, result: RunResult) -> RunResult {
        self.state.send_replace(result.state());
        tracing::info!("replication finished: {:?}", result.state());
        result
    }
}

fn distinct_destinations(units: &[CopyUnit]) -> bool {
    let destinations: std::collections::HashSet<&Path> =
        units.iter().map(|unit| unit.destination.as_path()).collect();
    destinations.len() == units.len()
}

/// Resolves `path` through its longest existing ancestor, so roots that don't exist yet still
/// compare correctly against the source.
async fn canonical(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut existing = absolute.as_path();
    let mut missing = vec![];
    loop {
        if let Ok(resolved) = tokio::fs::canonicalize(existing).await {
            return missing
                .iter()
                .rev()
                .fold(resolved, |resolved, name| resolved.join(name));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return absolute,
        }
    }
}

fn scan_failure(source_root: &Path, error: ScanError) -> UnitFailure {
    let (path, kind) = match &error {
        ScanError::SourceNotFound(path) => (path, copy::ErrorKind::SourceRead),
        ScanError::Unreadable { path, source } => (
            path,
            copy::ErrorKind::classify(source, copy::ErrorKind::SourceRead),
        ),
    };
    UnitFailure {
        relative_path: path
            .strip_prefix(source_root)
            .unwrap_or(path)
            .to_path_buf(),
        destination_root: None,
        kind,
        message: error.to_string(),
    }
}
