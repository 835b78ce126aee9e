use anyhow::Context;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::instrument;

use crate::plan::CopyUnit;
use crate::preserve;

/// Default size of the transfer buffer
pub const DEFAULT_CHUNK_SIZE: usize = 128 * 1024;

/// Classification of a failed copy, the vocabulary shared with callers and reports
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "SourceReadError")]
    SourceRead,
    #[serde(rename = "DestinationPrepareError")]
    DestinationPrepare,
    #[serde(rename = "DestinationWriteError")]
    DestinationWrite,
    #[serde(rename = "PermissionError")]
    Permission,
    #[serde(rename = "InvalidRelativePath")]
    InvalidRelativePath,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::SourceRead => "SourceReadError",
            ErrorKind::DestinationPrepare => "DestinationPrepareError",
            ErrorKind::DestinationWrite => "DestinationWriteError",
            ErrorKind::Permission => "PermissionError",
            ErrorKind::InvalidRelativePath => "InvalidRelativePath",
        }
    }

    /// Picks `Permission` for permission-denied failures, `fallback` otherwise
    pub fn classify(error: &std::io::Error, fallback: ErrorKind) -> ErrorKind {
        if error.kind() == std::io::ErrorKind::PermissionDenied {
            ErrorKind::Permission
        } else {
            fallback
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for a single copy unit.
///
/// # Logging Convention
/// The Display implementation shows the kind followed by the full error chain:
/// ```ignore
/// tracing::error!("copy failed: {}", &error);   // SourceReadError: cannot open "a.txt" for reading: No such file ...
/// ```
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {source:#}")]
pub struct Error {
    pub kind: ErrorKind,
    #[source]
    pub source: anyhow::Error,
}

impl Error {
    #[must_use]
    pub fn new(kind: ErrorKind, source: anyhow::Error) -> Self {
        Error { kind, source }
    }

    fn io(error: std::io::Error, fallback: ErrorKind, context: String) -> Self {
        let kind = ErrorKind::classify(&error, fallback);
        Error::new(kind, anyhow::Error::new(error).context(context))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// size of the buffer used to stream file contents
    pub chunk_size: usize,
    pub preserve: preserve::Settings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            preserve: preserve::preserve_default(),
        }
    }
}

/// Copies one file to one destination and returns the number of bytes written.
///
/// Missing parent directories are created; an existing destination file is truncated and
/// overwritten. On failure whatever was already written stays at the destination.
#[instrument(skip(unit, settings), fields(src = ?unit.source, dst = ?unit.destination))]
pub async fn copy_unit(unit: &CopyUnit, settings: &Settings) -> Result<u64, Error> {
    let src = &unit.source;
    let dst = &unit.destination;
    if let Some(parent) = dst.parent() {
        tracing::debug!("creating destination directory {:?}", parent);
        tokio::fs::create_dir_all(parent).await.map_err(|error| {
            Error::io(
                error,
                ErrorKind::DestinationPrepare,
                format!("cannot create directory {parent:?}"),
            )
        })?;
    }
    tracing::debug!("opening 'src' for reading and 'dst' for writing");
    let mut reader = tokio::fs::File::open(src).await.map_err(|error| {
        Error::io(
            error,
            ErrorKind::SourceRead,
            format!("cannot open {src:?} for reading"),
        )
    })?;
    let src_metadata = reader.metadata().await.map_err(|error| {
        Error::io(
            error,
            ErrorKind::SourceRead,
            format!("failed reading metadata from {src:?}"),
        )
    })?;
    let mut writer = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(dst)
        .await
        .map_err(|error| {
            Error::io(
                error,
                ErrorKind::DestinationWrite,
                format!("cannot open {dst:?} for writing"),
            )
        })?;
    tracing::debug!("copying data");
    let mut buffer = vec![0u8; settings.chunk_size.max(1)];
    let mut bytes_copied = 0u64;
    loop {
        let bytes_read = reader.read(&mut buffer).await.map_err(|error| {
            Error::io(
                error,
                ErrorKind::SourceRead,
                format!("failed reading {src:?}"),
            )
        })?;
        if bytes_read == 0 {
            break;
        }
        writer
            .write_all(&buffer[..bytes_read])
            .await
            .map_err(|error| {
                Error::io(
                    error,
                    ErrorKind::DestinationWrite,
                    format!("failed writing {dst:?}"),
                )
            })?;
        bytes_copied += bytes_read as u64;
    }
    // tokio completes file writes in the background, flush surfaces the last write's result
    writer.flush().await.map_err(|error| {
        Error::io(
            error,
            ErrorKind::DestinationWrite,
            format!("failed writing {dst:?}"),
        )
    })?;
    drop(writer);
    if settings.preserve.any() {
        preserve::set_file_metadata(&settings.preserve, &src_metadata, dst)
            .await
            .with_context(|| format!("failed setting metadata on {dst:?}"))
            .map_err(|error| Error::new(ErrorKind::DestinationWrite, error))?;
    }
    tracing::debug!("copied {} bytes", bytes_copied);
    Ok(bytes_copied)
}
