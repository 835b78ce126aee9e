//! Source tree enumeration
//!
//! [`TreeScanner`] walks the source root depth-first in the order the filesystem returns
//! directory entries and yields every regular file together with its size. The walk is lazy and
//! can only be consumed once; callers that need the total up front collect it into a `Vec`.
//!
//! Symbolic links are resolved by the I/O layer: a link to a file is reported as a file and a link
//! to a directory is descended into. There is no cycle detection, so a cyclic chain of directory
//! links makes the walk non-terminating.

use std::path::{Path, PathBuf};
use tracing::instrument;

use crate::filter::FilterSettings;

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("source directory {0:?} does not exist or is not a directory")]
    SourceNotFound(PathBuf),
    #[error("failed reading {path:?}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ScanError {
    fn unreadable(path: PathBuf, source: std::io::Error) -> Self {
        ScanError::Unreadable { path, source }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub size: u64,
}

pub struct TreeScanner {
    root: PathBuf,
    filter: Option<FilterSettings>,
    // directories being listed, innermost last
    pending: Vec<(PathBuf, tokio::fs::ReadDir)>,
}

impl std::fmt::Debug for TreeScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeScanner")
            .field("root", &self.root)
            .field("depth", &self.pending.len())
            .finish()
    }
}

impl TreeScanner {
    #[instrument(skip(filter))]
    pub async fn open(root: &Path, filter: Option<FilterSettings>) -> Result<Self, ScanError> {
        let metadata = match tokio::fs::metadata(root).await {
            Ok(metadata) => metadata,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(ScanError::SourceNotFound(root.to_path_buf()));
            }
            Err(error) => return Err(ScanError::unreadable(root.to_path_buf(), error)),
        };
        if !metadata.is_dir() {
            return Err(ScanError::SourceNotFound(root.to_path_buf()));
        }
        let entries = tokio::fs::read_dir(root)
            .await
            .map_err(|error| ScanError::unreadable(root.to_path_buf(), error))?;
        Ok(Self {
            root: root.to_path_buf(),
            filter: filter.filter(|filter| !filter.is_empty()),
            pending: vec![(root.to_path_buf(), entries)],
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the next regular file, `None` once the whole tree was visited.
    ///
    /// A directory that cannot be listed or an entry whose metadata cannot be read is reported as
    /// an error item; the walk then continues with the remaining entries.
    pub async fn next_file(&mut self) -> Option<Result<ScannedFile, ScanError>> {
        loop {
            let (_, entries) = self.pending.last_mut()?;
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => {
                    self.pending.pop();
                    continue;
                }
                Err(error) => {
                    let (dir, _) = self.pending.pop()?;
                    return Some(Err(ScanError::unreadable(dir, error)));
                }
            };
            let path = entry.path();
            let metadata = match tokio::fs::metadata(&path).await {
                Ok(metadata) => metadata,
                Err(error) => return Some(Err(ScanError::unreadable(path, error))),
            };
            if metadata.is_dir() {
                if !self.is_included(&path, true) {
                    tracing::debug!("skipping excluded directory {:?}", &path);
                    continue;
                }
                match tokio::fs::read_dir(&path).await {
                    Ok(entries) => self.pending.push((path, entries)),
                    Err(error) => return Some(Err(ScanError::unreadable(path, error))),
                }
                continue;
            }
            if !metadata.is_file() {
                tracing::debug!(
                    "skipping {:?}, unsupported file type: {:?}",
                    &path,
                    metadata.file_type()
                );
                continue;
            }
            if !self.is_included(&path, false) {
                tracing::debug!("skipping excluded file {:?}", &path);
                continue;
            }
            return Some(Ok(ScannedFile {
                path,
                size: metadata.len(),
            }));
        }
    }

    fn is_included(&self, path: &Path, is_dir: bool) -> bool {
        let Some(filter) = &self.filter else {
            return true;
        };
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return true;
        };
        if is_dir {
            filter.includes_dir(relative)
        } else {
            filter.includes_file(relative)
        }
    }
}
