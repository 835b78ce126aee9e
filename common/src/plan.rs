use std::path::{Component, Path, PathBuf};
use tracing::instrument;

/// One file's transfer to one destination root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyUnit {
    /// path of the file relative to the source root, identical for every destination
    pub relative_path: PathBuf,
    pub source: PathBuf,
    pub destination_root: PathBuf,
    pub destination: PathBuf,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{file:?} is not inside source directory {root:?}")]
pub struct InvalidRelativePath {
    pub root: PathBuf,
    pub file: PathBuf,
}

/// Computes the path of `file` relative to `root`.
///
/// The result is non-empty and consists only of normal components, so joining it onto any
/// destination root stays inside that root.
pub fn relative_path(root: &Path, file: &Path) -> Result<PathBuf, InvalidRelativePath> {
    let invalid = || InvalidRelativePath {
        root: root.to_path_buf(),
        file: file.to_path_buf(),
    };
    let relative = file.strip_prefix(root).map_err(|_| invalid())?;
    if relative.as_os_str().is_empty()
        || !relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
    {
        return Err(invalid());
    }
    Ok(relative.to_path_buf())
}

/// Maps source files onto the configured destination roots
#[derive(Debug, Clone)]
pub struct Planner {
    source_root: PathBuf,
    destination_roots: Vec<PathBuf>,
}

impl Planner {
    /// Empty destination roots are treated as "not configured" and dropped; the order of the
    /// remaining roots is the order in which a file's copies are attempted.
    pub fn new(source_root: &Path, destination_roots: &[PathBuf]) -> Self {
        Self {
            source_root: source_root.to_path_buf(),
            destination_roots: destination_roots
                .iter()
                .filter(|root| !root.as_os_str().is_empty())
                .cloned()
                .collect(),
        }
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn destination_roots(&self) -> &[PathBuf] {
        &self.destination_roots
    }

    #[instrument(skip(self))]
    pub fn plan(&self, file: &Path) -> Result<Vec<CopyUnit>, InvalidRelativePath> {
        let relative = relative_path(&self.source_root, file)?;
        Ok(self
            .destination_roots
            .iter()
            .map(|root| CopyUnit {
                relative_path: relative.clone(),
                source: file.to_path_buf(),
                destination_root: root.clone(),
                destination: root.join(&relative),
            })
            .collect())
    }
}
