use tracing::instrument;

/// Which source attributes are carried over to a copied file
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Settings {
    /// permission bits
    pub mode: bool,
    /// access and modification times
    pub time: bool,
}

impl Settings {
    pub fn any(&self) -> bool {
        self.mode || self.time
    }
}

pub fn preserve_default() -> Settings {
    Settings::default()
}

pub fn preserve_all() -> Settings {
    Settings {
        mode: true,
        time: true,
    }
}

#[instrument(skip(metadata))]
pub async fn set_file_metadata(
    settings: &Settings,
    metadata: &std::fs::Metadata,
    path: &std::path::Path,
) -> std::io::Result<()> {
    if settings.time {
        // timestamps first, a read-only mode set below must not block them
        tracing::debug!("setting timestamps");
        let atime = filetime::FileTime::from_last_access_time(metadata);
        let mtime = filetime::FileTime::from_last_modification_time(metadata);
        let dst = path.to_path_buf();
        tokio::task::spawn_blocking(move || filetime::set_file_times(&dst, atime, mtime))
            .await
            .map_err(std::io::Error::other)??;
    }
    if settings.mode {
        tracing::debug!("setting permissions");
        tokio::fs::set_permissions(path, metadata.permissions()).await?;
    }
    Ok(())
}
