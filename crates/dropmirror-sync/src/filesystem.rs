//! Local filesystem adapter (secondary/driven adapter)
//!
//! Implements [`ILocalFileSystem`] using `tokio::fs` for async file operations.
//!
//! ## Design Decisions
//!
//! - **Atomic writes**: Uses write-to-temp + rename so a reader never sees a
//!   half-written mirror file. Temp names are unique per write.
//! - **No symlink following on remove**: `symlink_metadata` decides between
//!   file and directory removal, so a link inside the mirror is removed
//!   rather than its target.
//! - **NotFound passthrough**: `remove` surfaces a missing path as the raw
//!   `io::Error`, which callers detect with `is_not_found`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::DateTime;
use dropmirror_core::ports::local_filesystem::{FileSystemState, ILocalFileSystem};
use tracing::{debug, instrument};
use uuid::Uuid;

// ============================================================================
// LocalFileSystemAdapter struct
// ============================================================================

/// Adapter that bridges the [`ILocalFileSystem`] port to the real filesystem.
///
/// Zero-sized: every operation receives an absolute local path already
/// resolved against the account root.
#[derive(Debug, Clone, Default)]
pub struct LocalFileSystemAdapter;

impl LocalFileSystemAdapter {
    /// Create a new `LocalFileSystemAdapter`.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Unique per call: overlapping watch paths can write the same target concurrently
    fn temp_path_for(target: &Path) -> PathBuf {
        let mut p = target.as_os_str().to_owned();
        p.push(format!(".{}.tmp", Uuid::new_v4().simple()));
        PathBuf::from(p)
    }
}

#[async_trait::async_trait]
impl ILocalFileSystem for LocalFileSystemAdapter {
    #[instrument(skip(self), fields(path = %path.display()))]
    async fn remove(&self, path: &Path) -> anyhow::Result<()> {
        let metadata = tokio::fs::symlink_metadata(path).await?;

        if metadata.is_dir() {
            debug!("removing directory recursively");
            tokio::fs::remove_dir_all(path).await?;
        } else {
            debug!("removing file");
            tokio::fs::remove_file(path).await?;
        }

        Ok(())
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn mkdirs(&self, path: &Path) -> anyhow::Result<()> {
        debug!("creating directory");
        tokio::fs::create_dir_all(path).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn stat(&self, path: &Path) -> anyhow::Result<FileSystemState> {
        let metadata = match tokio::fs::symlink_metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(FileSystemState::not_found());
            }
            Err(e) => return Err(e.into()),
        };

        let modified = metadata.modified().ok().and_then(|st| {
            st.duration_since(std::time::UNIX_EPOCH)
                .ok()
                .and_then(|dur| DateTime::from_timestamp(dur.as_secs() as i64, dur.subsec_nanos()))
        });

        let is_file = !metadata.is_dir();
        let size = if is_file { metadata.len() } else { 0 };

        Ok(FileSystemState {
            exists: true,
            is_file,
            size,
            modified,
        })
    }

    #[instrument(skip(self, data), fields(path = %path.display(), bytes = data.len()))]
    async fn write_file(&self, path: &Path, data: &[u8]) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp_path = Self::temp_path_for(path);
        tokio::fs::write(&tmp_path, data).await?;

        if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        debug!("write complete");
        Ok(())
    }
}

// ============================================================================
// Unit tests
// ============================================================================
