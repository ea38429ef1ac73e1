//! Local filesystem port (driven/secondary port)
//!
//! This module defines the filesystem primitives the commit pipeline is
//! built from. Each one is assumed atomic enough on its own; the engine
//! provides ordering, not multi-file atomicity.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because filesystem errors are adapter-specific.
//! - "Does not exist" stays distinguishable: adapters surface it as an
//!   `std::io::Error` of kind `NotFound`, detectable with [`is_not_found`].
//! - `stat` reports a missing path as [`FileSystemState::not_found`]
//!   rather than as an error.

use std::io::ErrorKind;
use std::path::Path;

use chrono::{DateTime, Utc};

// ============================================================================
// FileSystemState struct
// ============================================================================

/// Snapshot of a path's state on the local filesystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSystemState {
    /// Whether the file/directory exists on disk
    pub exists: bool,
    /// Whether this is a regular file (false for directories and other types)
    pub is_file: bool,
    /// Size in bytes (0 for directories or non-existent files)
    pub size: u64,
    /// Last modification time (None if not available or file doesn't exist)
    pub modified: Option<DateTime<Utc>>,
}

impl FileSystemState {
    /// Returns a state representing a non-existent path
    pub fn not_found() -> Self {
        Self {
            exists: false,
            is_file: false,
            size: 0,
            modified: None,
        }
    }

    /// Returns true if the path exists and is a regular file
    pub fn is_regular_file(&self) -> bool {
        self.exists && self.is_file
    }

    /// Returns true if the path exists and is a directory
    pub fn is_directory(&self) -> bool {
        self.exists && !self.is_file
    }
}

// ============================================================================
// ILocalFileSystem trait
// ============================================================================

/// Port trait for local filesystem operations
#[async_trait::async_trait]
pub trait ILocalFileSystem: Send + Sync {
    /// Removes a file, or a directory and everything below it
    ///
    /// Fails with a `NotFound` I/O error if nothing exists at `path`.
    async fn remove(&self, path: &Path) -> anyhow::Result<()>;

    /// Creates a directory and any missing parents
    async fn mkdirs(&self, path: &Path) -> anyhow::Result<()>;

    /// Reports what currently exists at `path`
    async fn stat(&self, path: &Path) -> anyhow::Result<FileSystemState>;

    /// Writes `data` to `path`, replacing any existing file
    async fn write_file(&self, path: &Path, data: &[u8]) -> anyhow::Result<()>;
}

/// Returns true if the error chain carries an I/O `NotFound` error
pub fn is_not_found(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<std::io::Error>()
            .is_some_and(|io| io.kind() == ErrorKind::NotFound)
    })
}
