//! dropmirror Sync - Remote-to-local delta mirroring engine
//!
//! Provides:
//! - Cursor lifecycle and the long-poll / pull state machine
//! - Multi-page delta accumulation into complete batches
//! - Per-path filtering and serialized commit pipelines
//! - A process-wide instance cache keyed by account identity
//!
//! ## Modules
//!
//! - [`account`] - Public [`SyncAccount`] handle (`sync` / `stop_sync`)
//! - [`registry`] - Instance cache and the one-shot [`sync_account`] helper
//! - [`engine`] - Per-account worker: watch loop, delta puller, dispatcher
//! - [`commit`] - Commit pipeline applying path-scoped batches to disk
//! - [`path_table`] - Watched paths and the prefix filter
//! - [`cursor`] - Cursor store
//! - [`filesystem`] - Local filesystem adapter (atomic writes)
//! - [`observer`] - Change/error notification trait for consumers

pub mod account;
pub mod commit;
pub mod cursor;
pub mod engine;
pub mod filesystem;
pub mod observer;
pub mod path_table;
pub mod registry;

use std::path::{Path, PathBuf};

use dropmirror_core::domain::errors::DomainError;
use dropmirror_core::domain::newtypes::WatchPath;
use thiserror::Error;

pub use account::SyncAccount;
pub use engine::{AccountStatus, WatchState};
pub use filesystem::LocalFileSystemAdapter;
pub use observer::{CallbackObserver, IPathObserver};
pub use registry::{sync_account, AccountRegistry};

/// Errors reported by the synchronization engine
///
/// `Clone` so one account-wide error can be handed to every observer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The delta feed failed (poll, pull or file fetch)
    #[error("Transport error: {0}")]
    Transport(String),

    /// A local filesystem operation failed while committing a batch
    #[error("Filesystem error at {}: {message}", path.display())]
    Filesystem {
        /// Local path the operation targeted
        path: PathBuf,
        /// Rendered error chain
        message: String,
    },

    /// A delta entry was neither a removal, a file nor a folder
    #[error("Unrecognized change at {path}: {description}")]
    UnrecognizedChange {
        /// Remote path of the entry
        path: String,
        /// What the feed reported instead
        description: String,
    },

    /// `sync` was called for a path that is already watched
    #[error("Already watching: {0}")]
    AlreadyWatching(WatchPath),

    /// `stop_sync` was called for a path that is not watched
    #[error("Not watching: {0}")]
    NotWatching(WatchPath),

    /// The account instance has been torn down
    #[error("Account closed")]
    AccountClosed,

    /// A domain-level error propagated from dropmirror-core
    #[error("Domain error: {0}")]
    DomainError(#[from] DomainError),
}

impl SyncError {
    /// Wraps a delta feed failure
    pub fn transport(err: &anyhow::Error) -> Self {
        Self::Transport(format!("{err:#}"))
    }

    /// Wraps a filesystem failure at `path`
    pub fn filesystem(path: &Path, err: &anyhow::Error) -> Self {
        Self::Filesystem {
            path: path.to_path_buf(),
            message: format!("{err:#}"),
        }
    }

    /// Transport errors are account-wide; everything else is scoped to one batch
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
