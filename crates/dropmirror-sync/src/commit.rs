//! Commit pipeline
//!
//! Turns one path-scoped batch into local filesystem operations. Every
//! watched path owns one commit worker task; batches for that path are
//! applied strictly one after another, and the observer's `on_changes`
//! returns before the worker picks up the next batch.
//!
//! Per entry, in feed order:
//!
//! | Entry kind | Local effect |
//! |------------|--------------|
//! | removed    | delete file or directory; a missing path is fine |
//! | file       | delete what is there while fetching content, then write |
//! | folder     | create if missing, keep if a directory, replace a file |
//! | unknown    | fail the batch with [`SyncError::UnrecognizedChange`] |

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dropmirror_core::domain::delta::{DeltaEntry, EntryKind};
use dropmirror_core::domain::newtypes::{AccountIdentity, RemotePath, WatchPath};
use dropmirror_core::ports::{is_not_found, IDeltaFeed, ILocalFileSystem};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::engine::AccountEvent;
use crate::observer::IPathObserver;
use crate::SyncError;

/// The slice of a complete delta batch that belongs to one watched path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathBatch {
    /// Watched path this batch was routed to
    pub path: WatchPath,
    /// Entries under `path`, in feed order
    pub entries: Vec<DeltaEntry>,
    /// Wipe and recreate the path's local mirror before applying entries
    pub blank_slate: bool,
}

/// A batch queued on a commit worker, tagged with the dispatch it belongs to
#[derive(Debug)]
pub(crate) struct CommitJob {
    pub dispatch_id: u64,
    pub batch: PathBatch,
}

// ============================================================================
// CommitPipeline
// ============================================================================

/// Applies path batches to the account's local mirror
pub struct CommitPipeline {
    identity: AccountIdentity,
    feed: Arc<dyn IDeltaFeed>,
    fs: Arc<dyn ILocalFileSystem>,
}

impl CommitPipeline {
    /// Creates a pipeline writing under `identity.root()`
    pub fn new(
        identity: AccountIdentity,
        feed: Arc<dyn IDeltaFeed>,
        fs: Arc<dyn ILocalFileSystem>,
    ) -> Self {
        Self { identity, feed, fs }
    }

    /// Applies a batch and returns the affected local paths in entry order
    ///
    /// # Errors
    ///
    /// The first failing entry aborts the rest of the batch. Content fetch
    /// failures are reported as [`SyncError::Transport`], local failures as
    /// [`SyncError::Filesystem`].
    #[instrument(
        skip(self, batch),
        fields(path = %batch.path, entries = batch.entries.len(), blank_slate = batch.blank_slate)
    )]
    pub async fn apply(&self, batch: &PathBatch) -> Result<Vec<PathBuf>, SyncError> {
        if batch.blank_slate {
            self.reset_mirror(&batch.path).await?;
        }

        let mut changed = Vec::with_capacity(batch.entries.len());
        for entry in &batch.entries {
            changed.push(self.apply_entry(entry).await?);
        }

        debug!(changed = changed.len(), "batch applied");
        Ok(changed)
    }

    async fn reset_mirror(&self, path: &WatchPath) -> Result<(), SyncError> {
        let local = self.identity.to_local_path(&path.to_remote());
        info!(local = %local.display(), "Rebuilding local mirror from a blank slate");

        self.remove_if_exists(&local).await?;
        self.fs
            .mkdirs(&local)
            .await
            .map_err(|e| SyncError::filesystem(&local, &e))
    }

    async fn apply_entry(&self, entry: &DeltaEntry) -> Result<PathBuf, SyncError> {
        let local = self.identity.to_local_path(&entry.path);

        match &entry.kind {
            EntryKind::Removed => self.remove_if_exists(&local).await?,
            EntryKind::File(_) => self.replace_file(&entry.path, &local).await?,
            EntryKind::Folder => self.ensure_folder(&local).await?,
            EntryKind::Unknown(description) => {
                return Err(SyncError::UnrecognizedChange {
                    path: entry.path.to_string(),
                    description: description.clone(),
                });
            }
        }

        Ok(local)
    }

    async fn remove_if_exists(&self, local: &Path) -> Result<(), SyncError> {
        match self.fs.remove(local).await {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(SyncError::filesystem(local, &e)),
        }
    }

    async fn replace_file(&self, remote: &RemotePath, local: &Path) -> Result<(), SyncError> {
        let (fetched, removed) =
            tokio::join!(self.feed.read_file(remote), self.remove_if_exists(local));

        let data = fetched.map_err(|e| SyncError::transport(&e))?;
        removed?;

        self.fs
            .write_file(local, &data)
            .await
            .map_err(|e| SyncError::filesystem(local, &e))
    }

    async fn ensure_folder(&self, local: &Path) -> Result<(), SyncError> {
        let state = self
            .fs
            .stat(local)
            .await
            .map_err(|e| SyncError::filesystem(local, &e))?;

        if state.is_directory() {
            return Ok(());
        }
        if state.exists {
            debug!(local = %local.display(), "replacing file with directory");
            self.remove_if_exists(local).await?;
        }

        self.fs
            .mkdirs(local)
            .await
            .map_err(|e| SyncError::filesystem(local, &e))
    }
}

// ============================================================================
// Commit worker
// ============================================================================

/// Spawns the worker that serializes commits for one watched path
///
/// The queue holds at most one batch. Path-scoped failures go to the
/// path's observer; transport failures are only reported back, since the
/// account worker broadcasts them to every path. Completion is reported
/// after the observer returns, whatever the outcome.
pub(crate) fn spawn_commit_worker(
    pipeline: Arc<CommitPipeline>,
    path: WatchPath,
    observer: Arc<dyn IPathObserver>,
    events: mpsc::UnboundedSender<AccountEvent>,
) -> (mpsc::Sender<CommitJob>, JoinHandle<()>) {
    let (queue, mut jobs) = mpsc::channel::<CommitJob>(1);

    let worker = tokio::spawn(async move {
        debug!(path = %path, "Commit worker started");

        while let Some(job) = jobs.recv().await {
            let outcome = match pipeline.apply(&job.batch).await {
                Ok(changed) => {
                    observer.on_changes(&changed);
                    Ok(changed.len())
                }
                Err(err) if err.is_transport() => {
                    warn!(path = %path, error = %err, "Content fetch failed");
                    Err(err)
                }
                Err(err) => {
                    warn!(path = %path, error = %err, "Batch commit failed");
                    observer.on_error(&err);
                    Err(err)
                }
            };

            let finished = AccountEvent::CommitFinished {
                path: path.clone(),
                dispatch_id: job.dispatch_id,
                outcome,
            };
            if events.send(finished).is_err() {
                debug!(path = %path, "Account worker gone, dropping commit result");
            }
        }

        debug!(path = %path, "Commit worker stopped");
    });

    (queue, worker)
}
