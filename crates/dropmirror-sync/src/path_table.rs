//! Path table and path filter
//!
//! The table maps each normalized [`WatchPath`] to its observer and its
//! commit worker. [`partition`] routes the entries of a complete batch to
//! the watched paths whose prefix covers them.

use std::collections::BTreeMap;
use std::sync::Arc;

use dropmirror_core::domain::delta::DeltaBatch;
use dropmirror_core::domain::newtypes::WatchPath;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::commit::{CommitJob, PathBatch};
use crate::observer::IPathObserver;
use crate::SyncError;

/// Splits a complete batch into one [`PathBatch`] per interested watched path
///
/// An entry lands in every watched path that is a prefix of it, so nested
/// subscriptions each get a copy; entries nobody watches are dropped. A path
/// with no entries still gets a batch when `blank_slate` is set, because a
/// reset applies to every mirror of the account.
pub fn partition<'a, I>(paths: I, batch: &DeltaBatch) -> Vec<PathBatch>
where
    I: IntoIterator<Item = &'a WatchPath>,
{
    paths
        .into_iter()
        .filter_map(|path| {
            let entries: Vec<_> = batch
                .entries
                .iter()
                .filter(|entry| path.contains(entry.path.as_str()))
                .cloned()
                .collect();

            (batch.blank_slate || !entries.is_empty()).then(|| PathBatch {
                path: path.clone(),
                entries,
                blank_slate: batch.blank_slate,
            })
        })
        .collect()
}

/// One registered path
pub(crate) struct WatchedPath {
    pub observer: Arc<dyn IPathObserver>,
    pub queue: mpsc::Sender<CommitJob>,
    pub worker: JoinHandle<()>,
}

/// Watched paths of one account, ordered by path
#[derive(Default)]
pub(crate) struct PathTable {
    entries: BTreeMap<WatchPath, WatchedPath>,
}

impl PathTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, path: &WatchPath) -> bool {
        self.entries.contains_key(path)
    }

    pub fn insert(&mut self, path: WatchPath, watched: WatchedPath) -> Result<(), SyncError> {
        if self.contains(&path) {
            return Err(SyncError::AlreadyWatching(path));
        }
        self.entries.insert(path, watched);
        Ok(())
    }

    pub fn remove(&mut self, path: &WatchPath) -> Option<WatchedPath> {
        self.entries.remove(path)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn paths(&self) -> Vec<WatchPath> {
        self.entries.keys().cloned().collect()
    }

    pub fn queue(&self, path: &WatchPath) -> Option<mpsc::Sender<CommitJob>> {
        self.entries.get(path).map(|w| w.queue.clone())
    }

    /// Observers at this moment, detached from the table
    pub fn observers(&self) -> Vec<Arc<dyn IPathObserver>> {
        self.entries
            .values()
            .map(|w| Arc::clone(&w.observer))
            .collect()
    }

    pub fn partition(&self, batch: &DeltaBatch) -> Vec<PathBatch> {
        partition(self.entries.keys(), batch)
    }
}
