//! Consumer notification interface
//!
//! Every watched path carries one [`IPathObserver`]. The engine calls
//! [`on_changes`](IPathObserver::on_changes) once per committed batch and
//! [`on_error`](IPathObserver::on_error) when a batch (or the whole account)
//! fails.
//!
//! ## Threading
//!
//! Callbacks run on engine tasks. `on_changes` runs on the path's commit
//! worker and the next batch for that path does not start until it returns,
//! so implementations should hand heavy work off rather than block.

use std::path::PathBuf;

use crate::SyncError;

/// Receives notifications for one watched path
pub trait IPathObserver: Send + Sync {
    /// Called after a batch was committed, with the affected local paths in order
    fn on_changes(&self, changed: &[PathBuf]);

    /// Called when a batch for this path failed, or the account hit a transport error
    fn on_error(&self, error: &SyncError);
}

/// Adapts an `(on_error, on_change)` closure pair to [`IPathObserver`]
pub struct CallbackObserver<E, C> {
    on_error: E,
    on_change: C,
}

impl<E, C> CallbackObserver<E, C>
where
    E: Fn(&SyncError) + Send + Sync,
    C: Fn(&[PathBuf]) + Send + Sync,
{
    /// Creates an observer from two closures
    pub fn new(on_error: E, on_change: C) -> Self {
        Self {
            on_error,
            on_change,
        }
    }
}

impl<E, C> IPathObserver for CallbackObserver<E, C>
where
    E: Fn(&SyncError) + Send + Sync,
    C: Fn(&[PathBuf]) + Send + Sync,
{
    fn on_changes(&self, changed: &[PathBuf]) {
        (self.on_change)(changed);
    }

    fn on_error(&self, error: &SyncError) {
        (self.on_error)(error);
    }
}
