//! Delta feed port (driven/secondary port)
//!
//! This module defines the interface to the hosted file-storage service's
//! cursor-based delta feed. The engine consumes it; it never reimplements
//! the feed's cursor semantics.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because errors at port boundaries are adapter-specific.
//!   The engine classifies every failure here as a transport error.
//! - Cancelling an outstanding long-poll is done by aborting the task that
//!   awaits [`IDeltaFeed::poll_for_changes`]; implementations must be
//!   cancel-safe (dropping the future abandons the request).

use crate::domain::delta::{DeltaPage, PollResult};
use crate::domain::newtypes::{Cursor, RemotePath};

/// Port trait for the remote delta feed
#[async_trait::async_trait]
pub trait IDeltaFeed: Send + Sync {
    /// Blocks until the feed has changes past `cursor` or the server times out
    ///
    /// # Returns
    /// Whether changes exist, and the feed's own backoff hint
    async fn poll_for_changes(&self, cursor: &Cursor) -> anyhow::Result<PollResult>;

    /// Fetches one page of changes starting at `cursor`
    ///
    /// A `None` cursor requests the complete current state; the feed answers
    /// with `reset = true` on the first page.
    async fn pull_changes(&self, cursor: Option<&Cursor>) -> anyhow::Result<DeltaPage>;

    /// Downloads the full content of a remote file
    async fn read_file(&self, path: &RemotePath) -> anyhow::Result<Vec<u8>>;
}
