//! DeltaFeedProvider - IDeltaFeed implementation over HTTP
//!
//! Wraps the [`DeltaClient`] and delegates to the [`delta`] module and the
//! client's download call to fulfil the [`IDeltaFeed`] port contract.
//!
//! ## Design Notes
//!
//! - Port methods only read the client, which is held without a lock; a
//!   long-poll in flight never blocks a concurrent file read.

use anyhow::Result;
use tracing::debug;

use dropmirror_core::domain::delta::{DeltaPage, PollResult};
use dropmirror_core::domain::newtypes::{Cursor, RemotePath};
use dropmirror_core::ports::IDeltaFeed;

use crate::client::DeltaClient;
use crate::delta;

/// Delta feed backed by the HTTP service
pub struct DeltaFeedProvider {
    client: DeltaClient,
}

impl DeltaFeedProvider {
    /// Creates a new `DeltaFeedProvider` wrapping the given [`DeltaClient`]
    pub fn new(client: DeltaClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl IDeltaFeed for DeltaFeedProvider {
    /// Delegates to [`delta::longpoll`]
    async fn poll_for_changes(&self, cursor: &Cursor) -> Result<PollResult> {
        debug!("DeltaFeedProvider::poll_for_changes");
        delta::longpoll(&self.client, cursor).await
    }

    /// Delegates to [`delta::pull_page`]
    async fn pull_changes(&self, cursor: Option<&Cursor>) -> Result<DeltaPage> {
        debug!(has_cursor = cursor.is_some(), "DeltaFeedProvider::pull_changes");
        delta::pull_page(&self.client, cursor).await
    }

    /// Delegates to [`DeltaClient::download_file`]
    async fn read_file(&self, path: &RemotePath) -> Result<Vec<u8>> {
        debug!(path = %path, "DeltaFeedProvider::read_file");
        self.client.download_file(path).await
    }
}
