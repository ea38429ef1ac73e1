//! Public account handle
//!
//! A [`SyncAccount`] is a cheap, cloneable handle to one running account
//! worker. Every clone talks to the same worker; [`SyncAccount::same_instance`]
//! tells whether two handles do.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use dropmirror_core::domain::newtypes::{AccountIdentity, RemotePath, WatchPath};
use dropmirror_core::ports::{IDeltaFeed, ILocalFileSystem};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::engine::{AccountEvent, AccountStatus, AccountWorker};
use crate::observer::{CallbackObserver, IPathObserver};
use crate::registry::AccountMap;
use crate::SyncError;

struct AccountHandle {
    identity: AccountIdentity,
    instance_id: Uuid,
    events: mpsc::UnboundedSender<AccountEvent>,
    alive: CancellationToken,
    /// Fires once the worker task has exited
    finished: CancellationToken,
}

/// Handle to the sync engine of one account
#[derive(Clone)]
pub struct SyncAccount {
    inner: Arc<AccountHandle>,
}

impl SyncAccount {
    /// Starts a worker for `identity`; must be called inside a tokio runtime
    pub(crate) fn spawn(
        identity: AccountIdentity,
        feed: Arc<dyn IDeltaFeed>,
        fs: Arc<dyn ILocalFileSystem>,
        accounts: AccountMap,
    ) -> Self {
        let instance_id = Uuid::new_v4();
        let alive = CancellationToken::new();
        let (worker, events) = AccountWorker::new(
            identity.clone(),
            instance_id,
            feed,
            fs,
            accounts,
            alive.clone(),
        );

        let finished = CancellationToken::new();
        let done = finished.clone().drop_guard();
        let span = info_span!("account", account = %identity);
        tokio::spawn(
            async move {
                worker.run().await;
                drop(done);
            }
            .instrument(span),
        );

        Self {
            inner: Arc::new(AccountHandle {
                identity,
                instance_id,
                events,
                alive,
                finished,
            }),
        }
    }

    /// The account this engine mirrors
    pub fn identity(&self) -> &AccountIdentity {
        &self.inner.identity
    }

    /// Identifies the engine instance behind this handle
    pub fn instance_id(&self) -> Uuid {
        self.inner.instance_id
    }

    /// Whether both handles drive the same engine instance
    pub fn same_instance(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Whether the engine has shut down (or is shutting down)
    pub fn is_closed(&self) -> bool {
        self.inner.alive.is_cancelled()
    }

    /// Whether the worker task has exited, teardown included
    pub(crate) fn is_terminated(&self) -> bool {
        self.inner.finished.is_cancelled()
    }

    /// Waits for the worker task to exit
    pub(crate) async fn terminated(&self) {
        self.inner.finished.cancelled().await;
    }

    /// Maps a remote path onto this account's local mirror
    pub fn to_local_path(&self, remote: &RemotePath) -> PathBuf {
        self.inner.identity.to_local_path(remote)
    }

    /// Starts mirroring `path` (the account root when `None`)
    ///
    /// The path is normalized first: lower-cased, made absolute, trailing
    /// separators dropped. Returns the normalized path.
    ///
    /// # Errors
    ///
    /// - [`SyncError::DomainError`] if the path is not a valid remote path
    /// - [`SyncError::AlreadyWatching`] if the normalized path is registered
    /// - [`SyncError::AccountClosed`] if the engine has shut down
    pub async fn sync(
        &self,
        path: Option<&str>,
        observer: Arc<dyn IPathObserver>,
    ) -> Result<WatchPath, SyncError> {
        let path = WatchPath::parse(path)?;
        let watched = path.clone();
        self.request(move |reply| AccountEvent::Subscribe {
            path: watched,
            observer,
            reply,
        })
        .await??;
        Ok(path)
    }

    /// [`sync`](Self::sync) with a pair of closures instead of an observer
    pub async fn sync_with<E, C>(
        &self,
        path: Option<&str>,
        on_error: E,
        on_change: C,
    ) -> Result<WatchPath, SyncError>
    where
        E: Fn(&SyncError) + Send + Sync + 'static,
        C: Fn(&[PathBuf]) + Send + Sync + 'static,
    {
        self.sync(path, Arc::new(CallbackObserver::new(on_error, on_change)))
            .await
    }

    /// Stops mirroring `path`
    ///
    /// Removing the last path shuts the engine down: the outstanding remote
    /// call is cancelled, in-flight commits drain, the local mirror root is
    /// deleted and the instance is evicted from its registry. The call
    /// returns once all of that is done.
    ///
    /// # Errors
    ///
    /// - [`SyncError::NotWatching`] if the path is not registered
    /// - [`SyncError::Filesystem`] if wiping the mirror root failed
    /// - [`SyncError::AccountClosed`] if the engine has already shut down
    pub async fn stop_sync(&self, path: Option<&str>) -> Result<(), SyncError> {
        let path = WatchPath::parse(path)?;
        self.request(move |reply| AccountEvent::Unsubscribe { path, reply })
            .await?
    }

    /// Current state of the engine
    pub async fn status(&self) -> Result<AccountStatus, SyncError> {
        self.request(|reply| AccountEvent::Status { reply }).await
    }

    async fn request<T>(
        &self,
        event: impl FnOnce(oneshot::Sender<T>) -> AccountEvent,
    ) -> Result<T, SyncError> {
        if self.is_closed() {
            return Err(SyncError::AccountClosed);
        }

        let (reply, response) = oneshot::channel();
        self.inner
            .events
            .send(event(reply))
            .map_err(|_| SyncError::AccountClosed)?;
        response.await.map_err(|_| SyncError::AccountClosed)
    }
}

impl fmt::Debug for SyncAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncAccount")
            .field("identity", &self.inner.identity)
            .field("instance_id", &self.inner.instance_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}
