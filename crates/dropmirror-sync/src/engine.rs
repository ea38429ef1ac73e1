//! Account worker
//!
//! One tokio task per account owns the cursor, the path table and the
//! watch state, and changes them only while handling an [`AccountEvent`].
//! Remote calls run in spawned tasks and commits run on per-path workers;
//! both report back through the same event channel, so no two state
//! transitions for an account ever run at once.
//!
//! ## Watch loop
//!
//! ```text
//!  NoCursor ──pull──▶ Pulling ──complete──▶ Committing ──all done──▶ Idle
//!                        ▲  │ has_more                                  │
//!                        │  └──────┘                                    ▼
//!                        └────────── has_changes / poll error ──── IdleWatching
//!                                                                 │        ▲
//!                                                                 └────────┘
//!                                                           no changes, retry_after
//! ```
//!
//! Within one batch, paths that overlap (one lies under the other) commit
//! one after another in ancestor-first order; disjoint paths commit
//! concurrently.
//!
//! A pull or content-fetch failure moves the account to `Halted` and is
//! reported to every observer; a new registration re-arms the loop.

use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dropmirror_core::domain::delta::{DeltaBatch, DeltaPage, PollResult};
use dropmirror_core::domain::newtypes::{AccountIdentity, Cursor, WatchPath};
use dropmirror_core::ports::{is_not_found, IDeltaFeed, ILocalFileSystem};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::commit::{spawn_commit_worker, CommitJob, CommitPipeline, PathBatch};
use crate::cursor::CursorStore;
use crate::observer::IPathObserver;
use crate::path_table::{PathTable, WatchedPath};
use crate::registry::AccountMap;
use crate::SyncError;

// ============================================================================
// Public state types
// ============================================================================

/// Where the account's watch loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchState {
    /// No cursor yet; the next step is a full pull
    NoCursor,
    /// Cursor held, nothing outstanding
    Idle,
    /// A pull cycle is fetching pages
    Pulling,
    /// A long-poll is outstanding (or waiting out `retry_after`)
    IdleWatching,
    /// Commit workers are applying the last batch
    Committing,
    /// Stopped after a transport error until a path is registered again
    Halted,
}

impl WatchState {
    /// Snake-case name used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoCursor => "no_cursor",
            Self::Idle => "idle",
            Self::Pulling => "pulling",
            Self::IdleWatching => "idle_watching",
            Self::Committing => "committing",
            Self::Halted => "halted",
        }
    }
}

impl Display for WatchState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of one account
#[derive(Debug, Clone)]
pub struct AccountStatus {
    pub identity: AccountIdentity,
    pub instance_id: Uuid,
    pub state: WatchState,
    pub has_cursor: bool,
    pub watched_paths: Vec<WatchPath>,
    pub batches_committed: u64,
    pub last_commit: Option<DateTime<Utc>>,
    pub cursor_updated_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Events
// ============================================================================

pub(crate) enum AccountEvent {
    Subscribe {
        path: WatchPath,
        observer: Arc<dyn IPathObserver>,
        reply: oneshot::Sender<Result<(), SyncError>>,
    },
    Unsubscribe {
        path: WatchPath,
        reply: oneshot::Sender<Result<(), SyncError>>,
    },
    Status {
        reply: oneshot::Sender<AccountStatus>,
    },
    PollCompleted {
        result: anyhow::Result<PollResult>,
    },
    PageFetched {
        result: anyhow::Result<DeltaPage>,
    },
    CommitFinished {
        path: WatchPath,
        dispatch_id: u64,
        outcome: Result<usize, SyncError>,
    },
}

/// Pages gathered so far in the current pull cycle
struct PendingPull {
    batch: DeltaBatch,
    cursor: Option<Cursor>,
}

/// Commits of one batch, started and still to start
struct Dispatch {
    id: u64,
    running: HashSet<WatchPath>,
    /// Held back until no overlapping path is committing
    waiting: Vec<PathBatch>,
    failure: Option<SyncError>,
}

// ============================================================================
// AccountWorker
// ============================================================================

pub(crate) struct AccountWorker {
    identity: AccountIdentity,
    instance_id: Uuid,
    feed: Arc<dyn IDeltaFeed>,
    fs: Arc<dyn ILocalFileSystem>,
    pipeline: Arc<CommitPipeline>,
    accounts: AccountMap,
    events_tx: mpsc::UnboundedSender<AccountEvent>,
    events_rx: mpsc::UnboundedReceiver<AccountEvent>,
    alive: CancellationToken,

    cursor: CursorStore,
    paths: PathTable,
    state: WatchState,
    remote_call: Option<JoinHandle<()>>,
    pending: Option<PendingPull>,
    dispatch: Option<Dispatch>,
    next_dispatch_id: u64,
    retired: Vec<JoinHandle<()>>,
    batches_committed: u64,
    last_commit: Option<DateTime<Utc>>,
    closed: bool,
}

impl AccountWorker {
    pub(crate) fn new(
        identity: AccountIdentity,
        instance_id: Uuid,
        feed: Arc<dyn IDeltaFeed>,
        fs: Arc<dyn ILocalFileSystem>,
        accounts: AccountMap,
        alive: CancellationToken,
    ) -> (Self, mpsc::UnboundedSender<AccountEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let pipeline = Arc::new(CommitPipeline::new(
            identity.clone(),
            Arc::clone(&feed),
            Arc::clone(&fs),
        ));

        let worker = Self {
            identity,
            instance_id,
            feed,
            fs,
            pipeline,
            accounts,
            events_tx: events_tx.clone(),
            events_rx,
            alive,
            cursor: CursorStore::new(),
            paths: PathTable::new(),
            state: WatchState::NoCursor,
            remote_call: None,
            pending: None,
            dispatch: None,
            next_dispatch_id: 0,
            retired: Vec::new(),
            batches_committed: 0,
            last_commit: None,
            closed: false,
        };

        (worker, events_tx)
    }

    /// Processes events until the last watched path is removed
    pub(crate) async fn run(mut self) {
        info!(instance = %self.instance_id, "Account worker started");

        while !self.closed {
            let Some(event) = self.events_rx.recv().await else {
                break;
            };
            self.handle(event).await;
        }

        info!(instance = %self.instance_id, "Account worker stopped");
    }

    async fn handle(&mut self, event: AccountEvent) {
        match event {
            AccountEvent::Subscribe {
                path,
                observer,
                reply,
            } => {
                let result = self.subscribe(path, observer);
                let accepted = result.is_ok();
                let _ = reply.send(result);
                if accepted {
                    self.watch_for_changes();
                }
            }
            AccountEvent::Unsubscribe { path, reply } => {
                let result = self.unsubscribe(path).await;
                let _ = reply.send(result);
            }
            AccountEvent::Status { reply } => {
                let _ = reply.send(self.status());
            }
            AccountEvent::PollCompleted { result } => self.on_poll_completed(result),
            AccountEvent::PageFetched { result } => self.on_page_fetched(result),
            AccountEvent::CommitFinished {
                path,
                dispatch_id,
                outcome,
            } => self.on_commit_finished(path, dispatch_id, outcome),
        }
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    fn subscribe(
        &mut self,
        path: WatchPath,
        observer: Arc<dyn IPathObserver>,
    ) -> Result<(), SyncError> {
        if self.paths.contains(&path) {
            return Err(SyncError::AlreadyWatching(path));
        }

        let (queue, worker) = spawn_commit_worker(
            Arc::clone(&self.pipeline),
            path.clone(),
            Arc::clone(&observer),
            self.events_tx.clone(),
        );
        self.paths.insert(
            path.clone(),
            WatchedPath {
                observer,
                queue,
                worker,
            },
        )?;
        info!(path = %path, "Watching path");

        if self.state == WatchState::Halted {
            self.state = if self.cursor.is_set() {
                WatchState::Idle
            } else {
                WatchState::NoCursor
            };
            info!(state = %self.state, "Re-arming halted watch loop");
        }

        Ok(())
    }

    async fn unsubscribe(&mut self, path: WatchPath) -> Result<(), SyncError> {
        let watched = self
            .paths
            .remove(&path)
            .ok_or_else(|| SyncError::NotWatching(path.clone()))?;
        info!(path = %path, "Stopped watching path");

        // Dropping the queue lets the worker finish what it holds, then exit.
        drop(watched.queue);
        self.retired.retain(|worker| !worker.is_finished());
        self.retired.push(watched.worker);

        if self.paths.is_empty() {
            return self.shutdown().await;
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), SyncError> {
        info!("Last watched path removed, closing account");

        self.alive.cancel();
        if let Some(call) = self.remote_call.take() {
            call.abort();
        }
        self.pending = None;
        self.dispatch = None;
        self.cursor.clear();
        self.state = WatchState::NoCursor;

        for worker in self.retired.drain(..) {
            if let Err(e) = worker.await {
                if e.is_panic() {
                    warn!("Commit worker panicked before shutdown");
                }
            }
        }

        let root = self.identity.root().to_path_buf();
        let wiped = match self.fs.remove(&root).await {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => {
                error!(root = %root.display(), error = %format!("{e:#}"), "Failed to wipe local mirror");
                Err(SyncError::filesystem(&root, &e))
            }
        };

        let instance_id = self.instance_id;
        self.accounts
            .remove_if(&self.identity, |_, account| account.instance_id() == instance_id);
        self.closed = true;

        wiped
    }

    fn status(&self) -> AccountStatus {
        AccountStatus {
            identity: self.identity.clone(),
            instance_id: self.instance_id,
            state: self.state,
            has_cursor: self.cursor.is_set(),
            watched_paths: self.paths.paths(),
            batches_committed: self.batches_committed,
            last_commit: self.last_commit,
            cursor_updated_at: self.cursor.updated_at(),
        }
    }

    // ------------------------------------------------------------------
    // Watch loop
    // ------------------------------------------------------------------

    fn watch_for_changes(&mut self) {
        if self.paths.is_empty() {
            return;
        }

        match self.state {
            WatchState::NoCursor => self.pull_changes(),
            WatchState::Idle => match self.cursor.current().cloned() {
                Some(cursor) => self.start_poll(cursor, Duration::ZERO),
                None => self.pull_changes(),
            },
            WatchState::Halted => debug!("Watch loop halted, waiting for a new registration"),
            state => debug!(state = %state, "Watch loop already armed"),
        }
    }

    fn start_poll(&mut self, cursor: Cursor, delay: Duration) {
        self.state = WatchState::IdleWatching;

        let feed = Arc::clone(&self.feed);
        let events = self.events_tx.clone();
        let alive = self.alive.clone();

        debug!(delay_secs = delay.as_secs(), "Scheduling long-poll");
        self.remote_call = Some(tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let result = feed.poll_for_changes(&cursor).await;
            if alive.is_cancelled() {
                return;
            }
            let _ = events.send(AccountEvent::PollCompleted { result });
        }));
    }

    fn on_poll_completed(&mut self, result: anyhow::Result<PollResult>) {
        if self.state != WatchState::IdleWatching {
            debug!(state = %self.state, "Discarding late poll result");
            return;
        }
        self.remote_call = None;

        match result {
            Ok(poll) if poll.has_changes => {
                debug!("Long-poll reported changes");
                self.pull_changes();
            }
            Ok(poll) => match self.cursor.current().cloned() {
                Some(cursor) => self.start_poll(cursor, poll.retry_after),
                None => self.pull_changes(),
            },
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Long-poll failed, pulling instead");
                self.pull_changes();
            }
        }
    }

    // ------------------------------------------------------------------
    // Delta puller
    // ------------------------------------------------------------------

    fn pull_changes(&mut self) {
        if self.state == WatchState::Pulling {
            debug!("Pull already in flight");
            return;
        }

        self.state = WatchState::Pulling;
        self.pending = Some(PendingPull {
            batch: DeltaBatch::new(),
            cursor: self.cursor.current().cloned(),
        });
        info!(full = !self.cursor.is_set(), "Pulling changes");
        self.fetch_page();
    }

    fn fetch_page(&mut self) {
        let cursor = self.pending.as_ref().and_then(|p| p.cursor.clone());
        let feed = Arc::clone(&self.feed);
        let events = self.events_tx.clone();
        let alive = self.alive.clone();

        self.remote_call = Some(tokio::spawn(async move {
            let result = feed.pull_changes(cursor.as_ref()).await;
            if alive.is_cancelled() {
                return;
            }
            let _ = events.send(AccountEvent::PageFetched { result });
        }));
    }

    fn on_page_fetched(&mut self, result: anyhow::Result<DeltaPage>) {
        if self.state != WatchState::Pulling {
            debug!(state = %self.state, "Discarding late delta page");
            return;
        }
        self.remote_call = None;

        let Some(mut pending) = self.pending.take() else {
            return;
        };

        let page = match result {
            Ok(page) => page,
            Err(e) => {
                self.halt(SyncError::transport(&e));
                return;
            }
        };

        debug!(
            entries = page.entries.len(),
            has_more = page.has_more,
            reset = page.reset,
            "Fetched delta page"
        );
        pending.cursor = Some(pending.batch.absorb(page));

        if !pending.batch.is_complete() {
            self.pending = Some(pending);
            self.fetch_page();
            return;
        }

        if let Some(cursor) = pending.cursor {
            self.cursor.commit(cursor);
        }
        self.dispatch(pending.batch);
    }

    fn halt(&mut self, error: SyncError) {
        error!(error = %error, "Transport failure, halting watch loop");
        self.state = WatchState::Halted;
        self.pending = None;

        for observer in self.paths.observers() {
            observer.on_error(&error);
        }
    }

    // ------------------------------------------------------------------
    // Dispatcher
    // ------------------------------------------------------------------

    fn dispatch(&mut self, batch: DeltaBatch) {
        let partitions = self.paths.partition(&batch);
        info!(
            entries = batch.len(),
            pages = batch.pages,
            blank_slate = batch.blank_slate,
            paths = partitions.len(),
            "Dispatching delta batch"
        );

        self.next_dispatch_id += 1;
        self.state = WatchState::Committing;
        self.dispatch = Some(Dispatch {
            id: self.next_dispatch_id,
            running: HashSet::new(),
            waiting: partitions,
            failure: None,
        });
        self.start_ready();
        self.settle_dispatch();
    }

    /// Hands every waiting batch with no overlapping commit ahead of it to
    /// its path's worker
    fn start_ready(&mut self) {
        let Some(dispatch) = self.dispatch.as_mut() else {
            return;
        };

        let mut held: Vec<PathBatch> = Vec::new();
        for batch in std::mem::take(&mut dispatch.waiting) {
            let blocked = dispatch
                .running
                .iter()
                .chain(held.iter().map(|b| &b.path))
                .any(|path| path.overlaps(&batch.path));
            if blocked {
                held.push(batch);
                continue;
            }

            let path = batch.path.clone();
            let Some(queue) = self.paths.queue(&path) else {
                continue;
            };
            let job = CommitJob {
                dispatch_id: dispatch.id,
                batch,
            };
            match queue.try_send(job) {
                Ok(()) => {
                    dispatch.running.insert(path);
                }
                Err(_) => warn!(path = %path, "Commit worker unavailable, skipping batch"),
            }
        }

        if !held.is_empty() {
            debug!(waiting = held.len(), "Holding batches behind overlapping commits");
        }
        dispatch.waiting = held;
    }

    /// Ends the dispatch once nothing is running or waiting
    fn settle_dispatch(&mut self) {
        let settled = self
            .dispatch
            .as_ref()
            .is_some_and(|d| d.running.is_empty() && d.waiting.is_empty());
        if !settled {
            return;
        }

        match self.dispatch.take().and_then(|d| d.failure) {
            Some(err) => self.halt(err),
            None => {
                self.state = WatchState::Idle;
                self.watch_for_changes();
            }
        }
    }

    fn on_commit_finished(
        &mut self,
        path: WatchPath,
        dispatch_id: u64,
        outcome: Result<usize, SyncError>,
    ) {
        if let Ok(entries) = &outcome {
            debug!(path = %path, entries = *entries, "Batch committed");
            self.batches_committed += 1;
            self.last_commit = Some(Utc::now());
        }

        let Some(dispatch) = self.dispatch.as_mut().filter(|d| d.id == dispatch_id) else {
            debug!(path = %path, dispatch_id, "Commit result for a finished dispatch");
            return;
        };

        dispatch.running.remove(&path);
        if let Err(err) = outcome {
            if err.is_transport() && dispatch.failure.is_none() {
                dispatch.failure = Some(err);
            }
        }

        self.start_ready();
        self.settle_dispatch();
    }
}
