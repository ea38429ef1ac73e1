//! Shared helpers: a scripted delta feed and a recording observer

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dropmirror_core::domain::delta::{DeltaEntry, DeltaPage, FileMetadata, PollResult};
use dropmirror_core::domain::newtypes::{AccountIdentity, Cursor, RemotePath};
use dropmirror_core::ports::{FileSystemState, IDeltaFeed, ILocalFileSystem};
use dropmirror_sync::{
    AccountRegistry, IPathObserver, LocalFileSystemAdapter, SyncAccount, SyncError, WatchState,
};
use tempfile::TempDir;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::Instant;

// ============================================================================
// ScriptedFeed
// ============================================================================

/// In-memory delta feed answering from queued scripts
///
/// When a script runs dry the call never completes, which leaves the engine
/// parked in its current state. Gated feeds hold every pull until
/// [`release_pull`](ScriptedFeed::release_pull) is called.
pub struct ScriptedFeed {
    pulls: Mutex<VecDeque<anyhow::Result<DeltaPage>>>,
    polls: Mutex<VecDeque<anyhow::Result<PollResult>>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    pull_cursors: Mutex<Vec<Option<String>>>,
    poll_log: Mutex<Vec<(String, Instant)>>,
    pull_permits: Semaphore,
}

impl ScriptedFeed {
    fn with_permits(permits: usize) -> Arc<Self> {
        Arc::new(Self {
            pulls: Mutex::new(VecDeque::new()),
            polls: Mutex::new(VecDeque::new()),
            files: Mutex::new(HashMap::new()),
            pull_cursors: Mutex::new(Vec::new()),
            poll_log: Mutex::new(Vec::new()),
            pull_permits: Semaphore::new(permits),
        })
    }

    pub fn new() -> Arc<Self> {
        Self::with_permits(Semaphore::MAX_PERMITS)
    }

    pub fn gated() -> Arc<Self> {
        Self::with_permits(0)
    }

    pub fn release_pull(&self) {
        self.pull_permits.add_permits(1);
    }

    pub fn push_page(&self, page: DeltaPage) {
        self.pulls.lock().unwrap().push_back(Ok(page));
    }

    pub fn push_pull_error(&self, message: &str) {
        self.pulls
            .lock()
            .unwrap()
            .push_back(Err(anyhow::anyhow!(message.to_string())));
    }

    pub fn push_poll(&self, has_changes: bool, retry_after_secs: u64) {
        self.polls.lock().unwrap().push_back(Ok(PollResult {
            has_changes,
            retry_after: Duration::from_secs(retry_after_secs),
        }));
    }

    pub fn push_poll_error(&self, message: &str) {
        self.polls
            .lock()
            .unwrap()
            .push_back(Err(anyhow::anyhow!(message.to_string())));
    }

    pub fn add_file(&self, path: &str, data: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), data.to_vec());
    }

    /// Cursor passed to every pull, in call order
    pub fn pull_cursors(&self) -> Vec<Option<String>> {
        self.pull_cursors.lock().unwrap().clone()
    }

    pub fn poll_count(&self) -> usize {
        self.poll_log.lock().unwrap().len()
    }

    pub fn poll_log(&self) -> Vec<(String, Instant)> {
        self.poll_log.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl IDeltaFeed for ScriptedFeed {
    async fn poll_for_changes(&self, cursor: &Cursor) -> anyhow::Result<PollResult> {
        self.poll_log
            .lock()
            .unwrap()
            .push((cursor.as_str().to_string(), Instant::now()));

        let next = self.polls.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }

    async fn pull_changes(&self, cursor: Option<&Cursor>) -> anyhow::Result<DeltaPage> {
        self.pull_cursors
            .lock()
            .unwrap()
            .push(cursor.map(|c| c.as_str().to_string()));

        self.pull_permits.acquire().await?.forget();

        let next = self.pulls.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }

    async fn read_file(&self, path: &RemotePath) -> anyhow::Result<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(path.as_str())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("404 Not Found: {path}"))
    }
}

// ============================================================================
// Page builders
// ============================================================================

pub fn remote(path: &str) -> RemotePath {
    path.parse().unwrap()
}

pub fn file(path: &str) -> DeltaEntry {
    DeltaEntry::file(remote(path), FileMetadata::default())
}

pub fn folder(path: &str) -> DeltaEntry {
    DeltaEntry::folder(remote(path))
}

pub fn removed(path: &str) -> DeltaEntry {
    DeltaEntry::removed(remote(path))
}

pub fn page(cursor: &str, entries: Vec<DeltaEntry>) -> DeltaPage {
    DeltaPage {
        cursor: Cursor::new(cursor.to_string()).unwrap(),
        entries,
        has_more: false,
        reset: false,
    }
}

pub fn reset_page(cursor: &str, entries: Vec<DeltaEntry>) -> DeltaPage {
    DeltaPage {
        reset: true,
        ..page(cursor, entries)
    }
}

pub fn partial_page(cursor: &str, entries: Vec<DeltaEntry>) -> DeltaPage {
    DeltaPage {
        has_more: true,
        ..page(cursor, entries)
    }
}

// ============================================================================
// RecordingObserver
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Observed {
    Changes(Vec<PathBuf>),
    Error(SyncError),
}

/// Forwards every notification into a channel the test reads from
pub struct RecordingObserver {
    events: mpsc::UnboundedSender<Observed>,
}

impl RecordingObserver {
    pub fn new() -> (Arc<Self>, Recorded) {
        let (events, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { events }), Recorded { rx })
    }
}

impl IPathObserver for RecordingObserver {
    fn on_changes(&self, changed: &[PathBuf]) {
        let _ = self.events.send(Observed::Changes(changed.to_vec()));
    }

    fn on_error(&self, error: &SyncError) {
        let _ = self.events.send(Observed::Error(error.clone()));
    }
}

pub struct Recorded {
    rx: mpsc::UnboundedReceiver<Observed>,
}

impl Recorded {
    /// Next notification; panics after five seconds of silence
    pub async fn next(&mut self) -> Observed {
        tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
            .await
            .expect("timed out waiting for a notification")
            .expect("observer dropped")
    }

    pub async fn next_changes(&mut self) -> Vec<PathBuf> {
        match self.next().await {
            Observed::Changes(paths) => paths,
            other => panic!("expected changes, got {other:?}"),
        }
    }

    pub async fn next_error(&mut self) -> SyncError {
        match self.next().await {
            Observed::Error(err) => err,
            other => panic!("expected an error, got {other:?}"),
        }
    }

    /// Nothing arrives in the next `window`; a dropped observer counts as quiet
    pub async fn assert_quiet(&mut self, window: Duration) {
        if let Ok(Some(event)) = tokio::time::timeout(window, self.rx.recv()).await {
            panic!("unexpected notification: {event:?}");
        }
    }
}

// ============================================================================
// SlowWipeFs
// ============================================================================

/// Local filesystem whose next removal of `root` stalls for `delay` once armed
pub struct SlowWipeFs {
    inner: LocalFileSystemAdapter,
    root: PathBuf,
    delay: Duration,
    armed: AtomicBool,
}

impl SlowWipeFs {
    pub fn new(root: &Path, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: LocalFileSystemAdapter::new(),
            root: root.to_path_buf(),
            delay,
            armed: AtomicBool::new(false),
        })
    }

    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl ILocalFileSystem for SlowWipeFs {
    async fn remove(&self, path: &Path) -> anyhow::Result<()> {
        if path == self.root && self.armed.swap(false, Ordering::SeqCst) {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.remove(path).await
    }

    async fn mkdirs(&self, path: &Path) -> anyhow::Result<()> {
        self.inner.mkdirs(path).await
    }

    async fn stat(&self, path: &Path) -> anyhow::Result<FileSystemState> {
        self.inner.stat(path).await
    }

    async fn write_file(&self, path: &Path, data: &[u8]) -> anyhow::Result<()> {
        self.inner.write_file(path, data).await
    }
}

// ============================================================================
// Account fixtures
// ============================================================================

/// A temp directory whose `mirror` subdirectory is the account root
pub struct Fixture {
    pub dir: TempDir,
    pub registry: AccountRegistry,
    pub identity: AccountIdentity,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let identity = AccountIdentity::new("uid-1", dir.path().join("mirror")).unwrap();
        Self {
            dir,
            registry: AccountRegistry::new(),
            identity,
        }
    }

    pub fn root(&self) -> &Path {
        self.identity.root()
    }

    pub fn local(&self, relative: &str) -> PathBuf {
        self.root().join(relative)
    }

    pub async fn open(&self, feed: &Arc<ScriptedFeed>) -> SyncAccount {
        self.open_with(feed, Arc::new(LocalFileSystemAdapter::new())).await
    }

    pub async fn open_with(
        &self,
        feed: &Arc<ScriptedFeed>,
        fs: Arc<dyn ILocalFileSystem>,
    ) -> SyncAccount {
        self.registry
            .open(self.identity.clone(), Arc::clone(feed) as Arc<dyn IDeltaFeed>, fs)
            .await
    }
}

/// Polls `status()` until the account reaches `state`
pub async fn wait_for_state(account: &SyncAccount, state: WatchState) {
    for _ in 0..500 {
        if account.status().await.unwrap().state == state {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("account never reached {state}");
}

/// Waits until the feed has seen `count` polls
pub async fn wait_for_polls(feed: &ScriptedFeed, count: usize) {
    for _ in 0..500 {
        if feed.poll_count() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("feed never saw {count} polls");
}
