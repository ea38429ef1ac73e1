//! Instance cache
//!
//! Maps each [`AccountIdentity`] (uid + local root) to its running engine,
//! so opening the same account twice yields the same cursor and the same
//! poll loop. An engine removes its own entry when its last watched path
//! is stopped.

use std::sync::{Arc, OnceLock};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use dropmirror_core::domain::newtypes::AccountIdentity;
use dropmirror_core::ports::{IDeltaFeed, ILocalFileSystem};
use tracing::{debug, info};

use crate::account::SyncAccount;
use crate::observer::IPathObserver;
use crate::SyncError;

pub(crate) type AccountMap = Arc<DashMap<AccountIdentity, SyncAccount>>;

static GLOBAL: OnceLock<AccountRegistry> = OnceLock::new();

/// Registry of running account engines
///
/// Cloning shares the underlying map.
#[derive(Clone, Default)]
pub struct AccountRegistry {
    accounts: AccountMap,
}

impl AccountRegistry {
    /// Creates an empty, independent registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry
    pub fn global() -> &'static AccountRegistry {
        GLOBAL.get_or_init(AccountRegistry::new)
    }

    /// Returns the running engine for `identity`, starting one if needed
    ///
    /// `feed` and `fs` are only used when a new engine is started. If the
    /// registered engine is still shutting down, waits for its teardown
    /// (mirror wipe included) to finish before starting the replacement.
    /// Must be called from within a tokio runtime.
    pub async fn open(
        &self,
        identity: AccountIdentity,
        feed: Arc<dyn IDeltaFeed>,
        fs: Arc<dyn ILocalFileSystem>,
    ) -> SyncAccount {
        loop {
            let closing = match self.accounts.entry(identity.clone()) {
                Entry::Occupied(existing) if !existing.get().is_closed() => {
                    debug!(account = %identity, "Reusing running account engine");
                    return existing.get().clone();
                }
                Entry::Occupied(mut stale) if stale.get().is_terminated() => {
                    let account = SyncAccount::spawn(identity, feed, fs, Arc::clone(&self.accounts));
                    info!(account = %account.identity(), instance = %account.instance_id(), "Replacing closed account engine");
                    stale.insert(account.clone());
                    return account;
                }
                Entry::Occupied(closing) => closing.get().clone(),
                Entry::Vacant(slot) => {
                    let account = SyncAccount::spawn(identity, feed, fs, Arc::clone(&self.accounts));
                    info!(account = %account.identity(), instance = %account.instance_id(), "Started account engine");
                    slot.insert(account.clone());
                    return account;
                }
            };

            debug!(account = %identity, instance = %closing.instance_id(), "Waiting for account engine teardown");
            closing.terminated().await;
        }
    }

    /// The running engine for `identity`, if any
    pub fn get(&self, identity: &AccountIdentity) -> Option<SyncAccount> {
        self.accounts
            .get(identity)
            .map(|account| account.value().clone())
            .filter(|account| !account.is_closed())
    }

    /// Whether an engine for `identity` is registered
    pub fn contains(&self, identity: &AccountIdentity) -> bool {
        self.accounts.contains_key(identity)
    }

    /// Number of registered engines
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Whether no engines are registered
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

/// Opens the account in `registry` and starts mirroring `path` in one call
///
/// # Errors
///
/// Same as [`SyncAccount::sync`].
pub async fn sync_account(
    registry: &AccountRegistry,
    identity: AccountIdentity,
    feed: Arc<dyn IDeltaFeed>,
    fs: Arc<dyn ILocalFileSystem>,
    path: Option<&str>,
    observer: Arc<dyn IPathObserver>,
) -> Result<SyncAccount, SyncError> {
    let account = registry.open(identity, feed, fs).await;
    account.sync(path, observer).await?;
    Ok(account)
}
