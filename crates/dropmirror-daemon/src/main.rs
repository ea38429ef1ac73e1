//! dropmirror Daemon - keeps a local directory mirrored from a remote delta feed
//!
//! This binary runs as a user service and handles:
//! - Loading and validating the YAML configuration
//! - Opening one account in the process-wide registry
//! - Registering every configured watch path and logging change notifications
//! - Graceful shutdown on SIGTERM/SIGINT
//!
//! # Architecture
//!
//! All mirroring happens on the account's own tasks. The daemon only
//! registers paths, then parks on a `CancellationToken` that is triggered on
//! receipt of SIGTERM or SIGINT. Shutdown unregisters every path, which
//! tears the account down and removes the local mirror.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dropmirror_core::config::Config;
use dropmirror_core::domain::newtypes::AccountIdentity;
use dropmirror_remote::{client::DeltaClient, provider::DeltaFeedProvider};
use dropmirror_sync::{AccountRegistry, LocalFileSystemAdapter, SyncAccount};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "dropmirrord", version, about = "Mirror a remote delta feed to a local directory")]
struct Args {
    /// Use alternate config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

// ============================================================================
// DaemonService
// ============================================================================

/// Owns the configuration and the shutdown token
struct DaemonService {
    config: Config,
    shutdown: CancellationToken,
}

impl DaemonService {
    fn new(config: Config, shutdown: CancellationToken) -> Self {
        Self { config, shutdown }
    }

    /// Registers every configured path, then waits for shutdown
    async fn run(&self) -> Result<()> {
        let token_env = &self.config.remote.access_token_env;
        let access_token = std::env::var(token_env)
            .with_context(|| format!("Access token not found in ${token_env}"))?;

        let client = DeltaClient::from_config(&self.config.remote, access_token);
        let feed = Arc::new(DeltaFeedProvider::new(client));

        let identity = AccountIdentity::new(
            self.config.account.uid.clone(),
            self.config.account.expanded_root(),
        )
        .context("Invalid account configuration")?;

        info!(account = %identity, "Opening account");
        let account = AccountRegistry::global()
            .open(identity, feed, Arc::new(LocalFileSystemAdapter::new()))
            .await;

        let paths = watch_paths(&self.config);
        for path in &paths {
            let label = path.clone().unwrap_or_else(|| "/".to_string());
            let error_label = label.clone();
            let watched = account
                .sync_with(
                    path.as_deref(),
                    move |err| warn!(path = %error_label, error = %err, "Mirror error"),
                    move |changed| info!(path = %label, changed = changed.len(), "Mirror updated"),
                )
                .await
                .with_context(|| format!("Failed to watch {}", path.as_deref().unwrap_or("/")))?;
            info!(path = %watched, "Watching");
        }

        self.shutdown.cancelled().await;
        self.stop(&account, &paths).await;
        Ok(())
    }

    /// Unregisters every path; the last one tears the account down
    async fn stop(&self, account: &SyncAccount, paths: &[Option<String>]) {
        match account.status().await {
            Ok(status) => info!(
                state = %status.state,
                batches = status.batches_committed,
                cursor_updated_at = ?status.cursor_updated_at,
                "Stopping account"
            ),
            Err(e) => warn!(error = %e, "Account status unavailable"),
        }

        for path in paths {
            if let Err(e) = account.stop_sync(path.as_deref()).await {
                error!(path = ?path, error = %e, "Failed to stop watching");
            }
        }
    }
}

/// Configured paths, or the account root when none are listed
fn watch_paths(config: &Config) -> Vec<Option<String>> {
    if config.account.paths.is_empty() {
        vec![None]
    } else {
        config.account.paths.iter().cloned().map(Some).collect()
    }
}

/// Loads the config from `--config` if given, else from the default location
fn load_config(args: &Args) -> Result<Config> {
    match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(Config::load_or_default(&Config::default_path())),
    }
}

// ============================================================================
// Graceful shutdown signal handler
// ============================================================================

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

// ============================================================================
// Main entry point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();

    info!("dropmirror daemon starting (dropmirrord)");

    let problems = config.validate();
    if !problems.is_empty() {
        for problem in &problems {
            error!(%problem, "Invalid configuration");
        }
        anyhow::bail!("Configuration has {} error(s)", problems.len());
    }

    let shutdown_token = CancellationToken::new();

    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    let service = DaemonService::new(config, shutdown_token);
    let result = service.run().await;

    match &result {
        Ok(()) => info!("dropmirror daemon shut down gracefully"),
        Err(e) => error!(error = %e, "dropmirror daemon exiting with error"),
    }

    result
}

// ============================================================================
// Tests
// ============================================================================
