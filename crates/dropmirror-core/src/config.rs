//! Configuration module for dropmirror.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::newtypes::WatchPath;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for dropmirror.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub account: AccountConfig,
    pub remote: RemoteConfig,
    pub logging: LoggingConfig,
}

/// The account to mirror and where to put it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Remote account uid (part of the engine's identity).
    pub uid: String,
    /// Root directory of the local mirror. A leading `~` is expanded.
    pub root: PathBuf,
    /// Remote sub-paths to watch. Empty means the whole account.
    pub paths: Vec<String>,
}

/// Delta feed endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL for metadata calls (`/delta`).
    pub api_url: String,
    /// Base URL for file content downloads.
    pub content_url: String,
    /// Base URL for long-poll notifications.
    pub notify_url: String,
    /// Server-side long-poll timeout in seconds.
    pub longpoll_timeout_secs: u64,
    /// Name of the environment variable holding the bearer token.
    pub access_token_env: String,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/dropmirror/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("dropmirror")
            .join("config.yaml")
    }
}

impl AccountConfig {
    /// The mirror root with a leading `~` replaced by the home directory.
    pub fn expanded_root(&self) -> PathBuf {
        match self.root.strip_prefix("~") {
            Ok(rest) => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("/"))
                .join(rest),
            Err(_) => self.root.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            uid: String::new(),
            root: PathBuf::from("~/Dropmirror"),
            paths: Vec::new(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.dropbox.com/1".to_string(),
            content_url: "https://api-content.dropbox.com/1".to_string(),
            notify_url: "https://api-notify.dropbox.com/1".to_string(),
            longpoll_timeout_secs: 30,
            access_token_env: "DROPMIRROR_ACCESS_TOKEN".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"remote.api_url"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Range the long-poll endpoint accepts for its `timeout` parameter.
const LONGPOLL_TIMEOUT_RANGE: std::ops::RangeInclusive<u64> = 30..=480;

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- account ---
        if self.account.uid.trim().is_empty() {
            errors.push(ValidationError {
                field: "account.uid".into(),
                message: "must not be empty".into(),
            });
        }
        if !self.account.expanded_root().is_absolute() {
            errors.push(ValidationError {
                field: "account.root".into(),
                message: format!("must be absolute: {}", self.account.root.display()),
            });
        }
        for (i, path) in self.account.paths.iter().enumerate() {
            if let Err(e) = WatchPath::parse(Some(path)) {
                errors.push(ValidationError {
                    field: format!("account.paths[{i}]"),
                    message: e.to_string(),
                });
            }
        }

        // --- remote ---
        for (field, url) in [
            ("remote.api_url", &self.remote.api_url),
            ("remote.content_url", &self.remote.content_url),
            ("remote.notify_url", &self.remote.notify_url),
        ] {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                errors.push(ValidationError {
                    field: field.into(),
                    message: format!("not an http(s) URL: '{url}'"),
                });
            }
        }
        if !LONGPOLL_TIMEOUT_RANGE.contains(&self.remote.longpoll_timeout_secs) {
            errors.push(ValidationError {
                field: "remote.longpoll_timeout_secs".into(),
                message: format!(
                    "must be in range {}..={}",
                    LONGPOLL_TIMEOUT_RANGE.start(),
                    LONGPOLL_TIMEOUT_RANGE.end()
                ),
            });
        }
        if self.remote.access_token_env.trim().is_empty() {
            errors.push(ValidationError {
                field: "remote.access_token_env".into(),
                message: "must not be empty".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use dropmirror_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .account_uid("12345")
///     .account_root(PathBuf::from("/home/user/Dropmirror"))
///     .watch_path("/photos")
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- account ---

    pub fn account_uid(mut self, uid: impl Into<String>) -> Self {
        self.config.account.uid = uid.into();
        self
    }

    pub fn account_root(mut self, root: PathBuf) -> Self {
        self.config.account.root = root;
        self
    }

    pub fn watch_path(mut self, path: impl Into<String>) -> Self {
        self.config.account.paths.push(path.into());
        self
    }

    // --- remote ---

    pub fn remote_api_url(mut self, url: impl Into<String>) -> Self {
        self.config.remote.api_url = url.into();
        self
    }

    pub fn remote_content_url(mut self, url: impl Into<String>) -> Self {
        self.config.remote.content_url = url.into();
        self
    }

    pub fn remote_notify_url(mut self, url: impl Into<String>) -> Self {
        self.config.remote.notify_url = url.into();
        self
    }

    pub fn remote_longpoll_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.remote.longpoll_timeout_secs = seconds;
        self
    }

    pub fn remote_access_token_env(mut self, name: impl Into<String>) -> Self {
        self.config.remote.access_token_env = name.into();
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
