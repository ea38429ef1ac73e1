//! Delta feed HTTP client
//!
//! Wraps `reqwest` with bearer authentication and the three service hosts
//! the feed is spread over:
//!
//! | Host    | Used for                         |
//! |---------|----------------------------------|
//! | api     | `POST /delta`                    |
//! | notify  | `GET /longpoll_delta` (no auth)  |
//! | content | `GET /files/auto/<path>`         |
//!
//! ## Usage
//!
//! ```rust,no_run
//! use dropmirror_remote::client::DeltaClient;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = DeltaClient::new("access-token-here");
//! let bytes = client.download_file(&"/docs/a.txt".parse()?).await?;
//! println!("{} bytes", bytes.len());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use dropmirror_core::config::RemoteConfig;
use dropmirror_core::domain::newtypes::RemotePath;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Method, RequestBuilder, Response};
use tracing::debug;
use url::Url;

use crate::RemoteError;

/// Default API host
const API_BASE_URL: &str = "https://api.dropbox.com/1";

/// Default file content host
const CONTENT_BASE_URL: &str = "https://api-content.dropbox.com/1";

/// Default long-poll host
const NOTIFY_BASE_URL: &str = "https://api-notify.dropbox.com/1";

/// Default server-side long-poll timeout
const DEFAULT_LONGPOLL_TIMEOUT: Duration = Duration::from_secs(30);

/// The notify host may hold a long-poll open past the requested timeout
const LONGPOLL_GRACE: Duration = Duration::from_secs(90);

// ============================================================================
// DeltaClient
// ============================================================================

/// HTTP client for the delta feed service
pub struct DeltaClient {
    /// The underlying HTTP client
    client: Client,
    /// Base URL for `/delta`
    api_url: String,
    /// Base URL for `/files/auto`
    content_url: String,
    /// Base URL for `/longpoll_delta`
    notify_url: String,
    /// Bearer token sent to the api and content hosts
    access_token: String,
    /// Timeout requested from the notify host
    longpoll_timeout: Duration,
}

impl DeltaClient {
    /// Creates a client for the public service hosts
    ///
    /// # Arguments
    /// * `access_token` - A valid OAuth2 bearer token
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_url: API_BASE_URL.to_string(),
            content_url: CONTENT_BASE_URL.to_string(),
            notify_url: NOTIFY_BASE_URL.to_string(),
            access_token: access_token.into(),
            longpoll_timeout: DEFAULT_LONGPOLL_TIMEOUT,
        }
    }

    /// Creates a client sending every request to one base URL (useful for testing)
    ///
    /// # Arguments
    /// * `access_token` - A valid OAuth2 bearer token
    /// * `base_url` - Base URL standing in for all three hosts
    pub fn with_base_url(access_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            client: Client::new(),
            api_url: base_url.clone(),
            content_url: base_url.clone(),
            notify_url: base_url,
            access_token: access_token.into(),
            longpoll_timeout: DEFAULT_LONGPOLL_TIMEOUT,
        }
    }

    /// Creates a client from the `remote` configuration section
    pub fn from_config(config: &RemoteConfig, access_token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            content_url: config.content_url.trim_end_matches('/').to_string(),
            notify_url: config.notify_url.trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            longpoll_timeout: Duration::from_secs(config.longpoll_timeout_secs),
        }
    }

    /// Sets the timeout requested from the notify host
    pub fn with_longpoll_timeout(mut self, timeout: Duration) -> Self {
        self.longpoll_timeout = timeout;
        self
    }

    /// Timeout requested from the notify host
    pub fn longpoll_timeout(&self) -> Duration {
        self.longpoll_timeout
    }

    /// Creates an authenticated request against the api host
    ///
    /// # Arguments
    /// * `method` - HTTP method
    /// * `path` - Path relative to the api base URL (e.g., "/delta")
    pub fn api_request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.api_url, path);
        self.client
            .request(method, &url)
            .bearer_auth(&self.access_token)
    }

    /// Creates an unauthenticated long-poll request against the notify host
    ///
    /// The request timeout covers the server-side wait plus a grace period.
    pub fn notify_request(&self, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.notify_url, path);
        self.client
            .get(&url)
            .timeout(self.longpoll_timeout + LONGPOLL_GRACE)
    }

    /// Content URL for a remote path, with each segment percent-encoded
    ///
    /// # Errors
    /// Returns an error if the configured content URL is not a valid base URL
    pub fn file_url(&self, path: &RemotePath) -> Result<Url> {
        let mut url = Url::parse(&self.content_url)
            .with_context(|| format!("Invalid content URL: {}", self.content_url))?;

        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| anyhow!("Content URL cannot be a base: {}", self.content_url))?;
            segments.pop_if_empty().extend(["files", "auto"]);
            if !path.is_root() {
                segments.extend(path.relative().split('/'));
            }
        }

        Ok(url)
    }

    /// Downloads the current content of a remote file
    ///
    /// # Arguments
    /// * `path` - Remote path of the file
    ///
    /// # Returns
    /// The file contents as a byte vector
    pub async fn download_file(&self, path: &RemotePath) -> Result<Vec<u8>> {
        let url = self.file_url(path)?;
        debug!(path = %path, "Downloading file");

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .context("Failed to send download request")?;

        let bytes = check_status(response)
            .await
            .with_context(|| format!("Download of {path} failed"))?
            .bytes()
            .await
            .context("Failed to read download response body")?;

        debug!(path = %path, bytes = bytes.len(), "Download complete");
        Ok(bytes.to_vec())
    }
}

/// Passes successful responses through and classifies the rest
pub(crate) async fn check_status(response: Response) -> std::result::Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let body = response.text().await.unwrap_or_default();

    Err(RemoteError::from_status(status, retry_after.as_deref(), body))
}
