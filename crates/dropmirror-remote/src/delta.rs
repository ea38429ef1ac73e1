//! Cursor-based delta pulls and long-polling
//!
//! ## Pull cycle
//!
//! 1. **First pull**: call [`pull_page`] with `cursor = None` to enumerate everything
//! 2. **Follow pages**: while the returned page has `has_more`, pull again with its cursor
//! 3. **Wait**: call [`longpoll`] with the last cursor; it returns once changes exist
//!    or the server-side timeout elapses
//!
//! Unlike a link-following API, each page is a separate call so the caller
//! decides when a batch is complete.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use dropmirror_remote::client::DeltaClient;
//! use dropmirror_remote::delta;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = DeltaClient::new("access-token");
//!
//! let page = delta::pull_page(&client, None).await?;
//! println!("Got {} entries, more pending: {}", page.entries.len(), page.has_more);
//!
//! let poll = delta::longpoll(&client, &page.cursor).await?;
//! println!("Changes: {}", poll.has_changes);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, warn};

use dropmirror_core::domain::delta::{DeltaEntry, DeltaPage, EntryKind, FileMetadata, PollResult};
use dropmirror_core::domain::newtypes::{Cursor, RemotePath};

use crate::client::{check_status, DeltaClient};
use crate::RemoteError;

/// Path for the delta endpoint relative to the api base URL
const DELTA_PATH: &str = "/delta";

/// Path for the long-poll endpoint relative to the notify base URL
const LONGPOLL_PATH: &str = "/longpoll_delta";

// ============================================================================
// Wire types (JSON deserialization)
// ============================================================================

/// Raw response from `POST /delta`
#[derive(Debug, Deserialize)]
struct WireDeltaResponse {
    /// `[path, metadata]` pairs in feed order
    #[serde(default)]
    entries: Vec<WireEntry>,

    /// The client must wipe its state before applying `entries`
    #[serde(default)]
    reset: bool,

    /// Cursor to pass on the next call
    cursor: String,

    /// More entries are available right away
    #[serde(default)]
    has_more: bool,
}

/// One `[lowercased_path, metadata]` pair; `null` metadata means removed
#[derive(Debug, Deserialize)]
struct WireEntry(String, Option<WireMetadata>);

/// Metadata attached to a delta entry
#[derive(Debug, Deserialize)]
struct WireMetadata {
    /// Absent on malformed or unsupported records
    is_dir: Option<bool>,

    /// Size in bytes
    bytes: Option<u64>,

    /// Revision identifier
    rev: Option<String>,

    /// RFC 2822 timestamp, e.g. "Sat, 21 Aug 2010 22:31:20 +0000"
    modified: Option<String>,

    /// Set on tombstones when deleted entries are included
    #[serde(default)]
    is_deleted: bool,
}

/// Raw response from `GET /longpoll_delta`
#[derive(Debug, Deserialize)]
struct WireLongpollResponse {
    changes: bool,

    /// Seconds to wait before polling again
    backoff: Option<u64>,
}

// ============================================================================
// DeltaParser
// ============================================================================

/// Converts wire responses into port-level [`DeltaPage`] and [`PollResult`] values
pub struct DeltaParser;

impl DeltaParser {
    /// Parses one entry
    ///
    /// The key path is used rather than `metadata.path` so that removals
    /// (which carry no metadata) and updates address the same path.
    fn parse_entry(entry: WireEntry) -> std::result::Result<DeltaEntry, RemoteError> {
        let WireEntry(raw_path, metadata) = entry;
        let path = RemotePath::new(raw_path.clone())
            .map_err(|e| RemoteError::InvalidResponse(format!("entry path {raw_path:?}: {e}")))?;

        let kind = match metadata {
            None => EntryKind::Removed,
            Some(meta) if meta.is_deleted => EntryKind::Removed,
            Some(WireMetadata { is_dir: None, .. }) => {
                EntryKind::Unknown("metadata without is_dir".to_string())
            }
            Some(WireMetadata {
                is_dir: Some(true), ..
            }) => EntryKind::Folder,
            Some(meta) => EntryKind::File(FileMetadata {
                size: meta.bytes,
                rev: meta.rev,
                modified: meta.modified.as_deref().and_then(Self::parse_modified),
            }),
        };

        Ok(DeltaEntry { path, kind })
    }

    /// Parses an RFC 2822 timestamp, dropping values that don't parse
    fn parse_modified(raw: &str) -> Option<DateTime<Utc>> {
        match DateTime::parse_from_rfc2822(raw) {
            Ok(dt) => Some(dt.with_timezone(&Utc)),
            Err(e) => {
                warn!(value = raw, error = %e, "Ignoring unparseable modified timestamp");
                None
            }
        }
    }

    /// Parses a full delta response into a page
    fn parse_response(response: WireDeltaResponse) -> std::result::Result<DeltaPage, RemoteError> {
        let cursor = Cursor::new(response.cursor)
            .map_err(|e| RemoteError::InvalidResponse(format!("cursor: {e}")))?;
        let entries = response
            .entries
            .into_iter()
            .map(Self::parse_entry)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(DeltaPage {
            cursor,
            entries,
            has_more: response.has_more,
            reset: response.reset,
        })
    }

    fn parse_longpoll(response: WireLongpollResponse) -> PollResult {
        PollResult {
            has_changes: response.changes,
            retry_after: Duration::from_secs(response.backoff.unwrap_or(0)),
        }
    }
}

// ============================================================================
// Delta and long-poll calls
// ============================================================================

/// Fetches one page of changes past `cursor`
///
/// # Arguments
///
/// * `client` - A reference to the authenticated [`DeltaClient`]
/// * `cursor` - Cursor from the previous page or cycle. `None` enumerates everything.
///
/// # Errors
///
/// Returns an error if:
/// - The HTTP request fails
/// - The API returns a non-success status (classified as [`RemoteError`])
/// - The response is not a valid delta page
pub async fn pull_page(client: &DeltaClient, cursor: Option<&Cursor>) -> Result<DeltaPage> {
    let mut form: Vec<(&str, &str)> = Vec::new();
    if let Some(c) = cursor {
        form.push(("cursor", c.as_str()));
    }

    debug!(has_cursor = cursor.is_some(), "Requesting delta page");

    let response = client
        .api_request(Method::POST, DELTA_PATH)
        .form(&form)
        .send()
        .await
        .context("Failed to send delta request")?;

    let raw: WireDeltaResponse = check_status(response)
        .await
        .context("Delta request returned error status")?
        .json()
        .await
        .context("Failed to parse delta response JSON")?;

    let page = DeltaParser::parse_response(raw).context("Malformed delta response")?;

    debug!(
        entries = page.entries.len(),
        has_more = page.has_more,
        reset = page.reset,
        "Received delta page"
    );

    Ok(page)
}

/// Blocks until changes exist past `cursor` or the server-side timeout elapses
///
/// A throttled long-poll is reported as "no changes" with the requested
/// delay, so the caller simply waits and polls again.
///
/// # Errors
///
/// Returns an error if the request fails for any other reason or the
/// response cannot be parsed.
pub async fn longpoll(client: &DeltaClient, cursor: &Cursor) -> Result<PollResult> {
    let timeout = client.longpoll_timeout().as_secs().to_string();

    let response = client
        .notify_request(LONGPOLL_PATH)
        .query(&[("cursor", cursor.as_str()), ("timeout", timeout.as_str())])
        .send()
        .await
        .context("Failed to send long-poll request")?;

    let response = match check_status(response).await {
        Ok(response) => response,
        Err(RemoteError::TooManyRequests { retry_after }) => {
            warn!(retry_after_secs = retry_after.as_secs(), "Long-poll throttled");
            return Ok(PollResult {
                has_changes: false,
                retry_after,
            });
        }
        Err(e) => return Err(e).context("Long-poll request returned error status"),
    };

    let raw: WireLongpollResponse = response
        .json()
        .await
        .context("Failed to parse long-poll response JSON")?;

    let result = DeltaParser::parse_longpoll(raw);
    debug!(
        has_changes = result.has_changes,
        backoff_secs = result.retry_after.as_secs(),
        "Long-poll returned"
    );

    Ok(result)
}

// ============================================================================
// Tests
// ============================================================================
