//! Delta feed records
//!
//! Port-level DTOs describing what the remote delta feed reports. A pull
//! cycle fetches one or more [`DeltaPage`]s and folds them into a single
//! [`DeltaBatch`]; only a complete batch is ever handed to consumers.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{Cursor, RemotePath};

/// Descriptive metadata the feed reports for a file entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// File size in bytes, if reported
    pub size: Option<u64>,
    /// Remote revision identifier, if reported
    pub rev: Option<String>,
    /// Last modified timestamp, if reported
    pub modified: Option<DateTime<Utc>>,
}

/// What happened to the entry's path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// The path was removed remotely
    Removed,
    /// The path is (now) a file
    File(FileMetadata),
    /// The path is (now) a folder
    Folder,
    /// The feed described the path in a way we don't understand
    Unknown(String),
}

/// One change record from the delta feed. Immutable once received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaEntry {
    /// Remote path as reported by the feed
    pub path: RemotePath,
    /// Removal flag or file/folder descriptor
    pub kind: EntryKind,
}

impl DeltaEntry {
    /// Convenience constructor for a removal entry
    #[must_use]
    pub fn removed(path: RemotePath) -> Self {
        Self {
            path,
            kind: EntryKind::Removed,
        }
    }

    /// Convenience constructor for a file entry
    #[must_use]
    pub fn file(path: RemotePath, metadata: FileMetadata) -> Self {
        Self {
            path,
            kind: EntryKind::File(metadata),
        }
    }

    /// Convenience constructor for a folder entry
    #[must_use]
    pub fn folder(path: RemotePath) -> Self {
        Self {
            path,
            kind: EntryKind::Folder,
        }
    }
}

/// One page returned by a single pull call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaPage {
    /// Position after this page
    pub cursor: Cursor,
    /// Entries in feed order
    pub entries: Vec<DeltaEntry>,
    /// More pages are pending; fetch again before treating the batch as complete
    pub has_more: bool,
    /// The local mirror must be wiped and rebuilt before applying entries
    pub reset: bool,
}

/// Result of one long-poll call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollResult {
    /// The feed has changes past the polled cursor
    pub has_changes: bool,
    /// How long to wait before polling again (zero means next scheduling tick)
    pub retry_after: Duration,
}

/// Pages of one pull cycle accumulated into a single logical batch
///
/// Entries are concatenated in the order received. `blank_slate` is sticky:
/// a reset reported by any page applies to the whole batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeltaBatch {
    /// Entries across every page, in feed order
    pub entries: Vec<DeltaEntry>,
    /// The mirror must be rebuilt before any entry is applied
    pub blank_slate: bool,
    /// The most recent page said more pages are pending
    pub pull_again: bool,
    /// Number of pages folded into this batch
    pub pages: u32,
}

impl DeltaBatch {
    /// Creates an empty batch
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one page into the batch and returns the page's cursor
    pub fn absorb(&mut self, page: DeltaPage) -> Cursor {
        self.entries.extend(page.entries);
        self.blank_slate |= page.reset;
        self.pull_again = page.has_more;
        self.pages += 1;
        page.cursor
    }

    /// A batch is complete once a page has been absorbed and none are pending
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.pages > 0 && !self.pull_again
    }

    /// Number of entries in the batch
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the batch has no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
