//! Cursor store
//!
//! Holds the account's position in the remote delta feed. Only the delta
//! puller commits a new value, and only once a pull cycle has produced a
//! complete batch.

use chrono::{DateTime, Utc};
use dropmirror_core::domain::newtypes::Cursor;
use tracing::debug;

/// Current delta feed position of one account
#[derive(Debug, Default)]
pub struct CursorStore {
    current: Option<Cursor>,
    updated_at: Option<DateTime<Utc>>,
}

impl CursorStore {
    /// Creates an empty store; the first pull will be a full pull
    pub fn new() -> Self {
        Self::default()
    }

    /// The committed cursor, if any
    pub fn current(&self) -> Option<&Cursor> {
        self.current.as_ref()
    }

    /// Whether a cursor has been committed
    pub fn is_set(&self) -> bool {
        self.current.is_some()
    }

    /// When the cursor last changed
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub(crate) fn commit(&mut self, cursor: Cursor) {
        debug!(
            previous = self.current.as_ref().map(Cursor::as_str),
            next = cursor.as_str(),
            "Committing cursor"
        );
        self.current = Some(cursor);
        self.updated_at = Some(Utc::now());
    }

    pub(crate) fn clear(&mut self) {
        self.current = None;
        self.updated_at = None;
    }
}
