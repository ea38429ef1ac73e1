//! Domain error types
//!
//! This module defines error types for domain validation failures:
//! malformed remote paths, watch paths, cursors and account identities.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid remote path format
    #[error("Invalid remote path: {0}")]
    InvalidRemotePath(String),

    /// Invalid watch path (subscription) format
    #[error("Invalid watch path: {0}")]
    InvalidWatchPath(String),

    /// Invalid delta cursor
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    /// Invalid account identity (empty uid or relative root)
    #[error("Invalid account: {0}")]
    InvalidAccount(String),
}
