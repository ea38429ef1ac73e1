//! Domain entities
//!
//! This module contains the core domain types for dropmirror:
//! - Validated newtypes for remote paths, watch paths, cursors and account identity
//! - Delta feed records (entries, pages, accumulated batches, poll results)
//! - Domain-specific error types

pub mod delta;
pub mod errors;
pub mod newtypes;

// Re-export commonly used types
pub use delta::{DeltaBatch, DeltaEntry, DeltaPage, EntryKind, FileMetadata, PollResult};
pub use errors::DomainError;
pub use newtypes::*;
