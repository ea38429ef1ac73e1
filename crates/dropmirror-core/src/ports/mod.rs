//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are the interfaces the synchronization engine depends on, whose
//! implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IDeltaFeed`] - Remote cursor-based delta feed (poll, pull, read file)
//! - [`ILocalFileSystem`] - Local filesystem primitives used by commits

pub mod delta_feed;
pub mod local_filesystem;

pub use delta_feed::IDeltaFeed;
pub use local_filesystem::{is_not_found, FileSystemState, ILocalFileSystem};
