//! dropmirror Core - Domain types, ports and configuration
//!
//! This crate holds everything the synchronization engine and its adapters
//! agree on:
//! - **Domain types** - `RemotePath`, `WatchPath`, `Cursor`, `AccountIdentity`,
//!   and the delta feed records (`DeltaEntry`, `DeltaPage`, `DeltaBatch`)
//! - **Port definitions** - Traits for adapters: `IDeltaFeed`, `ILocalFileSystem`
//! - **Configuration** - YAML-backed settings for the daemon
//!
//! # Architecture
//!
//! The domain module is pure data with validation and no I/O. Ports define
//! the trait interfaces the engine depends on; `dropmirror-remote` and the
//! filesystem adapter in `dropmirror-sync` implement them.

pub mod config;
pub mod domain;
pub mod ports;
