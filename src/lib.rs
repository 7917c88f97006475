//! # snapkv - An In-Memory Key-Value Server Bootstrapped From Snapshots
//!
//! snapkv speaks a subset of the Redis wire protocol (RESP), keeps its data
//! in memory with optional per-key expiry, and loads its initial keyspace
//! from an RDB snapshot file at startup.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                               snapkv                                │
//! │                                                                     │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐              │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │              │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │              │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘              │
//! │                            │                  │                     │
//! │                            ▼                  ▼                     │
//! │                     ┌─────────────┐    ┌──────────────────────┐     │
//! │                     │ RESP Parser │    │    StorageEngine     │     │
//! │                     └─────────────┘    │  Mutex<HashMap<..>>  │     │
//! │                                        └──────────────────────┘     │
//! │                                            ▲            ▲           │
//! │                       startup restore ─────┘            │           │
//! │                     ┌──────────────────┐     ┌──────────┴────────┐  │
//! │                     │ Snapshot Decoder │     │   ExpirySweeper   │  │
//! │                     │   (dump.rdb)     │     │ (background task) │  │
//! │                     └──────────────────┘     └───────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use snapkv::commands::CommandHandler;
//! use snapkv::config::ServerConfig;
//! use snapkv::connection::{handle_connection, ConnectionStats};
//! use snapkv::storage::StorageEngine;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Arc::new(ServerConfig::default());
//!     let storage = Arc::new(StorageEngine::new());
//!
//!     let report = snapkv::snapshot::load_file(&config.snapshot_path());
//!     storage.restore(report.entries.into_iter().map(snapkv::keyspace_entry));
//!
//!     let handler = CommandHandler::new(Arc::clone(&storage), Arc::clone(&config));
//!     let stats = Arc::new(ConnectionStats::new());
//!     let listener = TcpListener::bind(config.bind_address()).await.unwrap();
//!
//!     loop {
//!         let (stream, addr) = listener.accept().await.unwrap();
//!         tokio::spawn(handle_connection(stream, addr, handler.clone(), Arc::clone(&stats)));
//!     }
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP decoding and encoding
//! - [`storage`]: the keyspace, with lazy expiry and an optional sweeper
//! - [`snapshot`]: RDB snapshot decoding
//! - [`commands`]: command decoding and execution
//! - [`connection`]: per-client connection tasks
//! - [`config`]: command-line flags and resolved settings
//! - [`replication`]: best-effort greeting to a master
//!
//! ## Expiry
//!
//! An entry whose expiry has passed is absent to every read, and the read
//! that finds it deletes it. The background sweeper only reclaims memory for
//! keys nobody reads again; it never changes what a client sees.

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod replication;
pub mod snapshot;
pub mod storage;

pub use commands::CommandHandler;
pub use config::{Cli, ServerConfig};
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{ParseError, RespParser, RespValue};
pub use snapshot::{load_file, LoadReport, SnapshotEntry};
pub use storage::{start_expiry_sweeper, Entry, ExpiryConfig, ExpirySweeper, StorageEngine};

use bytes::Bytes;

/// The default port (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host to bind to
pub const DEFAULT_HOST: &str = "127.0.0.1";

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Converts a snapshot record into a keyspace entry for
/// [`StorageEngine::restore`].
pub fn keyspace_entry(record: SnapshotEntry) -> (Bytes, Entry) {
    (
        record.key,
        Entry::with_expiry(record.value, record.expires_at),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn test_snapshot_records_restore_into_keyspace() {
        let records = vec![
            SnapshotEntry {
                key: Bytes::from("fresh"),
                value: Bytes::from("1"),
                expires_at: None,
            },
            SnapshotEntry {
                key: Bytes::from("stale"),
                value: Bytes::from("2"),
                expires_at: Some(UNIX_EPOCH + Duration::from_secs(1)),
            },
        ];

        let storage = StorageEngine::new();
        assert_eq!(storage.restore(records.into_iter().map(keyspace_entry)), 2);

        assert_eq!(storage.get(b"fresh"), Some(Bytes::from("1")));
        assert_eq!(storage.get(b"stale"), None);
        assert_eq!(storage.keys(b"*"), vec![Bytes::from("fresh")]);
    }
}
