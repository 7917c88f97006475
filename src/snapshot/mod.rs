//! Snapshot Loading
//!
//! Reads `dir/dbfilename` once at startup and turns it into
//! [`SnapshotEntry`] records for the keyspace.
//!
//! - `reader`: size and string encodings
//! - `decoder`: the opcode-driven section parser
//!
//! Loading never fails outright. A missing, unreadable or malformed file
//! yields a [`LoadReport`] whose `entries` hold whatever could be decoded
//! (often nothing) and whose `outcome` says what went wrong.

pub mod decoder;
pub mod reader;

pub use decoder::{decode, DecodeFailure, Snapshot, SnapshotError};
pub use reader::SnapshotReader;

use bytes::Bytes;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// One key record from a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub key: Bytes,
    pub value: Bytes,
    pub expires_at: Option<SystemTime>,
}

/// How a load attempt ended.
#[derive(Debug)]
pub enum LoadOutcome {
    /// The whole file decoded
    Loaded,
    /// No file at the path
    Missing,
    /// The file exists but could not be read
    Unreadable(io::Error),
    /// Decoding stopped part-way; entries decoded before the error are kept
    Aborted(SnapshotError),
}

/// Result of [`load_file`].
#[derive(Debug)]
pub struct LoadReport {
    pub path: PathBuf,
    pub entries: Vec<SnapshotEntry>,
    pub outcome: LoadOutcome,
}

impl LoadReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, LoadOutcome::Loaded | LoadOutcome::Missing)
    }

    /// Logs the outcome once: `info!` on success, `warn!` otherwise.
    pub fn log(&self) {
        let path = self.path.display();
        match &self.outcome {
            LoadOutcome::Loaded => {
                info!(path = %path, entries = self.entries.len(), "Snapshot loaded");
            }
            LoadOutcome::Missing => {
                info!(path = %path, "No snapshot file, starting with an empty keyspace");
            }
            LoadOutcome::Unreadable(e) => {
                warn!(path = %path, error = %e, "Snapshot file unreadable, starting with an empty keyspace");
            }
            LoadOutcome::Aborted(e) => {
                warn!(
                    path = %path,
                    loaded = self.entries.len(),
                    error = %e,
                    "Snapshot load aborted, keeping entries decoded so far"
                );
            }
        }
    }
}

/// Reads and decodes the snapshot at `path`.
pub fn load_file(path: &Path) -> LoadReport {
    let report = |entries, outcome| LoadReport {
        path: path.to_path_buf(),
        entries,
        outcome,
    };

    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return report(Vec::new(), LoadOutcome::Missing);
        }
        Err(e) => return report(Vec::new(), LoadOutcome::Unreadable(e)),
    };

    match decode(&bytes) {
        Ok(snapshot) => {
            debug!(
                version = %snapshot.version,
                aux_fields = snapshot.metadata.len(),
                checksum = snapshot.checksum,
                "Snapshot decoded"
            );
            report(snapshot.entries, LoadOutcome::Loaded)
        }
        Err(failure) => report(failure.entries, LoadOutcome::Aborted(failure.error)),
    }
}
