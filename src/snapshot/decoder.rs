//! Snapshot Section Parser
//!
//! Walks the opcode-tagged sections of an RDB file:
//!
//! ```text
//! "REDIS" <4-byte version>
//! { 0xFA <string name> <string value> }                    auxiliary field
//! { 0xFE <size db> [0xFB <size keys> <size expires>]       database section
//!   { [0xFC <u64 LE ms> | 0xFD <u32 LE secs>]
//!     <type> <string key> <value> } }                      key records
//! 0xFF <8-byte checksum>
//! ```
//!
//! Decoding is a pure function over the file bytes. A failure part-way
//! through still hands back every entry decoded before it, so the caller can
//! decide what to do with a partial load.

use crate::snapshot::reader::SnapshotReader;
use crate::snapshot::SnapshotEntry;
use bytes::Bytes;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, trace, warn};

pub const MAGIC: &[u8] = b"REDIS";

pub const OPCODE_AUX: u8 = 0xFA;
pub const OPCODE_RESIZE_DB: u8 = 0xFB;
pub const OPCODE_EXPIRE_TIME_MS: u8 = 0xFC;
pub const OPCODE_EXPIRE_TIME: u8 = 0xFD;
pub const OPCODE_SELECT_DB: u8 = 0xFE;
pub const OPCODE_EOF: u8 = 0xFF;

/// The only value type this decoder understands.
pub const TYPE_STRING: u8 = 0;

/// Errors that stop a snapshot from decoding.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("snapshot file is empty")]
    Empty,

    #[error("not a snapshot file (bad magic)")]
    BadMagic,

    #[error("unexpected end of file at offset {offset} (needed {needed} more bytes)")]
    UnexpectedEof { offset: usize, needed: usize },

    #[error("unexpected special encoding {encoding} at offset {offset}")]
    UnexpectedEncoding { offset: usize, encoding: u8 },

    #[error("unsupported value type {tag} at offset {offset}")]
    UnsupportedValueType { tag: u8, offset: usize },
}

/// A decode that stopped early, with everything decoded up to that point.
#[derive(Debug, Error)]
#[error("snapshot decoding aborted after {} entries: {}", .entries.len(), .error)]
pub struct DecodeFailure {
    pub entries: Vec<SnapshotEntry>,
    pub error: SnapshotError,
}

/// A fully decoded snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// The 4-character version after the magic, e.g. `"0011"`
    pub version: String,
    /// Auxiliary fields in file order
    pub metadata: Vec<(String, String)>,
    pub entries: Vec<SnapshotEntry>,
    /// Stored checksum; never verified
    pub checksum: u64,
}

/// Decodes a snapshot held in memory.
pub fn decode(bytes: &[u8]) -> Result<Snapshot, DecodeFailure> {
    let mut decoder = Decoder {
        reader: SnapshotReader::new(bytes),
        snapshot: Snapshot::default(),
        section: None,
    };

    match decoder.run() {
        Ok(()) => Ok(decoder.snapshot),
        Err(error) => Err(DecodeFailure {
            entries: decoder.snapshot.entries,
            error,
        }),
    }
}

/// Bookkeeping for the current `SELECT_DB` section.
#[derive(Debug)]
struct DbSection {
    index: usize,
    declared_keys: Option<usize>,
    declared_expires: Option<usize>,
    keys: usize,
    expires: usize,
}

struct Decoder<'a> {
    reader: SnapshotReader<'a>,
    snapshot: Snapshot,
    section: Option<DbSection>,
}

impl Decoder<'_> {
    fn run(&mut self) -> Result<(), SnapshotError> {
        if self.reader.remaining() == 0 {
            return Err(SnapshotError::Empty);
        }
        match self.reader.take(MAGIC.len()) {
            Ok(magic) if magic == MAGIC => {}
            _ => return Err(SnapshotError::BadMagic),
        }
        self.snapshot.version = String::from_utf8_lossy(self.reader.take(4)?).into_owned();
        debug!(version = %self.snapshot.version, "Snapshot header");

        loop {
            let offset = self.reader.position();
            match self.reader.read_u8()? {
                OPCODE_AUX => {
                    let name = self.reader.read_string()?;
                    let value = self.reader.read_string()?;
                    let field = (lossy(&name), lossy(&value));
                    trace!(name = %field.0, value = %field.1, "Auxiliary field");
                    self.snapshot.metadata.push(field);
                }
                OPCODE_SELECT_DB => {
                    self.finish_section();
                    let index = self.reader.read_size()?;
                    trace!(db = index, "Database section");
                    self.section = Some(DbSection {
                        index,
                        declared_keys: None,
                        declared_expires: None,
                        keys: 0,
                        expires: 0,
                    });
                }
                OPCODE_RESIZE_DB => {
                    let keys = self.reader.read_size()?;
                    let expires = self.reader.read_size()?;
                    if let Some(section) = self.section.as_mut() {
                        section.declared_keys = Some(keys);
                        section.declared_expires = Some(expires);
                    }
                }
                OPCODE_EXPIRE_TIME_MS => {
                    let millis = self.reader.read_u64_le()?;
                    let expires_at = UNIX_EPOCH.checked_add(Duration::from_millis(millis));
                    let offset = self.reader.position();
                    let tag = self.reader.read_u8()?;
                    self.read_record(tag, offset, expires_at)?;
                }
                OPCODE_EXPIRE_TIME => {
                    let secs = self.reader.read_u32_le()?;
                    let expires_at = UNIX_EPOCH.checked_add(Duration::from_secs(secs as u64));
                    let offset = self.reader.position();
                    let tag = self.reader.read_u8()?;
                    self.read_record(tag, offset, expires_at)?;
                }
                OPCODE_EOF => {
                    self.finish_section();
                    self.snapshot.checksum = self.reader.read_u64_le()?;
                    if self.reader.remaining() > 0 {
                        debug!(
                            trailing = self.reader.remaining(),
                            "Ignoring bytes after snapshot checksum"
                        );
                    }
                    return Ok(());
                }
                tag => self.read_record(tag, offset, None)?,
            }
        }
    }

    /// Reads one key record whose value-type tag has already been consumed.
    fn read_record(
        &mut self,
        tag: u8,
        offset: usize,
        expires_at: Option<SystemTime>,
    ) -> Result<(), SnapshotError> {
        if tag != TYPE_STRING {
            return Err(SnapshotError::UnsupportedValueType { tag, offset });
        }

        let key = self.reader.read_string()?;
        let value = self.reader.read_string()?;

        if let Some(section) = self.section.as_mut() {
            section.keys += 1;
            if expires_at.is_some() {
                section.expires += 1;
            }
        }

        self.snapshot.entries.push(SnapshotEntry {
            key,
            value,
            expires_at,
        });
        Ok(())
    }

    /// Closes the current database section, reporting count mismatches.
    fn finish_section(&mut self) {
        let Some(section) = self.section.take() else {
            return;
        };

        let keys_match = section.declared_keys.map_or(true, |n| n == section.keys);
        let expires_match = section
            .declared_expires
            .map_or(true, |n| n == section.expires);

        if keys_match && expires_match {
            trace!(db = section.index, keys = section.keys, "Database section done");
        } else {
            warn!(
                db = section.index,
                declared_keys = ?section.declared_keys,
                keys = section.keys,
                declared_expires = ?section.declared_expires,
                expires = section.expires,
                "Snapshot key counts differ from the records found"
            );
        }
    }
}

fn lossy(bytes: &Bytes) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
