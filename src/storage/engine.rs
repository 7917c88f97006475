//! Keyspace Store
//!
//! The single mapping from key to [`Entry`] shared by every connection task.
//!
//! ## Design Decisions
//!
//! 1. **One lock**: the whole map sits behind one `parking_lot::Mutex`. Every
//!    operation, including the delete half of lazy expiry, happens while that
//!    lock is held, so a check-then-delete can never interleave with a write
//!    to the same key.
//! 2. **Absolute expiry**: `expires_at` is wall-clock time. Snapshot files
//!    store expiry as Unix time, and `SET ... PX` computes `now + ttl`, so both
//!    share one clock.
//! 3. **Lazy expiry**: an expired entry is logically absent. Reads delete it
//!    when they run into it; `keys` collects the expired keys it sees and
//!    removes them after the scan.
//!
//! The lock is never held across an `.await`; callers are plain synchronous
//! functions.

use crate::storage::glob::GlobPattern;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

/// A stored value with optional expiry time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub value: Bytes,
    /// When this entry stops existing (None = never expires)
    pub expires_at: Option<SystemTime>,
}

impl Entry {
    /// Creates a new entry without expiry.
    pub fn new(value: Bytes) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    /// Creates an entry expiring at an absolute time.
    pub fn with_expiry(value: Bytes, expires_at: Option<SystemTime>) -> Self {
        Self { value, expires_at }
    }

    /// Creates an entry that expires `ttl` from now.
    ///
    /// A zero `ttl` yields an entry that is already expired. A `ttl` too
    /// large for the platform clock is treated as no expiry.
    pub fn with_ttl(value: Bytes, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: SystemTime::now().checked_add(ttl),
        }
    }

    /// Checks whether this entry has expired as of `now`.
    #[inline]
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(SystemTime::now())
    }

    /// Time left before expiry, or None if the entry never expires.
    pub fn ttl(&self) -> Option<Duration> {
        self.expires_at.map(|exp| {
            exp.duration_since(SystemTime::now())
                .unwrap_or(Duration::ZERO)
        })
    }
}

/// The keyspace.
///
/// Wrap it in an `Arc` and hand a clone to every connection task.
///
/// # Example
///
/// ```
/// use snapkv::storage::StorageEngine;
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let engine = StorageEngine::new();
/// engine.set(Bytes::from("foo"), Bytes::from("bar"));
/// assert_eq!(engine.get(b"foo"), Some(Bytes::from("bar")));
///
/// engine.set_with_ttl(Bytes::from("gone"), Bytes::from("x"), Duration::ZERO);
/// assert_eq!(engine.get(b"gone"), None);
/// ```
#[derive(Debug, Default)]
pub struct StorageEngine {
    data: Mutex<HashMap<Bytes, Entry>>,

    get_count: AtomicU64,
    set_count: AtomicU64,
    del_count: AtomicU64,
    expired_count: AtomicU64,
}

impl StorageEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a key-value pair without expiry, overwriting any existing entry.
    ///
    /// Returns `true` if no live entry existed for the key.
    pub fn set(&self, key: Bytes, value: Bytes) -> bool {
        self.insert(key, Entry::new(value))
    }

    /// Sets a key-value pair that expires after `ttl`.
    pub fn set_with_ttl(&self, key: Bytes, value: Bytes, ttl: Duration) -> bool {
        self.insert(key, Entry::with_ttl(value, ttl))
    }

    /// Stores `entry` under `key`, overwriting any existing entry.
    pub fn insert(&self, key: Bytes, entry: Entry) -> bool {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        let now = SystemTime::now();
        let mut data = self.data.lock();
        match data.insert(key, entry) {
            Some(previous) => previous.is_expired_at(now),
            None => true,
        }
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or has expired; an expired
    /// entry is removed before returning.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let mut data = self.data.lock();
        self.lookup(&mut data, key, SystemTime::now())
            .map(|entry| entry.value.clone())
    }

    /// Gets the full entry for a key, applying the same expiry rule as `get`.
    pub fn get_entry(&self, key: &[u8]) -> Option<Entry> {
        let mut data = self.data.lock();
        self.lookup(&mut data, key, SystemTime::now()).cloned()
    }

    /// Checks if a key exists (and is not expired).
    pub fn exists(&self, key: &[u8]) -> bool {
        let mut data = self.data.lock();
        self.lookup(&mut data, key, SystemTime::now()).is_some()
    }

    /// Deletes a key.
    ///
    /// Returns `true` if a live entry was removed. Removing an expired entry
    /// counts as expiry, not deletion.
    pub fn delete(&self, key: &[u8]) -> bool {
        self.del_count.fetch_add(1, Ordering::Relaxed);

        let now = SystemTime::now();
        let mut data = self.data.lock();
        match data.remove(key) {
            Some(entry) if entry.is_expired_at(now) => {
                self.expired_count.fetch_add(1, Ordering::Relaxed);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Deletes several keys, returning how many live entries were removed.
    pub fn delete_many(&self, keys: &[Bytes]) -> u64 {
        keys.iter().filter(|key| self.delete(key)).count() as u64
    }

    /// Returns every non-expired key matching `pattern`.
    ///
    /// Expired entries seen during the scan are removed once the scan is
    /// done, under the same lock acquisition.
    pub fn keys(&self, pattern: &[u8]) -> Vec<Bytes> {
        let glob = GlobPattern::new(pattern);
        let match_all = glob.matches_everything();
        let now = SystemTime::now();

        let mut data = self.data.lock();
        let mut live = Vec::new();
        let mut expired = Vec::new();

        for (key, entry) in data.iter() {
            if entry.is_expired_at(now) {
                expired.push(key.clone());
            } else if match_all || glob.matches(key) {
                live.push(key.clone());
            }
        }

        for key in &expired {
            data.remove(key);
        }
        drop(data);

        if !expired.is_empty() {
            self.expired_count
                .fetch_add(expired.len() as u64, Ordering::Relaxed);
        }

        live
    }

    /// Merges entries into the keyspace, last write wins.
    ///
    /// Used once at startup with the snapshot contents. Returns the number of
    /// entries applied.
    pub fn restore<I>(&self, entries: I) -> usize
    where
        I: IntoIterator<Item = (Bytes, Entry)>,
    {
        let mut data = self.data.lock();
        let mut applied = 0;
        for (key, entry) in entries {
            data.insert(key, entry);
            applied += 1;
        }
        applied
    }

    /// Removes every expired entry. Returns how many were removed.
    ///
    /// Called by the background sweeper; reads never depend on it.
    pub fn cleanup_expired(&self) -> u64 {
        let now = SystemTime::now();
        let mut data = self.data.lock();
        let before = data.len();
        data.retain(|_, entry| !entry.is_expired_at(now));
        let removed = (before - data.len()) as u64;
        drop(data);

        if removed > 0 {
            self.expired_count.fetch_add(removed, Ordering::Relaxed);
        }
        removed
    }

    /// Number of stored entries, including expired ones not yet reclaimed.
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counts live keys, and how many of them carry an expiry.
    pub fn keyspace_info(&self) -> KeyspaceInfo {
        let now = SystemTime::now();
        let data = self.data.lock();
        let mut info = KeyspaceInfo::default();
        for entry in data.values().filter(|e| !e.is_expired_at(now)) {
            info.keys += 1;
            if entry.expires_at.is_some() {
                info.expires += 1;
            }
        }
        info
    }

    /// Returns operation counters.
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            del_ops: self.del_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }

    /// Returns the live entry for `key`, deleting it first if it has expired.
    fn lookup<'a>(
        &self,
        data: &'a mut HashMap<Bytes, Entry>,
        key: &[u8],
        now: SystemTime,
    ) -> Option<&'a Entry> {
        if data.get(key).is_some_and(|entry| entry.is_expired_at(now)) {
            data.remove(key);
            self.expired_count.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        data.get(key)
    }
}

/// Operation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub get_ops: u64,
    pub set_ops: u64,
    pub del_ops: u64,
    /// Entries reclaimed because they expired
    pub expired: u64,
}

/// Live key counts for `INFO keyspace`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyspaceInfo {
    pub keys: u64,
    pub expires: u64,
}
