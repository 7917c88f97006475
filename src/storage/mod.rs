//! Keyspace Storage
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                StorageEngine                │
//! │   Mutex<HashMap<Bytes, Entry { value,       │
//! │                              expires_at }>> │
//! └─────────────────────────────────────────────┘
//!          ▲                         ▲
//!          │ get/set/keys/del        │ cleanup_expired
//!   CommandHandler            ExpirySweeper (optional)
//! ```
//!
//! - `engine`: the keyspace and its lazy-expiry rules
//! - `glob`: pattern matching for `KEYS`
//! - `expiry`: the optional background sweeper

pub mod engine;
pub mod expiry;
pub mod glob;

pub use engine::{Entry, KeyspaceInfo, StorageEngine, StorageStats};
pub use expiry::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper};
pub use glob::GlobPattern;
