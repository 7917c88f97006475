//! Connection Handler Module
//!
//! Each accepted client is served by its own async task.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener (main.rs)                  │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │ accept() + spawn
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ Read bytes  │───>│ Parse RESP  │───>│ Execute cmd │      │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘      │
//! │         ▲                                     │             │
//! │         └────────── flush replies <───────────┘             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **Pipelining**: every complete command in a read is executed in order,
//!   and their replies leave in a single flush
//! - **Protocol errors**: the client gets `-ERR Protocol error: ...` and the
//!   connection is closed; other connections are unaffected
//! - **Statistics**: [`ConnectionStats`] counts connections, commands and bytes

pub mod handler;

pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};
