//! Command Module
//!
//! Receives decoded request frames, resolves them into [`Command`]s and
//! executes them against the storage engine.
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  RESP Parser    │  (protocol module)
//! └────────┬────────┘
//!          │ CommandFrame
//!          ▼
//! ┌─────────────────┐
//! │ Command::parse  │  verb, arity, options
//! └────────┬────────┘
//!          │ Command
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │───> StorageEngine
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `PING [message]`, `ECHO message`
//! - `SET key value [PX ms | EX s]`, `GET key`, `DEL key [key ...]`
//! - `KEYS pattern`
//! - `CONFIG GET parameter` (`dir`, `dbfilename`)
//! - `INFO [section]`

pub mod command;
pub mod handler;

pub use command::{Command, CommandError};
pub use handler::CommandHandler;
