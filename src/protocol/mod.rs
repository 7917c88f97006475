//! RESP Protocol Codec
//!
//! Decodes inbound requests and encodes outbound replies.
//!
//! ## Modules
//!
//! - `types`: the `RespValue` reply enum and its encoder
//! - `parser`: the incremental request/reply decoder
//!
//! ## Example
//!
//! ```
//! use snapkv::protocol::{parse_command, RespValue};
//!
//! let (args, consumed) = parse_command(b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n")
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(consumed, 22);
//! assert_eq!(&args[0][..], b"GET");
//!
//! let reply = RespValue::bulk_string("bar");
//! assert_eq!(reply.serialize(), b"$3\r\nbar\r\n");
//! ```

pub mod parser;
pub mod types;

pub use parser::{parse_command, parse_reply, CommandFrame, ParseError, ParseResult, RespParser};
pub use types::RespValue;
