//! Incremental RESP Decoder
//!
//! Two entry points share the same framing rules:
//!
//! - [`RespParser::parse_command`] decodes client requests. A request must be
//!   an array (`*<n>\r\n`) of `n` bulk strings (`$<len>\r\n<bytes>\r\n`);
//!   anything else is a [`ParseError`].
//! - [`RespParser::parse_reply`] decodes any reply value. The replica greeting
//!   uses it to read what the master answers.
//!
//! Both are pure functions of the buffer and return:
//! - `Ok(Some((value, consumed)))` - a complete value, `consumed` bytes used
//! - `Ok(None)` - the buffer holds a valid prefix, more bytes are needed
//! - `Err(ParseError)` - the bytes can never become a valid value
//!
//! Because nothing is remembered between calls, the caller can keep appending
//! socket reads to one buffer and retry. A message split at any byte boundary
//! decodes to exactly what the unsplit message decodes to.

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use std::num::ParseIntError;
use thiserror::Error;

/// The arguments of one request, verb first.
pub type CommandFrame = Vec<Bytes>;

/// Errors that can occur during RESP parsing.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// A request did not start with the array prefix
    #[error("expected '*', got {0:#04x}")]
    ExpectedArray(u8),

    /// A request element was not a bulk string
    #[error("expected '$', got {0:#04x}")]
    ExpectedBulkString(u8),

    /// Unknown type prefix byte in a reply
    #[error("unknown type prefix: {0:#04x}")]
    UnknownPrefix(u8),

    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    #[error("invalid bulk length: {0}")]
    InvalidBulkLength(i64),

    #[error("invalid multibulk length: {0}")]
    InvalidArrayLength(i64),

    /// `*0\r\n` carries no verb
    #[error("empty command")]
    EmptyCommand,

    /// The bytes after the declared payload were not CRLF
    #[error("bulk string payload does not match declared length {declared}")]
    BulkLengthMismatch { declared: usize },

    #[error("maximum nesting depth exceeded: {0}")]
    NestingTooDeep(usize),

    #[error("message too large: {size} (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Any other framing violation
    #[error("protocol error: {0}")]
    ProtocolError(String),
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum number of arguments in one request
pub const MAX_COMMAND_ARGS: usize = 1024 * 1024;

/// Maximum array nesting depth for replies
pub const MAX_NESTING_DEPTH: usize = 32;

/// Longest accepted length line, digits and sign only.
const MAX_LENGTH_LINE: usize = 20;

/// A stateless RESP decoder with configurable size limits.
///
/// # Example
///
/// ```
/// use snapkv::protocol::RespParser;
///
/// let parser = RespParser::new();
/// let buf = b"*2\r\n$4\r\nECHO\r\n$3\r\nhey\r\n";
///
/// let (args, consumed) = parser.parse_command(buf).unwrap().unwrap();
/// assert_eq!(consumed, buf.len());
/// assert_eq!(&args[1][..], b"hey");
///
/// // Half a message is not an error, just not ready yet.
/// assert!(parser.parse_command(&buf[..10]).unwrap().is_none());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RespParser {
    max_bulk_size: usize,
}

impl Default for RespParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RespParser {
    pub fn new() -> Self {
        Self {
            max_bulk_size: MAX_BULK_SIZE,
        }
    }

    /// Overrides the bulk string size limit.
    pub fn with_max_bulk_size(mut self, max: usize) -> Self {
        self.max_bulk_size = max;
        self
    }

    /// Decodes one request from the front of `buf`.
    pub fn parse_command(&self, buf: &[u8]) -> ParseResult<Option<(CommandFrame, usize)>> {
        let Some(&first) = buf.first() else {
            return Ok(None);
        };
        if first != prefix::ARRAY {
            return Err(ParseError::ExpectedArray(first));
        }

        let Some((count, header_len)) = read_length_line(&buf[1..])? else {
            return Ok(None);
        };
        if count < 0 {
            return Err(ParseError::InvalidArrayLength(count));
        }
        if count == 0 {
            return Err(ParseError::EmptyCommand);
        }
        let count = count as usize;
        if count > MAX_COMMAND_ARGS {
            return Err(ParseError::MessageTooLarge {
                size: count,
                max: MAX_COMMAND_ARGS,
            });
        }

        let mut args = Vec::with_capacity(count.min(16));
        let mut consumed = 1 + header_len;

        for _ in 0..count {
            match self.parse_argument(&buf[consumed..])? {
                Some((arg, used)) => {
                    args.push(arg);
                    consumed += used;
                }
                None => return Ok(None),
            }
        }

        Ok(Some((args, consumed)))
    }

    /// Decodes one reply value from the front of `buf`.
    pub fn parse_reply(&self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        self.parse_value(buf, 0)
    }

    /// Parses a single request argument: `$<len>\r\n<bytes>\r\n`
    fn parse_argument(&self, buf: &[u8]) -> ParseResult<Option<(Bytes, usize)>> {
        let Some(&first) = buf.first() else {
            return Ok(None);
        };
        if first != prefix::BULK_STRING {
            return Err(ParseError::ExpectedBulkString(first));
        }

        let Some((length, header_len)) = read_length_line(&buf[1..])? else {
            return Ok(None);
        };
        if length < 0 {
            return Err(ParseError::InvalidBulkLength(length));
        }

        let data_start = 1 + header_len;
        self.bulk_payload(buf, data_start, length as usize)
    }

    fn parse_value(&self, buf: &[u8], depth: usize) -> ParseResult<Option<(RespValue, usize)>> {
        let Some(&first) = buf.first() else {
            return Ok(None);
        };

        match first {
            prefix::SIMPLE_STRING | prefix::ERROR => {
                let Some(pos) = find_crlf(&buf[1..]) else {
                    return Ok(None);
                };
                let text = std::str::from_utf8(&buf[1..1 + pos])
                    .map_err(|e| ParseError::InvalidUtf8(e.to_string()))?
                    .to_string();
                let value = if first == prefix::ERROR {
                    RespValue::Error(text)
                } else {
                    RespValue::SimpleString(text)
                };
                Ok(Some((value, 1 + pos + 2)))
            }
            prefix::INTEGER => Ok(read_length_line(&buf[1..])?
                .map(|(n, used)| (RespValue::Integer(n), 1 + used))),
            prefix::BULK_STRING => {
                let Some((length, header_len)) = read_length_line(&buf[1..])? else {
                    return Ok(None);
                };
                let data_start = 1 + header_len;
                match length {
                    -1 => Ok(Some((RespValue::Null, data_start))),
                    n if n < 0 => Err(ParseError::InvalidBulkLength(n)),
                    n => Ok(self
                        .bulk_payload(buf, data_start, n as usize)?
                        .map(|(data, used)| (RespValue::BulkString(data), used))),
                }
            }
            prefix::ARRAY => self.parse_array(buf, depth),
            other => Err(ParseError::UnknownPrefix(other)),
        }
    }

    fn parse_array(&self, buf: &[u8], depth: usize) -> ParseResult<Option<(RespValue, usize)>> {
        if depth >= MAX_NESTING_DEPTH {
            return Err(ParseError::NestingTooDeep(MAX_NESTING_DEPTH));
        }

        let Some((count, header_len)) = read_length_line(&buf[1..])? else {
            return Ok(None);
        };
        let mut consumed = 1 + header_len;

        if count == -1 {
            return Ok(Some((RespValue::NullArray, consumed)));
        }
        if count < 0 {
            return Err(ParseError::InvalidArrayLength(count));
        }

        let count = count as usize;
        let mut elements = Vec::with_capacity(count.min(16));
        for _ in 0..count {
            match self.parse_value(&buf[consumed..], depth + 1)? {
                Some((value, used)) => {
                    elements.push(value);
                    consumed += used;
                }
                None => return Ok(None),
            }
        }

        Ok(Some((RespValue::Array(elements), consumed)))
    }

    /// Extracts `length` payload bytes at `data_start` and checks the CRLF
    /// that must follow them.
    fn bulk_payload(
        &self,
        buf: &[u8],
        data_start: usize,
        length: usize,
    ) -> ParseResult<Option<(Bytes, usize)>> {
        if length > self.max_bulk_size {
            return Err(ParseError::MessageTooLarge {
                size: length,
                max: self.max_bulk_size,
            });
        }

        let data_end = data_start + length;

        // The terminator can be checked as soon as its first byte is here.
        if buf.len() > data_end && buf[data_end] != b'\r' {
            return Err(ParseError::BulkLengthMismatch { declared: length });
        }
        if buf.len() < data_end + 2 {
            return Ok(None);
        }
        if &buf[data_end..data_end + 2] != CRLF {
            return Err(ParseError::BulkLengthMismatch { declared: length });
        }

        let data = Bytes::copy_from_slice(&buf[data_start..data_end]);
        Ok(Some((data, data_end + 2)))
    }
}

/// Reads a `<integer>\r\n` line at the front of `buf`.
///
/// Returns the value and the bytes consumed including CRLF. A line that
/// cannot fit an integer is rejected before its CRLF arrives.
fn read_length_line(buf: &[u8]) -> ParseResult<Option<(i64, usize)>> {
    let window = &buf[..buf.len().min(MAX_LENGTH_LINE + 2)];
    match find_crlf(window) {
        Some(pos) => Ok(Some((parse_integer(&buf[..pos])?, pos + 2))),
        None if window.len() == MAX_LENGTH_LINE + 2 => Err(ParseError::ProtocolError(
            "length line too long".to_string(),
        )),
        None => Ok(None),
    }
}

/// Parses a line in the canonical form the encoder writes: an optional `-`,
/// then digits with no leading zero. `+1`, `01` and `-0` are rejected.
fn parse_integer(line: &[u8]) -> ParseResult<i64> {
    let s = std::str::from_utf8(line).map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
    let digits = s.strip_prefix('-').unwrap_or(s);
    let canonical = match digits.as_bytes() {
        [b'0'] => digits.len() == s.len(),
        [first, ..] => *first != b'0' && digits.bytes().all(|b| b.is_ascii_digit()),
        [] => false,
    };
    if !canonical {
        return Err(ParseError::InvalidInteger(format!("{:?}: not a canonical integer", s)));
    }
    s.parse()
        .map_err(|e: ParseIntError| ParseError::InvalidInteger(format!("{:?}: {}", s, e)))
}

/// Finds the position of CRLF in the buffer.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// Decodes one request with the default limits.
pub fn parse_command(buf: &[u8]) -> ParseResult<Option<(CommandFrame, usize)>> {
    RespParser::new().parse_command(buf)
}

/// Decodes one reply value with the default limits.
pub fn parse_reply(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    RespParser::new().parse_reply(buf)
}
