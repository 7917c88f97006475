//! Command Decoding
//!
//! Turns a [`CommandFrame`] into a [`Command`]. Verb matching, arity checks
//! and option parsing all happen here, once, so execution only ever sees
//! well-formed commands.

use crate::protocol::{CommandFrame, RespValue};
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

/// Errors reported to the client as `-ERR ...` replies.
///
/// The `Display` text is the exact reply text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(String),

    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    #[error("ERR syntax error")]
    Syntax,

    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,

    #[error("ERR invalid expire time in 'set' command")]
    InvalidExpireTime,

    #[error("ERR unknown subcommand '{0}'. Try CONFIG HELP.")]
    UnknownSubcommand(String),
}

impl From<CommandError> for RespValue {
    fn from(err: CommandError) -> Self {
        RespValue::error(err.to_string())
    }
}

/// A validated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `PING [message]`
    Ping(Option<Bytes>),
    /// `ECHO message`
    Echo(Bytes),
    /// `SET key value [PX milliseconds | EX seconds]`
    Set {
        key: Bytes,
        value: Bytes,
        ttl: Option<Duration>,
    },
    /// `GET key`
    Get(Bytes),
    /// `DEL key [key ...]`
    Del(Vec<Bytes>),
    /// `KEYS pattern`
    Keys(Bytes),
    /// `CONFIG GET parameter`
    ConfigGet(Bytes),
    /// `INFO [section]`
    Info(Option<Bytes>),
}

impl Command {
    /// Resolves a decoded frame into a command.
    pub fn parse(frame: CommandFrame) -> Result<Self, CommandError> {
        let mut parts = frame.into_iter();
        let Some(verb) = parts.next() else {
            return Err(CommandError::UnknownCommand(String::new()));
        };
        let args: Vec<Bytes> = parts.collect();

        match verb.to_ascii_uppercase().as_slice() {
            b"PING" => match <[Bytes; 1]>::try_from(args) {
                Ok([message]) => Ok(Command::Ping(Some(message))),
                Err(args) if args.is_empty() => Ok(Command::Ping(None)),
                Err(_) => Err(CommandError::WrongArity("ping".into())),
            },
            b"ECHO" => {
                let [message] = exact(args, "echo")?;
                Ok(Command::Echo(message))
            }
            b"SET" => parse_set(args),
            b"GET" => {
                let [key] = exact(args, "get")?;
                Ok(Command::Get(key))
            }
            b"DEL" => {
                if args.is_empty() {
                    return Err(CommandError::WrongArity("del".into()));
                }
                Ok(Command::Del(args))
            }
            b"KEYS" => {
                let [pattern] = exact(args, "keys")?;
                Ok(Command::Keys(pattern))
            }
            b"CONFIG" => parse_config(args),
            b"INFO" => match <[Bytes; 1]>::try_from(args) {
                Ok([section]) => Ok(Command::Info(Some(section))),
                Err(args) if args.is_empty() => Ok(Command::Info(None)),
                Err(_) => Err(CommandError::WrongArity("info".into())),
            },
            _ => Err(CommandError::UnknownCommand(
                String::from_utf8_lossy(&verb).into_owned(),
            )),
        }
    }

    /// Lowercase verb, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping(_) => "ping",
            Command::Echo(_) => "echo",
            Command::Set { .. } => "set",
            Command::Get(_) => "get",
            Command::Del(_) => "del",
            Command::Keys(_) => "keys",
            Command::ConfigGet(_) => "config|get",
            Command::Info(_) => "info",
        }
    }
}

fn exact<const N: usize>(args: Vec<Bytes>, verb: &str) -> Result<[Bytes; N], CommandError> {
    args.try_into()
        .map_err(|_| CommandError::WrongArity(verb.to_string()))
}

fn parse_set(args: Vec<Bytes>) -> Result<Command, CommandError> {
    if args.len() < 2 {
        return Err(CommandError::WrongArity("set".into()));
    }

    let mut args = args.into_iter();
    let (Some(key), Some(value)) = (args.next(), args.next()) else {
        return Err(CommandError::WrongArity("set".into()));
    };

    let ttl = match (args.next(), args.next(), args.next()) {
        (None, None, None) => None,
        (Some(option), Some(amount), None) => {
            let amount = parse_expiry(&amount)?;
            match option.to_ascii_uppercase().as_slice() {
                b"PX" => Some(Duration::from_millis(amount)),
                b"EX" => Some(Duration::from_secs(amount)),
                _ => return Err(CommandError::Syntax),
            }
        }
        _ => return Err(CommandError::Syntax),
    };

    Ok(Command::Set { key, value, ttl })
}

/// Parses a non-negative expiry amount.
fn parse_expiry(raw: &[u8]) -> Result<u64, CommandError> {
    let n: i64 = std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(CommandError::NotAnInteger)?;

    u64::try_from(n).map_err(|_| CommandError::InvalidExpireTime)
}

fn parse_config(args: Vec<Bytes>) -> Result<Command, CommandError> {
    let mut args = args.into_iter();
    let Some(sub) = args.next() else {
        return Err(CommandError::WrongArity("config".into()));
    };

    if !sub.eq_ignore_ascii_case(b"GET") {
        return Err(CommandError::UnknownSubcommand(
            String::from_utf8_lossy(&sub).into_owned(),
        ));
    }

    match (args.next(), args.next()) {
        (Some(name), None) => Ok(Command::ConfigGet(name)),
        _ => Err(CommandError::WrongArity("config|get".into())),
    }
}
