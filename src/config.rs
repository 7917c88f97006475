//! Server Configuration
//!
//! Command-line flags are parsed with `clap` into [`Cli`], then resolved into
//! an immutable [`ServerConfig`] that is shared as `Arc<ServerConfig>`.

use crate::{DEFAULT_HOST, DEFAULT_PORT};
use clap::Parser;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("expected \"<host> <port>\", got {0:?}")]
    InvalidReplicaOf(String),

    #[error("invalid master port {0:?}")]
    InvalidPort(String),
}

/// Command-line flags.
#[derive(Parser, Debug, Clone)]
#[command(name = "snapkv")]
#[command(about = "In-memory key-value server speaking RESP, bootstrapped from an RDB snapshot")]
#[command(version)]
pub struct Cli {
    /// Directory holding the snapshot file
    #[arg(long, default_value = "/tmp")]
    pub dir: PathBuf,

    /// Snapshot file name inside --dir
    #[arg(long, default_value = "dump.rdb")]
    pub dbfilename: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Address to bind to
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Run as a replica of "<host> <port>"
    #[arg(long, value_name = "HOST PORT")]
    pub replicaof: Option<ReplicaOf>,

    /// Only reclaim expired keys when they are read
    #[arg(long)]
    pub no_active_expiry: bool,
}

/// Address of the master this server replicates from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaOf {
    pub host: String,
    pub port: u16,
}

impl ReplicaOf {
    /// `host:port`, suitable for `TcpStream::connect`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl FromStr for ReplicaOf {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let (Some(host), Some(port), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(ConfigError::InvalidReplicaOf(s.to_string()));
        };

        let port = port
            .parse()
            .map_err(|_| ConfigError::InvalidPort(port.to_string()))?;

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for ReplicaOf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.host, self.port)
    }
}

/// Replication role reported by `INFO replication`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Master,
    Replica,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Master => "master",
            Role::Replica => "slave",
        }
    }
}

/// Resolved server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub dir: PathBuf,
    pub dbfilename: String,
    pub replicaof: Option<ReplicaOf>,
    pub active_expiry: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            dir: PathBuf::from("/tmp"),
            dbfilename: "dump.rdb".to_string(),
            replicaof: None,
            active_expiry: true,
        }
    }
}

impl From<Cli> for ServerConfig {
    fn from(cli: Cli) -> Self {
        Self {
            host: cli.host,
            port: cli.port,
            dir: cli.dir,
            dbfilename: cli.dbfilename,
            replicaof: cli.replicaof,
            active_expiry: !cli.no_active_expiry,
        }
    }
}

impl ServerConfig {
    /// `dir/dbfilename`
    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.join(&self.dbfilename)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn role(&self) -> Role {
        if self.replicaof.is_some() {
            Role::Replica
        } else {
            Role::Master
        }
    }
}
