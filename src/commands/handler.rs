//! Command Handler Module
//!
//! Executes a decoded [`Command`] against the keyspace and the read-only
//! server configuration, producing exactly one reply.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌──────────────────┐    ┌─────────────┐                    │
//! │  │ Command::parse() │───>│  dispatch() │───> cmd_*()        │
//! │  └──────────────────┘    └─────────────┘       │            │
//! │                                                ▼            │
//! │                               StorageEngine / ServerConfig  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Execution is synchronous; every storage call takes the keyspace lock
//! and releases it before returning.

use crate::commands::command::Command;
use crate::config::{Role, ServerConfig};
use crate::protocol::{CommandFrame, RespValue};
use crate::replication::generate_replid;
use crate::storage::StorageEngine;
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

const INFO_SECTIONS: [&str; 3] = ["server", "replication", "keyspace"];

/// Executes commands. Cheap to clone; one clone per connection.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    storage: Arc<StorageEngine>,
    config: Arc<ServerConfig>,
    /// Server start time for INFO
    start_time: Instant,
    replid: Arc<str>,
}

impl CommandHandler {
    pub fn new(storage: Arc<StorageEngine>, config: Arc<ServerConfig>) -> Self {
        Self {
            storage,
            config,
            start_time: Instant::now(),
            replid: generate_replid().into(),
        }
    }

    /// Decodes and executes one request frame.
    ///
    /// Unknown verbs and malformed arguments come back as error replies.
    pub fn execute(&self, frame: CommandFrame) -> RespValue {
        match Command::parse(frame) {
            Ok(command) => {
                trace!(command = command.name(), "Executing");
                self.dispatch(command)
            }
            Err(e) => e.into(),
        }
    }

    /// Executes an already decoded command.
    pub fn dispatch(&self, command: Command) -> RespValue {
        match command {
            Command::Ping(message) => self.cmd_ping(message),
            Command::Echo(message) => RespValue::bulk_string(message),
            Command::Set { key, value, ttl } => self.cmd_set(key, value, ttl),
            Command::Get(key) => self.cmd_get(&key),
            Command::Del(keys) => self.cmd_del(&keys),
            Command::Keys(pattern) => self.cmd_keys(&pattern),
            Command::ConfigGet(name) => self.cmd_config_get(&name),
            Command::Info(section) => self.cmd_info(section.as_deref()),
        }
    }

    /// PING [message]
    fn cmd_ping(&self, message: Option<Bytes>) -> RespValue {
        match message {
            Some(msg) => RespValue::bulk_string(msg),
            None => RespValue::pong(),
        }
    }

    /// SET key value [PX milliseconds | EX seconds]
    fn cmd_set(&self, key: Bytes, value: Bytes, ttl: Option<Duration>) -> RespValue {
        match ttl {
            Some(ttl) => self.storage.set_with_ttl(key, value, ttl),
            None => self.storage.set(key, value),
        };
        RespValue::ok()
    }

    /// GET key
    fn cmd_get(&self, key: &[u8]) -> RespValue {
        match self.storage.get(key) {
            Some(value) => RespValue::bulk_string(value),
            None => RespValue::null(),
        }
    }

    /// DEL key [key ...]
    fn cmd_del(&self, keys: &[Bytes]) -> RespValue {
        RespValue::integer(self.storage.delete_many(keys) as i64)
    }

    /// KEYS pattern
    fn cmd_keys(&self, pattern: &[u8]) -> RespValue {
        RespValue::bulk_array(self.storage.keys(pattern))
    }

    /// CONFIG GET parameter
    fn cmd_config_get(&self, name: &[u8]) -> RespValue {
        let name = String::from_utf8_lossy(name).to_ascii_lowercase();
        let value = match name.as_str() {
            "dir" => self.config.dir.to_string_lossy().into_owned(),
            "dbfilename" => self.config.dbfilename.clone(),
            _ => return RespValue::null(),
        };
        RespValue::bulk_array([name, value])
    }

    /// INFO [section]
    fn cmd_info(&self, section: Option<&[u8]>) -> RespValue {
        let requested = section
            .map(|s| String::from_utf8_lossy(s).to_ascii_lowercase())
            .unwrap_or_else(|| "all".to_string());

        let sections: Vec<&str> = match requested.as_str() {
            "all" | "default" | "everything" => INFO_SECTIONS.to_vec(),
            name => INFO_SECTIONS.into_iter().filter(|s| *s == name).collect(),
        };

        let info = sections
            .into_iter()
            .map(|s| self.info_section(s))
            .collect::<Vec<_>>()
            .join("\r\n");

        RespValue::bulk_string(info)
    }

    fn info_section(&self, section: &str) -> String {
        match section {
            "server" => format!(
                "# Server\r\n\
                 snapkv_version:{}\r\n\
                 os:{}\r\n\
                 process_id:{}\r\n\
                 tcp_port:{}\r\n\
                 uptime_in_seconds:{}\r\n",
                crate::VERSION,
                std::env::consts::OS,
                std::process::id(),
                self.config.port,
                self.start_time.elapsed().as_secs(),
            ),
            "replication" => self.replication_section(),
            "keyspace" => {
                let info = self.storage.keyspace_info();
                format!(
                    "# Keyspace\r\n\
                     db0:keys={},expires={},avg_ttl=0\r\n",
                    info.keys, info.expires
                )
            }
            _ => String::new(),
        }
    }

    fn replication_section(&self) -> String {
        let role = self.config.role();
        let details = match (role, &self.config.replicaof) {
            (Role::Replica, Some(master)) => format!(
                "master_host:{}\r\n\
                 master_port:{}\r\n\
                 master_link_status:down\r\n",
                master.host, master.port
            ),
            _ => format!(
                "connected_slaves:0\r\n\
                 master_replid:{}\r\n\
                 master_repl_offset:0\r\n",
                self.replid
            ),
        };
        format!("# Replication\r\nrole:{}\r\n{}", role.as_str(), details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReplicaOf;
    use std::path::PathBuf;

    fn create_handler() -> CommandHandler {
        let storage = Arc::new(StorageEngine::new());
        CommandHandler::new(storage, Arc::new(ServerConfig::default()))
    }

    fn make_command(args: &[&str]) -> CommandFrame {
        args.iter().map(|s| Bytes::from(s.to_string())).collect()
    }

    fn info_text(handler: &CommandHandler, args: &[&str]) -> String {
        match handler.execute(make_command(args)) {
            RespValue::BulkString(b) => String::from_utf8(b.to_vec()).unwrap(),
            other => panic!("expected bulk string, got {:?}", other),
        }
    }

    #[test]
    fn test_ping() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["PING"]));
        assert_eq!(response.serialize(), b"+PONG\r\n");

        let response = handler.execute(make_command(&["PING", "hello"]));
        assert_eq!(response, RespValue::bulk_string(Bytes::from("hello")));
    }

    #[test]
    fn test_echo() {
        let handler = create_handler();
        let response = handler.execute(make_command(&["ECHO", "hey"]));
        assert_eq!(response.serialize(), b"$3\r\nhey\r\n");
    }

    #[test]
    fn test_set_get() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["SET", "foo", "bar"]));
        assert_eq!(response, RespValue::ok());

        let response = handler.execute(make_command(&["GET", "foo"]));
        assert_eq!(response.serialize(), b"$3\r\nbar\r\n");
    }

    #[test]
    fn test_get_nonexistent() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["GET", "missing"]));
        assert_eq!(response.serialize(), b"$-1\r\n");
    }

    #[test]
    fn test_set_px_zero_is_gone() {
        let handler = create_handler();

        handler.execute(make_command(&["SET", "k", "v", "PX", "0"]));
        std::thread::sleep(Duration::from_millis(1));

        assert_eq!(handler.execute(make_command(&["GET", "k"])), RespValue::null());
        assert_eq!(
            handler.execute(make_command(&["KEYS", "*"])),
            RespValue::array(vec![])
        );
    }

    #[test]
    fn test_set_px_expires() {
        let handler = create_handler();

        handler.execute(make_command(&["SET", "k", "v", "px", "50"]));
        assert_eq!(
            handler.execute(make_command(&["GET", "k"])),
            RespValue::bulk_string(Bytes::from("v"))
        );

        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(handler.execute(make_command(&["GET", "k"])), RespValue::null());
    }

    #[test]
    fn test_del() {
        let handler = create_handler();

        handler.execute(make_command(&["SET", "a", "1"]));
        handler.execute(make_command(&["SET", "b", "2"]));

        let response = handler.execute(make_command(&["DEL", "a", "b", "c"]));
        assert_eq!(response, RespValue::integer(2));
        assert_eq!(handler.execute(make_command(&["GET", "a"])), RespValue::null());
    }

    #[test]
    fn test_keys() {
        let handler = create_handler();
        assert_eq!(
            handler.execute(make_command(&["KEYS", "*"])).serialize(),
            b"*0\r\n"
        );

        handler.execute(make_command(&["SET", "user:1", "a"]));
        handler.execute(make_command(&["SET", "user:2", "b"]));
        handler.execute(make_command(&["SET", "other", "c"]));

        let response = handler.execute(make_command(&["KEYS", "user:?"]));
        let mut keys: Vec<Vec<u8>> = response
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_bytes().unwrap().to_vec())
            .collect();
        keys.sort();
        assert_eq!(keys, vec![b"user:1".to_vec(), b"user:2".to_vec()]);
    }

    #[test]
    fn test_keys_question_mark_spans_multibyte_character() {
        let handler = create_handler();
        handler.execute(make_command(&["SET", "héllo", "1"]));
        handler.execute(make_command(&["SET", "hello", "2"]));
        handler.execute(make_command(&["SET", "heello", "3"]));

        let response = handler.execute(make_command(&["KEYS", "h?llo"]));
        let mut keys: Vec<Vec<u8>> = response
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_bytes().unwrap().to_vec())
            .collect();
        keys.sort();
        assert_eq!(keys, vec![b"hello".to_vec(), "héllo".as_bytes().to_vec()]);
    }

    #[test]
    fn test_config_get() {
        let storage = Arc::new(StorageEngine::new());
        let config = ServerConfig {
            dir: PathBuf::from("/tmp/redis-files"),
            dbfilename: "snap.rdb".to_string(),
            ..Default::default()
        };
        let handler = CommandHandler::new(storage, Arc::new(config));

        assert_eq!(
            handler.execute(make_command(&["CONFIG", "GET", "dir"])).serialize(),
            b"*2\r\n$3\r\ndir\r\n$16\r\n/tmp/redis-files\r\n"
        );
        assert_eq!(
            handler
                .execute(make_command(&["config", "get", "DBFILENAME"]))
                .serialize(),
            b"*2\r\n$10\r\ndbfilename\r\n$8\r\nsnap.rdb\r\n"
        );
        assert_eq!(
            handler.execute(make_command(&["CONFIG", "GET", "maxmemory"])),
            RespValue::null()
        );
    }

    #[test]
    fn test_info_replication_master() {
        let handler = create_handler();

        let info = info_text(&handler, &["INFO", "replication"]);
        assert!(info.starts_with("# Replication\r\n"));
        assert!(info.contains("role:master\r\n"));
        assert!(info.contains("connected_slaves:0\r\n"));
        assert!(info.contains("master_repl_offset:0\r\n"));
        assert!(!info.contains("# Server"));

        let replid = info
            .lines()
            .find_map(|line| line.strip_prefix("master_replid:"))
            .unwrap();
        assert_eq!(replid.len(), 40);
    }

    #[test]
    fn test_info_replication_replica() {
        let storage = Arc::new(StorageEngine::new());
        let config = ServerConfig {
            replicaof: Some(ReplicaOf {
                host: "localhost".to_string(),
                port: 6379,
            }),
            ..Default::default()
        };
        let handler = CommandHandler::new(storage, Arc::new(config));

        let info = info_text(&handler, &["info", "REPLICATION"]);
        assert!(info.contains("role:slave\r\n"));
        assert!(info.contains("master_host:localhost\r\n"));
        assert!(info.contains("master_port:6379\r\n"));
    }

    #[test]
    fn test_info_sections() {
        let handler = create_handler();
        handler.execute(make_command(&["SET", "a", "1"]));

        let all = info_text(&handler, &["INFO"]);
        assert!(all.contains("# Server\r\n"));
        assert!(all.contains("# Replication\r\n"));
        assert!(all.contains("db0:keys=1,expires=0"));

        assert_eq!(
            info_text(&handler, &["INFO", "keyspace"]),
            "# Keyspace\r\ndb0:keys=1,expires=0,avg_ttl=0\r\n"
        );
        assert_eq!(info_text(&handler, &["INFO", "nosuchsection"]), "");
    }

    #[test]
    fn test_errors_are_replies() {
        let handler = create_handler();

        assert_eq!(
            handler.execute(make_command(&["NOPE"])).serialize(),
            b"-ERR unknown command 'NOPE'\r\n"
        );
        assert_eq!(
            handler.execute(make_command(&["GET"])),
            RespValue::error("ERR wrong number of arguments for 'get' command")
        );
        assert_eq!(
            handler.execute(make_command(&["SET", "k", "v", "PX", "abc"])),
            RespValue::error("ERR value is not an integer or out of range")
        );
    }
}
