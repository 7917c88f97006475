//! Replica Greeting
//!
//! With `--replicaof`, the server introduces itself to its master:
//!
//! ```text
//! replica                         master
//!    │── PING ──────────────────────>│
//!    │<───────────────────── +PONG ──│
//!    │── REPLCONF listening-port N ─>│
//!    │<─────────────────────── +OK ──│
//!    │── REPLCONF capa psync2 ──────>│
//!    │<─────────────────────── +OK ──│
//! ```
//!
//! The greeting is best effort. Replies are read with a timeout and only
//! logged; nothing past the greeting (PSYNC, streaming) is attempted, and a
//! failure never affects serving local clients.

use crate::config::ReplicaOf;
use crate::protocol::{parse_reply, RespValue};
use anyhow::{bail, Context};
use bytes::BytesMut;
use rand::Rng;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long to wait for each master reply.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(1);

/// Runs the greeting in a background task, logging the outcome.
pub fn spawn_handshake(master: ReplicaOf, listening_port: u16) -> JoinHandle<()> {
    tokio::spawn(async move {
        match handshake(&master, listening_port).await {
            Ok(()) => info!(master = %master.address(), "Replica greeting sent"),
            Err(e) => warn!(master = %master.address(), error = %format!("{e:#}"), "Replica greeting failed"),
        }
    })
}

/// Connects to `master` and sends the three greeting commands.
pub async fn handshake(master: &ReplicaOf, listening_port: u16) -> anyhow::Result<()> {
    handshake_with_timeout(master, listening_port, REPLY_TIMEOUT).await
}

async fn handshake_with_timeout(
    master: &ReplicaOf,
    listening_port: u16,
    reply_timeout: Duration,
) -> anyhow::Result<()> {
    let address = master.address();
    let mut stream = TcpStream::connect(&address)
        .await
        .with_context(|| format!("failed to connect to master {}", address))?;
    debug!(master = %address, "Connected to master");

    let port = listening_port.to_string();
    let steps = [
        vec!["PING"],
        vec!["REPLCONF", "listening-port", port.as_str()],
        vec!["REPLCONF", "capa", "psync2"],
    ];

    let mut buffer = BytesMut::with_capacity(512);
    for parts in steps {
        let step = parts.join(" ");
        stream
            .write_all(&RespValue::command(parts.iter().map(|p| p.to_string())).serialize())
            .await
            .with_context(|| format!("failed to send {}", step))?;

        match read_reply(&mut stream, &mut buffer, reply_timeout).await? {
            Some(reply) if reply.is_error() => warn!(%step, %reply, "Master rejected greeting step"),
            Some(reply) => debug!(%step, %reply, "Master replied"),
            None => debug!(%step, "No reply from master within timeout"),
        }
    }

    Ok(())
}

/// Reads one reply, or `None` if the master stays silent for `wait`.
async fn read_reply(
    stream: &mut TcpStream,
    buffer: &mut BytesMut,
    wait: Duration,
) -> anyhow::Result<Option<RespValue>> {
    match tokio::time::timeout(wait, read_one(stream, buffer)).await {
        Ok(reply) => reply.map(Some),
        Err(_) => Ok(None),
    }
}

async fn read_one(stream: &mut TcpStream, buffer: &mut BytesMut) -> anyhow::Result<RespValue> {
    loop {
        if let Some((reply, consumed)) =
            parse_reply(&buffer[..]).context("malformed reply from master")?
        {
            let _ = buffer.split_to(consumed);
            return Ok(reply);
        }
        if stream
            .read_buf(buffer)
            .await
            .context("read from master failed")?
            == 0
        {
            bail!("master closed the connection");
        }
    }
}

const REPLID_LEN: usize = 40;
const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// A random 40-character hex replication id for `INFO replication`.
pub fn generate_replid() -> String {
    let mut rng = rand::rng();
    (0..REPLID_LEN)
        .map(|_| char::from(HEX_DIGITS[rng.random_range(0..HEX_DIGITS.len())]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn fake_master(replies: bool) -> (ReplicaOf, JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let task = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let expected: [&[u8]; 3] = [
                b"*1\r\n$4\r\nPING\r\n",
                b"*3\r\n$8\r\nREPLCONF\r\n$14\r\nlistening-port\r\n$4\r\n6380\r\n",
                b"*3\r\n$8\r\nREPLCONF\r\n$4\r\ncapa\r\n$6\r\npsync2\r\n",
            ];
            let mut received = Vec::new();
            for (i, message) in expected.iter().enumerate() {
                let mut buf = vec![0u8; message.len()];
                socket.read_exact(&mut buf).await.unwrap();
                received.extend_from_slice(&buf);
                if replies {
                    let reply: &[u8] = if i == 0 { b"+PONG\r\n" } else { b"+OK\r\n" };
                    socket.write_all(reply).await.unwrap();
                }
            }
            if !replies {
                // Stay connected so the replica sees a silent master, not EOF.
                tokio::time::sleep(Duration::from_millis(300)).await;
            }
            received
        });

        let master = ReplicaOf {
            host: "127.0.0.1".to_string(),
            port,
        };
        (master, task)
    }

    #[tokio::test]
    async fn test_handshake_sends_greeting() {
        let (master, task) = fake_master(true).await;

        handshake(&master, 6380).await.unwrap();

        let received = task.await.unwrap();
        assert_eq!(
            received,
            b"*1\r\n$4\r\nPING\r\n\
              *3\r\n$8\r\nREPLCONF\r\n$14\r\nlistening-port\r\n$4\r\n6380\r\n\
              *3\r\n$8\r\nREPLCONF\r\n$4\r\ncapa\r\n$6\r\npsync2\r\n"
                .to_vec()
        );
    }

    #[tokio::test]
    async fn test_silent_master_does_not_block() {
        let (master, task) = fake_master(false).await;

        handshake_with_timeout(&master, 6380, Duration::from_millis(50))
            .await
            .unwrap();

        assert_eq!(task.await.unwrap().len(), 14 + 49 + 40);
    }

    #[tokio::test]
    async fn test_unreachable_master() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let master = ReplicaOf {
            host: "127.0.0.1".to_string(),
            port,
        };
        let err = handshake(&master, 6380).await.unwrap_err();
        assert!(format!("{:#}", err).contains("failed to connect to master"));
    }

    #[test]
    fn test_replid_shape() {
        let id = generate_replid();
        assert_eq!(id.len(), 40);
        assert!(id.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_replids_differ() {
        assert_ne!(generate_replid(), generate_replid());
    }
}
