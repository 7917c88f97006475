//! snapkv server binary
//!
//! Parses flags, loads the snapshot into the keyspace, then accepts
//! connections until Ctrl+C.

use anyhow::Context;
use clap::Parser;
use snapkv::commands::CommandHandler;
use snapkv::config::{Cli, ServerConfig};
use snapkv::connection::{handle_connection, ConnectionStats};
use snapkv::replication::spawn_handshake;
use snapkv::snapshot::load_file;
use snapkv::storage::{start_expiry_sweeper, StorageEngine};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();
}

fn print_banner(config: &ServerConfig) {
    println!(
        r#"
snapkv v{} - in-memory key-value server
──────────────────────────────────────────────────────────────
Listening on   {}
Snapshot file  {}
Role           {}

Use Ctrl+C to shutdown gracefully.
"#,
        snapkv::VERSION,
        config.bind_address(),
        config.snapshot_path().display(),
        config.role().as_str(),
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = Arc::new(ServerConfig::from(cli));
    print_banner(&config);

    // The keyspace is filled before any client can connect.
    let storage = Arc::new(StorageEngine::new());
    let report = load_file(&config.snapshot_path());
    report.log();
    let restored = storage.restore(report.entries.into_iter().map(snapkv::keyspace_entry));
    info!(keys = restored, "Keyspace ready");

    let _sweeper = config
        .active_expiry
        .then(|| start_expiry_sweeper(Arc::clone(&storage)));

    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;
    info!(address = %config.bind_address(), "Listening");

    if let Some(master) = config.replicaof.clone() {
        info!(master = %master, "Starting as replica");
        spawn_handshake(master, config.port);
    }

    let stats = Arc::new(ConnectionStats::new());
    let handler = CommandHandler::new(Arc::clone(&storage), Arc::clone(&config));

    let shutdown = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received, stopping server..."),
            Err(e) => {
                error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = accept_loop(listener, handler, Arc::clone(&stats)) => {}
        _ = shutdown => {}
    }

    stats.log_totals();
    let totals = storage.stats();
    info!(
        keys = storage.len(),
        gets = totals.get_ops,
        sets = totals.set_ops,
        dels = totals.del_ops,
        expired = totals.expired,
        "Storage totals"
    );
    info!("Server shutdown complete");
    Ok(())
}

/// Accepts connections forever, one task per client.
async fn accept_loop(listener: TcpListener, handler: CommandHandler, stats: Arc<ConnectionStats>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let handler = handler.clone();
                let stats = Arc::clone(&stats);
                tokio::spawn(handle_connection(stream, addr, handler, stats));
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
            }
        }
    }
}
