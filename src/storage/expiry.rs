//! Background Expiry Sweeper
//!
//! Lazy expiry only reclaims an entry when something reads it. Keys that are
//! written with a TTL and never touched again would otherwise stay in memory
//! until shutdown, so this task periodically calls
//! [`StorageEngine::cleanup_expired`].
//!
//! The sweeper only removes entries every read path already treats as absent,
//! so turning it off (`--no-active-expiry`) changes memory use, never replies.
//!
//! The interval adapts: it halves (down to `min_interval`) after a sweep that
//! reclaimed many keys and doubles (up to `max_interval`) after an empty one.

use crate::storage::StorageEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace};

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Starting interval between sweeps
    pub base_interval: Duration,
    pub min_interval: Duration,
    pub max_interval: Duration,
    /// Reclaiming at least this many keys in one sweep speeds the next one up
    pub busy_threshold: u64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(100),
            min_interval: Duration::from_millis(10),
            max_interval: Duration::from_secs(1),
            busy_threshold: 20,
        }
    }
}

/// Handle to the running sweeper task. Dropping it stops the task.
#[derive(Debug)]
pub struct ExpirySweeper {
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Spawns the sweeper on the current tokio runtime.
    pub fn start(engine: Arc<StorageEngine>, config: ExpiryConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(sweeper_loop(engine, config, shutdown_rx));
        info!("Background expiry sweeper started");
        Self { shutdown_tx }
    }

    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweeper_loop(
    engine: Arc<StorageEngine>,
    config: ExpiryConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut interval = config.base_interval;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry sweeper stopped");
                    return;
                }
            }
        }

        let reclaimed = engine.cleanup_expired();
        interval = next_interval(interval, reclaimed, &config);

        if reclaimed > 0 {
            debug!(
                reclaimed,
                next_interval_ms = interval.as_millis() as u64,
                "Expired keys reclaimed"
            );
        } else {
            trace!(next_interval_ms = interval.as_millis() as u64, "Nothing to reclaim");
        }
    }
}

fn next_interval(current: Duration, reclaimed: u64, config: &ExpiryConfig) -> Duration {
    if reclaimed >= config.busy_threshold {
        (current / 2).max(config.min_interval)
    } else if reclaimed == 0 {
        (current * 2).min(config.max_interval)
    } else {
        current
    }
}

/// Starts the expiry sweeper with default configuration.
pub fn start_expiry_sweeper(engine: Arc<StorageEngine>) -> ExpirySweeper {
    ExpirySweeper::start(engine, ExpiryConfig::default())
}
