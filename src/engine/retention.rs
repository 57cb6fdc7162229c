//! Background removal of resolved work items.
//!
//! Best effort: a failed sweep is logged and retried on the next tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{info, warn};

use super::QueueEngine;

/// Periodically runs `QueueEngine::retention_sweep` until shut down.
#[derive(Clone)]
pub struct RetentionSweeper {
    engine: Arc<QueueEngine>,
    interval: Duration,
    shutdown: Arc<Notify>,
}

impl RetentionSweeper {
    pub fn new(engine: Arc<QueueEngine>, interval: Duration) -> Self {
        Self {
            engine,
            interval,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Signal the sweeper to stop.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Run the sweep loop until shutdown.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.interval);
        info!(interval_ms = self.interval.as_millis() as u64, "retention sweeper started");

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("retention sweeper shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.engine.retention_sweep().await {
                        warn!("retention sweep failed: {e}");
                    }
                }
            }
        }
    }
}
