//! Outcome waits.
//!
//! A waiter learns about resolution two ways: the notifier pushes every
//! terminal item resolved in this process, and a poll re-reads the store at
//! `poll_interval` to catch resolutions made elsewhere (another broker
//! sharing the database). Both are bounded by the same timeout, and the
//! subscription is dropped on every exit path.

use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use super::QueueEngine;
use crate::error::{Error, Result};
use crate::model::{WorkId, WorkItem};
use crate::telemetry::metrics;

const CHANNEL_CAPACITY: usize = 256;

/// Fan-out of terminal work items to waiting flows.
pub struct Notifier {
    tx: broadcast::Sender<WorkItem>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkItem> {
        self.tx.subscribe()
    }

    /// Push a resolved item to every current subscriber.
    pub fn publish(&self, item: &WorkItem) {
        if self.tx.send(item.clone()).is_err() {
            trace!(id = %item.id, "resolved with nobody waiting");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl QueueEngine {
    /// Wait until `id` reaches a terminal status, or `timeout` elapses.
    ///
    /// Returns the terminal item, `Completed` or `Failed`. On timeout the
    /// item is left as it is; a later resolution is simply not observed.
    pub async fn await_outcome(&self, id: WorkId, timeout: Duration) -> Result<WorkItem> {
        let started = Instant::now();

        // Subscribe before the first read so no resolution slips between them.
        let mut updates = self.notifier.subscribe();
        let result = tokio::time::timeout(timeout, self.watch(id, &mut updates))
            .await
            .unwrap_or(Err(Error::Timeout(id)));
        drop(updates);

        let outcome = match result {
            Ok(ref item) => item.status.as_str(),
            Err(Error::Timeout(_)) => "timeout",
            Err(_) => "error",
        };
        metrics::wait_outcomes().add(1, &[KeyValue::new("outcome", outcome)]);
        metrics::wait_duration_ms().record(
            started.elapsed().as_secs_f64() * 1000.0,
            &[KeyValue::new("outcome", outcome)],
        );
        debug!(%id, outcome, "wait finished");

        result
    }

    async fn watch(
        &self,
        id: WorkId,
        updates: &mut broadcast::Receiver<WorkItem>,
    ) -> Result<WorkItem> {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                received = updates.recv() => match received {
                    Ok(item) if item.id == id => return Ok(item),
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(%id, skipped, "waiter lagged, re-reading");
                        let item = self.get(id).await?;
                        if item.status.is_terminal() {
                            return Ok(item);
                        }
                    }
                    Err(RecvError::Closed) => {
                        return Err(Error::Other("outcome notifier closed".to_string()));
                    }
                },
                _ = ticker.tick() => {
                    let item = self.get(id).await?;
                    if item.status.is_terminal() {
                        return Ok(item);
                    }
                }
            }
        }
    }
}
