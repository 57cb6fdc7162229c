//! The queue engine. The public API for submitting and resolving work.
//!
//! The engine owns the store handle and the notifier. Every status change
//! goes through here; nothing else writes to the store.
//!
//! Device protocol assumption: the device claims sequentially and completes
//! (or abandons) one item before claiming the next. The engine keeps the
//! claim transition itself atomic, and `exclusive_claim` additionally
//! refuses to claim while another item is `Processing`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use opentelemetry::KeyValue;
use tracing::{Instrument, debug, info, warn};

use super::waiter::Notifier;
use crate::error::{Error, Result};
use crate::model::*;
use crate::storage::{Durability, MemoryStore, WorkItemStore};
use crate::telemetry::metrics;
use crate::telemetry::work::{record_state_transition, start_work_span};

/// Upper bound on the waiter re-read interval.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Upper bound on how long resolved items are kept.
pub const MAX_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Tunables for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long `request` waits for a terminal outcome.
    pub wait_timeout: Duration,
    /// Re-read interval for waiters when no push arrives.
    pub poll_interval: Duration,
    /// How long resolved items stay readable before removal.
    pub retention: Duration,
    /// Refuse to claim while an item is already `Processing`.
    pub exclusive_claim: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(500),
            retention: Duration::from_secs(10),
            exclusive_claim: false,
        }
    }
}

impl EngineConfig {
    /// A still-waiting flow must get one read of a resolved item before it
    /// can be removed, so retention has to outlast the poll interval.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(Error::Config("poll interval must be non-zero".to_string()));
        }
        if self.poll_interval > MAX_POLL_INTERVAL {
            return Err(Error::Config(format!(
                "poll interval ({:?}) must not exceed {:?}",
                self.poll_interval, MAX_POLL_INTERVAL
            )));
        }
        if self.retention > MAX_RETENTION {
            return Err(Error::Config(format!(
                "retention ({:?}) must not exceed {:?}",
                self.retention, MAX_RETENTION
            )));
        }
        if self.retention <= self.poll_interval {
            return Err(Error::Config(format!(
                "retention ({:?}) must exceed the poll interval ({:?})",
                self.retention, self.poll_interval
            )));
        }
        Ok(())
    }
}

/// The queue engine. Owns all state and enforces all invariants.
pub struct QueueEngine {
    store: Arc<dyn WorkItemStore>,
    pub(super) notifier: Notifier,
    pub(super) config: EngineConfig,
}

impl QueueEngine {
    pub fn new(store: Arc<dyn WorkItemStore>, config: EngineConfig) -> Result<Self> {
        config.validate()?;

        match store.durability() {
            Durability::Transient => warn!(
                "queue backed by transient storage: all work items are lost on restart"
            ),
            Durability::Durable => info!("queue backed by durable storage"),
        }

        Ok(Self {
            store,
            notifier: Notifier::new(),
            config,
        })
    }

    /// Create an engine with in-memory storage.
    pub fn in_memory(config: EngineConfig) -> Result<Self> {
        Self::new(Arc::new(MemoryStore::new()), config)
    }

    pub fn durability(&self) -> Durability {
        self.store.durability()
    }

    /// Number of flows currently subscribed for outcomes.
    pub fn active_waiters(&self) -> usize {
        self.notifier.subscriber_count()
    }

    /// Submit new work. Validation failures never touch the store.
    pub async fn submit(&self, action: i64, requester_id: &str) -> Result<WorkId> {
        let validated = Action::new(action).and_then(|action| {
            if requester_id.trim().is_empty() {
                Err(Error::InvalidInput("requester id must be non-empty".to_string()))
            } else {
                Ok(action)
            }
        });
        let action = match validated {
            Ok(action) => action,
            Err(e) => {
                metrics::work_submitted().add(1, &[KeyValue::new("result", "invalid")]);
                return Err(e);
            }
        };

        let item = WorkItem::pending(action, requester_id, Utc::now());
        let item = match self.store.insert(item).await {
            Ok(item) => item,
            Err(e) => {
                metrics::work_submitted().add(1, &[KeyValue::new("result", "error")]);
                return Err(e);
            }
        };

        metrics::work_submitted().add(1, &[KeyValue::new("result", "ok")]);
        info!(
            id = %item.id,
            action = %item.action,
            requester = %item.requester_id,
            seq = item.seq,
            "work item queued"
        );
        Ok(item.id)
    }

    /// Get a work item by ID.
    pub async fn get(&self, id: WorkId) -> Result<WorkItem> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// List work items by status, oldest first.
    pub async fn list(&self, statuses: &[Status]) -> Result<Vec<WorkItem>> {
        self.store.scan(statuses).await
    }

    /// Queue snapshot from one requester's point of view.
    pub async fn query_status(&self, requester_id: &str) -> Result<QueueStatus> {
        let active = self
            .store
            .scan(&[Status::Pending, Status::Processing])
            .await?;
        Ok(QueueStatus::from_snapshot(&active, requester_id))
    }

    /// Claim the oldest pending item. Returns None if nothing is pending
    /// (or, with `exclusive_claim`, if an item is already processing).
    pub async fn claim_next(&self) -> Result<Option<WorkItem>> {
        let scope: &[Status] = if self.config.exclusive_claim {
            &[Status::Pending, Status::Processing]
        } else {
            &[Status::Pending]
        };

        loop {
            let candidates = self.store.scan(scope).await?;

            if let Some(busy) = candidates
                .iter()
                .find(|item| item.status == Status::Processing)
            {
                debug!(busy = %busy.id, "claim refused, an item is already processing");
                return Ok(None);
            }

            let Some(next) = candidates.into_iter().next() else {
                return Ok(None);
            };

            let update = StatusUpdate::claimed(Utc::now());
            match self
                .store
                .update_if(next.id, &[Status::Pending], &update)
                .await?
            {
                Some(item) => {
                    record_transition(&item, Status::Pending, Status::Processing);
                    info!(
                        id = %item.id,
                        action = %item.action,
                        requester = %item.requester_id,
                        "work item claimed"
                    );
                    return Ok(Some(item));
                }
                // Another claimer won this item; look again.
                None => debug!(id = %next.id, "lost claim race, rescanning"),
            }
        }
    }

    /// Record the device's outcome for a work item.
    ///
    /// Completing an item that was never claimed still resolves it. An
    /// item that is already terminal is left untouched and returned as is.
    pub async fn complete(
        &self,
        id: WorkId,
        success: bool,
        reason: Option<String>,
    ) -> Result<WorkItem> {
        let update = StatusUpdate::resolved(success, reason, Utc::now());
        let mut current = self.get(id).await?;

        // CAS against the status just read; a lost race re-reads.
        let (from, item) = loop {
            if !current.status.can_transition_to(update.status) {
                warn!(%id, status = %current.status, "completion for an already resolved item ignored");
                return Ok(current);
            }
            match self.store.update_if(id, &[current.status], &update).await? {
                Some(item) => break (current.status, item),
                None => {
                    debug!(%id, status = %current.status, "item changed before completion, re-reading");
                    current = self.get(id).await?;
                }
            }
        };

        if from == Status::Pending {
            warn!(%id, "completion for an item that was never claimed");
        }
        record_transition(&item, from, item.status);
        match item.failure_reason {
            Some(ref reason) => warn!(%id, %reason, "work item failed"),
            None if item.status == Status::Failed => warn!(%id, "work item failed"),
            None => info!(%id, "work item completed"),
        }

        self.notifier.publish(&item);
        Ok(item)
    }

    /// Remove items resolved longer ago than the retention window.
    pub async fn retention_sweep(&self) -> Result<u64> {
        let window = chrono::Duration::from_std(self.config.retention)
            .map_err(|e| Error::Config(format!("retention out of range: {e}")))?;
        let removed = self.store.remove_terminal_before(Utc::now() - window).await?;

        if removed > 0 {
            metrics::retention_removed().add(removed, &[]);
            debug!(removed, "retention sweep removed resolved items");
        }
        Ok(removed)
    }

    /// Submit and wait for the outcome, bounded by `wait_timeout`.
    ///
    /// Returns the completed item; a device-reported failure becomes
    /// `Error::ActuationFailure`.
    pub async fn request(&self, action: i64, requester_id: &str) -> Result<WorkItem> {
        let id = self.submit(action, requester_id).await?;
        let span = start_work_span(Action::new(action)?, id);

        let item = self
            .await_outcome(id, self.config.wait_timeout)
            .instrument(span.clone())
            .await?;
        span.record("work.status", item.status.as_str());

        match item.status {
            Status::Completed => Ok(item),
            _ => Err(Error::ActuationFailure {
                id,
                reason: item.failure_reason,
            }),
        }
    }
}

fn record_transition(item: &WorkItem, from: Status, to: Status) {
    metrics::work_state_transitions().add(
        1,
        &[
            KeyValue::new("from", from.as_str()),
            KeyValue::new("to", to.as_str()),
        ],
    );
    let span = start_work_span(item.action, item.id);
    record_state_transition(&span, from, to);
}
