//! Work item storage.
//!
//! The engine is the only writer; stores persist what the engine hands them.
//! Any backing works as long as conditional updates are atomic per item.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{Status, StatusUpdate, WorkId, WorkItem};

pub use memory::MemoryStore;

/// Whether items survive a process restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Durability {
    /// Lost on restart.
    Transient,
    Durable,
}

impl std::fmt::Display for Durability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Durability::Transient => f.write_str("transient"),
            Durability::Durable => f.write_str("durable"),
        }
    }
}

/// Storage primitives consumed by the queue engine.
#[async_trait]
pub trait WorkItemStore: Send + Sync {
    /// Insert a new item. Returns it with the store-assigned `seq`.
    async fn insert(&self, item: WorkItem) -> Result<WorkItem>;

    /// Look up by ID.
    async fn get(&self, id: WorkId) -> Result<Option<WorkItem>>;

    /// All items whose status is in `statuses`, oldest first by
    /// `(submitted_at, seq)`. Must read a single consistent snapshot.
    async fn scan(&self, statuses: &[Status]) -> Result<Vec<WorkItem>>;

    /// Compare-and-set: apply `update` only if the item's current status is
    /// in `expected`. Returns the updated item, or `None` if the item is
    /// missing or its status did not match.
    async fn update_if(
        &self,
        id: WorkId,
        expected: &[Status],
        update: &StatusUpdate,
    ) -> Result<Option<WorkItem>>;

    /// Remove terminal items whose `completed_at` is before `cutoff`.
    async fn remove_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    fn durability(&self) -> Durability;
}
