//! In-process transient store.
//!
//! A single write lock guards the whole collection, so every conditional
//! update is atomic with respect to every other mutation.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{Durability, WorkItemStore};
use crate::error::{Error, Result};
use crate::model::{Status, StatusUpdate, WorkId, WorkItem};

#[derive(Default)]
struct Inner {
    items: HashMap<WorkId, WorkItem>,
    next_seq: u64,
}

/// Memory-backed store. Everything is lost when the process exits.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkItemStore for MemoryStore {
    async fn insert(&self, mut item: WorkItem) -> Result<WorkItem> {
        let mut inner = self.inner.write().await;
        if inner.items.contains_key(&item.id) {
            return Err(Error::Other(format!("duplicate work item id {}", item.id)));
        }
        inner.next_seq += 1;
        item.seq = inner.next_seq;
        inner.items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn get(&self, id: WorkId) -> Result<Option<WorkItem>> {
        Ok(self.inner.read().await.items.get(&id).cloned())
    }

    async fn scan(&self, statuses: &[Status]) -> Result<Vec<WorkItem>> {
        let inner = self.inner.read().await;
        let mut items: Vec<WorkItem> = inner
            .items
            .values()
            .filter(|item| statuses.contains(&item.status))
            .cloned()
            .collect();
        items.sort_by_key(|item| item.queue_key());
        Ok(items)
    }

    async fn update_if(
        &self,
        id: WorkId,
        expected: &[Status],
        update: &StatusUpdate,
    ) -> Result<Option<WorkItem>> {
        let mut inner = self.inner.write().await;
        let Some(item) = inner.items.get_mut(&id) else {
            return Ok(None);
        };
        if !expected.contains(&item.status) {
            return Ok(None);
        }
        item.apply(update);
        Ok(Some(item.clone()))
    }

    async fn remove_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let before = inner.items.len();
        inner.items.retain(|_, item| {
            !(item.status.is_terminal() && item.completed_at.is_some_and(|at| at < cutoff))
        });
        Ok((before - inner.items.len()) as u64)
    }

    fn durability(&self) -> Durability {
        Durability::Transient
    }
}
