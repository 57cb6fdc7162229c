//! Work item operations against Postgres.
//!
//! Claims and completions are compare-and-set updates: the `WHERE status =
//! ANY(...)` guard makes a racing second writer see zero rows instead of
//! overwriting the first.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::*;
use crate::storage::{Durability, WorkItemStore};

const COLUMNS: &str = "id, seq, action, requester_id, status, submitted_at, processing_started_at, completed_at, failure_reason";

fn status_names(statuses: &[Status]) -> Vec<String> {
    statuses.iter().map(|s| s.to_string()).collect()
}

#[async_trait]
impl WorkItemStore for super::Db {
    async fn insert(&self, mut item: WorkItem) -> Result<WorkItem> {
        let seq: (i64,) = sqlx::query_as(
            "INSERT INTO work_items (id, action, requester_id, status, submitted_at, processing_started_at, completed_at, failure_reason)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING seq",
        )
        .bind(item.id.0)
        .bind(i16::from(item.action.get()))
        .bind(&item.requester_id)
        .bind(item.status.to_string())
        .bind(item.submitted_at)
        .bind(item.processing_started_at)
        .bind(item.completed_at)
        .bind(&item.failure_reason)
        .fetch_one(&self.pool)
        .await?;

        item.seq = seq.0 as u64;
        Ok(item)
    }

    async fn get(&self, id: WorkId) -> Result<Option<WorkItem>> {
        let row: Option<WorkItemRow> =
            sqlx::query_as(&format!("SELECT {COLUMNS} FROM work_items WHERE id = $1"))
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;

        row.map(WorkItemRow::try_into_work_item).transpose()
    }

    async fn scan(&self, statuses: &[Status]) -> Result<Vec<WorkItem>> {
        let rows: Vec<WorkItemRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM work_items
             WHERE status = ANY($1)
             ORDER BY submitted_at ASC, seq ASC"
        ))
        .bind(status_names(statuses))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(WorkItemRow::try_into_work_item)
            .collect()
    }

    async fn update_if(
        &self,
        id: WorkId,
        expected: &[Status],
        update: &StatusUpdate,
    ) -> Result<Option<WorkItem>> {
        let row: Option<WorkItemRow> = sqlx::query_as(&format!(
            "UPDATE work_items SET
                status = $1,
                processing_started_at = COALESCE($2, processing_started_at),
                completed_at = COALESCE($3, completed_at),
                failure_reason = COALESCE($4, failure_reason)
             WHERE id = $5 AND status = ANY($6)
             RETURNING {COLUMNS}"
        ))
        .bind(update.status.to_string())
        .bind(update.processing_started_at)
        .bind(update.completed_at)
        .bind(&update.failure_reason)
        .bind(id.0)
        .bind(status_names(expected))
        .fetch_optional(&self.pool)
        .await?;

        row.map(WorkItemRow::try_into_work_item).transpose()
    }

    async fn remove_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let removed = sqlx::query(
            "DELETE FROM work_items
             WHERE status IN ('completed', 'failed') AND completed_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(removed)
    }

    fn durability(&self) -> Durability {
        Durability::Durable
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct WorkItemRow {
    id: Uuid,
    seq: i64,
    action: i16,
    requester_id: String,
    status: String,
    submitted_at: DateTime<Utc>,
    processing_started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    failure_reason: Option<String>,
}

impl WorkItemRow {
    fn try_into_work_item(self) -> Result<WorkItem> {
        let action = Action::new(i64::from(self.action))
            .map_err(|e| Error::Other(format!("corrupt row {}: {e}", self.id)))?;

        Ok(WorkItem {
            id: WorkId(self.id),
            action,
            requester_id: self.requester_id,
            status: self.status.parse()?,
            seq: self.seq as u64,
            submitted_at: self.submitted_at,
            processing_started_at: self.processing_started_at,
            completed_at: self.completed_at,
            failure_reason: self.failure_reason,
        })
    }
}
