//! Core data model.
//!
//! A work item is one request for the device to perform a numbered action.
//! It has identity, the requester who asked for it, and lifecycle state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Work Item
// ---------------------------------------------------------------------------

/// A unit of arbitration tracked by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    /// Unique identifier, assigned at submission.
    pub id: WorkId,

    /// Which of the device's discrete operations to perform.
    pub action: Action,

    /// Opaque identifier of the submitter.
    pub requester_id: String,

    /// Current lifecycle state.
    pub status: Status,

    /// Insertion sequence assigned by the store. Breaks `submitted_at` ties.
    pub seq: u64,

    /// FIFO sort key.
    pub submitted_at: DateTime<Utc>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Device-reported reason, set only on `Failed`.
    pub failure_reason: Option<String>,
}

impl WorkItem {
    /// A fresh `Pending` item. The store assigns `seq` on insert.
    pub fn pending(action: Action, requester_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: WorkId::new(),
            action,
            requester_id: requester_id.into(),
            status: Status::Pending,
            seq: 0,
            submitted_at: now,
            processing_started_at: None,
            completed_at: None,
            failure_reason: None,
        }
    }

    /// Apply a field patch. Fields left `None` in the patch are untouched.
    pub fn apply(&mut self, update: &StatusUpdate) {
        self.status = update.status;
        if let Some(at) = update.processing_started_at {
            self.processing_started_at = Some(at);
        }
        if let Some(at) = update.completed_at {
            self.completed_at = Some(at);
        }
        if let Some(ref reason) = update.failure_reason {
            self.failure_reason = Some(reason.clone());
        }
    }

    /// FIFO ordering key: submission time, then insertion sequence.
    pub fn queue_key(&self) -> (DateTime<Utc>, u64) {
        (self.submitted_at, self.seq)
    }
}

/// Newtype for work item IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkId(pub Uuid);

impl WorkId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for WorkId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(WorkId)
            .map_err(|_| Error::NotFound(format!("work item {s}")))
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// A device action number, always within `Action::MIN..=Action::MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Action(u8);

impl Action {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 8;

    pub fn new(n: i64) -> Result<Self> {
        if (i64::from(Self::MIN)..=i64::from(Self::MAX)).contains(&n) {
            Ok(Self(n as u8))
        } else {
            Err(Error::InvalidInput(format!(
                "action must be between {} and {}, got {n}",
                Self::MIN,
                Self::MAX
            )))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Action {
    type Error = Error;

    fn try_from(n: i64) -> Result<Self> {
        Self::new(n)
    }
}

impl From<Action> for i64 {
    fn from(action: Action) -> Self {
        i64::from(action.0)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle state of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Waiting in line for the device.
    Pending,
    /// Claimed by the device. At most one item is here at a time.
    Processing,
    /// Device reported success. Terminal.
    Completed,
    /// Device reported failure. Terminal.
    Failed,
}

impl Status {
    pub const ALL: [Status; 4] = [
        Status::Pending,
        Status::Processing,
        Status::Completed,
        Status::Failed,
    ];

    /// Can transition from self to `to`?
    ///
    /// `Pending -> Completed/Failed` is accepted so that a completion
    /// reported for an unclaimed item still resolves its waiter.
    pub fn can_transition_to(self, to: Status) -> bool {
        use Status::*;
        matches!(
            (self, to),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Pending, Completed)
                | (Pending, Failed)
        )
    }

    /// Is this a terminal state?
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed | Status::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Processing => "processing",
            Status::Completed => "completed",
            Status::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Status::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| Error::Other(format!("unknown status: {s}")))
    }
}

// ---------------------------------------------------------------------------
// Status update
// ---------------------------------------------------------------------------

/// Field patch written by the engine on a state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: Status,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

impl StatusUpdate {
    pub fn claimed(at: DateTime<Utc>) -> Self {
        Self {
            status: Status::Processing,
            processing_started_at: Some(at),
            completed_at: None,
            failure_reason: None,
        }
    }

    pub fn resolved(success: bool, reason: Option<String>, at: DateTime<Utc>) -> Self {
        Self {
            status: if success {
                Status::Completed
            } else {
                Status::Failed
            },
            processing_started_at: None,
            completed_at: Some(at),
            failure_reason: if success { None } else { reason },
        }
    }
}

// ---------------------------------------------------------------------------
// Queue status
// ---------------------------------------------------------------------------

/// Snapshot of the queue as seen by one requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub is_processing: bool,
    pub queue_length: usize,
    pub current_requester_id: Option<String>,
    /// 1-based rank of the requester's oldest pending item, 0 if none.
    pub your_position: usize,
}

impl QueueStatus {
    /// Compute from `Pending` and `Processing` items taken in one read.
    pub fn from_snapshot(items: &[WorkItem], requester_id: &str) -> Self {
        let mut pending: Vec<&WorkItem> = items
            .iter()
            .filter(|item| item.status == Status::Pending)
            .collect();
        pending.sort_by_key(|item| item.queue_key());

        let processing = items.iter().find(|item| item.status == Status::Processing);

        let your_position = pending
            .iter()
            .position(|item| item.requester_id == requester_id)
            .map_or(0, |idx| idx + 1);

        Self {
            is_processing: processing.is_some(),
            queue_length: pending.len(),
            current_requester_id: processing.map(|item| item.requester_id.clone()),
            your_position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn action_range_is_enforced() {
        assert!(Action::new(0).is_err());
        assert!(Action::new(9).is_err());
        assert!(Action::new(-3).is_err());
        assert_eq!(Action::new(1).unwrap().get(), 1);
        assert_eq!(Action::new(8).unwrap().get(), 8);
    }

    #[test]
    fn action_deserializes_through_validation() {
        let ok: Action = serde_json::from_str("3").unwrap();
        assert_eq!(ok.get(), 3);
        assert!(serde_json::from_str::<Action>("9").is_err());
    }

    #[test]
    fn transitions_are_one_directional() {
        use Status::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(!Processing.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Processing));
        assert!(!Completed.can_transition_to(Pending));
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in Status::ALL {
            assert_eq!(status.as_str().parse::<Status>().unwrap(), status);
        }
        assert!("dead".parse::<Status>().is_err());
    }

    #[test]
    fn position_counts_only_earlier_pending_items() {
        let t0 = Utc::now();
        let mut a = WorkItem::pending(Action::new(1).unwrap(), "a", t0);
        a.seq = 1;
        let mut b = WorkItem::pending(Action::new(2).unwrap(), "b", t0 + Duration::milliseconds(1));
        b.seq = 2;
        let mut c = WorkItem::pending(Action::new(3).unwrap(), "c", t0 + Duration::milliseconds(2));
        c.seq = 3;
        c.status = Status::Processing;

        let status = QueueStatus::from_snapshot(&[b.clone(), a.clone(), c], "b");
        assert!(status.is_processing);
        assert_eq!(status.queue_length, 2);
        assert_eq!(status.current_requester_id.as_deref(), Some("c"));
        assert_eq!(status.your_position, 2);

        let nobody = QueueStatus::from_snapshot(&[a, b], "z");
        assert_eq!(nobody.your_position, 0);
        assert!(!nobody.is_processing);
    }

    #[test]
    fn ties_break_on_sequence() {
        let t0 = Utc::now();
        let mut first = WorkItem::pending(Action::new(1).unwrap(), "first", t0);
        first.seq = 1;
        let mut second = WorkItem::pending(Action::new(1).unwrap(), "second", t0);
        second.seq = 2;

        let status = QueueStatus::from_snapshot(&[second, first], "first");
        assert_eq!(status.your_position, 1);
    }

    #[test]
    fn resolved_update_drops_reason_on_success() {
        let now = Utc::now();
        let ok = StatusUpdate::resolved(true, Some("ignored".into()), now);
        assert_eq!(ok.status, Status::Completed);
        assert_eq!(ok.failure_reason, None);

        let failed = StatusUpdate::resolved(false, Some("jammed".into()), now);
        assert_eq!(failed.status, Status::Failed);
        assert_eq!(failed.failure_reason.as_deref(), Some("jammed"));
        assert_eq!(failed.completed_at, Some(now));
    }
}
