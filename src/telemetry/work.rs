//! Work item span helpers.

use tracing::Span;

use crate::model::{Action, Status, WorkId};

/// Start a span covering one requester's submit-and-wait.
///
/// `work.status` is declared empty and filled in by [`record_state_transition`].
pub fn start_work_span(action: Action, work_id: WorkId) -> Span {
    tracing::info_span!(
        "work.request",
        "work.action" = action.get(),
        "work.id" = %work_id,
        "work.status" = tracing::field::Empty,
    )
}

/// Record a state transition on the given span.
pub fn record_state_transition(span: &Span, from: Status, to: Status) {
    span.record("work.status", to.as_str());
    span.in_scope(|| {
        tracing::info!(from = from.as_str(), to = to.as_str(), "state_transition");
    });
}
