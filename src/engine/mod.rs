//! Queue engine: FIFO admission, the single-active-worker rule, outcome
//! waits, and retention of resolved items.

pub mod queue;
pub mod retention;
pub mod waiter;

pub use queue::{EngineConfig, QueueEngine};
pub use retention::RetentionSweeper;
pub use waiter::Notifier;
