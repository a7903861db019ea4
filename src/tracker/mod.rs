//! # Completion Tracking
//!
//! Progress counters, the tracker state machine and the control-node loop
//! that keeps the executor filled until every unit of work is acknowledged.

pub mod control_loop;
pub mod progress;
pub mod state;

pub use control_loop::{Completion, CompletionTracker, PendingWork};
pub use progress::{ProgressCounters, ProgressOverflow};
pub use state::TrackerState;
