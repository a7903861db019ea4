#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Dispatch Core
//!
//! Orchestration core for large batch calculations: split a weighted
//! workload into bounded blocks, run them with a fixed concurrency ceiling,
//! fold partial results into one aggregate and track completion through an
//! out-of-band signal channel.
//!
//! ## Overview
//!
//! ```text
//! work items ─▶ partition ─▶ TaskDispatcher ─▶ workers ─┬─▶ partial results ─▶ AccumulatingMap
//!                                 ▲                     │
//!                                 └── CompletionTracker ◀┴── completion signals
//! ```
//!
//! The control node fills the executor up to the concurrency limit, then
//! waits for completion signals and submits exactly one new block per
//! acknowledged task until every unit of work is accounted for.
//!
//! ## Module Organization
//!
//! - [`partition`] - Weighted block splitting
//! - [`accumulator`] - Mergeable values and the accumulating map
//! - [`dispatch`] - Work functions, executors and the dispatcher
//! - [`tracker`] - Progress counters and the control-node loop
//! - [`signaling`] - Completion signal messages, broker seam and channel
//! - [`calculation`] - Phase lifecycle around one orchestrated run
//! - [`monitor`] - Timing scopes passed to work functions
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dispatch_core::prelude::*;
//!
//! # async fn example() -> DispatchResult<()> {
//! dispatch_core::logging::init_structured_logging();
//!
//! let config = ConfigManager::load()?.config().clone();
//! let items = vec![
//!     WorkItem::new(2.0, "src-A", 10u32)?,
//!     WorkItem::new(1.0, "src-A", 20u32)?,
//!     WorkItem::new(4.0, "src-B", 30u32)?,
//! ];
//! let max_weight = config.resolve_max_block_weight(7.0)?;
//!
//! let sum = |block: Block<WorkItem<&'static str, u32>, &'static str>,
//!            _monitor: &Monitor|
//!  -> anyhow::Result<PartialResult<&'static str, u64>> {
//!     let total = block.iter().map(|item| u64::from(*item.payload())).sum();
//!     Ok([(*block.group_key(), total)].into_iter().collect())
//! };
//!
//! let mut dispatcher = TaskDispatcher::new(config, sum)?;
//! dispatcher.submit_all(split_work_items(items, max_weight)?);
//! let outcome = dispatcher.reduce().await?;
//!
//! assert_eq!(outcome.result.get("src-A"), 30);
//! # Ok(())
//! # }
//! ```

pub mod accumulator;
pub mod calculation;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod partition;
pub mod signaling;
pub mod tracker;

pub use accumulator::{Accumulate, AccumulatingMap, SharedAccumulator};
pub use calculation::{Calculation, CalculationReport, CalculationRunner};
pub use config::{AccumulationStrategy, ConfigManager, DispatchConfig, ExecutionMode};
pub use dispatch::{PartialResult, RunOutcome, RunSummary, TaskDispatcher, WorkFunction, Workload};
pub use error::{DispatchError, DispatchResult};
pub use monitor::Monitor;
pub use partition::{block_splitter, split_work_items, Block, WorkItem};
pub use signaling::{CompletionSignal, InMemoryBroker, RunId, SignalBroker};
pub use tracker::{Completion, CompletionTracker, ProgressCounters, TrackerState};

/// Everything needed to define and run a dispatch
pub mod prelude {
    pub use crate::accumulator::{Accumulate, AccumulatingMap};
    pub use crate::config::{AccumulationStrategy, ConfigManager, DispatchConfig, ExecutionMode};
    pub use crate::dispatch::{PartialResult, TaskDispatcher, WorkFunction, Workload};
    pub use crate::error::{DispatchError, DispatchResult};
    pub use crate::monitor::Monitor;
    pub use crate::partition::{block_splitter, split_work_items, Block, WorkItem};
}
