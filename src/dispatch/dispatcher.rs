//! # Task Dispatcher
//!
//! Entry point of an orchestrated run. Collects task arguments, picks the
//! execution strategy, opens the run's completion channel and hands
//! everything to a [`CompletionTracker`].
//!
//! ```rust,no_run
//! use dispatch_core::prelude::*;
//!
//! # async fn example() -> DispatchResult<()> {
//! let items = (0..100).map(|i| WorkItem::new(1.0, i % 4, i)).collect::<Result<Vec<_>, _>>()?;
//! let config = DispatchConfig::with_concurrency_limit(4);
//! let max_weight = config.resolve_max_block_weight(100.0)?;
//!
//! let count = |block: Block<WorkItem<i32, i32>, i32>, _: &Monitor| -> anyhow::Result<PartialResult<i32, u64>> {
//!     Ok([(*block.group_key(), block.len() as u64)].into_iter().collect())
//! };
//!
//! let mut dispatcher = TaskDispatcher::new(config, count)?;
//! dispatcher.submit_all(split_work_items(items, max_weight)?);
//! let outcome = dispatcher.reduce().await?;
//! assert_eq!(outcome.result.get(&0), 25);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use futures::Stream;
use serde::Serialize;
use tracing::debug;

use crate::accumulator::{AccumulatingMap, SharedAccumulator};
use crate::config::{AccumulationStrategy, DispatchConfig, ExecutionMode};
use crate::constants::events;
use crate::dispatch::{
    ResultKey, ResultValue, SequentialExecutor, TaskExecutor, TaskRunner, ThreadPoolExecutor,
    WorkFunction, Workload,
};
use crate::error::DispatchResult;
use crate::logging::log_run_operation;
use crate::monitor::{Monitor, ScopeStats};
use crate::signaling::{CompletionChannel, InMemoryBroker, RunId, SignalBroker};
use crate::tracker::control_loop::TrackerSetup;
use crate::tracker::{Completion, CompletionTracker, PendingWork, TrackerState};

/// Result of a successful run
#[derive(Debug)]
pub struct RunOutcome<K, V>
where
    K: ResultKey,
    V: ResultValue,
{
    pub result: AccumulatingMap<K, V>,
    pub summary: RunSummary,
}

/// Bookkeeping reported alongside the result
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub state: TrackerState,
    pub execution_mode: ExecutionMode,
    pub concurrency_limit: usize,
    pub tasks_submitted: u64,
    pub units_computed: u64,
    pub units_total: u64,
    pub peak_in_flight: usize,
    pub duplicates_discarded: u64,
    pub elapsed_ms: u64,
    pub timings: Vec<ScopeStats>,
}

/// Bounded-concurrency dispatcher for one run
pub struct TaskDispatcher<A, K, V>
where
    K: ResultKey,
    V: ResultValue,
{
    config: DispatchConfig,
    work_fn: Arc<dyn WorkFunction<A, K, V>>,
    broker: Option<Arc<dyn SignalBroker>>,
    monitor: Monitor,
    run_id: RunId,
    queued: Vec<A>,
}

impl<A, K, V> TaskDispatcher<A, K, V>
where
    A: Workload + Send + 'static,
    K: ResultKey,
    V: ResultValue,
{
    /// Validates the configuration; nothing is submitted on error
    pub fn new<F>(config: DispatchConfig, work_fn: F) -> DispatchResult<Self>
    where
        F: WorkFunction<A, K, V> + 'static,
    {
        Self::new_shared(config, Arc::new(work_fn))
    }

    pub fn new_shared(
        config: DispatchConfig,
        work_fn: Arc<dyn WorkFunction<A, K, V>>,
    ) -> DispatchResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            work_fn,
            broker: None,
            monitor: Monitor::new("dispatch"),
            run_id: RunId::generate(),
            queued: Vec::new(),
        })
    }

    /// Publish signals through `broker` instead of a private in-memory one
    pub fn with_broker(mut self, broker: Arc<dyn SignalBroker>) -> Self {
        self.broker = Some(broker);
        self
    }

    pub fn with_monitor(mut self, monitor: Monitor) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<RunId>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Tasks waiting for the run to start
    pub fn queued(&self) -> usize {
        self.queued.len()
    }

    /// Enqueue one task; execution starts with `reduce`, `execute` or `stream`
    pub fn submit(&mut self, args: A) {
        log_run_operation(
            events::TASK_SUBMITTED,
            self.run_id.as_str(),
            Some(self.queued.len() as u64),
            "queued",
            None,
        );
        self.queued.push(args);
    }

    pub fn submit_all<I>(&mut self, args: I)
    where
        I: IntoIterator<Item = A>,
    {
        for arg in args {
            self.submit(arg);
        }
    }

    /// Run every submitted task and merge their partial results
    pub async fn reduce(self) -> DispatchResult<RunOutcome<K, V>> {
        let total = self.queued.iter().map(Workload::units).sum();
        self.execute(std::iter::empty(), total).await
    }

    /// Run submitted tasks, then `pending` lazily, until `total` units are
    /// acknowledged
    pub async fn execute<I>(self, pending: I, total: u64) -> DispatchResult<RunOutcome<K, V>>
    where
        I: IntoIterator<Item = A>,
        I::IntoIter: Send + 'static,
    {
        self.start(pending, total).await?.run().await
    }

    /// Like `execute`, delivering each acknowledged task as it happens
    pub async fn stream<I>(
        self,
        pending: I,
        total: u64,
    ) -> DispatchResult<impl Stream<Item = DispatchResult<Completion<K, V>>>>
    where
        I: IntoIterator<Item = A>,
        I::IntoIter: Send + 'static,
    {
        Ok(self.start(pending, total).await?.into_stream())
    }

    /// Build the control loop without driving it
    pub async fn start<I>(self, pending: I, total: u64) -> DispatchResult<CompletionTracker<A, K, V>>
    where
        I: IntoIterator<Item = A>,
        I::IntoIter: Send + 'static,
    {
        let pending = pending.into_iter();
        let limit = self.config.concurrency_limit;
        let expected_tasks = pending
            .size_hint()
            .1
            .map(|upper| upper + self.queued.len());
        let execution_mode = self.config.execution_mode.resolve(limit, expected_tasks);

        let broker = self.broker.unwrap_or_else(|| {
            Arc::new(InMemoryBroker::new(self.config.signaling.exchange.clone()))
        });
        let channel =
            CompletionChannel::open(broker, self.run_id.clone(), &self.config.signaling).await?;

        let shared = match self.config.accumulation {
            AccumulationStrategy::InWorker => Some(SharedAccumulator::new()),
            AccumulationStrategy::ControlNode => None,
        };

        let (results_tx, results_rx) = crossbeam::channel::unbounded();
        let runner = Arc::new(TaskRunner::new(
            self.work_fn,
            channel.notifier(),
            results_tx,
            shared.clone(),
        ));

        let executor: Box<dyn TaskExecutor<A>> = match execution_mode {
            ExecutionMode::Threads => Box::new(ThreadPoolExecutor::new(runner, limit)?),
            ExecutionMode::Sequential | ExecutionMode::Auto => {
                Box::new(SequentialExecutor::new(runner))
            }
        };

        debug!(
            run_id = %self.run_id,
            queued = self.queued.len(),
            expected_tasks = ?expected_tasks,
            execution_mode = %execution_mode,
            "🚀 DISPATCH: Run prepared"
        );

        let pending: PendingWork<A> = Box::new(self.queued.into_iter().chain(pending));

        Ok(CompletionTracker::new(TrackerSetup {
            run_id: self.run_id,
            execution_mode,
            concurrency_limit: limit,
            executor,
            pending,
            total,
            channel,
            results: results_rx,
            shared,
            monitor: self.monitor,
        }))
    }
}

impl<A, K, V> std::fmt::Debug for TaskDispatcher<A, K, V>
where
    K: ResultKey,
    V: ResultValue,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDispatcher")
            .field("run_id", &self.run_id)
            .field("config", &self.config)
            .field("queued", &self.queued.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DispatchError;
    use crate::dispatch::PartialResult;

    struct Units(u64);

    impl Workload for Units {
        fn units(&self) -> u64 {
            self.0
        }

        fn label(&self) -> String {
            format!("units({})", self.0)
        }
    }

    fn tally(args: Units, _monitor: &Monitor) -> anyhow::Result<PartialResult<&'static str, u64>> {
        Ok([("tasks", 1), ("units", args.0)].into_iter().collect())
    }

    #[test]
    fn test_invalid_configuration_rejected_up_front() {
        let result = TaskDispatcher::new(DispatchConfig::with_concurrency_limit(0), tally);
        assert!(matches!(
            result,
            Err(DispatchError::InvalidConfiguration { .. })
        ));
    }

    #[tokio::test]
    async fn test_reduce_sequential() {
        let config = DispatchConfig {
            execution_mode: ExecutionMode::Sequential,
            ..DispatchConfig::with_concurrency_limit(2)
        };
        let mut dispatcher = TaskDispatcher::new(config, tally).unwrap().with_run_id(11u64);
        dispatcher.submit_all([Units(2), Units(1), Units(2)]);
        assert_eq!(dispatcher.queued(), 3);

        let outcome = dispatcher.reduce().await.unwrap();
        assert_eq!(outcome.result.get("tasks"), 3);
        assert_eq!(outcome.result.get("units"), 5);
        assert_eq!(outcome.summary.run_id, RunId::from(11u64));
        assert_eq!(outcome.summary.state, TrackerState::Done);
        assert_eq!(outcome.summary.execution_mode, ExecutionMode::Sequential);
        assert_eq!(outcome.summary.units_total, 5);
        assert!(outcome.summary.peak_in_flight <= 2);
    }

    #[tokio::test]
    async fn test_auto_mode_resolution() {
        let mut single = TaskDispatcher::new(DispatchConfig::with_concurrency_limit(4), tally).unwrap();
        single.submit(Units(1));
        let outcome = single.reduce().await.unwrap();
        assert_eq!(outcome.summary.execution_mode, ExecutionMode::Sequential);

        let mut many = TaskDispatcher::new(DispatchConfig::with_concurrency_limit(4), tally).unwrap();
        many.submit_all((0..8).map(|_| Units(1)));
        let outcome = many.reduce().await.unwrap();
        assert_eq!(outcome.summary.execution_mode, ExecutionMode::Threads);
        assert_eq!(outcome.result.get("units"), 8);
    }

    #[tokio::test]
    async fn test_empty_run_completes_immediately() {
        let dispatcher = TaskDispatcher::new(DispatchConfig::with_concurrency_limit(2), tally).unwrap();
        let outcome = dispatcher.reduce().await.unwrap();

        assert!(outcome.result.is_empty());
        assert_eq!(outcome.summary.tasks_submitted, 0);
        assert_eq!(outcome.summary.state, TrackerState::Done);
    }

    #[tokio::test]
    async fn test_summary_serializes() {
        let mut dispatcher = TaskDispatcher::new(DispatchConfig::with_concurrency_limit(1), tally)
            .unwrap()
            .with_run_id("calc-1");
        dispatcher.submit(Units(3));

        let outcome = dispatcher.reduce().await.unwrap();
        let json = serde_json::to_value(&outcome.summary).unwrap();
        assert_eq!(json["run_id"], serde_json::json!("calc-1"));
        assert_eq!(json["state"], serde_json::json!("done"));
        assert_eq!(json["units_computed"], serde_json::json!(3));
        assert_eq!(json["timings"][0]["name"], serde_json::json!("dispatch/task"));
    }
}
