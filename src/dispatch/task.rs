//! # Tasks and Work Functions
//!
//! A task is one submitted unit of work: a work function, its arguments and
//! a per-task monitor. [`TaskRunner`] executes a task at the worker boundary,
//! hands the outcome back to the control node and then publishes the
//! completion signal.

use std::any::Any;
use std::fmt::Debug;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::Sender;
use tracing::{debug, warn};

use crate::accumulator::{Accumulate, AccumulatingMap, SharedAccumulator};
use crate::monitor::Monitor;
use crate::partition::Block;
use crate::signaling::CompletionNotifier;

/// Task arguments as seen by the dispatcher
pub trait Workload {
    /// Amount of work reported in the completion signal
    fn units(&self) -> u64 {
        1
    }

    /// Identity attached to a failure of this task
    fn label(&self) -> String;
}

impl<T, K: Debug> Workload for Block<T, K> {
    fn units(&self) -> u64 {
        self.len() as u64
    }

    fn label(&self) -> String {
        format!(
            "block #{} group={:?} items={} weight={}",
            self.index(),
            self.group_key(),
            self.len(),
            self.weight()
        )
    }
}

/// Extra domain arguments ride along with the workload
impl<W: Workload, X> Workload for (W, X) {
    fn units(&self) -> u64 {
        self.0.units()
    }

    fn label(&self) -> String {
        self.0.label()
    }
}

/// Keys of a partial result
pub trait ResultKey: Eq + Hash + Clone + Debug + Send + Sync + 'static {}
impl<T> ResultKey for T where T: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

/// Values of a partial result
pub trait ResultValue: Accumulate + Clone + Debug + Send + Sync + 'static {}
impl<T> ResultValue for T where T: Accumulate + Clone + Debug + Send + Sync + 'static {}

/// What one task produces
pub type PartialResult<K, V> = AccumulatingMap<K, V>;

/// The external computation run for every task
///
/// Any `Fn(A, &Monitor) -> anyhow::Result<PartialResult<K, V>>` qualifies.
pub trait WorkFunction<A, K, V>: Send + Sync
where
    K: ResultKey,
    V: ResultValue,
{
    fn call(&self, args: A, monitor: &Monitor) -> anyhow::Result<PartialResult<K, V>>;
}

impl<A, K, V, F> WorkFunction<A, K, V> for F
where
    K: ResultKey,
    V: ResultValue,
    F: Fn(A, &Monitor) -> anyhow::Result<PartialResult<K, V>> + Send + Sync,
{
    fn call(&self, args: A, monitor: &Monitor) -> anyhow::Result<PartialResult<K, V>> {
        self(args, monitor)
    }
}

/// A submitted unit of work
#[derive(Debug)]
pub struct Task<A> {
    pub task_no: u64,
    pub args: A,
    pub monitor: Monitor,
}

/// Result of running one task, handed back to the control node
#[derive(Debug)]
pub struct TaskOutcome<K, V>
where
    K: Eq + Hash,
{
    pub task_no: u64,
    pub units: u64,
    pub label: String,
    /// `Ok(None)` when the partial result was merged in the worker
    pub result: Result<Option<PartialResult<K, V>>, anyhow::Error>,
    pub elapsed: Duration,
}

/// Executes tasks at the worker boundary
pub struct TaskRunner<A, K, V>
where
    K: ResultKey,
    V: ResultValue,
{
    work_fn: Arc<dyn WorkFunction<A, K, V>>,
    notifier: CompletionNotifier,
    results: Sender<TaskOutcome<K, V>>,
    shared: Option<SharedAccumulator<K, V>>,
}

impl<A, K, V> TaskRunner<A, K, V>
where
    A: Workload,
    K: ResultKey,
    V: ResultValue,
{
    pub fn new(
        work_fn: Arc<dyn WorkFunction<A, K, V>>,
        notifier: CompletionNotifier,
        results: Sender<TaskOutcome<K, V>>,
        shared: Option<SharedAccumulator<K, V>>,
    ) -> Self {
        Self {
            work_fn,
            notifier,
            results,
            shared,
        }
    }

    /// Run the task, report its outcome, then signal completion
    ///
    /// The outcome is always sent before the signal is published, so the
    /// control node finds it as soon as the signal arrives.
    pub fn run(&self, task: Task<A>) {
        let Task {
            task_no,
            args,
            monitor,
        } = task;
        let units = args.units();
        let label = args.label();
        let started = Instant::now();

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let _timing = monitor.measure("task");
            self.work_fn.call(args, &monitor)
        }))
        .unwrap_or_else(|payload| {
            Err(anyhow::anyhow!(
                "work function panicked: {}",
                panic_message(payload.as_ref())
            ))
        });

        let result = result.map(|partial| match &self.shared {
            Some(shared) => {
                shared.merge_map(partial);
                None
            }
            None => Some(partial),
        });

        let failure = result.as_ref().err().map(|e| format!("{e:#}"));
        let elapsed = started.elapsed();

        debug!(
            run_id = %self.notifier.run_id(),
            task_no = task_no,
            units = units,
            failed = failure.is_some(),
            elapsed_ms = elapsed.as_millis() as u64,
            "⚙️ WORKER: Task finished"
        );

        let outcome = TaskOutcome {
            task_no,
            units,
            label,
            result,
            elapsed,
        };
        if self.results.send(outcome).is_err() {
            debug!(task_no = task_no, "⚙️ WORKER: Control node gone, outcome discarded");
        }

        let published = match failure {
            Some(error) => self.notifier.signal_failed(task_no, error),
            None => self.notifier.signal_completed(task_no, units),
        };
        if let Err(e) = published {
            warn!(task_no = task_no, error = %e, "⚙️ WORKER: Failed to publish completion signal");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
