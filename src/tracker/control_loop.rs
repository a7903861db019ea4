//! # Completion Tracker
//!
//! The control-node loop. It fills the executor up to the concurrency limit,
//! then blocks on the completion channel and refills exactly one task per
//! acknowledged signal until `computed == total`.
//!
//! ```text
//! Filling ──▶ Draining ──(computed == total)──▶ Done
//!                │
//!                └──(task failure / anomaly)──▶ Aborted
//! ```
//!
//! The concurrency ceiling is held by a tokio semaphore: every in-flight
//! task owns a permit, released when its signal is acknowledged. The only
//! await point is the channel receive.

use std::collections::HashMap;
use std::iter::Fuse;
use std::sync::Arc;
use std::time::Instant;

use crossbeam::channel::Receiver;
use futures::stream::{self, Stream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, instrument};

use crate::accumulator::{AccumulatingMap, SharedAccumulator};
use crate::config::ExecutionMode;
use crate::constants::events;
use crate::dispatch::{
    PartialResult, ResultKey, ResultValue, RunOutcome, RunSummary, Task, TaskExecutor,
    TaskOutcome, Workload,
};
use crate::error::{DispatchError, DispatchResult};
use crate::logging::log_run_operation;
use crate::monitor::Monitor;
use crate::signaling::{CompletionChannel, RunId};
use crate::tracker::{ProgressCounters, TrackerState};

/// Lazily produced task arguments
pub type PendingWork<A> = Box<dyn Iterator<Item = A> + Send>;

/// One acknowledged task
#[derive(Debug)]
pub struct Completion<K, V>
where
    K: ResultKey,
    V: ResultValue,
{
    pub task_no: u64,
    pub label: String,
    /// Units reported by the completion signal
    pub amount: u64,
    /// Counters after this completion was applied
    pub progress: ProgressCounters,
    /// Partial result; `None` when workers merge into a shared accumulator
    pub partial: Option<PartialResult<K, V>>,
}

struct InFlight {
    label: String,
    _permit: OwnedSemaphorePermit,
}

/// Everything the dispatcher hands over to start a run
pub(crate) struct TrackerSetup<A, K, V>
where
    K: ResultKey,
    V: ResultValue,
{
    pub run_id: RunId,
    pub execution_mode: ExecutionMode,
    pub concurrency_limit: usize,
    pub executor: Box<dyn TaskExecutor<A>>,
    pub pending: PendingWork<A>,
    pub total: u64,
    pub channel: CompletionChannel,
    pub results: Receiver<TaskOutcome<K, V>>,
    pub shared: Option<SharedAccumulator<K, V>>,
    pub monitor: Monitor,
}

/// Control-node loop for one orchestrated run
pub struct CompletionTracker<A, K, V>
where
    K: ResultKey,
    V: ResultValue,
{
    run_id: RunId,
    state: TrackerState,
    execution_mode: ExecutionMode,
    concurrency_limit: usize,
    executor: Box<dyn TaskExecutor<A>>,
    pending: Fuse<PendingWork<A>>,
    permits: Arc<Semaphore>,
    in_flight: HashMap<u64, InFlight>,
    channel: CompletionChannel,
    results: Receiver<TaskOutcome<K, V>>,
    outcomes: HashMap<u64, TaskOutcome<K, V>>,
    progress: ProgressCounters,
    shared: Option<SharedAccumulator<K, V>>,
    monitor: Monitor,
    next_task_no: u64,
    peak_in_flight: usize,
    started: Instant,
}

impl<A, K, V> CompletionTracker<A, K, V>
where
    A: Workload + Send + 'static,
    K: ResultKey,
    V: ResultValue,
{
    pub(crate) fn new(setup: TrackerSetup<A, K, V>) -> Self {
        info!(
            run_id = %setup.run_id,
            total = setup.total,
            concurrency_limit = setup.concurrency_limit,
            execution_mode = %setup.execution_mode,
            executor = setup.executor.name(),
            "🎯 TRACKER: Starting run"
        );
        log_run_operation(events::RUN_STARTED, setup.run_id.as_str(), None, "started", None);

        Self {
            run_id: setup.run_id,
            state: TrackerState::Filling,
            execution_mode: setup.execution_mode,
            concurrency_limit: setup.concurrency_limit,
            executor: setup.executor,
            pending: setup.pending.fuse(),
            permits: Arc::new(Semaphore::new(setup.concurrency_limit)),
            in_flight: HashMap::new(),
            channel: setup.channel,
            results: setup.results,
            outcomes: HashMap::new(),
            progress: ProgressCounters::new(setup.total),
            shared: setup.shared,
            monitor: setup.monitor,
            next_task_no: 0,
            peak_in_flight: 0,
            started: Instant::now(),
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn progress(&self) -> ProgressCounters {
        self.progress
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Shared accumulator workers merge into, under in-worker accumulation
    ///
    /// `None` once the run is aborted.
    pub fn accumulator(&self) -> Option<&SharedAccumulator<K, V>> {
        self.shared.as_ref()
    }

    /// Advance the state machine to the next acknowledged task
    ///
    /// Returns `Ok(None)` once the run is done. The first error aborts the
    /// run; later calls return `Ok(None)`.
    #[instrument(level = "debug", skip(self), fields(run_id = %self.run_id, state = %self.state))]
    pub async fn next_completion(&mut self) -> DispatchResult<Option<Completion<K, V>>> {
        match self.state {
            TrackerState::Done | TrackerState::Aborted => return Ok(None),
            TrackerState::Filling => {
                self.fill()?;
                self.transition(TrackerState::Draining);
            }
            TrackerState::Draining => {}
        }

        if self.in_flight.is_empty() {
            if self.progress.is_complete() {
                self.finish();
                return Ok(None);
            }
            let err = DispatchError::IncompleteRun {
                computed: self.progress.computed(),
                total: self.progress.total(),
            };
            return Err(self.fail(err));
        }

        self.executor.drive();

        let signal = match self.channel.recv().await {
            Ok(signal) => signal,
            Err(e) => return Err(self.fail(e)),
        };
        let task_no = signal.task_no;

        let Some(slot) = self.in_flight.remove(&task_no) else {
            let err = DispatchError::signal_anomaly(
                self.run_id.as_str(),
                format!("signal for task {task_no} which is not in flight"),
            );
            return Err(self.fail(err));
        };

        if signal.failed {
            let cause = match self.take_outcome(task_no) {
                Some(TaskOutcome { result: Err(e), .. }) => e,
                _ => anyhow::anyhow!(signal
                    .error_message()
                    .unwrap_or("task reported failure")
                    .to_string()),
            };
            let err = DispatchError::task_failure(task_no, slot.label, cause);
            return Err(self.fail(err));
        }

        if let Err(overflow) = self.progress.advance(signal.amount) {
            let err = DispatchError::signal_anomaly(
                self.run_id.as_str(),
                format!("task {task_no} {overflow}"),
            );
            return Err(self.fail(err));
        }

        let partial = match self.take_outcome(task_no) {
            Some(TaskOutcome { result: Ok(partial), .. }) => partial,
            Some(TaskOutcome { result: Err(e), .. }) => {
                let err = DispatchError::task_failure(task_no, slot.label, e);
                return Err(self.fail(err));
            }
            None => {
                let err = DispatchError::signal_anomaly(
                    self.run_id.as_str(),
                    format!("completion signal for task {task_no} arrived without its result"),
                );
                return Err(self.fail(err));
            }
        };

        // release the permit before refilling
        let InFlight { label, _permit } = slot;
        drop(_permit);
        self.fill()?;

        debug!(
            run_id = %self.run_id,
            task_no = task_no,
            amount = signal.amount,
            computed = self.progress.computed(),
            total = self.progress.total(),
            in_flight = self.in_flight.len(),
            "🎯 TRACKER: Task acknowledged"
        );

        if self.progress.is_complete() && self.in_flight.is_empty() {
            self.finish();
        }

        Ok(Some(Completion {
            task_no,
            label,
            amount: signal.amount,
            progress: self.progress,
            partial,
        }))
    }

    /// Drive the run to completion and fold every partial result
    pub async fn run(mut self) -> DispatchResult<RunOutcome<K, V>> {
        let mut result = AccumulatingMap::new();

        while let Some(completion) = self.next_completion().await? {
            if let Some(partial) = completion.partial {
                result.merge_map(partial);
            }
        }

        if let Some(shared) = self.shared.take() {
            result.merge_map(shared.into_map());
        }

        Ok(RunOutcome {
            result,
            summary: self.summary(),
        })
    }

    /// Completions as a stream; ends after the last one or the first error
    pub fn into_stream(self) -> impl Stream<Item = DispatchResult<Completion<K, V>>> {
        stream::unfold(Some(self), |tracker| async move {
            let mut tracker = tracker?;
            match tracker.next_completion().await {
                Ok(Some(completion)) => Some((Ok(completion), Some(tracker))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id.clone(),
            state: self.state,
            execution_mode: self.execution_mode,
            concurrency_limit: self.concurrency_limit,
            tasks_submitted: self.next_task_no,
            units_computed: self.progress.computed(),
            units_total: self.progress.total(),
            peak_in_flight: self.peak_in_flight,
            duplicates_discarded: self.channel.duplicates_discarded(),
            elapsed_ms: self.started.elapsed().as_millis() as u64,
            timings: self.monitor.report(),
        }
    }

    /// Submit pending work while permits are available
    fn fill(&mut self) -> DispatchResult<()> {
        while self.state.accepts_submissions() {
            let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
                break;
            };
            let Some(args) = self.pending.next() else {
                break;
            };
            self.submit(args, permit)?;
        }
        Ok(())
    }

    fn submit(&mut self, args: A, permit: OwnedSemaphorePermit) -> DispatchResult<()> {
        let task_no = self.next_task_no;
        self.next_task_no += 1;

        let label = args.label();
        let task = Task {
            task_no,
            args,
            monitor: self.monitor.for_task(task_no),
        };

        if let Err(e) = self.executor.submit(task) {
            return Err(self.fail(e));
        }

        self.in_flight.insert(
            task_no,
            InFlight {
                label,
                _permit: permit,
            },
        );
        self.peak_in_flight = self.peak_in_flight.max(self.in_flight.len());

        debug!(
            run_id = %self.run_id,
            task_no = task_no,
            in_flight = self.in_flight.len(),
            "🎯 TRACKER: Task submitted"
        );
        Ok(())
    }

    /// Outcome for `task_no`, buffering any others that arrived first
    fn take_outcome(&mut self, task_no: u64) -> Option<TaskOutcome<K, V>> {
        if let Some(outcome) = self.outcomes.remove(&task_no) {
            return Some(outcome);
        }
        for outcome in self.results.try_iter() {
            if outcome.task_no == task_no {
                return Some(outcome);
            }
            self.outcomes.insert(outcome.task_no, outcome);
        }
        None
    }

    fn transition(&mut self, next: TrackerState) {
        debug!(
            run_id = %self.run_id,
            from = %self.state,
            to = %next,
            "🎯 TRACKER: State transition"
        );
        self.state = next;
    }

    fn finish(&mut self) {
        self.transition(TrackerState::Done);
        self.executor.shutdown();

        info!(
            run_id = %self.run_id,
            tasks = self.next_task_no,
            units = self.progress.computed(),
            peak_in_flight = self.peak_in_flight,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "✅ TRACKER: Run complete"
        );
        log_run_operation(events::RUN_COMPLETED, self.run_id.as_str(), None, "done", None);
    }

    fn fail(&mut self, err: DispatchError) -> DispatchError {
        self.transition(TrackerState::Aborted);
        self.executor.abort();
        self.in_flight.clear();
        self.outcomes.clear();
        // merges from an aborted run are never exposed
        self.shared = None;

        error!(
            run_id = %self.run_id,
            task_no = err.failed_task_no(),
            computed = self.progress.computed(),
            total = self.progress.total(),
            error = %err,
            "❌ TRACKER: Run aborted"
        );
        let details = err.to_string();
        log_run_operation(
            events::RUN_FAILED,
            self.run_id.as_str(),
            err.failed_task_no(),
            "aborted",
            Some(&details),
        );
        err
    }
}

impl<A, K, V> std::fmt::Debug for CompletionTracker<A, K, V>
where
    K: ResultKey,
    V: ResultValue,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionTracker")
            .field("run_id", &self.run_id)
            .field("state", &self.state)
            .field("progress", &self.progress)
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}
