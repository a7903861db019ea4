//! # Task Executors
//!
//! Execution strategies behind the dispatcher. Both report through the same
//! [`TaskRunner`](crate::dispatch::TaskRunner) so the control node cannot tell
//! them apart beyond latency.

use crate::error::DispatchResult;
use crate::dispatch::Task;

/// A strategy for running submitted tasks
pub trait TaskExecutor<A>: Send {
    fn name(&self) -> &'static str;

    /// Hand a task over for execution; never blocks on the task itself
    fn submit(&mut self, task: Task<A>) -> DispatchResult<()>;

    /// Give queued work a chance to run before the control node waits for
    /// the next signal. Executors with their own threads do nothing here.
    fn drive(&mut self) {}

    /// Tasks accepted but not yet started
    fn queued(&self) -> usize;

    /// Drop queued tasks and stop accepting new ones; running tasks are
    /// abandoned and their results discarded
    fn abort(&mut self);

    /// Stop accepting tasks and wait for workers to finish
    fn shutdown(&mut self);
}
