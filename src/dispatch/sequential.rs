use std::collections::VecDeque;
use std::sync::Arc;

use tracing::debug;

use crate::dispatch::{ResultKey, ResultValue, Task, TaskExecutor, TaskRunner, Workload};
use crate::error::DispatchResult;

/// In-process executor running one task at a time on the control node
///
/// `submit` only queues; the task runs when the control loop calls
/// [`TaskExecutor::drive`] right before it waits for the next signal.
pub struct SequentialExecutor<A, K, V>
where
    K: ResultKey,
    V: ResultValue,
{
    runner: Arc<TaskRunner<A, K, V>>,
    queue: VecDeque<Task<A>>,
    closed: bool,
}

impl<A, K, V> SequentialExecutor<A, K, V>
where
    A: Workload,
    K: ResultKey,
    V: ResultValue,
{
    pub fn new(runner: Arc<TaskRunner<A, K, V>>) -> Self {
        Self {
            runner,
            queue: VecDeque::new(),
            closed: false,
        }
    }
}

impl<A, K, V> TaskExecutor<A> for SequentialExecutor<A, K, V>
where
    A: Workload + Send,
    K: ResultKey,
    V: ResultValue,
{
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn submit(&mut self, task: Task<A>) -> DispatchResult<()> {
        if self.closed {
            debug!(task_no = task.task_no, "🧵 SEQUENTIAL: Executor closed, task dropped");
            return Ok(());
        }
        self.queue.push_back(task);
        Ok(())
    }

    fn drive(&mut self) {
        if let Some(task) = self.queue.pop_front() {
            self.runner.run(task);
        }
    }

    fn queued(&self) -> usize {
        self.queue.len()
    }

    fn abort(&mut self) {
        self.closed = true;
        self.queue.clear();
    }

    fn shutdown(&mut self) {
        self.closed = true;
        while let Some(task) = self.queue.pop_front() {
            self.runner.run(task);
        }
    }
}
