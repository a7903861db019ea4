use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Sender, TrySendError};
use tracing::{debug, info, warn};

use crate::dispatch::{ResultKey, ResultValue, Task, TaskExecutor, TaskRunner, Workload};
use crate::error::{DispatchError, DispatchResult};

/// Pool of named OS worker threads fed through a bounded crossbeam channel
///
/// The channel holds at most `workers` tasks, matching the control node's
/// concurrency ceiling, so a full channel means the ceiling was violated.
pub struct ThreadPoolExecutor<A> {
    sender: Option<Sender<Task<A>>>,
    workers: Vec<JoinHandle<()>>,
    cancelled: Arc<AtomicBool>,
}

impl<A> ThreadPoolExecutor<A>
where
    A: Workload + Send + 'static,
{
    pub fn new<K, V>(runner: Arc<TaskRunner<A, K, V>>, workers: usize) -> DispatchResult<Self>
    where
        K: ResultKey,
        V: ResultValue,
    {
        if workers == 0 {
            return Err(DispatchError::invalid_configuration(
                "concurrency_limit",
                "thread pool needs at least one worker",
            ));
        }

        let (sender, receiver) = channel::bounded::<Task<A>>(workers);
        let cancelled = Arc::new(AtomicBool::new(false));

        let handles = (0..workers)
            .map(|index| {
                let receiver = receiver.clone();
                let runner = Arc::clone(&runner);
                let cancelled = Arc::clone(&cancelled);

                thread::Builder::new()
                    .name(format!("dispatch-worker-{index}"))
                    .spawn(move || {
                        while let Ok(task) = receiver.recv() {
                            if cancelled.load(Ordering::Acquire) {
                                debug!(task_no = task.task_no, "🏊 POOL: Run aborted, skipping task");
                                continue;
                            }
                            runner.run(task);
                        }
                    })
                    .map_err(|e| DispatchError::transport("spawn_worker", e.to_string()))
            })
            .collect::<DispatchResult<Vec<_>>>()?;

        info!(workers = workers, "🏊 POOL: Started worker threads");

        Ok(Self {
            sender: Some(sender),
            workers: handles,
            cancelled,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl<A> TaskExecutor<A> for ThreadPoolExecutor<A>
where
    A: Workload + Send + 'static,
{
    fn name(&self) -> &'static str {
        "threads"
    }

    fn submit(&mut self, task: Task<A>) -> DispatchResult<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| DispatchError::transport("submit", "thread pool is shut down"))?;

        sender.try_send(task).map_err(|e| match e {
            TrySendError::Full(task) => DispatchError::transport(
                "submit",
                format!("worker queue full at task {}", task.task_no),
            ),
            TrySendError::Disconnected(task) => DispatchError::transport(
                "submit",
                format!("worker threads gone at task {}", task.task_no),
            ),
        })
    }

    fn queued(&self) -> usize {
        self.sender.as_ref().map_or(0, |sender| sender.len())
    }

    fn abort(&mut self) {
        self.cancelled.store(true, Ordering::Release);
        self.sender.take();
        // running tasks finish on their own; nobody waits for them
        self.workers.clear();
    }

    fn shutdown(&mut self) {
        self.sender.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("🏊 POOL: Worker thread panicked outside of a task");
            }
        }
        debug!("🏊 POOL: Worker threads joined");
    }
}

impl<A> Drop for ThreadPoolExecutor<A> {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.cancelled.store(true, Ordering::Release);
            self.sender.take();
        }
    }
}
