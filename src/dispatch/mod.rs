//! # Task Dispatch
//!
//! Worker pool and dispatcher. Tasks run either sequentially on the control
//! node or on a pool of OS threads bounded by the concurrency limit; both
//! strategies produce the same accumulated result.

pub mod dispatcher;
pub mod executor;
pub mod sequential;
pub mod task;
pub mod thread_pool;

pub use dispatcher::{RunOutcome, RunSummary, TaskDispatcher};
pub use executor::TaskExecutor;
pub use sequential::SequentialExecutor;
pub use task::{
    PartialResult, ResultKey, ResultValue, Task, TaskOutcome, TaskRunner, WorkFunction, Workload,
};
pub use thread_pool::ThreadPoolExecutor;
