//! # System Constants
//!
//! Defaults and naming formats shared by the dispatcher, the completion
//! signaling channel and the configuration loader.

/// Default exchange completion signals are published to
pub const DEFAULT_EXCHANGE: &str = "dispatch_tasks";

/// Default prefix of per-run routing keys (`run.<run_id>.tasks`)
pub const DEFAULT_ROUTING_KEY_PREFIX: &str = "run";

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "DISPATCH";

/// Separator between nested keys in environment overrides
pub const ENV_SEPARATOR: &str = "__";

/// Environment variable naming the deployment environment
pub const ENV_NAME_VAR: &str = "DISPATCH_ENV";

/// Block weight used when the total workload weight is zero
pub const ZERO_WEIGHT_FALLBACK: f64 = 1.0;

/// Metadata key set on signals published for failed tasks
pub const FAILURE_METADATA_KEY: &str = "error";

/// Run lifecycle events emitted through structured logging
pub mod events {
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_COMPLETED: &str = "run.completed";
    pub const RUN_FAILED: &str = "run.failed";
    pub const TASK_SUBMITTED: &str = "task.submitted";
    pub const TASK_COMPLETED: &str = "task.completed";
    pub const TASK_FAILED: &str = "task.failed";
    pub const PHASE_STARTED: &str = "phase.started";
    pub const PHASE_COMPLETED: &str = "phase.completed";
}

/// Build the routing key a run's completion signals are published with
pub fn routing_key(prefix: &str, run_id: &str) -> String {
    format!("{prefix}.{run_id}.tasks")
}

/// Build the name of the transient queue consuming a run's signals
pub fn signal_queue_name(prefix: &str, run_id: &str) -> String {
    format!("tasks.{prefix}.{run_id}")
}
