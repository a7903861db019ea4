//! # Dispatch Error Types
//!
//! Structured error handling for block splitting, task dispatch and completion
//! tracking. Every error raised by a worker is re-raised in the control loop;
//! nothing here is retried automatically.

use thiserror::Error;

/// Errors surfaced by an orchestrated run
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Rejected before any task is submitted
    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    /// A work function returned an error or panicked
    #[error("Task {task_no} failed ({label}): {source}")]
    TaskFailure {
        task_no: u64,
        label: String,
        #[source]
        source: anyhow::Error,
    },

    /// Duplicate, unknown or overflowing completion signal
    #[error("Signal delivery anomaly in run {run_id}: {reason}")]
    SignalDeliveryAnomaly { run_id: String, reason: String },

    /// All work was acknowledged but the counters never met
    #[error("Run finished with {computed} of {total} units computed")]
    IncompleteRun { computed: u64, total: u64 },

    #[error("No completion signal received for run {run_id} within {timeout_ms}ms")]
    SignalTimeout { run_id: String, timeout_ms: u64 },

    #[error("Signal transport error: {operation}: {message}")]
    Transport { operation: String, message: String },

    #[error("Signal serialization error: {message}")]
    SignalSerialization { message: String },

    #[error("Configuration loading failed: {message}")]
    ConfigLoad { message: String },

    #[error("Calculation phase {phase} failed: {message}")]
    Phase { phase: String, message: String },
}

impl DispatchError {
    /// Create an invalid configuration error
    pub fn invalid_configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a task failure carrying the failing task's identity
    pub fn task_failure(task_no: u64, label: impl Into<String>, source: anyhow::Error) -> Self {
        Self::TaskFailure {
            task_no,
            label: label.into(),
            source,
        }
    }

    /// Create a signal delivery anomaly
    pub fn signal_anomaly(run_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SignalDeliveryAnomaly {
            run_id: run_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a transport error
    pub fn transport(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a calculation phase error
    pub fn phase(phase: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Phase {
            phase: phase.into(),
            message: message.into(),
        }
    }

    /// Whether the error was raised by a work function
    pub fn is_task_failure(&self) -> bool {
        matches!(self, Self::TaskFailure { .. })
    }

    /// Task number of the failing task, if any
    pub fn failed_task_no(&self) -> Option<u64> {
        match self {
            Self::TaskFailure { task_no, .. } => Some(*task_no),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::SignalSerialization {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for DispatchError {
    fn from(err: config::ConfigError) -> Self {
        Self::ConfigLoad {
            message: err.to_string(),
        }
    }
}

/// Result type alias for dispatch operations
pub type DispatchResult<T> = Result<T, DispatchError>;
