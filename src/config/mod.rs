//! # Dispatch Configuration
//!
//! Settings the orchestration core reads once at run start: the concurrency
//! ceiling, how block weights are bounded, which execution strategy runs the
//! tasks, and how completion signals are routed. There is no hot reload.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use dispatch_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // defaults -> config/dispatch.toml -> config/dispatch.<env>.toml -> DISPATCH__* variables
//! let manager = ConfigManager::load()?;
//!
//! let limit = manager.config().concurrency_limit;
//! let max_weight = manager.config().resolve_max_block_weight(1_000.0)?;
//! # Ok(())
//! # }
//! ```

pub mod loader;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::constants::{DEFAULT_EXCHANGE, DEFAULT_ROUTING_KEY_PREFIX};
use crate::error::{DispatchError, DispatchResult};
use crate::partition::max_block_weight;

pub use loader::ConfigManager;

/// How submitted tasks are executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Sequential for a single task or a concurrency limit of 1, threads otherwise
    #[default]
    Auto,
    /// In-process, one task at a time
    Sequential,
    /// Pool of OS worker threads bounded by the concurrency limit
    Threads,
}

impl ExecutionMode {
    /// Resolve `Auto` given the concurrency limit and the expected task count
    pub fn resolve(self, concurrency_limit: usize, expected_tasks: Option<usize>) -> Self {
        match self {
            Self::Auto if concurrency_limit <= 1 => Self::Sequential,
            Self::Auto if matches!(expected_tasks, Some(n) if n <= 1) => Self::Sequential,
            Self::Auto => Self::Threads,
            explicit => explicit,
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Sequential => write!(f, "sequential"),
            Self::Threads => write!(f, "threads"),
        }
    }
}

/// Where partial results are merged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccumulationStrategy {
    /// Partial results travel back and are folded by the control loop
    #[default]
    ControlNode,
    /// Workers merge into a shared accumulator; only the signal travels back
    InWorker,
}

/// Completion signal routing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    /// Exchange completion signals are published to
    pub exchange: String,
    /// Prefix of the per-run routing key, `<prefix>.<run_id>.tasks`
    pub routing_key_prefix: String,
    /// Give up waiting for the next signal after this long; unset waits forever
    pub signal_timeout_ms: Option<u64>,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            exchange: DEFAULT_EXCHANGE.to_string(),
            routing_key_prefix: DEFAULT_ROUTING_KEY_PREFIX.to_string(),
            signal_timeout_ms: None,
        }
    }
}

impl SignalingConfig {
    pub fn signal_timeout(&self) -> Option<Duration> {
        self.signal_timeout_ms.map(Duration::from_millis)
    }
}

/// Root configuration of an orchestrated run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Maximum number of simultaneously unacknowledged tasks
    pub concurrency_limit: usize,

    /// Number of tasks the workload should be split into when deriving the
    /// block weight; defaults to the concurrency limit
    pub concurrent_tasks: Option<usize>,

    /// Explicit block weight bound, overrides the derived one
    pub max_block_weight: Option<f64>,

    /// Hard cap on the derived block weight
    pub weight_cap: Option<f64>,

    pub execution_mode: ExecutionMode,

    pub accumulation: AccumulationStrategy,

    pub signaling: SignalingConfig,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            concurrent_tasks: None,
            max_block_weight: None,
            weight_cap: None,
            execution_mode: ExecutionMode::default(),
            accumulation: AccumulationStrategy::default(),
            signaling: SignalingConfig::default(),
        }
    }
}

impl DispatchConfig {
    /// Configuration with an explicit concurrency limit and defaults elsewhere
    pub fn with_concurrency_limit(concurrency_limit: usize) -> Self {
        Self {
            concurrency_limit,
            ..Self::default()
        }
    }

    /// Validate the configuration; called before any task is submitted
    pub fn validate(&self) -> DispatchResult<()> {
        if self.concurrency_limit == 0 {
            return Err(DispatchError::invalid_configuration(
                "concurrency_limit",
                "must be greater than 0",
            ));
        }

        if self.concurrent_tasks == Some(0) {
            return Err(DispatchError::invalid_configuration(
                "concurrent_tasks",
                "must be greater than 0 when set",
            ));
        }

        for (field, value) in [
            ("max_block_weight", self.max_block_weight),
            ("weight_cap", self.weight_cap),
        ] {
            if let Some(weight) = value {
                if !(weight > 0.0) || weight.is_infinite() {
                    return Err(DispatchError::invalid_configuration(
                        field,
                        format!("must be a finite positive number, got {weight}"),
                    ));
                }
            }
        }

        if self.signaling.exchange.is_empty() {
            return Err(DispatchError::invalid_configuration(
                "signaling.exchange",
                "cannot be empty",
            ));
        }

        if self.signaling.routing_key_prefix.is_empty()
            || self.signaling.routing_key_prefix.contains(char::is_whitespace)
        {
            return Err(DispatchError::invalid_configuration(
                "signaling.routing_key_prefix",
                "must be a non-empty word without whitespace",
            ));
        }

        if self.signaling.signal_timeout_ms == Some(0) {
            return Err(DispatchError::invalid_configuration(
                "signaling.signal_timeout_ms",
                "must be greater than 0 when set",
            ));
        }

        Ok(())
    }

    /// Effective weight-derivation hint
    pub fn concurrent_tasks(&self) -> usize {
        self.concurrent_tasks.unwrap_or(self.concurrency_limit)
    }

    /// Block weight bound for a workload of `total_weight`
    ///
    /// An explicit `max_block_weight` wins; otherwise
    /// `min(ceil(total_weight / concurrent_tasks), weight_cap)`.
    pub fn resolve_max_block_weight(&self, total_weight: f64) -> DispatchResult<f64> {
        self.validate()?;
        match self.max_block_weight {
            Some(weight) => Ok(weight),
            None => max_block_weight(total_weight, self.concurrent_tasks(), self.weight_cap),
        }
    }
}
