//! # Completion Signal Messages
//!
//! Wire format of the out-of-band completion notification a worker publishes
//! after each task. Payloads travel as JSON values.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::FAILURE_METADATA_KEY;
use crate::error::DispatchResult;

/// Identity of one orchestrated run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random run identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RunId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RunId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for RunId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<Uuid> for RunId {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

/// Notification that one task finished
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionSignal {
    pub run_id: RunId,
    /// Per-run monotonic task number; the deduplication key
    pub task_no: u64,
    /// Units of work completed by the task
    pub amount: u64,
    #[serde(default)]
    pub failed: bool,
    pub sent_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl CompletionSignal {
    pub fn completed(run_id: RunId, task_no: u64, amount: u64) -> Self {
        Self {
            run_id,
            task_no,
            amount,
            failed: false,
            sent_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Failure notice; carries no work and the error text in its metadata
    pub fn failed(run_id: RunId, task_no: u64, error: impl Into<String>) -> Self {
        Self {
            failed: true,
            ..Self::completed(run_id, task_no, 0)
        }
        .with_metadata(FAILURE_METADATA_KEY, serde_json::Value::String(error.into()))
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Error text attached to a failure notice
    pub fn error_message(&self) -> Option<&str> {
        self.metadata
            .get(FAILURE_METADATA_KEY)
            .and_then(|value| value.as_str())
    }

    pub fn to_json(&self) -> DispatchResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_json(payload: serde_json::Value) -> DispatchResult<Self> {
        Ok(serde_json::from_value(payload)?)
    }
}
