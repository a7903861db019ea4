use serde::{Deserialize, Serialize};
use std::fmt;

/// Control loop states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerState {
    /// Submitting blocks up to the concurrency limit
    Filling,
    /// Waiting for completion signals, one refill per signal
    Draining,
    /// `computed == total`; no further submissions
    Done,
    /// A task failed or the signal stream broke; remaining work abandoned
    Aborted,
}

impl TrackerState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }

    /// Whether the loop may still submit tasks
    pub fn accepts_submissions(&self) -> bool {
        matches!(self, Self::Filling | Self::Draining)
    }
}

impl fmt::Display for TrackerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filling => write!(f, "filling"),
            Self::Draining => write!(f, "draining"),
            Self::Done => write!(f, "done"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

impl std::str::FromStr for TrackerState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "filling" => Ok(Self::Filling),
            "draining" => Ok(Self::Draining),
            "done" => Ok(Self::Done),
            "aborted" => Ok(Self::Aborted),
            _ => Err(format!("Invalid tracker state: {s}")),
        }
    }
}
