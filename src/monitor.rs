//! # Performance Monitor
//!
//! Named, nestable timing scopes handed to every work function. The dispatcher
//! treats the monitor as an opaque pass-through: it only derives per-task
//! copies and reads the aggregated report once the run is over.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

/// Aggregated timing of one named scope
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScopeStats {
    pub name: String,
    pub calls: u64,
    #[serde(with = "duration_ms")]
    pub total: Duration,
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64() * 1000.0)
    }
}

/// Timing monitor with a shared stats sink
#[derive(Debug, Clone)]
pub struct Monitor {
    name: String,
    task_no: Option<u64>,
    stats: Arc<Mutex<HashMap<String, ScopeStats>>>,
}

impl Monitor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            task_no: None,
            stats: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Task number this copy was derived for, if any
    pub fn task_no(&self) -> Option<u64> {
        self.task_no
    }

    /// Nested monitor; scope names are prefixed with `parent/`
    pub fn child(&self, name: &str) -> Self {
        Self {
            name: format!("{}/{}", self.name, name),
            task_no: self.task_no,
            stats: Arc::clone(&self.stats),
        }
    }

    /// Per-task copy feeding the same stats sink
    pub fn for_task(&self, task_no: u64) -> Self {
        Self {
            name: self.name.clone(),
            task_no: Some(task_no),
            stats: Arc::clone(&self.stats),
        }
    }

    /// Start timing `scope`; the elapsed time is recorded when the guard drops
    pub fn measure(&self, scope: &str) -> MeasureGuard<'_> {
        MeasureGuard {
            monitor: self,
            scope: scope.to_string(),
            started: Instant::now(),
        }
    }

    /// Add `elapsed` to `<name>/<scope>`
    pub fn record(&self, scope: &str, elapsed: Duration) {
        let key = format!("{}/{}", self.name, scope);
        let mut stats = self.stats.lock();
        let entry = stats.entry(key.clone()).or_insert_with(|| ScopeStats {
            name: key,
            ..ScopeStats::default()
        });
        entry.calls += 1;
        entry.total += elapsed;
    }

    /// Snapshot of every recorded scope, sorted by name
    pub fn report(&self) -> Vec<ScopeStats> {
        let mut report: Vec<ScopeStats> = self.stats.lock().values().cloned().collect();
        report.sort_by(|a, b| a.name.cmp(&b.name));
        report
    }
}

/// RAII guard returned by [`Monitor::measure`]
pub struct MeasureGuard<'a> {
    monitor: &'a Monitor,
    scope: String,
    started: Instant,
}

impl Drop for MeasureGuard<'_> {
    fn drop(&mut self) {
        self.monitor.record(&self.scope, self.started.elapsed());
    }
}
