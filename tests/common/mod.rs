#![allow(dead_code)]

pub mod brokers;
pub mod strategies;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dispatch_core::config::{DispatchConfig, ExecutionMode};
use dispatch_core::dispatch::{PartialResult, Workload};
use dispatch_core::monitor::Monitor;

/// Task arguments carrying an explicit unit count
#[derive(Debug, Clone)]
pub struct Units {
    pub id: u64,
    pub amount: u64,
}

impl Units {
    pub fn new(id: u64, amount: u64) -> Self {
        Self { id, amount }
    }

    pub fn batch(amounts: &[u64]) -> Vec<Units> {
        amounts
            .iter()
            .enumerate()
            .map(|(id, amount)| Units::new(id as u64, *amount))
            .collect()
    }
}

impl Workload for Units {
    fn units(&self) -> u64 {
        self.amount
    }

    fn label(&self) -> String {
        format!("units#{}", self.id)
    }
}

/// Tallies task count and units under fixed keys
pub fn tally(args: Units, _monitor: &Monitor) -> anyhow::Result<PartialResult<String, u64>> {
    Ok([
        ("tasks".to_string(), 1),
        ("units".to_string(), args.amount),
        (format!("task-{}", args.id), args.amount),
    ]
    .into_iter()
    .collect())
}

/// Records how many tasks run at the same time
#[derive(Debug, Default)]
pub struct ConcurrencyGauge {
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyGauge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn enter(&self) {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    pub fn exit(&self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

pub fn config(limit: usize, mode: ExecutionMode) -> DispatchConfig {
    DispatchConfig {
        execution_mode: mode,
        ..DispatchConfig::with_concurrency_limit(limit)
    }
}

pub fn short_sleep() {
    std::thread::sleep(Duration::from_millis(5));
}
