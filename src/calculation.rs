//! # Calculation Lifecycle
//!
//! A calculation is a domain computation expressed as a fixed sequence of
//! phases around one orchestrated run:
//!
//! `pre_execute` → `work_items` → split + dispatch → `post_execute` →
//! `post_process` → `export` → `clean_up`
//!
//! [`CalculationRunner`] drives the phases under a [`Monitor`], derives the
//! block weight from the configuration and always runs `clean_up`, even when
//! an earlier phase failed.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::accumulator::AccumulatingMap;
use crate::config::DispatchConfig;
use crate::constants::events;
use crate::dispatch::{ResultKey, ResultValue, RunSummary, TaskDispatcher, WorkFunction};
use crate::error::{DispatchError, DispatchResult};
use crate::logging::log_run_operation;
use crate::monitor::{Monitor, ScopeStats};
use crate::partition::{block_splitter, Block};
use crate::signaling::SignalBroker;

/// Domain computation driven by a [`CalculationRunner`]
#[async_trait]
pub trait Calculation: Send {
    type Item: Send + 'static;
    type GroupKey: PartialEq + Debug + Send + 'static;
    type Key: ResultKey;
    type Value: ResultValue;

    fn name(&self) -> &str;

    /// Read inputs and prepare state
    async fn pre_execute(&mut self, _monitor: &Monitor) -> anyhow::Result<()> {
        Ok(())
    }

    /// The finite workload, in dispatch order
    fn work_items(&mut self) -> anyhow::Result<Vec<Self::Item>>;

    /// Scheduling cost of one item
    fn weight(item: &Self::Item) -> f64;

    /// Items sharing a key are never split across blocks of different keys
    fn group_key(item: &Self::Item) -> Self::GroupKey;

    /// Computation run once per block
    fn work_function(
        &self,
    ) -> Arc<dyn WorkFunction<Block<Self::Item, Self::GroupKey>, Self::Key, Self::Value>>;

    /// Domain reducer receiving the accumulated result
    async fn post_execute(
        &mut self,
        result: AccumulatingMap<Self::Key, Self::Value>,
        monitor: &Monitor,
    ) -> anyhow::Result<()>;

    async fn post_process(&mut self, _monitor: &Monitor) -> anyhow::Result<()> {
        Ok(())
    }

    /// Names of whatever was exported
    async fn export(&mut self, _monitor: &Monitor) -> anyhow::Result<Vec<String>> {
        Ok(Vec::new())
    }

    /// Release resources; runs after success and failure alike
    async fn clean_up(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// What a successful calculation reports
#[derive(Debug, Clone, Serialize)]
pub struct CalculationReport {
    pub name: String,
    pub run: RunSummary,
    pub exported: Vec<String>,
    pub timings: Vec<ScopeStats>,
}

/// Drives a [`Calculation`] through its phases
pub struct CalculationRunner {
    config: DispatchConfig,
    broker: Option<Arc<dyn SignalBroker>>,
    monitor: Monitor,
}

impl CalculationRunner {
    pub fn new(config: DispatchConfig) -> DispatchResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            broker: None,
            monitor: Monitor::new("calculation"),
        })
    }

    pub fn with_broker(mut self, broker: Arc<dyn SignalBroker>) -> Self {
        self.broker = Some(broker);
        self
    }

    pub fn with_monitor(mut self, monitor: Monitor) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    /// Run every phase; `clean_up` runs even if an earlier phase fails
    pub async fn run<C: Calculation>(&self, calc: &mut C) -> DispatchResult<CalculationReport> {
        let name = calc.name().to_string();
        info!(calculation = %name, "🧮 CALCULATION: Starting");

        let outcome = self.run_phases(calc).await;

        let cleaned = {
            let _timing = self.monitor.measure("clean_up");
            calc.clean_up()
                .await
                .map_err(|e| DispatchError::phase("clean_up", format!("{e:#}")))
        };

        match (outcome, cleaned) {
            (Ok(report), Ok(())) => {
                info!(calculation = %name, "✅ CALCULATION: Finished");
                Ok(report)
            }
            (Err(e), cleaned) => {
                if let Err(clean_err) = cleaned {
                    warn!(calculation = %name, error = %clean_err, "🧮 CALCULATION: Clean-up failed after error");
                }
                error!(calculation = %name, error = %e, "❌ CALCULATION: Failed");
                Err(e)
            }
            (Ok(_), Err(e)) => {
                error!(calculation = %name, error = %e, "❌ CALCULATION: Clean-up failed");
                Err(e)
            }
        }
    }

    async fn run_phases<C: Calculation>(&self, calc: &mut C) -> DispatchResult<CalculationReport> {
        let name = calc.name().to_string();

        self.phase(&name, "pre_execute", calc.pre_execute(&self.monitor))
            .await?;

        let items = calc
            .work_items()
            .map_err(|e| DispatchError::phase("work_items", format!("{e:#}")))?;
        let total_weight: f64 = items.iter().map(C::weight).sum();
        let max_weight = self.config.resolve_max_block_weight(total_weight)?;
        let total_units = items.len() as u64;

        info!(
            calculation = %name,
            items = total_units,
            total_weight = total_weight,
            max_weight = max_weight,
            "🧮 CALCULATION: Splitting workload"
        );

        let blocks = block_splitter(
            items,
            max_weight,
            C::weight as fn(&C::Item) -> f64,
            C::group_key as fn(&C::Item) -> C::GroupKey,
        )?;

        let mut dispatcher = TaskDispatcher::new_shared(self.config.clone(), calc.work_function())?
            .with_monitor(self.monitor.child("execute"));
        if let Some(broker) = &self.broker {
            dispatcher = dispatcher.with_broker(Arc::clone(broker));
        }

        let outcome = {
            let _timing = self.monitor.measure("execute");
            dispatcher.execute(blocks, total_units).await?
        };

        self.phase(
            &name,
            "post_execute",
            calc.post_execute(outcome.result, &self.monitor),
        )
        .await?;
        self.phase(&name, "post_process", calc.post_process(&self.monitor))
            .await?;
        let exported = self
            .phase(&name, "export", calc.export(&self.monitor))
            .await?;

        Ok(CalculationReport {
            name,
            run: outcome.summary,
            exported,
            timings: self.monitor.report(),
        })
    }

    async fn phase<T, F>(&self, name: &str, phase: &str, fut: F) -> DispatchResult<T>
    where
        F: std::future::Future<Output = anyhow::Result<T>>,
    {
        log_run_operation(events::PHASE_STARTED, name, None, phase, None);
        let result = {
            let _timing = self.monitor.measure(phase);
            fut.await
        };
        match result {
            Ok(value) => {
                log_run_operation(events::PHASE_COMPLETED, name, None, phase, None);
                Ok(value)
            }
            Err(e) => Err(DispatchError::phase(phase, format!("{e:#}"))),
        }
    }
}

impl std::fmt::Debug for CalculationRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalculationRunner")
            .field("config", &self.config)
            .field("monitor", &self.monitor.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutionMode;
    use crate::dispatch::PartialResult;

    /// Counts assets per taxonomy, the way a loss calculator tallies exposure
    #[derive(Default)]
    struct AssetCount {
        fail_in: Option<&'static str>,
        phases: Vec<&'static str>,
        totals: Option<AccumulatingMap<String, u64>>,
    }

    fn count_block(
        block: Block<(String, f64), String>,
        _monitor: &Monitor,
    ) -> anyhow::Result<PartialResult<String, u64>> {
        Ok([(block.group_key().clone(), block.len() as u64)]
            .into_iter()
            .collect())
    }

    impl AssetCount {
        fn step(&mut self, phase: &'static str) -> anyhow::Result<()> {
            self.phases.push(phase);
            if self.fail_in == Some(phase) {
                anyhow::bail!("{phase} exploded");
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Calculation for AssetCount {
        type Item = (String, f64);
        type GroupKey = String;
        type Key = String;
        type Value = u64;

        fn name(&self) -> &str {
            "asset_count"
        }

        async fn pre_execute(&mut self, _monitor: &Monitor) -> anyhow::Result<()> {
            self.step("pre_execute")
        }

        fn work_items(&mut self) -> anyhow::Result<Vec<Self::Item>> {
            Ok(["wood", "wood", "wood", "steel", "steel", "rc"]
                .iter()
                .map(|taxonomy| (taxonomy.to_string(), 1.0))
                .collect())
        }

        fn weight(item: &Self::Item) -> f64 {
            item.1
        }

        fn group_key(item: &Self::Item) -> Self::GroupKey {
            item.0.clone()
        }

        fn work_function(
            &self,
        ) -> Arc<dyn WorkFunction<Block<Self::Item, Self::GroupKey>, String, u64>> {
            Arc::new(count_block)
        }

        async fn post_execute(
            &mut self,
            result: AccumulatingMap<String, u64>,
            _monitor: &Monitor,
        ) -> anyhow::Result<()> {
            self.step("post_execute")?;
            self.totals = Some(result);
            Ok(())
        }

        async fn export(&mut self, _monitor: &Monitor) -> anyhow::Result<Vec<String>> {
            self.step("export")?;
            Ok(vec!["asset_totals.csv".to_string()])
        }

        async fn clean_up(&mut self) -> anyhow::Result<()> {
            self.step("clean_up")
        }
    }

    /// Reads its inventory by reference instead of owning it
    struct BorrowedInventory<'a> {
        inventory: &'a [(&'static str, f64)],
        totals: Option<AccumulatingMap<String, u64>>,
    }

    #[async_trait]
    impl<'a> Calculation for BorrowedInventory<'a> {
        type Item = (String, f64);
        type GroupKey = String;
        type Key = String;
        type Value = u64;

        fn name(&self) -> &str {
            "borrowed_inventory"
        }

        fn work_items(&mut self) -> anyhow::Result<Vec<Self::Item>> {
            Ok(self
                .inventory
                .iter()
                .map(|(taxonomy, weight)| (taxonomy.to_string(), *weight))
                .collect())
        }

        fn weight(item: &Self::Item) -> f64 {
            item.1
        }

        fn group_key(item: &Self::Item) -> Self::GroupKey {
            item.0.clone()
        }

        fn work_function(
            &self,
        ) -> Arc<dyn WorkFunction<Block<Self::Item, Self::GroupKey>, String, u64>> {
            Arc::new(count_block)
        }

        async fn post_execute(
            &mut self,
            result: AccumulatingMap<String, u64>,
            _monitor: &Monitor,
        ) -> anyhow::Result<()> {
            self.totals = Some(result);
            Ok(())
        }
    }

    fn runner() -> CalculationRunner {
        let config = DispatchConfig {
            execution_mode: ExecutionMode::Threads,
            concurrent_tasks: Some(3),
            ..DispatchConfig::with_concurrency_limit(2)
        };
        CalculationRunner::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_phases_run_in_order() {
        let mut calc = AssetCount::default();
        let report = runner().run(&mut calc).await.unwrap();

        assert_eq!(
            calc.phases,
            vec!["pre_execute", "post_execute", "export", "clean_up"]
        );
        let totals = calc.totals.unwrap();
        assert_eq!(totals.get("wood"), 3);
        assert_eq!(totals.get("steel"), 2);
        assert_eq!(totals.get("rc"), 1);

        assert_eq!(report.name, "asset_count");
        assert_eq!(report.exported, vec!["asset_totals.csv".to_string()]);
        assert_eq!(report.run.units_computed, 6);
        // max weight ceil(6 / 3) = 2: wood splits in two, steel and rc stay whole
        assert_eq!(report.run.tasks_submitted, 4);
        assert!(report
            .timings
            .iter()
            .any(|scope| scope.name == "calculation/execute"));
    }

    #[tokio::test]
    async fn test_clean_up_runs_after_failure() {
        let mut calc = AssetCount {
            fail_in: Some("post_execute"),
            ..AssetCount::default()
        };
        let err = runner().run(&mut calc).await.unwrap_err();

        assert!(matches!(err, DispatchError::Phase { ref phase, .. } if phase == "post_execute"));
        assert_eq!(calc.phases.last(), Some(&"clean_up"));
        assert!(!calc.phases.contains(&"export"));
    }

    #[tokio::test]
    async fn test_clean_up_failure_is_reported() {
        let mut calc = AssetCount {
            fail_in: Some("clean_up"),
            ..AssetCount::default()
        };
        let err = runner().run(&mut calc).await.unwrap_err();
        assert!(matches!(err, DispatchError::Phase { ref phase, .. } if phase == "clean_up"));
    }

    #[tokio::test]
    async fn test_calculation_borrowing_its_inputs() {
        let inventory = vec![("wood", 1.0), ("wood", 1.0), ("rc", 3.0)];
        let mut calc = BorrowedInventory {
            inventory: &inventory,
            totals: None,
        };

        let report = runner().run(&mut calc).await.unwrap();

        let totals = calc.totals.unwrap();
        assert_eq!(totals.get("wood"), 2);
        assert_eq!(totals.get("rc"), 1);
        assert_eq!(report.run.units_computed, 3);
    }
}
