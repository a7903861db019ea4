//! # Completion Channel
//!
//! Per-run view of the signal transport. The control node owns one
//! [`CompletionChannel`], workers hold cheap [`CompletionNotifier`] clones.
//!
//! Delivery from workers is at-least-once; the channel makes it exactly-once
//! for the tracker by discarding repeated `(run_id, task_no)` pairs.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::SignalingConfig;
use crate::constants::{routing_key, signal_queue_name};
use crate::error::{DispatchError, DispatchResult};
use crate::signaling::{CompletionSignal, QueueDeclaration, RunId, SignalBroker, SignalConsumer};

/// Consumer of one run's completion signals
pub struct CompletionChannel {
    run_id: RunId,
    routing_key: String,
    broker: Arc<dyn SignalBroker>,
    consumer: Box<dyn SignalConsumer>,
    timeout: Option<Duration>,
    seen: HashSet<u64>,
    duplicates_discarded: u64,
}

impl CompletionChannel {
    /// Declare the run's transient queue and subscribe to it
    pub async fn open(
        broker: Arc<dyn SignalBroker>,
        run_id: RunId,
        config: &SignalingConfig,
    ) -> DispatchResult<Self> {
        let routing_key = routing_key(&config.routing_key_prefix, run_id.as_str());
        let queue_name = signal_queue_name(&config.routing_key_prefix, run_id.as_str());

        let consumer = broker
            .declare_queue(QueueDeclaration::transient(queue_name, routing_key.clone()))
            .await?;

        debug!(
            run_id = %run_id,
            queue = %consumer.queue_name(),
            routing_key = %routing_key,
            "📡 SIGNALS: Subscribed to completion queue"
        );

        Ok(Self {
            run_id,
            routing_key,
            broker,
            consumer,
            timeout: config.signal_timeout(),
            seen: HashSet::new(),
            duplicates_discarded: 0,
        })
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    pub fn queue_name(&self) -> &str {
        self.consumer.queue_name()
    }

    pub fn duplicates_discarded(&self) -> u64 {
        self.duplicates_discarded
    }

    /// Publisher handle for workers of this run
    pub fn notifier(&self) -> CompletionNotifier {
        CompletionNotifier {
            broker: Arc::clone(&self.broker),
            run_id: self.run_id.clone(),
            routing_key: self.routing_key.clone(),
        }
    }

    /// Wait for the next first-time signal of this run
    ///
    /// Blocks without a deadline unless `signal_timeout_ms` is configured.
    pub async fn recv(&mut self) -> DispatchResult<CompletionSignal> {
        loop {
            let payload = match self.timeout {
                Some(timeout) => tokio::time::timeout(timeout, self.consumer.recv())
                    .await
                    .map_err(|_| DispatchError::SignalTimeout {
                        run_id: self.run_id.to_string(),
                        timeout_ms: timeout.as_millis() as u64,
                    })?,
                None => self.consumer.recv().await,
            };

            let payload = payload.ok_or_else(|| {
                DispatchError::transport(
                    "recv",
                    format!("completion queue {} closed", self.consumer.queue_name()),
                )
            })?;
            let signal = CompletionSignal::from_json(payload)?;

            if signal.run_id != self.run_id {
                return Err(DispatchError::signal_anomaly(
                    self.run_id.as_str(),
                    format!("received signal for foreign run {}", signal.run_id),
                ));
            }

            if !self.seen.insert(signal.task_no) {
                self.duplicates_discarded += 1;
                warn!(
                    run_id = %self.run_id,
                    task_no = signal.task_no,
                    "📡 SIGNALS: Discarding duplicate completion signal"
                );
                continue;
            }

            return Ok(signal);
        }
    }
}

impl std::fmt::Debug for CompletionChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionChannel")
            .field("run_id", &self.run_id)
            .field("routing_key", &self.routing_key)
            .field("seen", &self.seen.len())
            .field("duplicates_discarded", &self.duplicates_discarded)
            .finish()
    }
}

/// Worker-side publisher for one run
#[derive(Clone)]
pub struct CompletionNotifier {
    broker: Arc<dyn SignalBroker>,
    run_id: RunId,
    routing_key: String,
}

impl CompletionNotifier {
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn signal_completed(&self, task_no: u64, amount: u64) -> DispatchResult<()> {
        self.publish(CompletionSignal::completed(self.run_id.clone(), task_no, amount))
    }

    pub fn signal_failed(&self, task_no: u64, error: impl Into<String>) -> DispatchResult<()> {
        self.publish(CompletionSignal::failed(self.run_id.clone(), task_no, error))
    }

    pub fn publish(&self, signal: CompletionSignal) -> DispatchResult<()> {
        self.broker.publish(&self.routing_key, signal.to_json()?)
    }
}
