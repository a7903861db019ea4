use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use dispatch_core::error::DispatchResult;
use dispatch_core::signaling::{InMemoryBroker, QueueDeclaration, SignalBroker, SignalConsumer};

type Rewrite = dyn Fn(Value) -> Vec<Value> + Send + Sync;

/// Broker that rewrites every published payload before delivery
///
/// Stands in for a misbehaving transport: redelivery, corrupted amounts,
/// signals leaking in from another run.
pub struct RewritingBroker {
    inner: InMemoryBroker,
    rewrite: Box<Rewrite>,
    published: AtomicU64,
}

impl RewritingBroker {
    pub fn new<F>(rewrite: F) -> Arc<Self>
    where
        F: Fn(Value) -> Vec<Value> + Send + Sync + 'static,
    {
        Arc::new(Self {
            inner: InMemoryBroker::new("rewriting"),
            rewrite: Box::new(rewrite),
            published: AtomicU64::new(0),
        })
    }

    /// Every signal is delivered twice
    pub fn duplicating() -> Arc<Self> {
        Self::new(|payload| vec![payload.clone(), payload])
    }

    /// Reported amounts are multiplied by `factor`
    pub fn inflating(factor: u64) -> Arc<Self> {
        Self::new(move |mut payload| {
            let amount = payload["amount"].as_u64().unwrap_or(0);
            payload["amount"] = Value::from(amount * factor);
            vec![payload]
        })
    }

    /// Payloads as delivered, counted after rewriting
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignalBroker for RewritingBroker {
    fn exchange(&self) -> &str {
        self.inner.exchange()
    }

    async fn declare_queue(
        &self,
        declaration: QueueDeclaration,
    ) -> DispatchResult<Box<dyn SignalConsumer>> {
        self.inner.declare_queue(declaration).await
    }

    fn publish(&self, routing_key: &str, payload: Value) -> DispatchResult<()> {
        for rewritten in (self.rewrite)(payload) {
            self.published.fetch_add(1, Ordering::SeqCst);
            self.inner.publish(routing_key, rewritten)?;
        }
        Ok(())
    }
}
