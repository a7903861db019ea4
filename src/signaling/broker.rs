//! # Signal Broker
//!
//! Direct-exchange transport seam between workers and the control node.
//! Workers publish JSON payloads by routing key; the control node declares a
//! queue bound to its run's routing key and consumes it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{DispatchError, DispatchResult};

/// Queue declaration, AMQP style
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDeclaration {
    pub name: String,
    pub routing_key: String,
    /// Survives broker restarts
    pub durable: bool,
    /// Removed when its consumer goes away
    pub auto_delete: bool,
}

impl QueueDeclaration {
    /// Non-durable queue removed with its consumer
    pub fn transient(name: impl Into<String>, routing_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            routing_key: routing_key.into(),
            durable: false,
            auto_delete: true,
        }
    }
}

/// Transport used to carry completion signals
#[async_trait]
pub trait SignalBroker: Send + Sync {
    /// Exchange this broker publishes to
    fn exchange(&self) -> &str;

    /// Declare a queue bound to `routing_key` and attach its single consumer
    async fn declare_queue(
        &self,
        declaration: QueueDeclaration,
    ) -> DispatchResult<Box<dyn SignalConsumer>>;

    /// Publish a payload; callable from any thread
    fn publish(&self, routing_key: &str, payload: serde_json::Value) -> DispatchResult<()>;
}

/// Consumer side of a declared queue
#[async_trait]
pub trait SignalConsumer: Send {
    fn queue_name(&self) -> &str;

    /// Next payload in arrival order; `None` once the queue is gone
    async fn recv(&mut self) -> Option<serde_json::Value>;
}

struct QueueEntry {
    declaration: QueueDeclaration,
    sender: mpsc::UnboundedSender<serde_json::Value>,
}

/// Process-local broker backed by tokio channels
///
/// Clones share the same queues. Nothing is persisted: `durable` is recorded
/// but has no effect.
#[derive(Clone)]
pub struct InMemoryBroker {
    exchange: String,
    queues: Arc<RwLock<HashMap<String, QueueEntry>>>,
}

impl InMemoryBroker {
    pub fn new(exchange: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            queues: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn has_queue(&self, name: &str) -> bool {
        self.queues.read().contains_key(name)
    }

    pub fn queue_count(&self) -> usize {
        self.queues.read().len()
    }
}

impl std::fmt::Debug for InMemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBroker")
            .field("exchange", &self.exchange)
            .field("queues", &self.queue_count())
            .finish()
    }
}

#[async_trait]
impl SignalBroker for InMemoryBroker {
    fn exchange(&self) -> &str {
        &self.exchange
    }

    async fn declare_queue(
        &self,
        declaration: QueueDeclaration,
    ) -> DispatchResult<Box<dyn SignalConsumer>> {
        let mut queues = self.queues.write();

        if let Some(existing) = queues.get(&declaration.name) {
            if !existing.sender.is_closed() {
                return Err(DispatchError::transport(
                    "declare_queue",
                    format!("queue {} already has a consumer", declaration.name),
                ));
            }
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        debug!(
            queue = %declaration.name,
            routing_key = %declaration.routing_key,
            exchange = %self.exchange,
            durable = declaration.durable,
            auto_delete = declaration.auto_delete,
            "📮 BROKER: Declared queue"
        );

        let consumer = InMemoryConsumer {
            name: declaration.name.clone(),
            auto_delete: declaration.auto_delete,
            receiver,
            queues: Arc::clone(&self.queues),
        };
        queues.insert(
            declaration.name.clone(),
            QueueEntry {
                declaration,
                sender,
            },
        );

        Ok(Box::new(consumer))
    }

    fn publish(&self, routing_key: &str, payload: serde_json::Value) -> DispatchResult<()> {
        let queues = self.queues.read();
        let mut delivered = 0usize;

        for entry in queues
            .values()
            .filter(|entry| entry.declaration.routing_key == routing_key)
        {
            if entry.sender.send(payload.clone()).is_ok() {
                delivered += 1;
            }
        }

        if delivered == 0 {
            warn!(
                routing_key = %routing_key,
                exchange = %self.exchange,
                "📮 BROKER: No live queue bound to routing key, message dropped"
            );
        }

        Ok(())
    }
}

struct InMemoryConsumer {
    name: String,
    auto_delete: bool,
    receiver: mpsc::UnboundedReceiver<serde_json::Value>,
    queues: Arc<RwLock<HashMap<String, QueueEntry>>>,
}

#[async_trait]
impl SignalConsumer for InMemoryConsumer {
    fn queue_name(&self) -> &str {
        &self.name
    }

    async fn recv(&mut self) -> Option<serde_json::Value> {
        self.receiver.recv().await
    }
}

impl Drop for InMemoryConsumer {
    fn drop(&mut self) {
        if self.auto_delete {
            self.queues.write().remove(&self.name);
            debug!(queue = %self.name, "📮 BROKER: Auto-deleted queue");
        }
    }
}
