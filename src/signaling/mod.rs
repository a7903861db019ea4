//! # Completion Signaling
//!
//! Out-of-band notification path from workers to the control node. Each
//! finished task publishes a [`CompletionSignal`] under the run's routing key
//! (`<prefix>.<run_id>.tasks`); the control node consumes the run's transient
//! queue (`tasks.<prefix>.<run_id>`) through a [`CompletionChannel`] until the
//! expected total is reached.
//!
//! [`SignalBroker`] is the transport seam. [`InMemoryBroker`] serves
//! single-process runs and tests; a networked broker implements the same
//! trait.

pub mod broker;
pub mod channel;
pub mod message;

pub use broker::{InMemoryBroker, QueueDeclaration, SignalBroker, SignalConsumer};
pub use channel::{CompletionChannel, CompletionNotifier};
pub use message::{CompletionSignal, RunId};
