//! # Partial Result Accumulation
//!
//! Partial results produced by many tasks are combined with an associative,
//! commutative merge so the aggregate does not depend on completion order.
//!
//! - [`Accumulate`] - the merge abstraction (`identity` + `merge`)
//! - [`AccumulatingMap`] - key to mergeable value, missing keys read as identity
//! - [`SharedAccumulator`] - concurrent variant with per-key write locking

pub mod map;
pub mod monoid;
pub mod shared;

pub use map::AccumulatingMap;
pub use monoid::Accumulate;
pub use shared::SharedAccumulator;
