use crate::error::{DispatchError, DispatchResult};

/// The smallest schedulable unit of input
///
/// `weight` is a cost proxy used only for scheduling; `group_key` marks items
/// that must stay together (same physical scenario, same source group...);
/// `payload` is opaque to the dispatcher and only read by the work function.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem<K, P> {
    weight: f64,
    group_key: K,
    payload: P,
}

impl<K, P> WorkItem<K, P> {
    /// Create a work item, rejecting negative or non-finite weights
    pub fn new(weight: f64, group_key: K, payload: P) -> DispatchResult<Self> {
        if !weight.is_finite() || weight < 0.0 {
            return Err(DispatchError::invalid_configuration(
                "weight",
                format!("work item weight must be a finite non-negative number, got {weight}"),
            ));
        }

        Ok(Self {
            weight,
            group_key,
            payload,
        })
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn group_key(&self) -> &K {
        &self.group_key
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn into_payload(self) -> P {
        self.payload
    }
}
