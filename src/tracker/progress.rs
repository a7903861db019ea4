use serde::Serialize;
use thiserror::Error;

/// Advancing would push `computed` past `total`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("reported {amount} units with {computed} of {total} already computed")]
pub struct ProgressOverflow {
    pub computed: u64,
    pub total: u64,
    pub amount: u64,
}

/// Units computed versus units expected for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressCounters {
    computed: u64,
    total: u64,
}

impl ProgressCounters {
    pub fn new(total: u64) -> Self {
        Self { computed: 0, total }
    }

    pub fn computed(&self) -> u64 {
        self.computed
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn remaining(&self) -> u64 {
        self.total - self.computed
    }

    pub fn is_complete(&self) -> bool {
        self.computed == self.total
    }

    /// Add a reported amount; returns whether the run is now complete
    ///
    /// Never clamps: an amount that would overshoot leaves the counters
    /// untouched and is returned as an error.
    pub fn advance(&mut self, amount: u64) -> Result<bool, ProgressOverflow> {
        match self.computed.checked_add(amount) {
            Some(next) if next <= self.total => {
                self.computed = next;
                Ok(self.is_complete())
            }
            _ => Err(ProgressOverflow {
                computed: self.computed,
                total: self.total,
                amount,
            }),
        }
    }

    /// Percentage done; an empty run counts as finished
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.computed as f64 * 100.0 / self.total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_sequence() {
        let mut progress = ProgressCounters::new(5);
        let mut seen = vec![progress.computed()];
        let mut done = Vec::new();

        for amount in [2, 1, 2] {
            done.push(progress.advance(amount).unwrap());
            seen.push(progress.computed());
        }

        assert_eq!(seen, vec![0, 2, 3, 5]);
        assert_eq!(done, vec![false, false, true]);
        assert_eq!(progress.remaining(), 0);
    }

    #[test]
    fn test_overflow_is_not_clamped() {
        let mut progress = ProgressCounters::new(3);
        progress.advance(2).unwrap();

        let err = progress.advance(2).unwrap_err();
        assert_eq!(err, ProgressOverflow { computed: 2, total: 3, amount: 2 });
        assert_eq!(progress.computed(), 2);
        assert!(!progress.is_complete());
    }

    #[test]
    fn test_empty_run_is_complete() {
        let progress = ProgressCounters::new(0);
        assert!(progress.is_complete());
        assert_eq!(progress.percent(), 100.0);
    }
}
