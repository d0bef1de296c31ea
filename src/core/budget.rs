// src/core/budget.rs — Shared sample budget

use std::sync::atomic::{AtomicUsize, Ordering};

/// Run-wide count of evaluated samples, compared against an optional ceiling.
///
/// Workers read the counter once before each batch, so concurrent batches can
/// overshoot the ceiling by up to `num_samplers * samples_per_prompt - 1`.
#[derive(Debug)]
pub struct SampleBudget {
    count: AtomicUsize,
    max: Option<usize>,
}

impl SampleBudget {
    pub fn new(max: Option<usize>) -> Self {
        Self {
            count: AtomicUsize::new(0),
            max,
        }
    }

    /// Start from an existing count (resumed runs).
    pub fn starting_at(count: usize, max: Option<usize>) -> Self {
        Self {
            count: AtomicUsize::new(count),
            max,
        }
    }

    /// Count one evaluated sample. Returns the new total.
    pub fn record(&self) -> usize {
        self.count.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn is_exhausted(&self) -> bool {
        match self.max {
            Some(max) => self.count() >= max,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_exhaustion() {
        let budget = SampleBudget::new(Some(2));
        assert!(!budget.is_exhausted());
        assert_eq!(budget.record(), 1);
        assert!(!budget.is_exhausted());
        budget.record();
        assert!(budget.is_exhausted());
        // Overshoot keeps counting
        assert_eq!(budget.record(), 3);
        assert!(budget.is_exhausted());
    }

    #[test]
    fn test_zero_ceiling_is_exhausted_immediately() {
        assert!(SampleBudget::new(Some(0)).is_exhausted());
    }

    #[test]
    fn test_unbounded_never_exhausts() {
        let budget = SampleBudget::new(None);
        for _ in 0..1000 {
            budget.record();
        }
        assert!(!budget.is_exhausted());
        assert_eq!(budget.count(), 1000);
    }

    #[test]
    fn test_concurrent_records_are_not_lost() {
        let budget = Arc::new(SampleBudget::new(None));
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let b = budget.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        b.record();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(budget.count(), 4000);
    }

    #[test]
    fn test_starting_at() {
        let budget = SampleBudget::starting_at(5, Some(5));
        assert!(budget.is_exhausted());
        assert_eq!(budget.count(), 5);
    }
}
