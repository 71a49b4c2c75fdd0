//! The Sliding-Window Quantile Engine: a bounded FIFO of
//! per-block-group frequency vectors, plus an aggregate kept in lock-step
//! so `quantile()` never has to re-sum the whole window.

use crate::quantile::approximator::ValueApproximator;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use thiserror::Error;

/// A histogram over normalized-value buckets for one block-group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyVector(pub Vec<u64>);

impl FrequencyVector {
    pub fn zeroed(len: usize) -> Self {
        Self(vec![0; len])
    }

    fn add_assign(&mut self, other: &FrequencyVector) {
        for (a, b) in self.0.iter_mut().zip(other.0.iter()) {
            *a += b;
        }
    }

    fn sub_assign(&mut self, other: &FrequencyVector) {
        for (a, b) in self.0.iter_mut().zip(other.0.iter()) {
            *a = a.saturating_sub(*b);
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum QuantileError {
    #[error("quantile must be in [0, 1], got {0}")]
    OutOfRange(f64),
    #[error("quantile requested over an empty window")]
    EmptyWindow,
}

/// A bounded queue of [`FrequencyVector`]s, one per block-group, with a
/// maintained elementwise sum (invariant: "the aggregate
/// equals the element-wise sum of all vectors currently in the queue").
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    approximator: ValueApproximator,
    max_groups: usize,
    groups: VecDeque<FrequencyVector>,
    aggregate: FrequencyVector,
}

impl SlidingWindow {
    pub fn new(approximator: ValueApproximator, max_groups: usize) -> Self {
        assert!(max_groups > 0, "a window must hold at least one group");
        let len = approximator.vector_len();
        Self {
            approximator,
            max_groups,
            groups: VecDeque::new(),
            aggregate: FrequencyVector::zeroed(len),
        }
    }

    pub fn approximator(&self) -> &ValueApproximator {
        &self.approximator
    }

    pub fn aggregate(&self) -> &FrequencyVector {
        &self.aggregate
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Normalize `values`, build the block-group's frequency vector, push
    /// it onto the queue and fold it into the aggregate. Evicts the
    /// oldest group if the window now exceeds `max_groups`
    /// (: "shifted out when the window exceeds its
    /// configured group count").
    pub fn add(&mut self, values: &[i64]) {
        let mut vector = FrequencyVector::zeroed(self.approximator.vector_len());
        for &value in values {
            vector.0[self.approximator.normalize(value)] += 1;
        }

        self.aggregate.add_assign(&vector);
        self.groups.push_back(vector);

        while self.groups.len() > self.max_groups {
            self.delete_last();
        }
    }

    /// Pop the oldest group from the window and subtract it from the
    /// aggregate. A no-op on an empty window.
    pub fn delete_last(&mut self) {
        if let Some(evicted) = self.groups.pop_front() {
            self.aggregate.sub_assign(&evicted);
        }
    }

    /// `quantile(q)`: the smallest denormalized bucket whose prefix sum
    /// reaches `q * total`.
    pub fn quantile(&self, q: f64) -> Result<u64, QuantileError> {
        if !(0.0..=1.0).contains(&q) {
            return Err(QuantileError::OutOfRange(q));
        }

        let total: u64 = self.aggregate.0.iter().sum();
        if total == 0 {
            return Err(QuantileError::EmptyWindow);
        }

        let threshold = q * total as f64;
        let mut running = 0u64;
        for (index, count) in self.aggregate.0.iter().enumerate() {
            running += count;
            if running as f64 >= threshold {
                return Ok(self.approximator.denormalize(index));
            }
        }

        // Floating point rounding can leave `running` a hair under
        // `threshold` even after consuming every bucket; the last
        // non-empty bucket is the correct answer.
        Ok(self.approximator.denormalize(self.aggregate.0.len() - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> SlidingWindow {
        SlidingWindow::new(ValueApproximator::new(2.0, 1024), 10)
    }

    #[test]
    fn aggregate_matches_sum_of_groups_after_adds_and_deletes() {
        let mut window = window();
        window.add(&[1, 2, 3, 4]);
        window.add(&[10, 20, 30]);
        window.add(&[100]);

        let expected = recompute_aggregate(&window);
        assert_eq!(window.aggregate().0, expected.0);

        window.delete_last();
        let expected = recompute_aggregate(&window);
        assert_eq!(window.aggregate().0, expected.0);
    }

    #[test]
    fn window_evicts_oldest_group_beyond_capacity() {
        let mut window = SlidingWindow::new(ValueApproximator::new(2.0, 1024), 2);
        window.add(&[1]);
        window.add(&[2]);
        window.add(&[3]);
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn quantile_rejects_out_of_range() {
        let mut window = window();
        window.add(&[1]);
        assert!(matches!(
            window.quantile(1.5),
            Err(QuantileError::OutOfRange(_))
        ));
        assert!(matches!(
            window.quantile(-0.1),
            Err(QuantileError::OutOfRange(_))
        ));
    }

    #[test]
    fn quantile_on_empty_window_fails() {
        let window = window();
        assert_eq!(window.quantile(0.5), Err(QuantileError::EmptyWindow));
    }

    #[test]
    fn median_of_powers_of_two_is_near_the_middle_value() {
        let mut window = SlidingWindow::new(ValueApproximator::new(2.0, 1024), 1);
        let values: Vec<i64> = (1..=1024).collect();
        window.add(&values);

        let approximator = ValueApproximator::new(2.0, 1024);
        let lower_bound = approximator.denormalize(approximator.normalize(512));
        let median = window.quantile(0.5).unwrap();

        assert!(median >= lower_bound);
        assert!((median as f64) < 2.0 * 512.0);
    }

    fn recompute_aggregate(window: &SlidingWindow) -> FrequencyVector {
        let len = window.approximator().vector_len();
        let mut acc = FrequencyVector::zeroed(len);
        for group in &window.groups {
            acc.add_assign(group);
        }
        acc
    }
}
