//! The Lock Store and Quantile Store contracts — durable persistence
//! is out of scope for this subsystem; only the trait contracts and
//! in-memory test doubles live here. A production deployment plugs in
//! a concrete backend (e.g. `sled` or `sqlite`) behind these traits.

use crate::quantile::window::FrequencyVector;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What kind of intent a [`SavedLock`] recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockRecordType {
    Create,
    Relock,
    ReturnToWallet,
}

/// The persisted intent a [`crate::monitor::LockMonitor`] writes before
/// every broadcast.
///
/// `create_timestamp` must retain int64 precision across any
/// serialization boundary; it is the total order across
/// ticks, since ticks never overlap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedLock {
    pub transaction_id: String,
    pub raw_transaction: Vec<u8>,
    pub redeem_script_hex: String,
    pub desired_lock_amount_satoshis: u64,
    pub create_timestamp: i64,
    pub record_type: LockRecordType,
}

/// Append-only store of [`SavedLock`] records, indexed by `create_timestamp`.
///
/// Implementations MUST treat a duplicate `transaction_id` insert as a
/// no-op rather than an error: a crashed writer retrying the same
/// intent must not fail on the retry.
#[async_trait]
pub trait LockStore: Send + Sync {
    async fn add_lock(&self, lock: SavedLock) -> anyhow::Result<()>;

    /// The record with the highest `create_timestamp`, or `None` if the
    /// store is empty.
    async fn get_last_lock(&self) -> anyhow::Result<Option<SavedLock>>;
}

/// One block-group's normalized-fee frequency sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyGroup {
    pub group_id: u64,
    pub vector: FrequencyVector,
}

/// Persists per-group reservoir samples so the Quantile Engine's window
/// can be reconstructed after a restart.
#[async_trait]
pub trait QuantileStore: Send + Sync {
    async fn put(&self, group: FrequencyGroup) -> anyhow::Result<()>;

    async fn first_group_id(&self) -> anyhow::Result<Option<u64>>;

    async fn last_group_id(&self) -> anyhow::Result<Option<u64>>;

    /// Drop every group with `group_id >= id`; used to rewind the window
    /// on a block-reorganization.
    async fn remove_groups_at_or_after(&self, id: u64) -> anyhow::Result<()>;
}

/// Test-only reset operations. Kept off [`LockStore`]/[`QuantileStore`]
/// themselves so a production Monitor built against those traits has no
/// way to call them.
#[async_trait]
pub trait ClearForTests {
    async fn clear(&self);
}

/// In-memory doubles: constructible stand-ins usable without a real
/// backend.
#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct InMemoryLockStore {
        records: Mutex<Vec<SavedLock>>,
    }

    impl InMemoryLockStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn all(&self) -> Vec<SavedLock> {
            self.records.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LockStore for InMemoryLockStore {
        async fn add_lock(&self, lock: SavedLock) -> anyhow::Result<()> {
            let mut records = self.records.lock().unwrap();
            if records
                .iter()
                .any(|r| r.transaction_id == lock.transaction_id)
            {
                return Ok(());
            }
            records.push(lock);
            Ok(())
        }

        async fn get_last_lock(&self) -> anyhow::Result<Option<SavedLock>> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .max_by_key(|r| r.create_timestamp)
                .cloned())
        }
    }

    #[async_trait]
    impl ClearForTests for InMemoryLockStore {
        async fn clear(&self) {
            self.records.lock().unwrap().clear();
        }
    }

    #[derive(Default)]
    pub struct InMemoryQuantileStore {
        groups: Mutex<std::collections::BTreeMap<u64, FrequencyVector>>,
    }

    impl InMemoryQuantileStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl QuantileStore for InMemoryQuantileStore {
        async fn put(&self, group: FrequencyGroup) -> anyhow::Result<()> {
            self.groups
                .lock()
                .unwrap()
                .insert(group.group_id, group.vector);
            Ok(())
        }

        async fn first_group_id(&self) -> anyhow::Result<Option<u64>> {
            Ok(self.groups.lock().unwrap().keys().next().copied())
        }

        async fn last_group_id(&self) -> anyhow::Result<Option<u64>> {
            Ok(self.groups.lock().unwrap().keys().next_back().copied())
        }

        async fn remove_groups_at_or_after(&self, id: u64) -> anyhow::Result<()> {
            self.groups.lock().unwrap().retain(|group_id, _| *group_id < id);
            Ok(())
        }
    }

    #[async_trait]
    impl ClearForTests for InMemoryQuantileStore {
        async fn clear(&self) {
            self.groups.lock().unwrap().clear();
        }
    }
}
