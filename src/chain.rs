//! The Chain Client contract — out of scope to implement here: this
//! crate only defines the trait a real Bitcoin RPC/wallet adapter must
//! satisfy, analogous to an `#[async_trait]` repository trait whose
//! concrete backends (RPC, embedded wallet) live in separate modules.

use async_trait::async_trait;
use bitcoin::Txid;
use serde::{Deserialize, Serialize};

/// A confirmed or unconfirmed transaction as reported by the chain backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTransaction {
    pub txid: Txid,
    pub raw_bytes: Vec<u8>,
    /// Number of confirmations; `0` or negative means not yet confirmed.
    pub confirmations: i64,
    pub block_hash: Option<bitcoin::BlockHash>,
    /// Transaction outputs in on-chain order, as `(satoshis, script_pubkey)`.
    pub outputs: Vec<(u64, bitcoin::ScriptBuf)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub height: u32,
}

/// The pieces of a lock/relock/release transaction the Chain Client hands
/// back after constructing it, and which the Monitor persists before
/// broadcasting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConstructedTransaction {
    pub txid: String,
    pub raw_bytes: Vec<u8>,
    pub redeem_script_hex: String,
    pub transaction_fee: u64,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn get_raw_transaction(&self, txid: &str) -> anyhow::Result<RawTransaction>;

    async fn get_block_info(&self, block_hash: &bitcoin::BlockHash) -> anyhow::Result<BlockInfo>;

    async fn get_current_block_height(&self) -> anyhow::Result<u32>;

    async fn get_balance_in_satoshis(&self) -> anyhow::Result<u64>;

    async fn create_lock_transaction(
        &self,
        amount_satoshis: u64,
        duration_in_blocks: u32,
    ) -> anyhow::Result<ConstructedTransaction>;

    async fn create_relock_transaction(
        &self,
        prior_txid: &str,
        prior_duration_in_blocks: u32,
        new_duration_in_blocks: u32,
    ) -> anyhow::Result<ConstructedTransaction>;

    async fn create_release_lock_transaction(
        &self,
        prior_txid: &str,
        prior_duration_in_blocks: u32,
    ) -> anyhow::Result<ConstructedTransaction>;

    /// Must be idempotent: broadcasting a txid the client has already seen
    /// succeeds silently.
    async fn broadcast_lock_transaction(&self, tx: &ConstructedTransaction) -> anyhow::Result<()>;
}

/// In-memory test doubles: constructible stand-ins with no real backend,
/// used only by this crate's own tests.
#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct Inner {
        transactions: HashMap<String, RawTransaction>,
        blocks: HashMap<bitcoin::BlockHash, BlockInfo>,
        current_height: u32,
        balance_satoshis: u64,
        broadcasts: Vec<String>,
        queued_constructions: VecDeque<ConstructedTransaction>,
    }

    /// A fully in-process Chain Client whose behaviour is driven by the
    /// test that constructs it.
    pub struct FakeChainClient {
        inner: Mutex<Inner>,
    }

    impl FakeChainClient {
        pub fn new() -> Self {
            Self {
                inner: Mutex::new(Inner::default()),
            }
        }

        pub fn set_balance(&self, satoshis: u64) {
            self.inner.lock().unwrap().balance_satoshis = satoshis;
        }

        pub fn set_current_height(&self, height: u32) {
            self.inner.lock().unwrap().current_height = height;
        }

        pub fn insert_transaction(&self, tx: RawTransaction) {
            self.inner
                .lock()
                .unwrap()
                .transactions
                .insert(tx.txid.to_string(), tx);
        }

        pub fn insert_block(&self, hash: bitcoin::BlockHash, info: BlockInfo) {
            self.inner.lock().unwrap().blocks.insert(hash, info);
        }

        /// Arrange for the next `create_*_transaction` call to return this
        /// value verbatim. Calling this more than once queues results for
        /// successive calls, in order.
        pub fn queue_construction(&self, tx: ConstructedTransaction) {
            self.inner.lock().unwrap().queued_constructions.push_back(tx);
        }

        pub fn broadcast_count(&self) -> usize {
            self.inner.lock().unwrap().broadcasts.len()
        }

        pub fn broadcasts(&self) -> Vec<String> {
            self.inner.lock().unwrap().broadcasts.clone()
        }

        fn take_construction(&self) -> anyhow::Result<ConstructedTransaction> {
            self.inner
                .lock()
                .unwrap()
                .queued_constructions
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("test did not queue a construction result"))
        }
    }

    impl Default for FakeChainClient {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl ChainClient for FakeChainClient {
        async fn get_raw_transaction(&self, txid: &str) -> anyhow::Result<RawTransaction> {
            self.inner
                .lock()
                .unwrap()
                .transactions
                .get(txid)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("unknown transaction {txid}"))
        }

        async fn get_block_info(
            &self,
            block_hash: &bitcoin::BlockHash,
        ) -> anyhow::Result<BlockInfo> {
            self.inner
                .lock()
                .unwrap()
                .blocks
                .get(block_hash)
                .copied()
                .ok_or_else(|| anyhow::anyhow!("unknown block {block_hash}"))
        }

        async fn get_current_block_height(&self) -> anyhow::Result<u32> {
            Ok(self.inner.lock().unwrap().current_height)
        }

        async fn get_balance_in_satoshis(&self) -> anyhow::Result<u64> {
            Ok(self.inner.lock().unwrap().balance_satoshis)
        }

        async fn create_lock_transaction(
            &self,
            _amount_satoshis: u64,
            _duration_in_blocks: u32,
        ) -> anyhow::Result<ConstructedTransaction> {
            self.take_construction()
        }

        async fn create_relock_transaction(
            &self,
            _prior_txid: &str,
            _prior_duration_in_blocks: u32,
            _new_duration_in_blocks: u32,
        ) -> anyhow::Result<ConstructedTransaction> {
            self.take_construction()
        }

        async fn create_release_lock_transaction(
            &self,
            _prior_txid: &str,
            _prior_duration_in_blocks: u32,
        ) -> anyhow::Result<ConstructedTransaction> {
            self.take_construction()
        }

        async fn broadcast_lock_transaction(
            &self,
            tx: &ConstructedTransaction,
        ) -> anyhow::Result<()> {
            let mut inner = self.inner.lock().unwrap();
            if !inner.broadcasts.contains(&tx.txid) {
                inner.broadcasts.push(tx.txid.clone());
            }
            Ok(())
        }
    }
}
