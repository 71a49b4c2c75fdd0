//! End-to-end coverage of the Lock Monitor against the in-memory test
//! doubles, exercised through the crate's public API only.

use std::sync::Arc;
use vtl::bitcoin::script::{build, p2sh_script_pubkey, LockScriptTemplate};
use vtl::bitcoin::timelocks::DurationInBlocks;
use vtl::chain::test_support::FakeChainClient;
use vtl::chain::{BlockInfo, ConstructedTransaction, RawTransaction};
use vtl::config::{DurationSchedule, FeeCalculator, MonitorConfig};
use vtl::error::MonitorError;
use vtl::monitor::LockMonitor;
use vtl::store::test_support::InMemoryLockStore;
use vtl::store::{LockRecordType, LockStore, SavedLock};

struct FixedFee(u64);
impl FeeCalculator for FixedFee {
    fn normalized_fee_at(&self, _height: vtl::bitcoin::timelocks::BlockHeight) -> anyhow::Result<u64> {
        Ok(self.0)
    }
}

fn build_monitor(
    chain: Arc<FakeChainClient>,
    store: Arc<InMemoryLockStore>,
    desired: u64,
    lock_period: u32,
) -> LockMonitor {
    LockMonitor::new(
        chain,
        store,
        Arc::new(DurationSchedule::constant(lock_period)),
        Arc::new(FixedFee(1)),
        MonitorConfig {
            desired_lock_amount_satoshis: desired,
            transaction_fees_amount_satoshis: 100,
            lock_period_in_blocks: lock_period,
            poll_period_seconds: 60,
        },
    )
    .unwrap()
}

#[tokio::test]
async fn scenario_fresh_start_lock_required() {
    let chain = Arc::new(FakeChainClient::new());
    let store = Arc::new(InMemoryLockStore::new());
    chain.set_balance(1_000_200);
    chain.queue_construction(ConstructedTransaction {
        txid: "tx-fresh".to_string(),
        raw_bytes: vec![1, 2, 3],
        redeem_script_hex: "deadbeef".to_string(),
        transaction_fee: 0,
    });

    let monitor = build_monitor(chain.clone(), store.clone(), 1_000_000, 90);
    monitor.initialize().await.unwrap();

    let records = store.all();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].record_type, LockRecordType::Create);
    assert_eq!(records[0].desired_lock_amount_satoshis, 1_000_000);
    assert_eq!(chain.broadcast_count(), 1);
    assert!(matches!(
        monitor.get_current_value_time_lock().await,
        Err(MonitorError::InPendingState)
    ));
}

#[tokio::test]
async fn scenario_insufficient_balance() {
    let chain = Arc::new(FakeChainClient::new());
    let store = Arc::new(InMemoryLockStore::new());
    chain.set_balance(1_000_050);

    let monitor = build_monitor(chain.clone(), store.clone(), 1_000_000, 90);
    let error = monitor.initialize().await.unwrap_err();

    assert!(matches!(error, MonitorError::NotEnoughBalanceForFirstLock));
    assert!(store.all().is_empty());
    assert_eq!(chain.broadcast_count(), 0);
}

fn block_hash_for(height: u32) -> bitcoin::BlockHash {
    use bitcoin::hashes::{sha256d, Hash};
    bitcoin::BlockHash::from_raw_hash(sha256d::Hash::hash(&height.to_le_bytes()))
}

async fn seed_confirmed_lock(
    chain: &FakeChainClient,
    store: &InMemoryLockStore,
    txid_label: &str,
    start_height: u32,
    duration: u32,
    amount: u64,
    desired: u64,
) {
    use bitcoin::hashes::{sha256d, Hash};

    let template = LockScriptTemplate {
        duration: DurationInBlocks::new(duration),
        owner_pubkey_hash: [4u8; 20],
    };
    let redeem_script = build(template);
    let p2sh = p2sh_script_pubkey(&redeem_script);
    let txid = bitcoin::Txid::from_raw_hash(sha256d::Hash::hash(txid_label.as_bytes()));
    let block_hash = block_hash_for(start_height);

    chain.insert_block(block_hash, BlockInfo { height: start_height });
    chain.insert_transaction(RawTransaction {
        txid,
        raw_bytes: vec![],
        confirmations: 6,
        block_hash: Some(block_hash),
        outputs: vec![(amount, p2sh)],
    });
    store
        .add_lock(SavedLock {
            transaction_id: txid.to_string(),
            raw_transaction: vec![],
            redeem_script_hex: hex::encode(redeem_script.as_bytes()),
            desired_lock_amount_satoshis: desired,
            create_timestamp: 1,
            record_type: LockRecordType::Create,
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn scenario_renewal_at_expiry() {
    let chain = Arc::new(FakeChainClient::new());
    let store = Arc::new(InMemoryLockStore::new());
    seed_confirmed_lock(&chain, &store, "scenario-3", 800_000, 90, 1_000_000, 1_000_000).await;
    chain.set_current_height(800_090);
    chain.queue_construction(ConstructedTransaction {
        txid: "tx-relock-3".to_string(),
        raw_bytes: vec![],
        redeem_script_hex: "deadbeef".to_string(),
        transaction_fee: 100,
    });

    let monitor = build_monitor(chain.clone(), store.clone(), 1_000_000, 90);
    monitor.initialize().await.unwrap();

    let records = store.all();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].record_type, LockRecordType::Relock);
    assert_eq!(chain.broadcasts(), vec!["tx-relock-3".to_string()]);
}

#[tokio::test]
async fn scenario_renewal_fee_eats_lock_falls_back_to_release() {
    let chain = Arc::new(FakeChainClient::new());
    let store = Arc::new(InMemoryLockStore::new());
    seed_confirmed_lock(&chain, &store, "scenario-4", 800_000, 90, 1_000_000, 1_000_000).await;
    chain.set_current_height(800_090);
    chain.queue_construction(ConstructedTransaction {
        txid: "tx-relock-4".to_string(),
        raw_bytes: vec![],
        redeem_script_hex: "deadbeef".to_string(),
        transaction_fee: 999_000,
    });
    chain.queue_construction(ConstructedTransaction {
        txid: "tx-release-4".to_string(),
        raw_bytes: vec![],
        redeem_script_hex: "deadbeef".to_string(),
        transaction_fee: 0,
    });

    let monitor = build_monitor(chain.clone(), store.clone(), 1_000_000, 90);
    monitor.initialize().await.unwrap();

    let records = store.all();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].record_type, LockRecordType::ReturnToWallet);
}

#[tokio::test]
async fn scenario_crash_recovery_rebroadcast() {
    let chain = Arc::new(FakeChainClient::new());
    let store = Arc::new(InMemoryLockStore::new());
    store
        .add_lock(SavedLock {
            transaction_id: "tx-orphan".to_string(),
            raw_transaction: vec![7, 7, 7],
            redeem_script_hex: "deadbeef".to_string(),
            desired_lock_amount_satoshis: 1_000_000,
            create_timestamp: 1,
            record_type: LockRecordType::Create,
        })
        .await
        .unwrap();

    let monitor = build_monitor(chain.clone(), store.clone(), 1_000_000, 90);
    monitor.initialize().await.unwrap();

    assert_eq!(chain.broadcasts(), vec!["tx-orphan".to_string()]);
    assert_eq!(store.all().len(), 1, "rebroadcast writes no new record");
}
