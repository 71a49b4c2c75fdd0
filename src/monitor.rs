//! The Lock Monitor: a single-writer state machine that
//! reconciles a desired lock amount against on-chain reality, idempotently
//! issuing create/renew/release transactions.

pub mod state;

use crate::bitcoin::timelocks::BlockHeight;
use crate::chain::{ChainClient, ConstructedTransaction};
use crate::config::{FeeCalculator, MonitorConfig, VersionManager};
use crate::error::MonitorError;
use crate::identifier::LockIdentifier;
use crate::resolver::{Resolver, ValueTimeLock};
use crate::store::{LockRecordType, LockStore, SavedLock};
use state::{LockState, LockStatus};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{watch, RwLock};
use tokio::time::{interval, Duration};

pub struct LockMonitor {
    chain: Arc<dyn ChainClient>,
    store: Arc<dyn LockStore>,
    versions: Arc<dyn VersionManager>,
    fees: Arc<dyn FeeCalculator>,
    config: MonitorConfig,
    cached_state: RwLock<Option<LockState>>,
    shutdown: watch::Sender<bool>,
}

impl LockMonitor {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        store: Arc<dyn LockStore>,
        versions: Arc<dyn VersionManager>,
        fees: Arc<dyn FeeCalculator>,
        config: MonitorConfig,
    ) -> Result<Self, MonitorError> {
        config.validate()?;

        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            chain,
            store,
            versions,
            fees,
            config,
            cached_state: RwLock::new(None),
            shutdown,
        })
    }

    /// One-shot setup: runs the first reconciliation synchronously so
    /// configuration errors surface to the caller instead of being
    /// logged and swallowed the way a routine tick's errors are.
    pub async fn initialize(&self) -> Result<(), MonitorError> {
        self.tick().await
    }

    /// Returns the last resolved lock, or `InPendingState` if the
    /// current intent has not yet confirmed.
    pub async fn get_current_value_time_lock(&self) -> Result<Option<ValueTimeLock>, MonitorError> {
        let state = self.cached_state.read().await;
        match state.as_ref() {
            None => Ok(None),
            Some(s) => match s.status() {
                LockStatus::Confirmed => Ok(s.active_lock().cloned()),
                LockStatus::Pending => Err(MonitorError::InPendingState),
                LockStatus::None => Ok(None),
            },
        }
    }

    /// Spawns the self-rescheduling poll loop at `poll_period_seconds`.
    /// Exceptions during a routine tick are logged, not propagated; a
    /// tick already running when shutdown is requested is allowed to
    /// finish before the loop exits.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(self.config.poll_period_seconds));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(error) = self.tick().await {
                            tracing::warn!(%error, code = error.code(), "lock monitor tick failed");
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            tracing::debug!("lock monitor shutting down");
                            break;
                        }
                    }
                }
            }
        })
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Re-derive [`LockState`] from the latest persisted intent and the
    /// chain.
    async fn compute_state(&self) -> Result<LockState, MonitorError> {
        let Some(saved) = self.store.get_last_lock().await.map_err(MonitorError::Chain)? else {
            return Ok(LockState::none(None));
        };

        if self
            .chain
            .get_raw_transaction(&saved.transaction_id)
            .await
            .is_err()
        {
            tracing::debug!(txid = %saved.transaction_id, "transaction not visible on chain, rebroadcasting");
            let rebroadcast = ConstructedTransaction {
                txid: saved.transaction_id.clone(),
                raw_bytes: saved.raw_transaction.clone(),
                redeem_script_hex: saved.redeem_script_hex.clone(),
                transaction_fee: 0,
            };
            // Backpressure: a rejected rebroadcast is swallowed, the next
            // tick will retry from the same saved intent.
            let _ = self.chain.broadcast_lock_transaction(&rebroadcast).await;
            return Ok(LockState::pending(saved));
        }

        if saved.record_type == LockRecordType::ReturnToWallet {
            return Ok(LockState::none(Some(saved)));
        }

        let identifier = LockIdentifier {
            transaction_id: saved.transaction_id.clone(),
            redeem_script_hex: saved.redeem_script_hex.clone(),
            // Not persisted by the Monitor; only meaningful to the
            // externally-facing identifier codec, see `identifier.rs`.
            wallet_address: "unknown".to_string(),
        };
        let resolver = Resolver::new(&*self.chain, &*self.versions, &*self.fees);
        match resolver.resolve(&identifier).await {
            Ok(lock) => Ok(LockState::confirmed(lock, saved)),
            Err(other) if other.is_transient() => Ok(LockState::pending(saved)),
            Err(other) => Err(MonitorError::Resolver(other)),
        }
    }

    /// Periodic reconciliation: read the last saved intent, probe the
    /// chain, decide, act. A single in-flight tick at a time is
    /// guaranteed by running this only from the sequential loop in
    /// [`Self::start`]; there is no internal concurrency to guard against.
    pub async fn tick(&self) -> Result<(), MonitorError> {
        let state = self.compute_state().await?;
        let lock_required = self.config.desired_lock_amount_satoshis > 0;
        let status = state.status();

        match status {
            LockStatus::Pending => {
                // Rebroadcast, if needed, already happened inside
                // `compute_state`; no further structural action this tick.
            }
            LockStatus::None if !lock_required => {
                // Idle.
            }
            LockStatus::None => {
                self.handle_create(self.config.desired_lock_amount_satoshis)
                    .await?;
            }
            LockStatus::Confirmed if !lock_required => {
                let active = state.active_lock().expect("confirmed state carries a lock");
                self.handle_release(active, self.config.desired_lock_amount_satoshis)
                    .await?;
            }
            LockStatus::Confirmed => {
                let active = state.active_lock().expect("confirmed state carries a lock");
                let latest = state
                    .latest_saved()
                    .expect("confirmed state carries the saved intent");
                match self
                    .handle_renew(active, latest, self.config.desired_lock_amount_satoshis)
                    .await
                {
                    Ok(_) => {}
                    Err(MonitorError::NotEnoughBalanceForRelock) => {
                        self.handle_release(active, self.config.desired_lock_amount_satoshis)
                            .await?;
                    }
                    Err(other) => return Err(other),
                }
            }
        }

        *self.cached_state.write().await = Some(state);
        Ok(())
    }

    /// Funds a brand-new lock from the wallet balance.
    async fn handle_create(&self, desired: u64) -> Result<(), MonitorError> {
        let total = desired + self.config.transaction_fees_amount_satoshis;
        let balance = self
            .chain
            .get_balance_in_satoshis()
            .await
            .map_err(MonitorError::Chain)?;

        if balance <= total {
            return Err(MonitorError::NotEnoughBalanceForFirstLock);
        }

        let constructed = self
            .chain
            .create_lock_transaction(total, self.config.lock_period_in_blocks)
            .await
            .map_err(MonitorError::Chain)?;

        self.save_then_broadcast(constructed, LockRecordType::Create, desired)
            .await
    }

    /// Extends an expired lock in place, or falls back to releasing it if
    /// the desired amount changed underneath it. Returns `Ok(false)` for
    /// the two "nothing to do" early exits so a caller can tell a no-op
    /// renewal apart from a committed one if it wants to.
    async fn handle_renew(
        &self,
        active: &ValueTimeLock,
        latest: &SavedLock,
        desired: u64,
    ) -> Result<bool, MonitorError> {
        let current_height = self
            .chain
            .get_current_block_height()
            .await
            .map_err(MonitorError::Chain)?;

        if current_height < u32::from(active.unlock_transaction_time) {
            return Ok(false);
        }

        if latest.desired_lock_amount_satoshis != desired {
            self.handle_release(active, desired).await?;
            return Ok(false);
        }

        let active_duration = u32::from(active.unlock_transaction_time)
            .checked_sub(u32::from(active.lock_transaction_time))
            .unwrap_or(0);
        let new_duration = self
            .versions
            .permitted_duration_in_blocks(BlockHeight::new(current_height));

        let constructed = self
            .chain
            .create_relock_transaction(&active.transaction_id, active_duration, new_duration)
            .await
            .map_err(MonitorError::Chain)?;

        if active.amount_locked.saturating_sub(constructed.transaction_fee) < desired {
            return Err(MonitorError::NotEnoughBalanceForRelock);
        }

        self.save_then_broadcast(constructed, LockRecordType::Relock, desired)
            .await?;
        Ok(true)
    }

    /// Returns an expired lock's funds to the wallet.
    async fn handle_release(&self, active: &ValueTimeLock, desired: u64) -> Result<bool, MonitorError> {
        let current_height = self
            .chain
            .get_current_block_height()
            .await
            .map_err(MonitorError::Chain)?;

        if current_height < u32::from(active.unlock_transaction_time) {
            return Ok(false);
        }

        let active_duration = u32::from(active.unlock_transaction_time)
            .checked_sub(u32::from(active.lock_transaction_time))
            .unwrap_or(0);

        let constructed = self
            .chain
            .create_release_lock_transaction(&active.transaction_id, active_duration)
            .await
            .map_err(MonitorError::Chain)?;

        self.save_then_broadcast(constructed, LockRecordType::ReturnToWallet, desired)
            .await?;
        Ok(true)
    }

    /// The critical invariant: the record is appended to the Lock Store
    /// *before* the transaction is handed to the Chain Client, so a crash
    /// between the two leaves a record a restarted Monitor can rebroadcast
    /// rather than an orphaned transaction with no trace of it.
    async fn save_then_broadcast(
        &self,
        constructed: ConstructedTransaction,
        record_type: LockRecordType,
        desired: u64,
    ) -> Result<(), MonitorError> {
        let saved = SavedLock {
            transaction_id: constructed.txid.clone(),
            raw_transaction: constructed.raw_bytes.clone(),
            redeem_script_hex: constructed.redeem_script_hex.clone(),
            desired_lock_amount_satoshis: desired,
            create_timestamp: now_millis(),
            record_type,
        };

        self.store.add_lock(saved).await.map_err(MonitorError::Chain)?;

        self.chain
            .broadcast_lock_transaction(&constructed)
            .await
            .map_err(MonitorError::Chain)?;

        Ok(())
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the Unix epoch")
        .as_millis() as i64
}
