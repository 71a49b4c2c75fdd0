//! Protocol parameters — the "version manager" and fee calculator the
//! Resolver and Verifier consult.
//!
//! Kept as plain structs/traits supplied by the caller, not a
//! file/CLI-loaded config layer: protocol-parameter version *selection*
//! is explicitly out of scope, so there is no surrounding file/CLI
//! machinery here — that lives outside this subsystem.

use crate::bitcoin::timelocks::BlockHeight;

/// Looks up the single relative-lock duration the protocol permits a
/// writer to use at a given height. Prevents writers from
/// self-selecting arbitrary durations outside the protocol's allowed
/// value.
pub trait VersionManager: Send + Sync {
    fn permitted_duration_in_blocks(&self, at_height: BlockHeight) -> u32;
}

/// Consulted by the Resolver for the normalized fee in effect at a given
/// height. A real implementation is typically
/// backed by a [`crate::quantile::QuantileEngine`]; see its `FeeCalculator`
/// impl below.
pub trait FeeCalculator: Send + Sync {
    fn normalized_fee_at(&self, height: BlockHeight) -> anyhow::Result<u64>;
}

/// A duration schedule that takes effect at and after a configured
/// height; most-recent-effective-height wins.
#[derive(Debug, Clone)]
pub struct DurationSchedule {
    /// Ascending by height; `(effective_from, duration_in_blocks)`.
    entries: Vec<(BlockHeight, u32)>,
}

impl DurationSchedule {
    /// `entries` need not be pre-sorted; at least one entry is required.
    pub fn new(mut entries: Vec<(BlockHeight, u32)>) -> Self {
        assert!(!entries.is_empty(), "a duration schedule needs a baseline entry");
        entries.sort_by_key(|(height, _)| *height);
        Self { entries }
    }

    pub fn constant(duration_in_blocks: u32) -> Self {
        Self::new(vec![(BlockHeight::new(0), duration_in_blocks)])
    }
}

impl VersionManager for DurationSchedule {
    fn permitted_duration_in_blocks(&self, at_height: BlockHeight) -> u32 {
        self.entries
            .iter()
            .rev()
            .find(|(effective_from, _)| *effective_from <= at_height)
            .map(|(_, duration)| *duration)
            .unwrap_or(self.entries[0].1)
    }
}

/// Tunables for the Verifier.
#[derive(Debug, Clone, Copy)]
pub struct VerifierParameters {
    pub free_ops: u64,
    pub normalized_fee_multiplier: u64,
    pub lock_amount_multiplier: u64,
}

impl Default for VerifierParameters {
    fn default() -> Self {
        Self {
            free_ops: 100,
            normalized_fee_multiplier: 1,
            lock_amount_multiplier: 1,
        }
    }
}

/// Configuration for [`crate::monitor::LockMonitor`].
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub desired_lock_amount_satoshis: u64,
    pub transaction_fees_amount_satoshis: u64,
    pub lock_period_in_blocks: u32,
    pub poll_period_seconds: u64,
}

impl MonitorConfig {
    /// Rejects a configuration that could never make progress: a zero
    /// lock period or poll interval. Callers constructing amounts from
    /// external input (e.g. a decimal BTC amount) should round before
    /// reaching here — the satoshi fields are `u64` and trusted as exact.
    pub fn validate(&self) -> Result<(), crate::error::MonitorError> {
        if self.lock_period_in_blocks == 0 {
            return Err(crate::error::MonitorError::Config(
                "lock_period_in_blocks must be positive".to_string(),
            ));
        }
        if self.poll_period_seconds == 0 {
            return Err(crate::error::MonitorError::Config(
                "poll_period_seconds must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
