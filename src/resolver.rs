//! The Lock Resolver: a pure verifier that turns a
//! [`LockIdentifier`] plus a chain snapshot and protocol parameters into
//! the authoritative [`ValueTimeLock`] record. Performs no writes.

use crate::bitcoin::script::{self, ScriptParseError};
use crate::bitcoin::timelocks::BlockHeight;
use crate::chain::ChainClient;
use crate::config::{FeeCalculator, VersionManager};
use crate::error::ResolverError;
use crate::identifier::LockIdentifier;
use bitcoin::ScriptBuf;
use serde::{Deserialize, Serialize};

/// The authoritative view of an on-chain value-time-lock.
///
/// Invariants: `unlock_transaction_time > lock_transaction_time`,
/// `amount_locked > 0`, `owner` is exactly 20 bytes, `normalized_fee >= 1`.
///
/// `transaction_id` is carried alongside the opaque `identifier` string
/// because the Monitor's renewal/release handlers reference
/// `active.transaction_id` directly and shouldn't have to decode the
/// identifier to get it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValueTimeLock {
    pub identifier: String,
    pub transaction_id: String,
    pub amount_locked: u64,
    pub owner: [u8; 20],
    pub lock_transaction_time: BlockHeight,
    pub unlock_transaction_time: BlockHeight,
    pub normalized_fee: u64,
}

pub struct Resolver<'a> {
    chain: &'a dyn ChainClient,
    versions: &'a dyn VersionManager,
    fees: &'a dyn FeeCalculator,
}

impl<'a> Resolver<'a> {
    pub fn new(
        chain: &'a dyn ChainClient,
        versions: &'a dyn VersionManager,
        fees: &'a dyn FeeCalculator,
    ) -> Self {
        Self {
            chain,
            versions,
            fees,
        }
    }

    /// Parses the redeem script, confirms the anchoring transaction,
    /// checks it pays the script's P2SH address, validates the declared
    /// duration against the protocol's permitted value at that height,
    /// and assembles the resolved lock.
    pub async fn resolve(&self, identifier: &LockIdentifier) -> Result<ValueTimeLock, ResolverError> {
        // Step 1: parse the redeem script into its duration + owner.
        let script_bytes =
            hex::decode(&identifier.redeem_script_hex).map_err(|e| {
                ResolverError::RedeemScriptInvalid(anyhow::anyhow!(e))
            })?;
        let redeem_script = ScriptBuf::from_bytes(script_bytes);
        let template = script::parse(&redeem_script).map_err(|e| match e {
            ScriptParseError::Malformed => {
                ResolverError::RedeemScriptInvalid(anyhow::anyhow!("malformed opcode stream"))
            }
            ScriptParseError::NotALock => ResolverError::RedeemScriptIsNotLock,
        })?;

        // Step 2: fetch the transaction.
        let transaction = self
            .chain
            .get_raw_transaction(&identifier.transaction_id)
            .await
            .map_err(ResolverError::TransactionNotFound)?;

        // Step 3: confirm anchoring.
        if transaction.confirmations <= 0 {
            return Err(ResolverError::TransactionNotConfirmed);
        }
        let block_hash = transaction
            .block_hash
            .ok_or(ResolverError::TransactionNotConfirmed)?;
        let block_info = self
            .chain
            .get_block_info(&block_hash)
            .await
            .map_err(ResolverError::TransactionNotFound)?;
        let lock_start_block = BlockHeight::new(block_info.height);

        // Step 4: verify payment to the redeem script's P2SH output.
        let expected_output = script::p2sh_script_pubkey(&redeem_script);
        let (amount_locked, _) = transaction
            .outputs
            .first()
            .filter(|(_, script)| *script == expected_output)
            .ok_or(ResolverError::TransactionIsNotPayingToScript)?;

        // Step 5: verify the declared duration is the one the protocol permits.
        let permitted_duration = self.versions.permitted_duration_in_blocks(lock_start_block);
        if permitted_duration != u32::from(template.duration) {
            return Err(ResolverError::DurationIsInvalid);
        }

        // Step 6: derive the normalized fee in effect at that height. The
        // transaction itself is already confirmed and verified by this
        // point, so a failure here is a distinct condition from a missing
        // or unconfirmed transaction.
        let normalized_fee = self
            .fees
            .normalized_fee_at(lock_start_block)
            .map_err(ResolverError::FeeUnavailable)?
            .max(1);

        // Step 7: assemble the resolved lock.
        Ok(ValueTimeLock {
            identifier: crate::identifier::serialize(identifier),
            transaction_id: identifier.transaction_id.clone(),
            amount_locked: *amount_locked,
            owner: template.owner_pubkey_hash,
            lock_transaction_time: lock_start_block,
            unlock_transaction_time: lock_start_block + template.duration,
            normalized_fee,
        })
    }
}
