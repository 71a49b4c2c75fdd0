//! The Value-Time-Lock Verifier: turns a resolved lock (or its absence)
//! into an accept/reject decision for one batch of writer operations.

use crate::bitcoin::timelocks::BlockHeight;
use crate::config::VerifierParameters;
use crate::error::VerifierError;
use crate::resolver::ValueTimeLock;

/// Decide whether `ops_in_batch` operations by `tx_writer`, anchored at
/// `tx_block` and costing `normalized_fee` per byte, are permitted
/// under `lock`.
///
/// A batch at or under `params.free_ops` is accepted unconditionally,
/// lock or no lock — this is the bootstrap allowance that lets a writer
/// publish before ever funding a stake.
pub fn verify(
    lock: Option<&ValueTimeLock>,
    ops_in_batch: u64,
    normalized_fee: u64,
    tx_block: BlockHeight,
    tx_writer: [u8; 20],
    params: &VerifierParameters,
) -> Result<(), VerifierError> {
    if ops_in_batch <= params.free_ops {
        return Ok(());
    }

    if let Some(lock) = lock {
        if lock.owner != tx_writer {
            return Err(VerifierError::LockOwnerMismatch);
        }
        if !(lock.lock_transaction_time <= tx_block && tx_block < lock.unlock_transaction_time) {
            return Err(VerifierError::LockTimeOutsideRange);
        }
    }

    let amount_locked = lock.map(|l| l.amount_locked).unwrap_or(0);
    let fee_per_op = normalized_fee.saturating_mul(params.normalized_fee_multiplier);
    let denominator = fee_per_op.saturating_mul(params.lock_amount_multiplier).max(1);
    let max_ops = (amount_locked / denominator).max(params.free_ops);

    if ops_in_batch > max_ops {
        return Err(VerifierError::InvalidNumberOfOperations);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lock(owner: [u8; 20], amount: u64, start: u32, end: u32) -> ValueTimeLock {
        ValueTimeLock {
            identifier: "id".to_string(),
            transaction_id: "tx".to_string(),
            amount_locked: amount,
            owner,
            lock_transaction_time: BlockHeight::new(start),
            unlock_transaction_time: BlockHeight::new(end),
            normalized_fee: 1,
        }
    }

    #[test]
    fn batch_under_free_ops_bypasses_every_check() {
        let params = VerifierParameters::default();
        let result = verify(None, params.free_ops, 1, BlockHeight::new(0), [0u8; 20], &params);
        assert!(result.is_ok());
    }

    #[test]
    fn batch_over_free_ops_with_no_lock_is_rejected() {
        let params = VerifierParameters::default();
        let result = verify(
            None,
            params.free_ops + 1,
            1,
            BlockHeight::new(0),
            [0u8; 20],
            &params,
        );
        assert_eq!(result.unwrap_err(), VerifierError::InvalidNumberOfOperations);
    }

    #[test]
    fn wrong_owner_is_rejected() {
        let params = VerifierParameters::default();
        let active = lock([1u8; 20], 1_000_000, 100, 200);
        let result = verify(
            Some(&active),
            params.free_ops + 1,
            1,
            BlockHeight::new(150),
            [2u8; 20],
            &params,
        );
        assert_eq!(result.unwrap_err(), VerifierError::LockOwnerMismatch);
    }

    #[test]
    fn block_outside_lock_range_is_rejected() {
        let params = VerifierParameters::default();
        let active = lock([1u8; 20], 1_000_000, 100, 200);
        let result = verify(
            Some(&active),
            params.free_ops + 1,
            1,
            BlockHeight::new(200),
            [1u8; 20],
            &params,
        );
        assert_eq!(result.unwrap_err(), VerifierError::LockTimeOutsideRange);
    }

    #[test]
    fn batch_exceeding_max_ops_for_locked_amount_is_rejected() {
        let params = VerifierParameters::default();
        let active = lock([1u8; 20], 10, 100, 200);
        let result = verify(
            Some(&active),
            params.free_ops + 1_000,
            1,
            BlockHeight::new(150),
            [1u8; 20],
            &params,
        );
        assert_eq!(result.unwrap_err(), VerifierError::InvalidNumberOfOperations);
    }

    #[test]
    fn well_funded_lock_permits_a_large_batch() {
        let params = VerifierParameters::default();
        let active = lock([1u8; 20], 1_000_000_000, 100, 200);
        let result = verify(
            Some(&active),
            params.free_ops + 1_000,
            1,
            BlockHeight::new(150),
            [1u8; 20],
            &params,
        );
        assert!(result.is_ok());
    }
}
