//! Stable error taxonomy for the VTL subsystem.
//!
//! Each public operation fails with a small, specific `thiserror` enum
//! scoped to the one thing that can go wrong at that call site, rather
//! than one crate-wide error type. Every variant also exposes a
//! `code()` returning a stable string, so callers on the service
//! boundary can match without parsing `Display` output.

use thiserror::Error;

/// Failures from [`crate::identifier`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("lock identifier is not in the expected base64url(txid.script.address) form")]
    IncorrectFormat,
}

impl IdentifierError {
    pub fn code(&self) -> &'static str {
        match self {
            IdentifierError::IncorrectFormat => "lock_identifier_incorrect_format",
        }
    }
}

/// Failures from [`crate::resolver::Resolver::resolve`].
#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("redeem script could not be decoded as a Bitcoin script")]
    RedeemScriptInvalid(#[source] anyhow::Error),
    #[error("redeem script does not match the value-time-lock template")]
    RedeemScriptIsNotLock,
    #[error("transaction is not found on chain")]
    TransactionNotFound(#[source] anyhow::Error),
    #[error("transaction exists but has not been confirmed yet")]
    TransactionNotConfirmed,
    #[error("transaction's first output does not pay the redeem script's P2SH address")]
    TransactionIsNotPayingToScript,
    #[error("redeem script's declared duration does not match the protocol's permitted duration at this height")]
    DurationIsInvalid,
    #[error("normalized fee could not be determined for this lock's height")]
    FeeUnavailable(#[source] anyhow::Error),
}

impl ResolverError {
    pub fn code(&self) -> &'static str {
        match self {
            ResolverError::RedeemScriptInvalid(_) => "lock_resolver_redeem_script_is_invalid",
            ResolverError::RedeemScriptIsNotLock => "lock_resolver_redeem_script_is_not_lock",
            ResolverError::TransactionNotFound(_) => "lock_resolver_transaction_not_found",
            ResolverError::TransactionNotConfirmed => "lock_resolver_transaction_not_confirmed",
            ResolverError::TransactionIsNotPayingToScript => {
                "lock_resolver_transaction_is_not_paying_to_script"
            }
            ResolverError::DurationIsInvalid => "lock_resolver_duration_is_invalid",
            ResolverError::FeeUnavailable(_) => "lock_resolver_fee_unavailable",
        }
    }

    /// True for errors the Monitor should treat as transient rather than fatal.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ResolverError::TransactionNotConfirmed | ResolverError::FeeUnavailable(_)
        )
    }
}

/// Failures specific to [`crate::monitor::LockMonitor`] reconciliation.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("wallet balance does not cover the desired lock amount plus transaction fees")]
    NotEnoughBalanceForFirstLock,
    #[error("relock transaction fee would bring the locked amount below the desired amount")]
    NotEnoughBalanceForRelock,
    #[error("current value-time-lock is still pending confirmation")]
    InPendingState,
    #[error("invalid monitor configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Resolver(#[from] ResolverError),
    #[error(transparent)]
    Chain(#[from] anyhow::Error),
}

impl MonitorError {
    pub fn code(&self) -> &'static str {
        match self {
            MonitorError::NotEnoughBalanceForFirstLock => {
                "lock_monitor_not_enough_balance_for_first_lock"
            }
            MonitorError::NotEnoughBalanceForRelock => {
                "lock_monitor_not_enough_balance_for_relock"
            }
            MonitorError::InPendingState => {
                "lock_monitor_current_value_time_lock_in_pending_state"
            }
            MonitorError::Config(_) => "lock_monitor_invalid_configuration",
            MonitorError::Resolver(e) => e.code(),
            MonitorError::Chain(_) => "lock_monitor_chain_error",
        }
    }
}

/// Failures from [`crate::verifier::verify`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum VerifierError {
    #[error("lock owner does not match the writer of this batch")]
    LockOwnerMismatch,
    #[error("transaction block falls outside the lock's active range")]
    LockTimeOutsideRange,
    #[error("number of operations in the batch exceeds what the lock's stake permits")]
    InvalidNumberOfOperations,
}
