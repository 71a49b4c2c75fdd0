//! Lock Identifier codec.
//!
//! Wire form: `base64url(transaction_id "." redeem_script_hex "." wallet_address)`.
//! `transaction_id` and `redeem_script_hex` are hex strings; `wallet_address`
//! is a base58check string (neither alphabet contains the ASCII dot, so the
//! delimiter is unambiguous).

use crate::error::IdentifierError;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;

/// The opaque reference to an on-chain lock, as handed to
/// [`crate::resolver::Resolver::resolve`].
///
/// `wallet_address` rides along in the wire form for display/audit
/// purposes; script verification in the Resolver never trusts it — it
/// recomputes ownership from the redeem script itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockIdentifier {
    pub transaction_id: String,
    pub redeem_script_hex: String,
    pub wallet_address: String,
}

pub fn serialize(identifier: &LockIdentifier) -> String {
    let payload = format!(
        "{}.{}.{}",
        identifier.transaction_id, identifier.redeem_script_hex, identifier.wallet_address
    );
    URL_SAFE.encode(payload)
}

pub fn deserialize(wire: &str) -> Result<LockIdentifier, IdentifierError> {
    let decoded = URL_SAFE
        .decode(wire)
        .map_err(|_| IdentifierError::IncorrectFormat)?;
    let payload = String::from_utf8(decoded).map_err(|_| IdentifierError::IncorrectFormat)?;

    let parts: Vec<&str> = payload.split('.').collect();
    let [transaction_id, redeem_script_hex, wallet_address] = <[&str; 3]>::try_from(parts)
        .map_err(|_| IdentifierError::IncorrectFormat)?;

    if transaction_id.is_empty() || redeem_script_hex.is_empty() || wallet_address.is_empty() {
        return Err(IdentifierError::IncorrectFormat);
    }

    Ok(LockIdentifier {
        transaction_id: transaction_id.to_string(),
        redeem_script_hex: redeem_script_hex.to_string(),
        wallet_address: wallet_address.to_string(),
    })
}
