//! Encoding and parsing of the value-time-lock redeem script.
//!
//! Bit layout:
//!
//! ```text
//! <duration(1-4 LE bytes)> OP_CSV OP_DROP OP_DUP OP_HASH160 <hash160(20 bytes)> OP_EQUALVERIFY OP_CHECKSIG
//! ```
//!
//! The script is recognized by walking its binary opcode stream
//! directly rather than splitting a textual ASM representation, so it
//! never depends on a particular disassembler's formatting.

use crate::bitcoin::timelocks::DurationInBlocks;
use bitcoin::blockdata::opcodes::all::{
    OP_CHECKSIG, OP_CSV, OP_DROP, OP_DUP, OP_EQUAL, OP_EQUALVERIFY, OP_HASH160,
};
use bitcoin::blockdata::script::{Builder, Instruction, Script, ScriptBuf};
use bitcoin::hashes::{hash160, Hash};
use bitcoin::script::PushBytesBuf;

/// The 20-byte hash160 of the public key entitled to spend the lock output.
pub type PubkeyHash = [u8; 20];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockScriptTemplate {
    pub duration: DurationInBlocks,
    pub owner_pubkey_hash: PubkeyHash,
}

/// Build the canonical value-time-lock redeem script for `(duration, owner)`.
pub fn build(template: LockScriptTemplate) -> ScriptBuf {
    let duration_push = PushBytesBuf::try_from(template.duration.to_le_bytes())
        .expect("duration never exceeds the 4-byte push limit");
    let hash_push = PushBytesBuf::try_from(template.owner_pubkey_hash.to_vec())
        .expect("hash160 is always exactly 20 bytes");

    Builder::new()
        .push_slice(duration_push)
        .push_opcode(OP_CSV)
        .push_opcode(OP_DROP)
        .push_opcode(OP_DUP)
        .push_opcode(OP_HASH160)
        .push_slice(hash_push)
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_CHECKSIG)
        .into_script()
}

/// Why [`parse`] rejected a script, split so the Resolver can
/// distinguish a malformed script (`RedeemScriptInvalid`) from a
/// well-formed one that simply isn't a lock (`RedeemScriptIsNotLock`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptParseError {
    /// The opcode stream itself could not be walked (e.g. a push opcode
    /// claims more bytes than remain).
    Malformed,
    /// The opcode stream parses fine but does not match the fixed
    /// eight-token value-time-lock template.
    NotALock,
}

/// Parse a redeem script back into its `(duration, owner)` template.
pub fn parse(script: &Script) -> Result<LockScriptTemplate, ScriptParseError> {
    let instructions: Vec<Instruction> = script
        .instructions()
        .collect::<Result<_, _>>()
        .map_err(|_| ScriptParseError::Malformed)?;

    let not_a_lock = || ScriptParseError::NotALock;

    let [duration_tok, csv_tok, drop_tok, dup_tok, hash160_tok, hash_tok, eqverify_tok, checksig_tok] =
        <[Instruction; 8]>::try_from(instructions).map_err(|_| not_a_lock())?;

    let duration_bytes = duration_tok.push_bytes().ok_or_else(not_a_lock)?;
    let duration = DurationInBlocks::from_le_bytes(duration_bytes.as_bytes()).ok_or_else(not_a_lock)?;

    if csv_tok.opcode().ok_or_else(not_a_lock)? != OP_CSV {
        return Err(not_a_lock());
    }
    if drop_tok.opcode().ok_or_else(not_a_lock)? != OP_DROP {
        return Err(not_a_lock());
    }
    if dup_tok.opcode().ok_or_else(not_a_lock)? != OP_DUP {
        return Err(not_a_lock());
    }
    if hash160_tok.opcode().ok_or_else(not_a_lock)? != OP_HASH160 {
        return Err(not_a_lock());
    }

    let hash_bytes = hash_tok.push_bytes().ok_or_else(not_a_lock)?;
    let owner_pubkey_hash: PubkeyHash = hash_bytes.as_bytes().try_into().map_err(|_| not_a_lock())?;

    if eqverify_tok.opcode().ok_or_else(not_a_lock)? != OP_EQUALVERIFY {
        return Err(not_a_lock());
    }
    if checksig_tok.opcode().ok_or_else(not_a_lock)? != OP_CHECKSIG {
        return Err(not_a_lock());
    }

    Ok(LockScriptTemplate {
        duration,
        owner_pubkey_hash,
    })
}

/// Derive the pay-to-script-hash scriptPubKey a funding transaction must
/// send to in order to pay this redeem script.
pub fn p2sh_script_pubkey(redeem_script: &Script) -> ScriptBuf {
    let script_hash = hash160::Hash::hash(redeem_script.as_bytes());
    Builder::new()
        .push_opcode(OP_HASH160)
        .push_slice(<&bitcoin::script::PushBytes>::try_from(script_hash.as_byte_array().as_slice()).expect("hash160 is 20 bytes"))
        .push_opcode(OP_EQUAL)
        .into_script()
}

trait InstructionExt {
    fn opcode(&self) -> Option<bitcoin::blockdata::opcodes::Opcode>;
    fn push_bytes(&self) -> Option<&bitcoin::script::PushBytes>;
}

impl InstructionExt for Instruction<'_> {
    fn opcode(&self) -> Option<bitcoin::blockdata::opcodes::Opcode> {
        match self {
            Instruction::Op(op) => Some(*op),
            Instruction::PushBytes(_) => None,
        }
    }

    fn push_bytes(&self) -> Option<&bitcoin::script::PushBytes> {
        match self {
            Instruction::PushBytes(bytes) => Some(bytes),
            Instruction::Op(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_template() -> LockScriptTemplate {
        LockScriptTemplate {
            duration: DurationInBlocks::new(90),
            owner_pubkey_hash: [7u8; 20],
        }
    }

    #[test]
    fn build_then_parse_round_trips() {
        let template = sample_template();
        let script = build(template);
        let parsed = parse(&script).expect("valid lock script parses");
        assert_eq!(parsed, template);
    }

    #[test]
    fn wrong_opcode_in_place_of_csv_is_rejected() {
        let template = sample_template();
        let duration_push = PushBytesBuf::try_from(template.duration.to_le_bytes()).unwrap();
        let hash_push = PushBytesBuf::try_from(template.owner_pubkey_hash.to_vec()).unwrap();

        // OP_NOP2 (0xb1) where OP_CSV (0xb2) belongs -- the legacy CLTV
        // opcode, rejected in favor of the consensus-active OP_CSV.
        let script = Builder::new()
            .push_slice(duration_push)
            .push_opcode(bitcoin::blockdata::opcodes::all::OP_CLTV)
            .push_opcode(OP_DROP)
            .push_opcode(OP_DUP)
            .push_opcode(OP_HASH160)
            .push_slice(hash_push)
            .push_opcode(OP_EQUALVERIFY)
            .push_opcode(OP_CHECKSIG)
            .into_script();

        assert_eq!(parse(&script), Err(ScriptParseError::NotALock));
    }

    #[test]
    fn wrong_number_of_tokens_is_rejected() {
        let script = Builder::new()
            .push_opcode(OP_DUP)
            .push_opcode(OP_HASH160)
            .into_script();
        assert_eq!(parse(&script), Err(ScriptParseError::NotALock));
    }

    #[test]
    fn p2sh_output_is_deterministic_for_same_script() {
        let script = build(sample_template());
        let a = p2sh_script_pubkey(&script);
        let b = p2sh_script_pubkey(&script);
        assert_eq!(a, b);
        assert!(a.is_p2sh());
    }
}
