//! Signature hashes.
//!
//! Two algorithms cover the supported chains: the legacy pre-segwit digest
//! for Bitcoin and Litecoin, and the BIP-143 digest with the Bitcoin Cash
//! fork ID. The fork-ID variant is written out field by field rather than
//! borrowing the segwit code path; the appended hash-type word differs
//! (`SIGHASH_ALL | 0x40`) and the committed script code is the sorted
//! multisig redeem, not a witness program.

use bitcoin::consensus::encode::serialize;
use bitcoin::hashes::{sha256d, Hash};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{Script, Transaction};

use crate::error::SignerError;

/// The Bitcoin Cash fork ID, OR-ed into the sighash type.
pub const FORK_ID: u8 = 0x40;

/// Which digest a signer computes, and which type byte it appends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SighashScheme {
    /// Legacy SIGHASH_ALL (Bitcoin, Litecoin).
    Legacy,
    /// BIP-143 with fork ID (Bitcoin Cash); commits to the input amount.
    ForkId,
}

impl SighashScheme {
    /// The byte appended to each DER signature.
    pub fn sighash_byte(self) -> u8 {
        match self {
            SighashScheme::Legacy => EcdsaSighashType::All.to_u32() as u8,
            SighashScheme::ForkId => EcdsaSighashType::All.to_u32() as u8 | FORK_ID,
        }
    }
}

/// Legacy SIGHASH_ALL digest: the serialized transaction with this input's
/// script replaced by `script_code`, all other input scripts blanked.
pub fn legacy_sighash(
    tx: &Transaction,
    index: usize,
    script_code: &[u8],
) -> Result<[u8; 32], SignerError> {
    let cache = SighashCache::new(tx);
    let sighash = cache
        .legacy_signature_hash(
            index,
            Script::from_bytes(script_code),
            EcdsaSighashType::All.to_u32(),
        )
        .map_err(|e| SignerError::Sighash(e.to_string()))?;
    Ok(sighash.to_byte_array())
}

/// BIP-143 digest with fork ID for SIGHASH_ALL: commits to all prevouts,
/// sequences and outputs, plus this input's outpoint, script code, claimed
/// `amount` and sequence.
pub fn bip143_sighash(
    tx: &Transaction,
    index: usize,
    script_code: &[u8],
    amount: u64,
) -> Result<[u8; 32], SignerError> {
    if index >= tx.input.len() {
        return Err(SignerError::Sighash(format!(
            "input {index} out of {}",
            tx.input.len()
        )));
    }

    let mut buf = Vec::new();
    for txin in &tx.input {
        buf.extend_from_slice(&serialize(&txin.previous_output));
    }
    let hash_prevouts = sha256d::Hash::hash(&buf);

    buf.clear();
    for txin in &tx.input {
        buf.extend_from_slice(&txin.sequence.0.to_le_bytes());
    }
    let hash_sequence = sha256d::Hash::hash(&buf);

    buf.clear();
    for txout in &tx.output {
        buf.extend_from_slice(&serialize(txout));
    }
    let hash_outputs = sha256d::Hash::hash(&buf);

    let txin = &tx.input[index];
    let mut preimage = Vec::with_capacity(156 + script_code.len());
    preimage.extend_from_slice(&tx.version.0.to_le_bytes());
    preimage.extend_from_slice(hash_prevouts.as_byte_array());
    preimage.extend_from_slice(hash_sequence.as_byte_array());
    preimage.extend_from_slice(&serialize(&txin.previous_output));
    // var-int length prefix, exactly as a script push on the wire
    preimage.extend_from_slice(&serialize(&script_code.to_vec()));
    preimage.extend_from_slice(&amount.to_le_bytes());
    preimage.extend_from_slice(&txin.sequence.0.to_le_bytes());
    preimage.extend_from_slice(hash_outputs.as_byte_array());
    preimage.extend_from_slice(&tx.lock_time.to_consensus_u32().to_le_bytes());
    preimage.extend_from_slice(
        &(EcdsaSighashType::All.to_u32() | u32::from(FORK_ID)).to_le_bytes(),
    );

    Ok(sha256d::Hash::hash(&preimage).to_byte_array())
}
