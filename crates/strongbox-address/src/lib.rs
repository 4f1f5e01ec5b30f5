//! Deposit address generation.
//!
//! Turns the wallet's ordered xpub list into a deterministic deposit address
//! for a given derivation index: P2PKH over the first xpub's child when the
//! wallet has a single signer, P2SH over the canonical sorted multisig redeem
//! script otherwise. Because the redeem script sorts the child keys, the
//! address is invariant under permutation of the xpubs.
//!
//! All key material used here is public; nothing needs wiping.

pub mod cashaddr;

use bitcoin::base58;
use bitcoin::hashes::{hash160, Hash};
use strongbox_core::xkey::{Xpub, DEPOSIT_BRANCH};
use strongbox_core::{KeyError, Network};
use strongbox_script::{build_multisig_script, ScriptError};
use thiserror::Error;

/// Upper bound on wallet signers, set by the 15-key standard multisig limit.
pub const MAX_SIGNERS: usize = 15;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("malformed CashAddr: {0}")]
    CashAddr(String),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Script(#[from] ScriptError),
}

/// Inputs for one deposit address.
#[derive(Debug, Clone)]
pub struct GeneratorParams {
    /// The wallet signers' extended public keys, in wallet order.
    pub signers_xpubs: Vec<String>,
    /// Signatures required to spend (M).
    pub signers_required: u8,
    /// Child index; the full derivation path is `[0, path_index]`.
    pub path_index: u32,
}

/// Base58check-encodes a 20-byte hash under a network version byte.
pub fn base58_address(version: u8, hash: &[u8; 20]) -> String {
    let mut payload = [0u8; 21];
    payload[0] = version;
    payload[1..].copy_from_slice(hash);
    base58::encode_check(&payload)
}

/// Generates the deposit address for `params` on `network`.
///
/// The result is always the legacy base58 form; cash chains convert for
/// display via [`cashaddr::to_cash_address`].
pub fn generate(params: &GeneratorParams, network: Network) -> Result<String, AddressError> {
    let total = params.signers_xpubs.len();
    if total < 1 || total > MAX_SIGNERS {
        return Err(AddressError::InvalidParameters(format!(
            "{total} signer xpubs"
        )));
    }
    let required = params.signers_required as usize;
    if required < 1 || required > total {
        return Err(AddressError::InvalidParameters(format!(
            "{required} required signatures over {total} signers"
        )));
    }
    if params.signers_xpubs.iter().any(|s| s.is_empty()) {
        return Err(AddressError::InvalidParameters("empty xpub".into()));
    }

    let path = [DEPOSIT_BRANCH, params.path_index];

    if total == 1 {
        let child: Xpub = params.signers_xpubs[0].parse::<Xpub>()?.derive_path(&path)?;
        let digest = hash160::Hash::hash(&child.public_key().serialize());
        return Ok(base58_address(
            network.p2pkh_version(),
            &digest.to_byte_array(),
        ));
    }

    let mut children = Vec::with_capacity(total);
    for xpub in &params.signers_xpubs {
        let child = xpub.parse::<Xpub>()?.derive_path(&path)?;
        children.push(*child.public_key());
    }
    let (redeem, _) = build_multisig_script(params.signers_required, &children, 0)?;
    let digest = hash160::Hash::hash(&redeem);
    Ok(base58_address(
        network.p2sh_version(),
        &digest.to_byte_array(),
    ))
}

/// Checks whether `address` is a valid spend target on `network`.
///
/// Accepts the network's legacy P2PKH/P2SH forms; on cash chains a CashAddr
/// with any recognized prefix is accepted too. Garbage yields `false`, never
/// an error.
pub fn validate(address: &str, network: Network) -> bool {
    if let Ok(decoded) = base58::decode_check(address) {
        return decoded.len() == 21
            && (decoded[0] == network.p2pkh_version() || decoded[0] == network.p2sh_version());
    }
    network.is_cash_chain() && cashaddr::to_legacy_address(address).is_ok()
}
