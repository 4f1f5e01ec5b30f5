//! Seed-holding key provider.
//!
//! A signer node holds exactly one seed for its process lifetime. The
//! provider rebuilds the BIP-32 master key on demand and hands out derived
//! child secrets; every intermediate private key is wiped when it drops.
//!
//! The eth-legacy mode predates HD derivation in the fleet: such a signer
//! treats the raw seed bytes as its ECDSA secret scalar, but only for the
//! `[0, 0]` path. Every other path still derives through BIP-32.

use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};
use strongbox_core::xkey::{Xprv, Xpub, DEPOSIT_BRANCH};
use strongbox_core::KeyError;
use zeroize::Zeroizing;

use crate::error::SignerError;

pub struct KeyProvider {
    seed: Zeroizing<Vec<u8>>,
    eth_legacy: bool,
}

impl KeyProvider {
    /// A standard BIP-32 provider.
    pub fn new(seed: Vec<u8>) -> Self {
        KeyProvider {
            seed: Zeroizing::new(seed),
            eth_legacy: false,
        }
    }

    /// A provider that serves the old direct-scalar key at path `[0, 0]`.
    pub fn new_legacy_eth(seed: Vec<u8>) -> Self {
        KeyProvider {
            seed: Zeroizing::new(seed),
            eth_legacy: true,
        }
    }

    pub fn is_eth_legacy(&self) -> bool {
        self.eth_legacy
    }

    fn master(&self) -> Result<Xprv, SignerError> {
        Ok(Xprv::new_master(&self.seed)?)
    }

    fn legacy_secret(&self) -> Result<SecretKey, SignerError> {
        SecretKey::from_slice(&self.seed)
            .map_err(|e| KeyError::BadKeyMaterial(e.to_string()).into())
    }

    /// The child secret key at `path`.
    pub fn derived_key(&self, path: &[u32]) -> Result<SecretKey, SignerError> {
        if self.eth_legacy && path == [DEPOSIT_BRANCH, 0].as_slice() {
            return self.legacy_secret();
        }
        let child = self.master()?.derive_path(path)?;
        Ok(child.secret_key())
    }

    /// The key other parties discover this signer by: the master xpub's
    /// point, or the direct scalar's point in eth-legacy mode.
    pub fn master_pubkey(&self) -> Result<PublicKey, SignerError> {
        let secp = Secp256k1::new();
        if self.eth_legacy {
            return Ok(self.legacy_secret()?.public_key(&secp));
        }
        Ok(*self.master()?.neuter().public_key())
    }

    /// The master extended public key.
    pub fn master_xpub(&self) -> Result<Xpub, SignerError> {
        Ok(self.master()?.neuter())
    }

    /// The master chain code (right half of the seed HMAC).
    pub fn chain_code(&self) -> Result<[u8; 32], SignerError> {
        Ok(self.master()?.chain_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED_A: &str = "0635671834e54c61b9352f26595d9615ef1e5840c7f64af198e4a10ed7140dd0";
    const XPUB_A: &str = "xpub661MyMwAqRbcEtBNvF5oTnmGFSkZvy6ShetrnbVXTz7hyKYJSNBEtKiiY9HnMeTpLKDFJRYW2QSbNGtCGdpCzwZVSPRKevufqeGBwALkBUK";

    fn seed() -> Vec<u8> {
        hex::decode(SEED_A).unwrap()
    }

    #[test]
    fn test_master_xpub() {
        let provider = KeyProvider::new(seed());
        assert_eq!(provider.master_xpub().unwrap().to_string(), XPUB_A);
    }

    #[test]
    fn test_derived_key_matches_public_derivation() {
        let secp = Secp256k1::new();
        let provider = KeyProvider::new(seed());
        let secret = provider.derived_key(&[0, 1000]).unwrap();
        let expected = provider
            .master_xpub()
            .unwrap()
            .derive_path(&[0, 1000])
            .unwrap();
        assert_eq!(secret.public_key(&secp), *expected.public_key());
    }

    #[test]
    fn test_eth_legacy_bypasses_bip32_only_at_zero_path() {
        let secp = Secp256k1::new();
        let legacy = KeyProvider::new_legacy_eth(seed());
        let plain = KeyProvider::new(seed());

        let direct = SecretKey::from_slice(&seed()).unwrap();
        assert_eq!(legacy.derived_key(&[0, 0]).unwrap(), direct);
        assert_eq!(legacy.master_pubkey().unwrap(), direct.public_key(&secp));
        assert_ne!(plain.derived_key(&[0, 0]).unwrap(), direct);
        // Any other path goes through the HD tree as usual.
        assert_eq!(
            legacy.derived_key(&[0, 1]).unwrap(),
            plain.derived_key(&[0, 1]).unwrap()
        );
    }

    #[test]
    fn test_chain_code_is_stable() {
        let provider = KeyProvider::new(seed());
        assert_eq!(
            provider.chain_code().unwrap(),
            provider.chain_code().unwrap()
        );
        assert_eq!(
            provider.chain_code().unwrap(),
            provider.master_xpub().unwrap().chain_code()
        );
    }
}
