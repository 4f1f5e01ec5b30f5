//! BIP-32 extended keys.
//!
//! Implements exactly the subset of BIP-32 the custody protocol relies on:
//! base58check parsing/serialization of the 78-byte form, non-hardened public
//! child derivation (CKDpub), private derivation, neutering and
//! master-from-seed. Deposit derivation always walks the two-element path
//! `[DEPOSIT_BRANCH, path_index]`.
//!
//! Extended keys are serialized with the mainnet version bytes regardless of
//! which chain the derived address lives on; the signing protocol embeds the
//! raw 78-byte key in transaction inputs and every participant must
//! reconstruct the same bytes. The parser additionally accepts the testnet
//! public version.

use std::fmt;
use std::str::FromStr;

use bitcoin::base58;
use bitcoin::hashes::{hash160, sha256d, sha512, Hash, HashEngine, Hmac, HmacEngine};
use bitcoin::secp256k1::{PublicKey, Scalar, Secp256k1, SecretKey};
use zeroize::Zeroize;

use crate::error::KeyError;

/// Mainnet public extended key version (`xpub`).
pub const VERSION_XPUB: [u8; 4] = [0x04, 0x88, 0xb2, 0x1e];
/// Mainnet private extended key version (`xprv`).
pub const VERSION_XPRV: [u8; 4] = [0x04, 0x88, 0xad, 0xe4];
/// Testnet public extended key version (`tpub`).
pub const VERSION_TPUB: [u8; 4] = [0x04, 0x35, 0x87, 0xcf];
/// Testnet private extended key version (`tprv`).
pub const VERSION_TPRV: [u8; 4] = [0x04, 0x35, 0x83, 0x94];

/// First index of the hardened derivation range.
pub const HARDENED_OFFSET: u32 = 1 << 31;

/// Fixed first element of the deposit path `[DEPOSIT_BRANCH, path_index]`.
pub const DEPOSIT_BRANCH: u32 = 0;

/// Length of the serialized extended key without its checksum.
pub const XKEY_RAW_LEN: usize = 78;

const CHECKSUM_LEN: usize = 4;
const MASTER_HMAC_KEY: &[u8] = b"Bitcoin seed";

fn hmac_sha512(key: &[u8], parts: &[&[u8]]) -> [u8; 64] {
    let mut engine = HmacEngine::<sha512::Hash>::new(key);
    for part in parts {
        engine.input(part);
    }
    let result = Hmac::from_engine(engine);
    let mut out = [0u8; 64];
    out.copy_from_slice(&result[..]);
    out
}

/// A BIP-32 extended public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Xpub {
    version: [u8; 4],
    depth: u8,
    parent_fingerprint: [u8; 4],
    child_number: u32,
    chain_code: [u8; 32],
    public_key: PublicKey,
}

impl Xpub {
    /// Parses the checksum-free 78-byte serialization.
    ///
    /// Private version prefixes are rejected: this type never carries secret
    /// material.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != XKEY_RAW_LEN {
            return Err(KeyError::BadLength {
                expected: XKEY_RAW_LEN,
                got: bytes.len(),
            });
        }
        let mut version = [0u8; 4];
        version.copy_from_slice(&bytes[0..4]);
        if version != VERSION_XPUB && version != VERSION_TPUB {
            return Err(KeyError::WrongVersion(version));
        }
        let mut parent_fingerprint = [0u8; 4];
        parent_fingerprint.copy_from_slice(&bytes[5..9]);
        let child_number = u32::from_be_bytes(bytes[9..13].try_into().expect("4 bytes"));
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&bytes[13..45]);
        let public_key = PublicKey::from_slice(&bytes[45..78])
            .map_err(|e| KeyError::BadKeyMaterial(e.to_string()))?;
        Ok(Xpub {
            version,
            depth: bytes[4],
            parent_fingerprint,
            child_number,
            chain_code,
            public_key,
        })
    }

    /// The checksum-free 78-byte serialization embedded in script envelopes.
    pub fn to_bytes(&self) -> [u8; XKEY_RAW_LEN] {
        let mut out = [0u8; XKEY_RAW_LEN];
        out[0..4].copy_from_slice(&self.version);
        out[4] = self.depth;
        out[5..9].copy_from_slice(&self.parent_fingerprint);
        out[9..13].copy_from_slice(&self.child_number.to_be_bytes());
        out[13..45].copy_from_slice(&self.chain_code);
        out[45..78].copy_from_slice(&self.public_key.serialize());
        out
    }

    /// The secp256k1 point of this key.
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn chain_code(&self) -> [u8; 32] {
        self.chain_code
    }

    /// First four bytes of HASH160 of the compressed key.
    pub fn fingerprint(&self) -> [u8; 4] {
        let digest = hash160::Hash::hash(&self.public_key.serialize());
        let mut out = [0u8; 4];
        out.copy_from_slice(&digest[..4]);
        out
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn child_number(&self) -> u32 {
        self.child_number
    }

    pub fn parent_fingerprint(&self) -> [u8; 4] {
        self.parent_fingerprint
    }

    /// CKDpub: derives the non-hardened child at `index`.
    ///
    /// Tweaks at or beyond the curve order, a zero tweak and the point at
    /// infinity all surface as [`KeyError::InvalidTweak`].
    pub fn derive_child(&self, index: u32) -> Result<Xpub, KeyError> {
        if index >= HARDENED_OFFSET {
            return Err(KeyError::HardenedRejected);
        }
        let secp = Secp256k1::new();
        let mut i = hmac_sha512(
            &self.chain_code,
            &[&self.public_key.serialize(), &index.to_be_bytes()],
        );

        let mut il = [0u8; 32];
        il.copy_from_slice(&i[..32]);
        let tweak = Scalar::from_be_bytes(il).map_err(|_| KeyError::InvalidTweak)?;
        // tweak * G; SecretKey::from_slice also rejects the zero tweak.
        let tweak_point = SecretKey::from_slice(&tweak.to_be_bytes())
            .map_err(|_| KeyError::InvalidTweak)?
            .public_key(&secp);
        let public_key = self
            .public_key
            .combine(&tweak_point)
            .map_err(|_| KeyError::InvalidTweak)?;

        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&i[32..]);
        i.zeroize();
        il.zeroize();

        Ok(Xpub {
            version: self.version,
            depth: self.depth.wrapping_add(1),
            parent_fingerprint: self.fingerprint(),
            child_number: index,
            chain_code,
            public_key,
        })
    }

    /// Folds [`Self::derive_child`] over `path`.
    pub fn derive_path(&self, path: &[u32]) -> Result<Xpub, KeyError> {
        let mut key = self.clone();
        for &index in path {
            key = key.derive_child(index)?;
        }
        Ok(key)
    }
}

impl FromStr for Xpub {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let data = base58::decode(s).map_err(|e| KeyError::Base58(e.to_string()))?;
        if data.len() != XKEY_RAW_LEN + CHECKSUM_LEN {
            return Err(KeyError::BadLength {
                expected: XKEY_RAW_LEN + CHECKSUM_LEN,
                got: data.len(),
            });
        }
        let (payload, checksum) = data.split_at(XKEY_RAW_LEN);
        let digest = sha256d::Hash::hash(payload);
        if digest[..CHECKSUM_LEN] != *checksum {
            return Err(KeyError::BadChecksum);
        }
        Xpub::from_bytes(payload)
    }
}

impl fmt::Display for Xpub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&base58::encode_check(&self.to_bytes()))
    }
}

/// A BIP-32 extended private key.
///
/// Not `Clone`: the secret key and chain code are wiped when the value drops.
pub struct Xprv {
    version: [u8; 4],
    depth: u8,
    parent_fingerprint: [u8; 4],
    child_number: u32,
    chain_code: [u8; 32],
    secret_key: SecretKey,
}

impl fmt::Debug for Xprv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Xprv")
            .field("version", &self.version)
            .field("depth", &self.depth)
            .field("parent_fingerprint", &self.parent_fingerprint)
            .field("child_number", &self.child_number)
            .field("chain_code", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

impl Xprv {
    /// Builds the master key from raw seed bytes per BIP-32:
    /// `HMAC-SHA512("Bitcoin seed", seed)`, left half key, right half chain
    /// code. Seed length must be within 16..=64 bytes.
    pub fn new_master(seed: &[u8]) -> Result<Self, KeyError> {
        if seed.len() < 16 || seed.len() > 64 {
            return Err(KeyError::BadSeedLength(seed.len()));
        }
        let mut i = hmac_sha512(MASTER_HMAC_KEY, &[seed]);
        let secret_key = SecretKey::from_slice(&i[..32])
            .map_err(|_| KeyError::BadKeyMaterial("master key outside curve order".into()))?;
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&i[32..]);
        i.zeroize();
        Ok(Xprv {
            version: VERSION_XPRV,
            depth: 0,
            parent_fingerprint: [0u8; 4],
            child_number: 0,
            chain_code,
            secret_key,
        })
    }

    /// Private child derivation; hardened indices are permitted here.
    pub fn derive_child(&self, index: u32) -> Result<Xprv, KeyError> {
        let secp = Secp256k1::new();
        let public_key = self.secret_key.public_key(&secp);

        let mut i = if index >= HARDENED_OFFSET {
            let mut key_bytes = [0u8; 33];
            key_bytes[1..].copy_from_slice(&self.secret_key.secret_bytes());
            let out = hmac_sha512(&self.chain_code, &[&key_bytes, &index.to_be_bytes()]);
            key_bytes.zeroize();
            out
        } else {
            hmac_sha512(
                &self.chain_code,
                &[&public_key.serialize(), &index.to_be_bytes()],
            )
        };

        let mut il = [0u8; 32];
        il.copy_from_slice(&i[..32]);
        let tweak = Scalar::from_be_bytes(il).map_err(|_| KeyError::InvalidTweak)?;
        let secret_key = self
            .secret_key
            .add_tweak(&tweak)
            .map_err(|_| KeyError::InvalidTweak)?;

        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&i[32..]);
        i.zeroize();
        il.zeroize();

        let digest = hash160::Hash::hash(&public_key.serialize());
        let mut parent_fingerprint = [0u8; 4];
        parent_fingerprint.copy_from_slice(&digest[..4]);

        Ok(Xprv {
            version: self.version,
            depth: self.depth.wrapping_add(1),
            parent_fingerprint,
            child_number: index,
            chain_code,
            secret_key,
        })
    }

    /// Folds [`Self::derive_child`] over `path`.
    pub fn derive_path(&self, path: &[u32]) -> Result<Xprv, KeyError> {
        let mut key = self.derive_child_noop();
        for &index in path {
            key = key.derive_child(index)?;
        }
        Ok(key)
    }

    // Structural copy for the path fold; Xprv is deliberately not Clone in
    // the public API.
    fn derive_child_noop(&self) -> Xprv {
        Xprv {
            version: self.version,
            depth: self.depth,
            parent_fingerprint: self.parent_fingerprint,
            child_number: self.child_number,
            chain_code: self.chain_code,
            secret_key: self.secret_key,
        }
    }

    /// Drops the private half, keeping the public key and chain code.
    pub fn neuter(&self) -> Xpub {
        let secp = Secp256k1::new();
        let version = if self.version == VERSION_TPRV {
            VERSION_TPUB
        } else {
            VERSION_XPUB
        };
        Xpub {
            version,
            depth: self.depth,
            parent_fingerprint: self.parent_fingerprint,
            child_number: self.child_number,
            chain_code: self.chain_code,
            public_key: self.secret_key.public_key(&secp),
        }
    }

    /// The secret scalar for signing. `SecretKey` is `Copy`; callers erase
    /// their copy when done.
    pub fn secret_key(&self) -> SecretKey {
        self.secret_key
    }

    /// The chain code. Treated as sensitive alongside the key itself.
    pub fn chain_code(&self) -> [u8; 32] {
        self.chain_code
    }

    fn to_bytes(&self) -> [u8; XKEY_RAW_LEN] {
        let mut out = [0u8; XKEY_RAW_LEN];
        out[0..4].copy_from_slice(&self.version);
        out[4] = self.depth;
        out[5..9].copy_from_slice(&self.parent_fingerprint);
        out[9..13].copy_from_slice(&self.child_number.to_be_bytes());
        out[13..45].copy_from_slice(&self.chain_code);
        // key material: 0x00 || 32-byte secret
        out[46..78].copy_from_slice(&self.secret_key.secret_bytes());
        out
    }
}

impl fmt::Display for Xprv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut raw = self.to_bytes();
        let encoded = base58::encode_check(&raw);
        raw.zeroize();
        f.write_str(&encoded)
    }
}

impl Drop for Xprv {
    fn drop(&mut self) {
        self.chain_code.zeroize();
        self.secret_key.non_secure_erase();
    }
}
