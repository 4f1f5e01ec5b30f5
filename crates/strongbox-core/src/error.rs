//! Error kinds shared by the key codec and amount conversion.

use thiserror::Error;

/// Errors from parsing, serializing or deriving extended keys.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("base58 decoding failed: {0}")]
    Base58(String),

    #[error("extended key checksum mismatch")]
    BadChecksum,

    #[error("extended key payload must be {expected} bytes, got {got}")]
    BadLength { expected: usize, got: usize },

    #[error("unknown or private extended key version {0:02x?}")]
    WrongVersion([u8; 4]),

    #[error("hardened derivation is not possible on a public key")]
    HardenedRejected,

    #[error("derived tweak is outside the curve order")]
    InvalidTweak,

    #[error("seed length {0} is outside the 16..=64 byte range")]
    BadSeedLength(usize),

    #[error("invalid key material: {0}")]
    BadKeyMaterial(String),
}

/// Errors from decimal-to-satoshi conversion.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount {0} does not fit into 64-bit satoshis")]
    OutOfRange(String),
}
