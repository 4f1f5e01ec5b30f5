//! Core types for the Strongbox custody engine.
//!
//! Everything the higher layers share lives here: BIP-32 extended keys with
//! the exact serialization the signing protocol embeds in transaction inputs,
//! the chain parameter table for the supported Bitcoin-family networks, and
//! fixed-point amount conversion.
//!
//! # Security
//!
//! Private extended keys wipe their secret material (key and chain code) on
//! drop. Public keys and xpubs copy freely.

pub mod amount;
pub mod error;
pub mod network;
pub mod xkey;

pub use error::{AmountError, KeyError};
pub use network::Network;
pub use xkey::{Xprv, Xpub, DEPOSIT_BRANCH, HARDENED_OFFSET};
