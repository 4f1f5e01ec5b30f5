//! Connector error kinds.
//!
//! `TxPermanentFailure` is deliberately distinct from `Transient`: retry
//! loops skip the former and may repeat the latter.

use strongbox_address::AddressError;
use strongbox_core::{AmountError, KeyError};
use strongbox_script::ScriptError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("inconsistent signatures for input {input}: {detail}")]
    InconsistentSignatures { input: usize, detail: String },

    #[error("address does not belong to this network: {0}")]
    NetworkMismatch(String),

    #[error("not found")]
    NotFound,

    #[error("transaction failed permanently")]
    TxPermanentFailure,

    #[error("node error: {0}")]
    Transient(String),

    #[error("decode failed: {0}")]
    Decode(String),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error(transparent)]
    Amount(#[from] AmountError),
}
