//! Signer-side errors.

use strongbox_core::KeyError;
use strongbox_script::ScriptError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignerError {
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("transaction decode failed: {0}")]
    Decode(String),

    #[error("sighash computation failed: {0}")]
    Sighash(String),

    #[error("signature envelope serialization failed: {0}")]
    Serialization(String),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Script(#[from] ScriptError),
}
