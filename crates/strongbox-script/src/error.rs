//! Script-layer errors.

use strongbox_core::KeyError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("opcode {opcode:#04x} needs {needed} more bytes, script has {have}")]
    Truncated {
        opcode: u8,
        needed: usize,
        have: usize,
    },

    #[error("malformed envelope script: {0}")]
    BadEnvelope(String),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error(transparent)]
    Key(#[from] KeyError),
}
