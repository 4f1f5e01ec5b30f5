//! Bitcoin script plumbing for the Strongbox signing protocol.
//!
//! Three layers live here:
//!
//! - a minimal, length-strict opcode parser ([`opcode`]),
//! - canonical data pushes ([`push`]),
//! - the protocol-specific script forms ([`envelope`], [`multisig`]): the
//!   unsigned envelope an orchestrator places in each input's signature
//!   script before signing, and the canonical sorted M-of-N redeem script
//!   that replaces it after assembly.
//!
//! The envelope is shaped so a standard script parser traverses it without
//! special knowledge; the byte layout is part of the wire protocol and must
//! not change.

pub mod envelope;
pub mod error;
pub mod multisig;
pub mod opcode;
pub mod push;

pub use envelope::{
    build_unsigned_envelope, decode_xpub_envelope, encode_xpub_envelope,
    extract_redeem_from_envelope, XPUB_ENVELOPE_LEN, XPUB_MARKER,
};
pub use error::ScriptError;
pub use multisig::{
    build_multisig_script, parse_multisig_with_xpubs, sorted_compressed, ParsedMultisig,
};
pub use opcode::{parse_script, ParsedOp};
pub use push::push_data;
