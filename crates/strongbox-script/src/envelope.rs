//! The unsigned-envelope script format.
//!
//! Before signing, each transaction input carries a script that is not a
//! spend at all: it is a self-describing envelope holding everything an
//! offline signer needs: the wallet's xpubs and the derivation path tail of
//! the deposit address being spent. The shape is
//!
//! ```text
//! OP_0
//! OP_DATA_1 0xff                 (one placeholder per required signature)
//! ...
//! OP_PUSHDATA* <inner redeem>
//!   inner redeem:
//!     OP_{m}
//!     OP_PUSHDATA1 0x57 <xpub envelope>   (n times, 87 bytes each)
//!     OP_{n}
//!     OP_CHECKMULTISIG
//!   xpub envelope:
//!     0xff || xpub[78] || u32le(0) || u32le(derivation index)
//! ```
//!
//! Push-length framing keeps the whole thing traversable by any script
//! parser. Byte layout is wire protocol; preserve it exactly.

use strongbox_core::xkey::{Xpub, DEPOSIT_BRANCH, XKEY_RAW_LEN};

use crate::error::ScriptError;
use crate::opcode::{
    parse_script, OP_0, OP_1, OP_CHECKMULTISIG, OP_DATA_1, OP_PUSHDATA1, OP_PUSHDATA4,
};
use crate::push::push_data;

/// Marker byte opening each xpub envelope (and used as the signature
/// placeholder).
pub const XPUB_MARKER: u8 = 0xff;

/// Size of one serialized xpub envelope: marker || raw xpub || two path words.
pub const XPUB_ENVELOPE_LEN: usize = 1 + XKEY_RAW_LEN + 4 + 4;

// OP_0, at least one placeholder, the redeem push.
const MIN_ENVELOPE_OPS: usize = 3;

/// Serializes one xpub with the deposit path tail.
pub fn encode_xpub_envelope(xpub: &Xpub, path_index: u32) -> [u8; XPUB_ENVELOPE_LEN] {
    let mut out = [0u8; XPUB_ENVELOPE_LEN];
    out[0] = XPUB_MARKER;
    out[1..1 + XKEY_RAW_LEN].copy_from_slice(&xpub.to_bytes());
    out[79..83].copy_from_slice(&DEPOSIT_BRANCH.to_le_bytes());
    out[83..87].copy_from_slice(&path_index.to_le_bytes());
    out
}

/// Decodes an 87-byte xpub envelope back into the key and its path tail.
pub fn decode_xpub_envelope(data: &[u8]) -> Result<(Xpub, [u32; 2]), ScriptError> {
    if data.len() != XPUB_ENVELOPE_LEN {
        return Err(ScriptError::BadEnvelope(format!(
            "xpub envelope must be {} bytes, got {}",
            XPUB_ENVELOPE_LEN,
            data.len()
        )));
    }
    if data[0] != XPUB_MARKER {
        return Err(ScriptError::BadEnvelope(format!(
            "xpub envelope marker {:#04x}",
            data[0]
        )));
    }
    let xpub = Xpub::from_bytes(&data[1..1 + XKEY_RAW_LEN])?;
    let path = [
        u32::from_le_bytes(data[79..83].try_into().expect("4 bytes")),
        u32::from_le_bytes(data[83..87].try_into().expect("4 bytes")),
    ];
    Ok((xpub, path))
}

/// Builds the full unsigned-envelope script for one input.
pub fn build_unsigned_envelope(
    required: u8,
    xpubs: &[Xpub],
    path_index: u32,
) -> Result<Vec<u8>, ScriptError> {
    let n = xpubs.len();
    if n == 0 || n > 16 {
        return Err(ScriptError::InvalidParameters(format!(
            "{n} xpubs in envelope"
        )));
    }
    if required == 0 || required as usize > n {
        return Err(ScriptError::InvalidParameters(format!(
            "{required} required signatures over {n} keys"
        )));
    }

    let mut inner = Vec::with_capacity(3 + n * (2 + XPUB_ENVELOPE_LEN));
    inner.push(OP_1 + required - 1);
    for xpub in xpubs {
        push_data(&mut inner, &encode_xpub_envelope(xpub, path_index));
    }
    inner.push(OP_1 + n as u8 - 1);
    inner.push(OP_CHECKMULTISIG);

    let mut script = Vec::with_capacity(1 + 2 * required as usize + 3 + inner.len());
    script.push(OP_0);
    for _ in 0..required {
        push_data(&mut script, &[XPUB_MARKER]);
    }
    push_data(&mut script, &inner);
    Ok(script)
}

/// Pulls the inner redeem out of an input's unsigned-envelope script.
///
/// Expects exactly: OP_0, then `OP_DATA_1 0xff` placeholders, then a single
/// PUSHDATA carrying the redeem.
pub fn extract_redeem_from_envelope(sig_script: &[u8]) -> Result<Vec<u8>, ScriptError> {
    let ops = parse_script(sig_script)?;
    if ops.len() < MIN_ENVELOPE_OPS {
        return Err(ScriptError::BadEnvelope(format!(
            "{} items in input script",
            ops.len()
        )));
    }
    let last = ops.len() - 1;
    if ops[0].opcode != OP_0
        || ops[last].opcode < OP_PUSHDATA1
        || ops[last].opcode > OP_PUSHDATA4
    {
        return Err(ScriptError::BadEnvelope(format!(
            "input script frame {:#04x} .. {:#04x}",
            ops[0].opcode, ops[last].opcode
        )));
    }
    for (i, op) in ops[1..last].iter().enumerate() {
        if op.opcode != OP_DATA_1 || op.data != [XPUB_MARKER] {
            return Err(ScriptError::BadEnvelope(format!(
                "placeholder {} is {:#04x} ({} bytes)",
                i,
                op.opcode,
                op.data.len()
            )));
        }
    }
    Ok(ops[last].data.clone())
}
