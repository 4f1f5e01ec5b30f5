//! Canonical data pushes.

use crate::opcode::{OP_0, OP_1, OP_1NEGATE, OP_PUSHDATA1, OP_PUSHDATA2, OP_PUSHDATA4};

/// Appends `data` to `script` using the smallest canonical push encoding.
///
/// The small-integer and 1NEGATE shortcuts match what consensus-standard
/// script builders emit; the envelope and final-script byte layouts depend on
/// this exact rule.
pub fn push_data(script: &mut Vec<u8>, data: &[u8]) {
    match data.len() {
        0 => script.push(OP_0),
        1 if (1..=16).contains(&data[0]) => script.push(OP_1 + data[0] - 1),
        1 if data[0] == 0x81 => script.push(OP_1NEGATE),
        n if n < OP_PUSHDATA1 as usize => {
            script.push(n as u8);
            script.extend_from_slice(data);
        }
        n if n <= u8::MAX as usize => {
            script.push(OP_PUSHDATA1);
            script.push(n as u8);
            script.extend_from_slice(data);
        }
        n if n <= u16::MAX as usize => {
            script.push(OP_PUSHDATA2);
            script.extend_from_slice(&(n as u16).to_le_bytes());
            script.extend_from_slice(data);
        }
        n => {
            script.push(OP_PUSHDATA4);
            script.extend_from_slice(&(n as u32).to_le_bytes());
            script.extend_from_slice(data);
        }
    }
}
