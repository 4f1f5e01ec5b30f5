//! Multisig redeem scripts over the envelope's xpubs.
//!
//! One sort order rules the whole protocol: byte-lexicographic over the
//! 33-byte compressed encodings. Address generation sorts child keys before
//! hashing, each signer reports its post-sort position, and the assembler
//! re-sorts to place signatures.

use bitcoin::secp256k1::PublicKey;

use crate::envelope::{decode_xpub_envelope, XPUB_ENVELOPE_LEN, XPUB_MARKER};
use crate::error::ScriptError;
use crate::opcode::{parse_script, OP_1, OP_16, OP_CHECKMULTISIG, OP_DATA_33, OP_PUSHDATA1};
use crate::push::push_data;

// OP_M, at least two key pushes, OP_N, OP_CHECKMULTISIG.
const MIN_MULTISIG_OPS: usize = 5;
const MAX_MULTISIG_OPS: usize = 1 + 16 + 2;

/// Result of tearing an inner redeem apart.
#[derive(Debug, Clone)]
pub struct ParsedMultisig {
    /// Required signature count (M).
    pub required: u8,
    /// Child public keys derived along [`Self::path`], in envelope order.
    pub pubkeys: Vec<PublicKey>,
    /// Position of the caller's xpub among the envelopes, when a target was
    /// given and matched.
    pub target_index: Option<usize>,
    /// The derivation path tail shared by every envelope.
    pub path: [u32; 2],
}

/// Sorts the compressed encodings of `pubkeys` byte-lexicographically.
pub fn sorted_compressed(pubkeys: &[PublicKey]) -> Vec<[u8; 33]> {
    let mut encoded: Vec<[u8; 33]> = pubkeys.iter().map(|pk| pk.serialize()).collect();
    encoded.sort_unstable();
    encoded
}

/// Parses an inner redeem full of xpub envelopes.
///
/// Validates the M-of-N frame, decodes every 87-byte envelope, checks that
/// all envelopes agree on the derivation path, derives the child key of each
/// xpub along that path, and (when `target` is given) records which
/// envelope's *parent* key equals it.
pub fn parse_multisig_with_xpubs(
    redeem: &[u8],
    target: Option<&PublicKey>,
) -> Result<ParsedMultisig, ScriptError> {
    let ops = parse_script(redeem)?;
    let sz = ops.len();
    if !(MIN_MULTISIG_OPS..=MAX_MULTISIG_OPS).contains(&sz)
        || ops[sz - 1].opcode != OP_CHECKMULTISIG
    {
        return Err(ScriptError::BadEnvelope(format!(
            "not a multisig redeem ({} items)",
            sz
        )));
    }
    let m_op = ops[0].opcode;
    let n_op = ops[sz - 2].opcode;
    if !(OP_1..=OP_16).contains(&m_op) || !(OP_1..=OP_16).contains(&n_op) || m_op > n_op {
        return Err(ScriptError::BadEnvelope(format!(
            "multisig frame {:#04x}/{:#04x}",
            m_op, n_op
        )));
    }
    let required = m_op - OP_1 + 1;
    let total = (n_op - OP_1 + 1) as usize;
    if total != sz - 3 {
        return Err(ScriptError::BadEnvelope(format!(
            "{total} keys declared, {} pushed",
            sz - 3
        )));
    }

    let mut pubkeys = Vec::with_capacity(total);
    let mut target_index = None;
    let mut path: Option<[u32; 2]> = None;

    for (i, op) in ops[1..sz - 2].iter().enumerate() {
        if op.opcode != OP_PUSHDATA1 || op.data.len() != XPUB_ENVELOPE_LEN || op.data[0] != XPUB_MARKER
        {
            return Err(ScriptError::BadEnvelope(format!(
                "xpub push {} is {:#04x} ({} bytes)",
                i,
                op.opcode,
                op.data.len()
            )));
        }
        let (xpub, envelope_path) = decode_xpub_envelope(&op.data)?;
        match path {
            None => path = Some(envelope_path),
            Some(p) if p != envelope_path => {
                return Err(ScriptError::BadEnvelope(
                    "envelopes disagree on the derivation path".into(),
                ))
            }
            Some(_) => {}
        }
        if let Some(target) = target {
            if xpub.public_key() == target {
                if target_index.is_some() {
                    return Err(ScriptError::BadEnvelope(format!(
                        "signer xpub appears twice (at {:?} and {})",
                        target_index, i
                    )));
                }
                target_index = Some(i);
            }
        }
        let child = xpub.derive_path(&envelope_path)?;
        pubkeys.push(*child.public_key());
    }

    Ok(ParsedMultisig {
        required,
        pubkeys,
        target_index,
        path: path.expect("at least two envelopes parsed"),
    })
}

/// Builds the canonical sorted multisig redeem script and reports where
/// `my_index` landed after sorting.
///
/// This is the script that is hashed into the P2SH deposit address, the
/// script code both sighash algorithms commit to, and the redeem pushed by
/// the assembled input.
pub fn build_multisig_script(
    required: u8,
    pubkeys: &[PublicKey],
    my_index: usize,
) -> Result<(Vec<u8>, usize), ScriptError> {
    let n = pubkeys.len();
    if n == 0 || n > 16 || required == 0 || required as usize > n {
        return Err(ScriptError::InvalidParameters(format!(
            "{required}-of-{n} multisig"
        )));
    }
    if my_index >= n {
        return Err(ScriptError::InvalidParameters(format!(
            "key index {my_index} out of {n}"
        )));
    }

    let mine = pubkeys[my_index].serialize();
    let sorted = sorted_compressed(pubkeys);
    let sorted_index = sorted
        .iter()
        .position(|pk| *pk == mine)
        .expect("own key survives sorting");

    let mut script = Vec::with_capacity(3 + n * (1 + OP_DATA_33 as usize));
    script.push(OP_1 + required - 1);
    for pk in &sorted {
        push_data(&mut script, pk);
    }
    script.push(OP_1 + n as u8 - 1);
    script.push(OP_CHECKMULTISIG);
    Ok((script, sorted_index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::build_unsigned_envelope;
    use std::str::FromStr;
    use strongbox_core::Xpub;

    const WALLET_XPUBS: [&str; 3] = [
        "xpub661MyMwAqRbcEtBNvF5oTnmGFSkZvy6ShetrnbVXTz7hyKYJSNBEtKiiY9HnMeTpLKDFJRYW2QSbNGtCGdpCzwZVSPRKevufqeGBwALkBUK",
        "xpub661MyMwAqRbcGgsQadngKDqjvQDC299XoG8SjbpfZhKUofdVVCqehG2TCsTXNudCFyTmNL72gGmNBNbtu75Tkzz2jJMqBak8Ab71MQYs2UQ",
        "xpub661MyMwAqRbcFTni57UXBzWmbN3JtuoqdLivkjzkbkiPB46gDU6pYYQeE2BKRyhD1h6wXHx5jRWZh78NS45EoZPwVezgKkLjf4TTXPWh8Wv",
    ];

    /// Children of the wallet xpubs at [0, 1000], in sorted order, taken
    /// from the final redeem script of the assembled regtest transaction.
    const SORTED_CHILDREN: [&str; 3] = [
        "028803d510417f3ffec81ffa81418435050d6b4693775d90a14c8abba0f74b18f4",
        "03e629b677066a100757fd930445ea5ce69d13ed4a6ee733a8e5a41f732c3311d2",
        "03fbc1d8df7237a5199dde3609ad991b12f31d9e6d09ea784eaad16c33d9f1ed69",
    ];

    const FINAL_REDEEM_HEX: &str = "5221028803d510417f3ffec81ffa81418435050d6b4693775d90a14c8abba0f74b18f42103e629b677066a100757fd930445ea5ce69d13ed4a6ee733a8e5a41f732c3311d22103fbc1d8df7237a5199dde3609ad991b12f31d9e6d09ea784eaad16c33d9f1ed6953ae";

    fn wallet_xpubs() -> Vec<Xpub> {
        WALLET_XPUBS.iter().map(|s| s.parse().unwrap()).collect()
    }

    fn inner_redeem() -> Vec<u8> {
        let script = build_unsigned_envelope(2, &wallet_xpubs(), 1000).unwrap();
        crate::envelope::extract_redeem_from_envelope(&script).unwrap()
    }

    #[test]
    fn test_parse_recovers_children_and_path() {
        let parsed = parse_multisig_with_xpubs(&inner_redeem(), None).unwrap();
        assert_eq!(parsed.required, 2);
        assert_eq!(parsed.path, [0, 1000]);
        assert_eq!(parsed.target_index, None);
        let sorted: Vec<String> = sorted_compressed(&parsed.pubkeys)
            .iter()
            .map(hex::encode)
            .collect();
        assert_eq!(sorted, SORTED_CHILDREN);
    }

    #[test]
    fn test_target_found_by_parent_key() {
        let xpubs = wallet_xpubs();
        for (i, xpub) in xpubs.iter().enumerate() {
            let parsed = parse_multisig_with_xpubs(&inner_redeem(), Some(xpub.public_key())).unwrap();
            assert_eq!(parsed.target_index, Some(i));
        }
        // A key that is not in the wallet matches nothing.
        let outsider = *Xpub::from_str(WALLET_XPUBS[0])
            .unwrap()
            .derive_child(1)
            .unwrap()
            .public_key();
        let parsed = parse_multisig_with_xpubs(&inner_redeem(), Some(&outsider)).unwrap();
        assert_eq!(parsed.target_index, None);
    }

    #[test]
    fn test_sorted_script_matches_assembled_fixture() {
        let parsed = parse_multisig_with_xpubs(&inner_redeem(), None).unwrap();
        let (script, _) = build_multisig_script(parsed.required, &parsed.pubkeys, 0).unwrap();
        assert_eq!(hex::encode(script), FINAL_REDEEM_HEX);
    }

    #[test]
    fn test_sorted_index_tracks_reordering() {
        let parsed = parse_multisig_with_xpubs(&inner_redeem(), None).unwrap();
        for i in 0..parsed.pubkeys.len() {
            let (_, sorted_index) =
                build_multisig_script(parsed.required, &parsed.pubkeys, i).unwrap();
            let mine = parsed.pubkeys[i].serialize();
            assert_eq!(hex::encode(mine), SORTED_CHILDREN[sorted_index]);
        }
    }

    #[test]
    fn test_mismatched_key_count_rejected() {
        let mut redeem = inner_redeem();
        // Claim four keys in a three-envelope script.
        let last = redeem.len();
        redeem[last - 2] = crate::opcode::OP_1 + 3;
        assert!(matches!(
            parse_multisig_with_xpubs(&redeem, None),
            Err(ScriptError::BadEnvelope(_))
        ));
    }

    #[test]
    fn test_disagreeing_paths_rejected() {
        let mut redeem = inner_redeem();
        // Patch the second envelope's index word (little-endian 1000 → 1001).
        // Envelope layout: OP_M, then per key: 4c 57 <87 bytes>.
        let second_env_start = 1 + (2 + 87);
        let index_offset = second_env_start + 2 + 87 - 4;
        redeem[index_offset] = 0xe9;
        assert!(matches!(
            parse_multisig_with_xpubs(&redeem, None),
            Err(ScriptError::BadEnvelope(_))
        ));
    }

    #[test]
    fn test_not_checkmultisig_rejected() {
        let mut redeem = inner_redeem();
        let last = redeem.len() - 1;
        redeem[last] = 0xac; // OP_CHECKSIG
        assert!(parse_multisig_with_xpubs(&redeem, None).is_err());
    }

    #[test]
    fn test_build_parameter_bounds() {
        let parsed = parse_multisig_with_xpubs(&inner_redeem(), None).unwrap();
        assert!(build_multisig_script(0, &parsed.pubkeys, 0).is_err());
        assert!(build_multisig_script(4, &parsed.pubkeys, 0).is_err());
        assert!(build_multisig_script(2, &parsed.pubkeys, 9).is_err());
        assert!(build_multisig_script(2, &[], 0).is_err());
    }
}
