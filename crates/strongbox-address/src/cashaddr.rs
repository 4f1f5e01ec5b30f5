//! CashAddr ↔ legacy base58 conversion.
//!
//! Bitcoin Cash nodes and users speak CashAddr, while every internal layer of
//! the engine works on the legacy base58 form. This module converts in both
//! directions for the three known prefixes (`bitcoincash`, `bchtest`,
//! `bchreg`); decoding is prefix-inferring like the conversion libraries the
//! connectors rely on, so a regtest connector still recognizes a mainnet
//! CashAddr as well-formed.

use bitcoin::base58;
use strongbox_core::Network;

use crate::AddressError;

const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

// prefix, P2PKH legacy version, P2SH legacy version
const PREFIXES: [(&str, u8, u8); 3] = [
    ("bitcoincash", 0x00, 0x05),
    ("bchtest", 0x6f, 0xc4),
    ("bchreg", 0x6f, 0xc4),
];

const CHECKSUM_GROUPS: usize = 8;
const TYPE_P2PKH: u8 = 0;
const TYPE_P2SH: u8 = 1;

fn polymod(values: &[u8]) -> u64 {
    let mut c: u64 = 1;
    for &d in values {
        let c0 = (c >> 35) as u8;
        c = ((c & 0x0007_ffff_ffff) << 5) ^ u64::from(d);
        if c0 & 0x01 != 0 {
            c ^= 0x98_f2bc_8e61;
        }
        if c0 & 0x02 != 0 {
            c ^= 0x79_b76d_99e2;
        }
        if c0 & 0x04 != 0 {
            c ^= 0xf3_3e5f_b3c4;
        }
        if c0 & 0x08 != 0 {
            c ^= 0xae_2eab_e2a8;
        }
        if c0 & 0x10 != 0 {
            c ^= 0x1e_4f43_e470;
        }
    }
    c ^ 1
}

fn prefix_values(prefix: &str) -> Vec<u8> {
    let mut values: Vec<u8> = prefix.bytes().map(|b| b & 0x1f).collect();
    values.push(0);
    values
}

fn convert_bits(data: &[u8], from: u32, to: u32, pad: bool) -> Result<Vec<u8>, AddressError> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let mut out = Vec::with_capacity(data.len() * from as usize / to as usize + 1);
    let max = (1u32 << to) - 1;
    let max_acc = (1u32 << (from + to - 1)) - 1;
    for &b in data {
        if u32::from(b) >> from != 0 {
            return Err(AddressError::CashAddr("value out of range".into()));
        }
        acc = ((acc << from) | u32::from(b)) & max_acc;
        bits += from;
        while bits >= to {
            bits -= to;
            out.push(((acc >> bits) & max) as u8);
        }
    }
    if pad {
        if bits > 0 {
            out.push(((acc << (to - bits)) & max) as u8);
        }
    } else if bits >= from || ((acc << (to - bits)) & max) != 0 {
        return Err(AddressError::CashAddr("non-zero padding".into()));
    }
    Ok(out)
}

fn encode(prefix: &str, version: u8, hash: &[u8; 20]) -> Result<String, AddressError> {
    let mut payload = Vec::with_capacity(21);
    payload.push(version);
    payload.extend_from_slice(hash);
    let payload5 = convert_bits(&payload, 8, 5, true)?;

    let mut checksum_input = prefix_values(prefix);
    checksum_input.extend_from_slice(&payload5);
    checksum_input.extend_from_slice(&[0u8; CHECKSUM_GROUPS]);
    let pm = polymod(&checksum_input);

    let mut out = String::with_capacity(prefix.len() + 1 + payload5.len() + CHECKSUM_GROUPS);
    out.push_str(prefix);
    out.push(':');
    for v in payload5 {
        out.push(CHARSET[v as usize] as char);
    }
    for i in 0..CHECKSUM_GROUPS {
        let v = (pm >> (5 * (CHECKSUM_GROUPS - 1 - i))) & 0x1f;
        out.push(CHARSET[v as usize] as char);
    }
    Ok(out)
}

fn charset_value(c: char) -> Result<u8, AddressError> {
    CHARSET
        .iter()
        .position(|&b| b as char == c)
        .map(|p| p as u8)
        .ok_or_else(|| AddressError::CashAddr(format!("invalid character {c:?}")))
}

fn decode_with_prefix(prefix: &str, payload: &str) -> Result<(u8, [u8; 20]), AddressError> {
    let (_, p2pkh, p2sh) = PREFIXES
        .iter()
        .find(|(p, _, _)| *p == prefix)
        .ok_or_else(|| AddressError::CashAddr(format!("unknown prefix {prefix:?}")))?;

    let mut values = prefix_values(prefix);
    let data_len = payload
        .len()
        .checked_sub(CHECKSUM_GROUPS)
        .ok_or_else(|| AddressError::CashAddr("payload too short".into()))?;
    for c in payload.chars() {
        values.push(charset_value(c)?);
    }
    if polymod(&values) != 0 {
        return Err(AddressError::CashAddr("checksum mismatch".into()));
    }

    let data5: Vec<u8> = payload
        .chars()
        .take(data_len)
        .map(charset_value)
        .collect::<Result<_, _>>()?;
    let payload8 = convert_bits(&data5, 5, 8, false)?;
    if payload8.len() != 21 {
        return Err(AddressError::CashAddr(format!(
            "payload is {} bytes",
            payload8.len()
        )));
    }
    let version = payload8[0];
    if version & 0x80 != 0 || version & 0x07 != 0 {
        return Err(AddressError::CashAddr(format!(
            "unsupported version byte {version:#04x}"
        )));
    }
    let legacy_version = match (version >> 3) & 0x0f {
        TYPE_P2PKH => *p2pkh,
        TYPE_P2SH => *p2sh,
        t => {
            return Err(AddressError::CashAddr(format!(
                "unsupported address type {t}"
            )))
        }
    };
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&payload8[1..]);
    Ok((legacy_version, hash))
}

fn decode(addr: &str) -> Result<(u8, [u8; 20]), AddressError> {
    let has_upper = addr.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = addr.chars().any(|c| c.is_ascii_lowercase());
    if has_upper && has_lower {
        return Err(AddressError::CashAddr("mixed case".into()));
    }
    let addr = addr.to_ascii_lowercase();

    if let Some((prefix, payload)) = addr.split_once(':') {
        return decode_with_prefix(prefix, payload);
    }
    // Prefix omitted: infer it from the checksum.
    for (prefix, _, _) in PREFIXES {
        if let Ok(found) = decode_with_prefix(prefix, &addr) {
            return Ok(found);
        }
    }
    Err(AddressError::CashAddr("no prefix matched".into()))
}

/// Converts a CashAddr into its legacy base58 form.
///
/// A string that already parses as a legacy address passes through unchanged.
pub fn to_legacy_address(addr: &str) -> Result<String, AddressError> {
    if let Ok(decoded) = base58::decode_check(addr) {
        if decoded.len() == 21 {
            return Ok(addr.to_string());
        }
    }
    let (version, hash) = decode(addr)?;
    let mut payload = [0u8; 21];
    payload[0] = version;
    payload[1..].copy_from_slice(&hash);
    Ok(base58::encode_check(&payload))
}

/// Converts a legacy base58 address into the CashAddr form for `network`.
pub fn to_cash_address(legacy: &str, network: Network) -> Result<String, AddressError> {
    let prefix = network
        .cashaddr_prefix()
        .ok_or_else(|| AddressError::CashAddr(format!("{network:?} has no CashAddr form")))?;
    let decoded = base58::decode_check(legacy)
        .map_err(|e| AddressError::CashAddr(format!("legacy decode: {e}")))?;
    if decoded.len() != 21 {
        return Err(AddressError::CashAddr(format!(
            "legacy payload is {} bytes",
            decoded.len()
        )));
    }
    let type_bits = match decoded[0] {
        0x00 | 0x6f | 0x30 => TYPE_P2PKH,
        0x05 | 0xc4 | 0x32 | 0x3a => TYPE_P2SH,
        v => {
            return Err(AddressError::CashAddr(format!(
                "unknown legacy version {v:#04x}"
            )))
        }
    };
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&decoded[1..]);
    encode(prefix, type_bits << 3, &hash)
}
