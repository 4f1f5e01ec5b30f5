//! Strongbox signer node.
//!
//! A signer receives an unsigned-envelope transaction (hex), discovers which
//! inputs belong to its key by matching its master public key against the
//! xpubs embedded in each input, derives the child key along the path the
//! envelope names, and returns one signature object per input:
//!
//! ```text
//! base64( {"i": <post-sort pubkey index>, "v": <base64 DER || type byte>} )
//! ```
//!
//! Inputs that do not reference the signer's key yield an empty placeholder
//! string. Signing is RFC 6979 deterministic: two runs over the same
//! transaction produce byte-identical output, and so do two independent
//! signer nodes configured with the same seed.

pub mod error;
pub mod provider;
pub mod sighash;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bitcoin::consensus::deserialize;
use bitcoin::secp256k1::{Message, Secp256k1};
use bitcoin::Transaction;
use serde::{Deserialize, Serialize};
use strongbox_script::{build_multisig_script, extract_redeem_from_envelope, parse_multisig_with_xpubs};

pub use error::SignerError;
pub use provider::KeyProvider;
pub use sighash::SighashScheme;

/// What [`TxSigner::public`] reports: the master xpub (or, for an eth-legacy
/// signer, the hex compressed public key).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicAttributes {
    pub xpub: String,
}

/// The per-input signature object exchanged with the orchestrator.
///
/// JSON field names are part of the wire format: `i` is the signer's index in
/// the sorted-compressed-pubkey order of the input, `v` the DER signature
/// with the sighash byte appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureEnvelope {
    #[serde(rename = "i")]
    pub index: usize,
    #[serde(rename = "v", with = "base64_bytes")]
    pub signature: Vec<u8>,
}

impl SignatureEnvelope {
    /// Serializes to the base64-wrapped JSON wire form.
    pub fn to_base64(&self) -> Result<String, SignerError> {
        let json = serde_json::to_vec(self).map_err(|e| SignerError::Serialization(e.to_string()))?;
        Ok(BASE64.encode(json))
    }

    /// Parses the base64-wrapped JSON wire form.
    pub fn from_base64(s: &str) -> Result<Self, SignerError> {
        let json = BASE64
            .decode(s.as_bytes())
            .map_err(|e| SignerError::Serialization(e.to_string()))?;
        serde_json::from_slice(&json).map_err(|e| SignerError::Serialization(e.to_string()))
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}

/// The call surface a signer node exposes to the orchestrator.
pub trait TxSigner {
    fn currency_type(&self) -> &str;
    fn public(&self) -> Result<PublicAttributes, SignerError>;
    /// One element per transaction input; empty string for inputs this
    /// signer does not own. `amounts` must be empty or match the input count.
    fn sign(&self, tx_hex: &str, amounts: &[u64]) -> Result<Vec<String>, SignerError>;
}

/// Signer for the Bitcoin-family chains.
pub struct BtcSigner {
    currency: String,
    scheme: SighashScheme,
    provider: KeyProvider,
}

impl BtcSigner {
    pub fn new(currency: &str, provider: KeyProvider, scheme: SighashScheme) -> Self {
        BtcSigner {
            currency: currency.to_string(),
            scheme,
            provider,
        }
    }
}

impl TxSigner for BtcSigner {
    fn currency_type(&self) -> &str {
        &self.currency
    }

    fn public(&self) -> Result<PublicAttributes, SignerError> {
        let xpub = if self.provider.is_eth_legacy() {
            hex::encode(self.provider.master_pubkey()?.serialize())
        } else {
            self.provider.master_xpub()?.to_string()
        };
        Ok(PublicAttributes { xpub })
    }

    fn sign(&self, tx_hex: &str, amounts: &[u64]) -> Result<Vec<String>, SignerError> {
        let tx_bytes = hex::decode(tx_hex).map_err(|e| SignerError::Decode(e.to_string()))?;
        let tx: Transaction =
            deserialize(&tx_bytes).map_err(|e| SignerError::Decode(e.to_string()))?;

        if !amounts.is_empty() && amounts.len() != tx.input.len() {
            return Err(SignerError::InvalidParameters(format!(
                "{} amounts for {} inputs",
                amounts.len(),
                tx.input.len()
            )));
        }

        let master_pubkey = self.provider.master_pubkey()?;
        let secp = Secp256k1::signing_only();
        let mut signatures = Vec::with_capacity(tx.input.len());

        for (index, txin) in tx.input.iter().enumerate() {
            let redeem = extract_redeem_from_envelope(txin.script_sig.as_bytes())?;
            let parsed = parse_multisig_with_xpubs(&redeem, Some(&master_pubkey))?;

            // Not our input; leave a placeholder so indices stay aligned.
            let Some(own_index) = parsed.target_index else {
                signatures.push(String::new());
                continue;
            };

            let (script, sorted_index) =
                build_multisig_script(parsed.required, &parsed.pubkeys, own_index)?;

            let mut secret = self.provider.derived_key(&parsed.path)?;
            let digest = match self.scheme {
                SighashScheme::Legacy => sighash::legacy_sighash(&tx, index, &script)?,
                SighashScheme::ForkId => {
                    let amount = amounts.get(index).copied().unwrap_or(0);
                    sighash::bip143_sighash(&tx, index, &script, amount)?
                }
            };
            let signature = secp.sign_ecdsa(&Message::from_digest(digest), &secret);
            secret.non_secure_erase();

            let mut der = signature.serialize_der().to_vec();
            der.push(self.scheme.sighash_byte());

            signatures.push(
                SignatureEnvelope {
                    index: sorted_index,
                    signature: der,
                }
                .to_base64()?,
            );
        }
        Ok(signatures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The three signer seeds behind the 2-of-3 fixture wallet.
    const SEED_A: &str = "0635671834e54c61b9352f26595d9615ef1e5840c7f64af198e4a10ed7140dd0";
    const SEED_B: &str = "b918edc07dd94ad9b8f705cddc6d133bfbe3aa9bdaca4c1fb99c755ff222d461";
    const SEED_C: &str = "1c4798b1fa6841e4b2c034c77d9221bdf44b0738f47149d88b40f772866c3649";

    /// Envelope transaction spending 10.1 coins at derivation index 1000.
    const TX_INDEX_1000: &str = "0200000001d71f0514b1f210d374a7d5c1ea4b24bb199eb0bf1990dc9d8ec5252359b8eff600000000fd16010001ff01ff4d0e01524c57ff0488b21e0000000000000000002231c2b6a33377bc6fb0806268e3627602987340ed2c5e6be0d7be7f24161bae038b8001ff63faf92876effaa8cb774ee8a7260b014922607e191b22fb88d3ef1700000000e80300004c57ff0488b21e000000000000000000d77de533cea4f03402d513aa6b682cd1a69409564a6c4cddb37c8eed4705d0c603d2a614051301da597eea74316d7e404d89d5eb850238c2c1b3d536c5d5c07a5900000000e80300004c57ff0488b21e0000000000000000005c65a74ec6c4922e3df98f50f7c297f62477d123989d9c69ad7de1322cc8394c02cc24a901a51e4e1525343049f11ded77391bf579bc020f08e6956a6eadb13b5a00000000e803000053aeffffffff02e0f83b360000000017a914af70bbab80fb64dbf90b212f4971cc4807d0b8808700e1f505000000001976a914b9e6fa37edaf12df0a0036257e7e89a9abb42fae88ac00000000";

    /// Single-input envelope transaction at derivation index 2.
    const TX_INDEX_2: &str = "0200000001db172762bebe28c7f79bcea59647ca37e4e38603618bebbf8407bf44b727c58f00000000fd16010001ff01ff4d0e01524c57ff0488b21e0000000000000000002231c2b6a33377bc6fb0806268e3627602987340ed2c5e6be0d7be7f24161bae038b8001ff63faf92876effaa8cb774ee8a7260b014922607e191b22fb88d3ef1700000000020000004c57ff0488b21e000000000000000000d77de533cea4f03402d513aa6b682cd1a69409564a6c4cddb37c8eed4705d0c603d2a614051301da597eea74316d7e404d89d5eb850238c2c1b3d536c5d5c07a5900000000020000004c57ff0488b21e0000000000000000005c65a74ec6c4922e3df98f50f7c297f62477d123989d9c69ad7de1322cc8394c02cc24a901a51e4e1525343049f11ded77391bf579bc020f08e6956a6eadb13b5a000000000200000053aeffffffff019c35f8030000000017a9140a4aa12d8ff4bf38647a21bb9f72c3602fecaa448700000000";

    fn signer(seed_hex: &str, scheme: SighashScheme) -> BtcSigner {
        let currency = match scheme {
            SighashScheme::Legacy => "BTC",
            SighashScheme::ForkId => "BCH",
        };
        BtcSigner::new(
            currency,
            KeyProvider::new(hex::decode(seed_hex).unwrap()),
            scheme,
        )
    }

    fn expected(index: usize, sig_hex: &str) -> String {
        SignatureEnvelope {
            index,
            signature: hex::decode(sig_hex).unwrap(),
        }
        .to_base64()
        .unwrap()
    }

    #[test]
    fn test_currency_type() {
        assert_eq!(signer(SEED_A, SighashScheme::ForkId).currency_type(), "BCH");
        assert_eq!(signer(SEED_A, SighashScheme::Legacy).currency_type(), "BTC");
    }

    #[test]
    fn test_public_reports_master_xpub() {
        let attrs = signer(SEED_A, SighashScheme::ForkId).public().unwrap();
        assert_eq!(
            attrs.xpub,
            "xpub661MyMwAqRbcEtBNvF5oTnmGFSkZvy6ShetrnbVXTz7hyKYJSNBEtKiiY9HnMeTpLKDFJRYW2QSbNGtCGdpCzwZVSPRKevufqeGBwALkBUK"
        );
    }

    #[test]
    fn test_bch_sign_signer_a() {
        let sign = signer(SEED_A, SighashScheme::ForkId)
            .sign(TX_INDEX_1000, &[1_010_000_000])
            .unwrap();
        assert_eq!(
            sign,
            vec![expected(
                0,
                "3044022058dbc5b8c7952fa0972d32e28d27415ede9de1c03dea74d3ae357c6f8b2c170502203558d6efdbeefb651a0be9eb5263fc5b505a842e94eabda5576022fa5f0f09c041"
            )]
        );
    }

    #[test]
    fn test_bch_sign_signer_b() {
        let sign = signer(SEED_B, SighashScheme::ForkId)
            .sign(TX_INDEX_1000, &[1_010_000_000])
            .unwrap();
        assert_eq!(
            sign,
            vec![expected(
                1,
                "304402201a5ff47d22d91b4c5a3195ece0c4546d49dbda9a46533bbaef885b80cf13aba002202e30e9662cbefde3c47147f7119a20e92b6d68531ffaf21344ef97fca5e8c96a41"
            )]
        );
    }

    #[test]
    fn test_bch_sign_one_input_signer_a() {
        let sign = signer(SEED_A, SighashScheme::ForkId)
            .sign(TX_INDEX_2, &[110_000_000])
            .unwrap();
        assert_eq!(
            sign,
            vec![expected(
                0,
                "30450221008fa912b8adb46e09eace525c90d3050f6207ed706eb49558d44e585f89c6d4d6022067c18ce15408a4d1d165093be0c9f376cc2c48b623a00548c662c131bed0020641"
            )]
        );
    }

    #[test]
    fn test_bch_sign_without_amounts_commits_to_zero() {
        // The second signer's child key sorts to index 2 on this input.
        let sign = signer(SEED_B, SighashScheme::ForkId)
            .sign(TX_INDEX_2, &[])
            .unwrap();
        assert_eq!(
            sign,
            vec![expected(
                2,
                "3045022100c446a6f6281548c2bd11906b9c53d8ad88c1f7ad6124b1ed81e5b35a2fb6efc2022079a9dccd8d19c3abc2cf9bca91ab3fc23552f2a37c5fea850d771e734e475fcc41"
            )]
        );

        let sign = signer(SEED_C, SighashScheme::ForkId)
            .sign(TX_INDEX_2, &[])
            .unwrap();
        assert_eq!(
            sign,
            vec![expected(
                1,
                "304402205be45f0d347e9d454a529a01d3493675b9d8be844908c38d43b3647ecaad412e022037d8e923fa8c12c374e5530bf2b4b29ddd7a355430c8d543b9884b04543d986841"
            )]
        );
    }

    #[test]
    fn test_btc_legacy_sign() {
        let sign = signer(SEED_A, SighashScheme::Legacy)
            .sign(TX_INDEX_2, &[])
            .unwrap();
        assert_eq!(
            sign,
            vec![expected(
                0,
                "30440220596c276e66186b98e1b190a626a94b30760718c99f2db32d2e165e7075c3f67302207fd6cd72995239952769b7ff2c61f4e952a05a3a9970f564f09f3efe51feded201"
            )]
        );

        let sign = signer(SEED_B, SighashScheme::Legacy)
            .sign(TX_INDEX_2, &[])
            .unwrap();
        assert_eq!(
            sign,
            vec![expected(
                2,
                "3045022100cc08a8be0f1021f9029b0fd428a0d1575c39e215ee396672eb70dd350f5b17d30220075c8eaf70f6d0dfcdf379c4a7f98ae7eb64ef765ac8d7be1b30f6e7e4c4181301"
            )]
        );

        let sign = signer(SEED_C, SighashScheme::Legacy)
            .sign(TX_INDEX_2, &[])
            .unwrap();
        assert_eq!(
            sign,
            vec![expected(
                1,
                "304402204c98e1508cd33482d004ec5044f71128c0adf5fbcf2fd3da0976023a04811ba20220039926ee4a5449a3ab44fdae71a356eed7dcf5d37c28bf79bfa11f67f4ee444c01"
            )]
        );
    }

    #[test]
    fn test_signing_is_idempotent() {
        let signer = signer(SEED_A, SighashScheme::ForkId);
        let first = signer.sign(TX_INDEX_1000, &[1_010_000_000]).unwrap();
        let second = signer.sign(TX_INDEX_1000, &[1_010_000_000]).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_foreign_key_yields_placeholder() {
        let outsider = BtcSigner::new(
            "BCH",
            KeyProvider::new(vec![9u8; 32]),
            SighashScheme::ForkId,
        );
        let sign = outsider.sign(TX_INDEX_1000, &[1_010_000_000]).unwrap();
        assert_eq!(sign, vec![String::new()]);
    }

    #[test]
    fn test_amount_count_mismatch_rejected() {
        let result = signer(SEED_A, SighashScheme::ForkId).sign(TX_INDEX_1000, &[1, 2]);
        assert!(matches!(result, Err(SignerError::InvalidParameters(_))));
    }

    #[test]
    fn test_garbage_hex_rejected() {
        assert!(matches!(
            signer(SEED_A, SighashScheme::ForkId).sign("zz", &[]),
            Err(SignerError::Decode(_))
        ));
        assert!(matches!(
            signer(SEED_A, SighashScheme::ForkId).sign("deadbeef", &[]),
            Err(SignerError::Decode(_))
        ));
    }

    #[test]
    fn test_signature_envelope_wire_roundtrip() {
        let envelope = SignatureEnvelope {
            index: 1,
            signature: vec![0x30, 0x44, 0x41],
        };
        let wire = envelope.to_base64().unwrap();
        assert_eq!(SignatureEnvelope::from_base64(&wire).unwrap(), envelope);

        // Field order and names are part of the wire format.
        let json = String::from_utf8(BASE64.decode(wire).unwrap()).unwrap();
        assert_eq!(json, r#"{"i":1,"v":"MERB"}"#);
    }
}
