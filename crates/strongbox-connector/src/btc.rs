//! Bitcoin-family chain connector.
//!
//! Covers Bitcoin and Litecoin directly; the Bitcoin Cash variant in
//! [`crate::bch`] wraps this connector with CashAddr normalization.

use std::str::FromStr;

use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::{deserialize, serialize};
use bitcoin::hashes::Hash;
use bitcoin::transaction::Version;
use bitcoin::{
    base58, Amount, OutPoint, PubkeyHash, ScriptBuf, ScriptHash, Sequence, Transaction, TxIn,
    TxOut, Txid, Witness,
};
use rust_decimal::Decimal;
use strongbox_core::{amount, Network, Xpub};
use strongbox_script::opcode::OP_0;
use strongbox_script::{
    build_multisig_script, build_unsigned_envelope, extract_redeem_from_envelope,
    parse_multisig_with_xpubs, push_data,
};

use crate::error::ConnectorError;
use crate::rpc::NodeClient;
use crate::types::{AddressBalance, CurrencyInfo, TxOutput, TxSignatures, TxStatus, Utxo, WalletSpec};

/// Node error marker for transactions that can never be accepted.
const SCRIPT_VERIFY_FAILURE: &str = "mandatory-script-verify-flag-failed";

const MIN_WALLET_SIGNERS: usize = 2;
const MAX_WALLET_SIGNERS: usize = 15;

/// An output of a scanned transaction, resolved to an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedOutput {
    pub address: String,
    /// Satoshis.
    pub value: u64,
    pub tx_pos: u32,
}

pub struct BtcChainConnector {
    currency: String,
    network: Network,
    client: NodeClient,
    pub(crate) tx_batch_size: usize,
}

impl BtcChainConnector {
    pub fn new(currency: &str, network: Network, client: NodeClient) -> Self {
        BtcChainConnector {
            currency: currency.to_string(),
            network,
            client,
            tx_batch_size: crate::importer::DEFAULT_TX_BATCH_SIZE,
        }
    }

    /// Overrides the block-scan batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.tx_batch_size = batch_size.max(1);
        self
    }

    pub fn currency_code(&self) -> &str {
        &self.currency
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub(crate) fn client(&self) -> &NodeClient {
        &self.client
    }

    /// True when `address` is a legacy address carrying one of this
    /// network's version bytes.
    pub fn validate_address(&self, address: &str) -> bool {
        strongbox_address::validate(address, self.network)
    }

    fn output_script(&self, address: &str) -> Result<ScriptBuf, ConnectorError> {
        let decoded = base58::decode_check(address)
            .map_err(|e| ConnectorError::Decode(format!("address {address:?}: {e}")))?;
        if decoded.len() != 21 {
            return Err(ConnectorError::Decode(format!(
                "address {address:?} payload is {} bytes",
                decoded.len()
            )));
        }
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&decoded[1..]);
        let version = decoded[0];
        if version == self.network.p2pkh_version() {
            Ok(ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array(hash)))
        } else if version == self.network.p2sh_version() {
            Ok(ScriptBuf::new_p2sh(&ScriptHash::from_byte_array(hash)))
        } else {
            Err(ConnectorError::NetworkMismatch(format!(
                "version {version:#04x} on {:?}",
                self.network
            )))
        }
    }

    /// Builds the serialized unsigned-envelope transaction.
    ///
    /// Amounts are summed per address (first-occurrence order preserved),
    /// outputs are emitted in that order, and every input's signature script
    /// is replaced by the unsigned envelope carrying the wallet xpubs and the
    /// utxo's derivation index.
    pub fn tx_build(
        &self,
        wallet: &WalletSpec,
        utxos: &[Utxo],
        outputs: &[TxOutput],
    ) -> Result<String, ConnectorError> {
        let total = wallet.xpubs.len();
        if !(MIN_WALLET_SIGNERS..=MAX_WALLET_SIGNERS).contains(&total) {
            return Err(ConnectorError::InvalidParameters(format!(
                "{total} wallet signers"
            )));
        }
        let required = wallet.signers_required as usize;
        if required < 1 || required > total {
            return Err(ConnectorError::InvalidParameters(format!(
                "{required} required signatures over {total} signers"
            )));
        }
        if utxos.is_empty() || outputs.is_empty() {
            return Err(ConnectorError::InvalidParameters(
                "transaction needs at least one input and one output".into(),
            ));
        }

        let xpubs = wallet
            .xpubs
            .iter()
            .map(|s| Xpub::from_str(s))
            .collect::<Result<Vec<_>, _>>()?;

        // Sum amounts per address, keeping first-occurrence order.
        let mut summed: Vec<(&str, Decimal)> = Vec::with_capacity(outputs.len());
        for output in outputs {
            let value = output.amount.abs();
            match summed.iter_mut().find(|(a, _)| *a == output.address) {
                Some((_, total)) => *total += value,
                None => summed.push((&output.address, value)),
            }
        }

        let mut tx_outputs = Vec::with_capacity(summed.len());
        for (address, coins) in &summed {
            tx_outputs.push(TxOut {
                value: Amount::from_sat(amount::to_satoshis(*coins)?),
                script_pubkey: self.output_script(address)?,
            });
        }

        let mut tx_inputs = Vec::with_capacity(utxos.len());
        for utxo in utxos {
            let txid = Txid::from_str(&utxo.tx_hash)
                .map_err(|e| ConnectorError::Decode(format!("utxo {}: {e}", utxo.tx_hash)))?;
            let envelope =
                build_unsigned_envelope(wallet.signers_required, &xpubs, utxo.derivation_index)?;
            tx_inputs.push(TxIn {
                previous_output: OutPoint {
                    txid,
                    vout: utxo.tx_pos,
                },
                script_sig: ScriptBuf::from_bytes(envelope),
                sequence: Sequence::MAX,
                witness: Witness::default(),
            });
        }

        let tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: tx_inputs,
            output: tx_outputs,
        };
        Ok(hex::encode(serialize(&tx)))
    }

    /// Replaces each input's unsigned envelope with the final
    /// `OP_0 sig₁ … sig_m redeem` script.
    ///
    /// Exactly M signatures per input are required. Each signature carries
    /// the post-sort pubkey index its signer reported; the assembler places
    /// signatures by that index over its own re-sort of the child keys, so
    /// the caller's ordering is irrelevant.
    pub fn tx_rebuild(
        &self,
        tx_hex: &str,
        signatures: &TxSignatures,
    ) -> Result<String, ConnectorError> {
        let tx_bytes = hex::decode(tx_hex).map_err(|e| ConnectorError::Decode(e.to_string()))?;
        let mut tx: Transaction =
            deserialize(&tx_bytes).map_err(|e| ConnectorError::Decode(e.to_string()))?;

        if tx.input.len() != signatures.len() {
            return Err(ConnectorError::InvalidParameters(format!(
                "{} signature sets for {} inputs",
                signatures.len(),
                tx.input.len()
            )));
        }

        for (index, txin) in tx.input.iter_mut().enumerate() {
            let redeem = extract_redeem_from_envelope(txin.script_sig.as_bytes())?;
            let parsed = parse_multisig_with_xpubs(&redeem, None)?;
            let required = parsed.required as usize;

            let input_sigs = &signatures[index];
            if input_sigs.len() != required {
                return Err(ConnectorError::InconsistentSignatures {
                    input: index,
                    detail: format!("{} signatures, need {required}", input_sigs.len()),
                });
            }

            // Order by the signers' post-sort indices.
            let mut ordered = vec![None; parsed.pubkeys.len()];
            for sig in input_sigs {
                if sig.index >= ordered.len() {
                    return Err(ConnectorError::InconsistentSignatures {
                        input: index,
                        detail: format!(
                            "signature index {} out of {} keys",
                            sig.index,
                            ordered.len()
                        ),
                    });
                }
                if ordered[sig.index].is_some() {
                    return Err(ConnectorError::InconsistentSignatures {
                        input: index,
                        detail: format!("duplicate signature index {}", sig.index),
                    });
                }
                ordered[sig.index] = Some(&sig.signature);
            }

            let (redeem_script, _) = build_multisig_script(parsed.required, &parsed.pubkeys, 0)?;
            let mut script = Vec::new();
            script.push(OP_0);
            for sig in ordered.into_iter().flatten() {
                push_data(&mut script, sig);
            }
            push_data(&mut script, &redeem_script);
            txin.script_sig = ScriptBuf::from_bytes(script);
        }

        Ok(hex::encode(serialize(&tx)))
    }

    /// Submits `tx_hex` to the node. Script-verify rejections are permanent;
    /// everything else is worth retrying.
    pub async fn tx_broadcast(&self, tx_hex: &str) -> Result<String, ConnectorError> {
        let tx_bytes = hex::decode(tx_hex).map_err(|e| ConnectorError::Decode(e.to_string()))?;
        let _: Transaction =
            deserialize(&tx_bytes).map_err(|e| ConnectorError::Decode(e.to_string()))?;

        match self.client.send_raw_transaction(tx_hex).await {
            Ok(txid) => Ok(txid),
            Err(ConnectorError::Transient(message)) if message.contains(SCRIPT_VERIFY_FAILURE) => {
                log::error!("broadcast rejected permanently: {message}");
                Err(ConnectorError::TxPermanentFailure)
            }
            Err(e) => Err(e),
        }
    }

    /// Chain status of `txid`: `{0, 0}` while unconfirmed, otherwise the
    /// node's confirmation count clamped at zero.
    pub async fn tx_status(&self, txid: &str, _block_no: u64) -> Result<TxStatus, ConnectorError> {
        let info = self.client.get_raw_transaction_verbose(txid).await?;
        match info.blockhash.as_deref() {
            None | Some("") => Ok(TxStatus {
                height: 0,
                confirmations: 0,
            }),
            Some(_) => Ok(TxStatus::with_clamped_confirmations(
                0,
                info.confirmations.unwrap_or(0),
            )),
        }
    }

    /// Sums the confirmed node balance over `addresses`, scaled to coins by
    /// the currency precision. Addresses that fail validation are skipped.
    pub async fn balance_get(
        &self,
        currency: &CurrencyInfo,
        addresses: &[String],
    ) -> Result<AddressBalance, ConnectorError> {
        if addresses.is_empty() {
            return Err(ConnectorError::InvalidParameters(
                "balance query needs at least one address".into(),
            ));
        }
        let mut total: i128 = 0;
        for address in addresses {
            if !self.validate_address(address) {
                log::warn!("skipping invalid address in balance query");
                continue;
            }
            let info = self.client.get_address_balance(address).await?;
            total += i128::from(info.balance);
        }
        let confirmed = Decimal::try_from_i128_with_scale(total, u32::from(currency.precision))
            .map_err(|e| ConnectorError::Decode(e.to_string()))?;
        Ok(AddressBalance {
            confirmed,
            ..AddressBalance::default()
        })
    }

    /// Resolves standard P2PKH/P2SH outputs to legacy addresses; other
    /// script forms are skipped.
    pub fn parse_outputs(&self, outputs: &[TxOut]) -> Vec<ParsedOutput> {
        parse_outputs_for(self.network, outputs)
    }
}

/// [`BtcChainConnector::parse_outputs`] without the connector; the importer
/// scan tasks call this directly.
pub(crate) fn parse_outputs_for(network: Network, outputs: &[TxOut]) -> Vec<ParsedOutput> {
    let mut parsed = Vec::new();
    for (pos, txout) in outputs.iter().enumerate() {
        let script = txout.script_pubkey.as_bytes();
        let (version, hash_bytes) = if txout.script_pubkey.is_p2pkh() {
            (network.p2pkh_version(), &script[3..23])
        } else if txout.script_pubkey.is_p2sh() {
            (network.p2sh_version(), &script[2..22])
        } else {
            continue;
        };
        let mut hash = [0u8; 20];
        hash.copy_from_slice(hash_bytes);
        parsed.push(ParsedOutput {
            address: strongbox_address::base58_address(version, &hash),
            value: txout.value.to_sat(),
            tx_pos: pos as u32,
        });
    }
    parsed
}
