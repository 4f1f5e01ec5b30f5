//! Shared connector records and configuration.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strongbox_signer::SignatureEnvelope;

/// Wallet parameters for transaction building.
#[derive(Debug, Clone)]
pub struct WalletSpec {
    /// Signatures required to spend (M).
    pub signers_required: u8,
    /// The signers' xpubs in wallet order (N keys).
    pub xpubs: Vec<String>,
}

/// One unspent output chosen by the orchestrator.
#[derive(Debug, Clone)]
pub struct Utxo {
    /// Transaction id in the usual display order.
    pub tx_hash: String,
    pub tx_pos: u32,
    /// The path tail the deposit address of this output was derived with.
    pub derivation_index: u32,
}

/// One requested output.
#[derive(Debug, Clone)]
pub struct TxOutput {
    pub address: String,
    /// Coin amount, 8-decimal fixed point.
    pub amount: Decimal,
    pub memo: Option<String>,
}

/// Confirmed/unconfirmed/unmatured balance triple.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressBalance {
    pub confirmed: Decimal,
    pub unconfirmed: Decimal,
    pub unmatured: Decimal,
}

/// Chain position of a broadcast transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxStatus {
    pub height: i64,
    pub confirmations: u64,
}

impl TxStatus {
    /// A fork can report negative confirmations for a discarded
    /// transaction; those clamp to zero.
    pub fn with_clamped_confirmations(height: i64, confirmations: i64) -> Self {
        TxStatus {
            height,
            confirmations: confirmations.max(0) as u64,
        }
    }
}

/// Signatures for one input, as returned by the signer fleet.
pub type TxInSignatures = Vec<SignatureEnvelope>;
/// Signatures for a whole transaction: one list per input.
pub type TxSignatures = Vec<TxInSignatures>;

/// Currency the caller is importing or querying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyInfo {
    pub code: String,
    pub precision: u8,
}

/// A deposit found while scanning a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub tx_id: String,
    pub tx_pos: u32,
    pub to_address: String,
    pub amount: Decimal,
}

/// Node endpoint configuration; loaded from the wallet config file with
/// environment overrides applied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_confirmations_clamp_to_zero() {
        for k in [1i64, 2, 1000, i64::MAX] {
            let status = TxStatus::with_clamped_confirmations(7, -k);
            assert_eq!(status, TxStatus { height: 7, confirmations: 0 });
        }
        let status = TxStatus::with_clamped_confirmations(7, 42);
        assert_eq!(status.confirmations, 42);
    }

    #[test]
    fn test_node_config_defaults() {
        let config: NodeConfig = serde_json::from_str(
            r#"{"host":"127.0.0.1","port":8332,"user":"rpc","password":"secret"}"#,
        )
        .unwrap();
        assert_eq!(config.timeout_secs, 30);
    }
}
