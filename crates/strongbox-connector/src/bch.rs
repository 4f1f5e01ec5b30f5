//! Bitcoin Cash connector.
//!
//! Wraps the Bitcoin connector with CashAddr handling: outgoing addresses
//! are accepted in either CashAddr or legacy form and normalized to legacy
//! before building, while scanned outputs are reported back in CashAddr
//! form. Balance queries are not supported on the cash chains (no address
//! index on the nodes the fleet runs).

use std::sync::Arc;

use bitcoin::TxOut;
use strongbox_address::cashaddr;
use strongbox_core::Network;

use crate::btc::{BtcChainConnector, ParsedOutput};
use crate::error::ConnectorError;
use crate::importer::{match_outputs, scan_in_batches, ScanFn};
use crate::rpc::NodeClient;
use crate::types::{
    AddressBalance, CurrencyInfo, Operation, TxOutput, TxSignatures, TxStatus, Utxo, WalletSpec,
};

pub struct BchChainConnector {
    inner: BtcChainConnector,
}

impl BchChainConnector {
    pub fn new(
        currency: &str,
        network: Network,
        client: NodeClient,
    ) -> Result<Self, ConnectorError> {
        if !network.is_cash_chain() {
            return Err(ConnectorError::InvalidParameters(format!(
                "{network:?} is not a cash chain"
            )));
        }
        Ok(BchChainConnector {
            inner: BtcChainConnector::new(currency, network, client),
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.inner = self.inner.with_batch_size(batch_size);
        self
    }

    pub fn currency_code(&self) -> &str {
        self.inner.currency_code()
    }

    pub fn network(&self) -> Network {
        self.inner.network()
    }

    /// Any convertible address is valid: CashAddr with a known prefix, or a
    /// legacy form.
    pub fn validate_address(&self, address: &str) -> bool {
        cashaddr::to_legacy_address(address).is_ok()
    }

    /// [`BtcChainConnector::tx_build`] with CashAddr outputs normalized to
    /// legacy first.
    pub fn tx_build(
        &self,
        wallet: &WalletSpec,
        utxos: &[Utxo],
        outputs: &[TxOutput],
    ) -> Result<String, ConnectorError> {
        let normalized = outputs
            .iter()
            .map(|output| {
                Ok(TxOutput {
                    address: cashaddr::to_legacy_address(&output.address)?,
                    amount: output.amount,
                    memo: output.memo.clone(),
                })
            })
            .collect::<Result<Vec<_>, ConnectorError>>()?;
        self.inner.tx_build(wallet, utxos, &normalized)
    }

    pub fn tx_rebuild(
        &self,
        tx_hex: &str,
        signatures: &TxSignatures,
    ) -> Result<String, ConnectorError> {
        self.inner.tx_rebuild(tx_hex, signatures)
    }

    pub async fn tx_broadcast(&self, tx_hex: &str) -> Result<String, ConnectorError> {
        self.inner.tx_broadcast(tx_hex).await
    }

    pub async fn tx_status(&self, txid: &str, block_no: u64) -> Result<TxStatus, ConnectorError> {
        self.inner.tx_status(txid, block_no).await
    }

    pub async fn balance_get(
        &self,
        _currency: &CurrencyInfo,
        _addresses: &[String],
    ) -> Result<AddressBalance, ConnectorError> {
        Err(ConnectorError::InvalidParameters(
            "unsupported method: BalanceGet".into(),
        ))
    }

    /// Standard outputs resolved to CashAddr form.
    pub fn parse_outputs(&self, outputs: &[TxOut]) -> Result<Vec<ParsedOutput>, ConnectorError> {
        self.inner
            .parse_outputs(outputs)
            .into_iter()
            .map(|output| {
                Ok(ParsedOutput {
                    address: cashaddr::to_cash_address(&output.address, self.network())?,
                    value: output.value,
                    tx_pos: output.tx_pos,
                })
            })
            .collect()
    }

    pub async fn get_block_hashes_by_number(
        &self,
        number: u64,
    ) -> Result<(String, String), ConnectorError> {
        self.inner.get_block_hashes_by_number(number).await
    }

    /// [`BtcChainConnector::process_block`] with CashAddr reporting.
    pub async fn process_block(
        &self,
        number: u64,
        currencies: &[CurrencyInfo],
        watched: &[String],
    ) -> Result<Vec<Operation>, ConnectorError> {
        let currency = self.inner.check_import_currency(currencies)?;
        let block = self.inner.get_block_by_number(number).await?;

        let network = self.network();
        let precision = currency.precision;
        let watched: Arc<Vec<String>> = Arc::new(watched.to_vec());
        let scan: ScanFn =
            Arc::new(move |tx| match_outputs(&tx, network, precision, &watched, Some(network)));

        let (operations, failures) =
            scan_in_batches(&block.txdata, self.inner.tx_batch_size, scan).await;
        if !failures.is_empty() {
            return Err(ConnectorError::Transient(failures.join("; ")));
        }
        Ok(operations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeConfig;
    use bitcoin::consensus::encode::deserialize;
    use bitcoin::Transaction;

    const WALLET_XPUBS: [&str; 3] = [
        "xpub661MyMwAqRbcEtBNvF5oTnmGFSkZvy6ShetrnbVXTz7hyKYJSNBEtKiiY9HnMeTpLKDFJRYW2QSbNGtCGdpCzwZVSPRKevufqeGBwALkBUK",
        "xpub661MyMwAqRbcGgsQadngKDqjvQDC299XoG8SjbpfZhKUofdVVCqehG2TCsTXNudCFyTmNL72gGmNBNbtu75Tkzz2jJMqBak8Ab71MQYs2UQ",
        "xpub661MyMwAqRbcFTni57UXBzWmbN3JtuoqdLivkjzkbkiPB46gDU6pYYQeE2BKRyhD1h6wXHx5jRWZh78NS45EoZPwVezgKkLjf4TTXPWh8Wv",
    ];

    /// TxBuild fixture: one 2-of-3 input at derivation index 1000, change to
    /// the deposit P2SH plus a P2PKH payout.
    const BUILD_FIXTURE_HEX: &str = "0200000001d71f0514b1f210d374a7d5c1ea4b24bb199eb0bf1990dc9d8ec5252359b8eff600000000fd16010001ff01ff4d0e01524c57ff0488b21e0000000000000000002231c2b6a33377bc6fb0806268e3627602987340ed2c5e6be0d7be7f24161bae038b8001ff63faf92876effaa8cb774ee8a7260b014922607e191b22fb88d3ef1700000000e80300004c57ff0488b21e000000000000000000d77de533cea4f03402d513aa6b682cd1a69409564a6c4cddb37c8eed4705d0c603d2a614051301da597eea74316d7e404d89d5eb850238c2c1b3d536c5d5c07a5900000000e80300004c57ff0488b21e0000000000000000005c65a74ec6c4922e3df98f50f7c297f62477d123989d9c69ad7de1322cc8394c02cc24a901a51e4e1525343049f11ded77391bf579bc020f08e6956a6eadb13b5a00000000e803000053aeffffffff02e0f83b360000000017a914af70bbab80fb64dbf90b212f4971cc4807d0b8808700e1f505000000001976a914b9e6fa37edaf12df0a0036257e7e89a9abb42fae88ac00000000";

    /// TxBuild fixture at derivation index 0, two P2PKH outputs.
    const BUILD_FIXTURE_INDEX0_HEX: &str = "02000000016ba5d03946adc49ba39262a658d432515b98de0fb968849645fd008e12acfbb500000000fd16010001ff01ff4d0e01524c57ff0488b21e0000000000000000002231c2b6a33377bc6fb0806268e3627602987340ed2c5e6be0d7be7f24161bae038b8001ff63faf92876effaa8cb774ee8a7260b014922607e191b22fb88d3ef1700000000000000004c57ff0488b21e000000000000000000d77de533cea4f03402d513aa6b682cd1a69409564a6c4cddb37c8eed4705d0c603d2a614051301da597eea74316d7e404d89d5eb850238c2c1b3d536c5d5c07a5900000000000000004c57ff0488b21e0000000000000000005c65a74ec6c4922e3df98f50f7c297f62477d123989d9c69ad7de1322cc8394c02cc24a901a51e4e1525343049f11ded77391bf579bc020f08e6956a6eadb13b5a000000000000000053aeffffffff0240420f00000000001976a9145df78188b31e0136f4a6c6aa570f5c41aa994b8d88ac6043993b000000001976a914b9e6fa37edaf12df0a0036257e7e89a9abb42fae88ac00000000";

    fn connector() -> BchChainConnector {
        let config = NodeConfig {
            host: "127.0.0.1".into(),
            port: 18443,
            user: "rpc".into(),
            password: "rpc".into(),
            timeout_secs: 30,
        };
        BchChainConnector::new(
            "BCHABC",
            Network::BitcoinCashRegtest,
            NodeClient::new(&config).unwrap(),
        )
        .unwrap()
    }

    fn wallet() -> WalletSpec {
        WalletSpec {
            signers_required: 2,
            xpubs: WALLET_XPUBS.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn output(address: &str, amount: &str) -> TxOutput {
        TxOutput {
            address: address.into(),
            amount: amount.parse().unwrap(),
            memo: None,
        }
    }

    #[test]
    fn test_tx_build_matches_fixture() {
        let utxos = vec![Utxo {
            tx_hash: "f6efb8592325c58e9ddc9019bfb09e19bb244beac1d5a774d310f2b114051fd7".into(),
            tx_pos: 0,
            derivation_index: 1000,
        }];
        let outputs = vec![
            output("bchreg:pzhhpwatsrakfklepvsj7jt3e3yq059csqw8u05deg", "9.099"),
            output("bchreg:qzu7d73hakh39hc2qqmz2ln73x56hdp04cyfy5q4ye", "1.0"),
        ];
        let tx = connector().tx_build(&wallet(), &utxos, &outputs).unwrap();
        assert_eq!(tx, BUILD_FIXTURE_HEX);
    }

    #[test]
    fn test_tx_build_index_zero_fixture() {
        let utxos = vec![Utxo {
            tx_hash: "b5fbac128e00fd45968468b90fde985b5132d458a66292a39bc4ad4639d0a56b".into(),
            tx_pos: 0,
            derivation_index: 0,
        }];
        let outputs = vec![
            output("bchreg:qpwl0qvgkv0qzdh55mr254c0t3q64x2t355a20k24d", "0.01"),
            output("bchreg:qzu7d73hakh39hc2qqmz2ln73x56hdp04cyfy5q4ye", "9.999"),
        ];
        let tx = connector().tx_build(&wallet(), &utxos, &outputs).unwrap();
        assert_eq!(tx, BUILD_FIXTURE_INDEX0_HEX);
    }

    #[test]
    fn test_tx_build_is_deterministic() {
        let utxos = vec![Utxo {
            tx_hash: "f6efb8592325c58e9ddc9019bfb09e19bb244beac1d5a774d310f2b114051fd7".into(),
            tx_pos: 0,
            derivation_index: 1000,
        }];
        let outputs = vec![output("bchreg:qzu7d73hakh39hc2qqmz2ln73x56hdp04cyfy5q4ye", "1.0")];
        let connector = connector();
        assert_eq!(
            connector.tx_build(&wallet(), &utxos, &outputs).unwrap(),
            connector.tx_build(&wallet(), &utxos, &outputs).unwrap()
        );
    }

    #[test]
    fn test_validate_address_accepts_any_known_prefix() {
        let connector = connector();
        assert!(connector.validate_address("bchreg:qzu7d73hakh39hc2qqmz2ln73x56hdp04cyfy5q4ye"));
        assert!(connector.validate_address("bitcoincash:qpm2qsznhks23z7629mms6s4cwef74vcwvy22gdx6a"));
        assert!(!connector.validate_address("garbage"));
        assert!(!connector.validate_address(""));
    }

    #[tokio::test]
    async fn test_balance_get_unsupported() {
        let currency = CurrencyInfo {
            code: "BCHABC".into(),
            precision: 8,
        };
        let result = connector().balance_get(&currency, &["x".into()]).await;
        assert!(matches!(result, Err(ConnectorError::InvalidParameters(_))));
    }

    #[test]
    fn test_parse_outputs_reports_cashaddr() {
        let tx_bytes = hex::decode(BUILD_FIXTURE_HEX).unwrap();
        let tx: Transaction = deserialize(&tx_bytes).unwrap();
        let parsed = connector().parse_outputs(&tx.output).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(
            parsed[0].address,
            "bchreg:pzhhpwatsrakfklepvsj7jt3e3yq059csqw8u05deg"
        );
        assert_eq!(parsed[0].value, 909_900_000);
        assert_eq!(
            parsed[1].address,
            "bchreg:qzu7d73hakh39hc2qqmz2ln73x56hdp04cyfy5q4ye"
        );
        assert_eq!(parsed[1].value, 100_000_000);
    }

    #[test]
    fn test_non_cash_network_rejected() {
        let config = NodeConfig {
            host: "127.0.0.1".into(),
            port: 18443,
            user: "rpc".into(),
            password: "rpc".into(),
            timeout_secs: 30,
        };
        assert!(matches!(
            BchChainConnector::new("BTC", Network::Bitcoin, NodeClient::new(&config).unwrap()),
            Err(ConnectorError::InvalidParameters(_))
        ));
    }
}
