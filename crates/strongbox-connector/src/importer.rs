//! Block importer.
//!
//! Scans a block's transactions for outputs paying watched deposit
//! addresses. Transactions are processed in batches; within a batch they run
//! in parallel and the batch join is a barrier. Failures never short-circuit
//! a batch: every error in the block is collected and surfaced together, so
//! a single bad transaction cannot hide deposits found in the rest.

use std::sync::Arc;

use bitcoin::consensus::encode::deserialize;
use bitcoin::{Block, Transaction};
use rust_decimal::Decimal;
use strongbox_core::Network;

use crate::btc::{parse_outputs_for, BtcChainConnector};
use crate::error::ConnectorError;
use crate::types::{CurrencyInfo, Operation};

pub const DEFAULT_TX_BATCH_SIZE: usize = 8;

/// Per-transaction scan callback; errors are plain strings so they can be
/// aggregated across the block.
pub(crate) type ScanFn = Arc<dyn Fn(Transaction) -> Result<Vec<Operation>, String> + Send + Sync>;

/// Runs `scan` over `txs` in parallel batches of `batch_size`, collecting
/// every failure instead of stopping at the first.
pub(crate) async fn scan_in_batches(
    txs: &[Transaction],
    batch_size: usize,
    scan: ScanFn,
) -> (Vec<Operation>, Vec<String>) {
    let mut operations = Vec::new();
    let mut failures = Vec::new();
    for batch in txs.chunks(batch_size.max(1)) {
        let mut tasks = tokio::task::JoinSet::new();
        for tx in batch {
            let tx = tx.clone();
            let scan = Arc::clone(&scan);
            tasks.spawn_blocking(move || scan(tx));
        }
        // Batch barrier: everything joins before the next batch starts.
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(ops)) => operations.extend(ops),
                Ok(Err(message)) => failures.push(message),
                Err(e) => failures.push(format!("scan task: {e}")),
            }
        }
    }
    (operations, failures)
}

/// Matches a transaction's standard outputs against the watched address
/// list. When `cash_display` is set, addresses are reported (and matched) in
/// their CashAddr form.
pub(crate) fn match_outputs(
    tx: &Transaction,
    network: Network,
    precision: u8,
    watched: &[String],
    cash_display: Option<Network>,
) -> Result<Vec<Operation>, String> {
    let tx_id = tx.compute_txid().to_string();
    let mut operations = Vec::new();
    for output in parse_outputs_for(network, &tx.output) {
        let address = match cash_display {
            Some(cash_network) => {
                strongbox_address::cashaddr::to_cash_address(&output.address, cash_network)
                    .map_err(|e| format!("tx {tx_id} output {}: {e}", output.tx_pos))?
            }
            None => output.address,
        };
        if watched.iter().any(|w| w.eq_ignore_ascii_case(&address)) {
            operations.push(Operation {
                tx_id: tx_id.clone(),
                tx_pos: output.tx_pos,
                to_address: address,
                amount: Decimal::new(output.value as i64, u32::from(precision)),
            });
        }
    }
    Ok(operations)
}

impl BtcChainConnector {
    /// Fetches and decodes a block by height. A missing block (or hash) is
    /// [`ConnectorError::NotFound`].
    pub async fn get_block_by_number(&self, number: u64) -> Result<Block, ConnectorError> {
        let hash = self
            .client()
            .get_block_hash(number)
            .await
            .map_err(|_| ConnectorError::NotFound)?;
        let block_hex = self
            .client()
            .get_block_hex(&hash)
            .await
            .map_err(|_| ConnectorError::NotFound)?;
        let bytes = hex::decode(&block_hex).map_err(|e| ConnectorError::Decode(e.to_string()))?;
        deserialize(&bytes).map_err(|e| ConnectorError::Decode(e.to_string()))
    }

    /// Block hash and previous-block hash at `number`.
    pub async fn get_block_hashes_by_number(
        &self,
        number: u64,
    ) -> Result<(String, String), ConnectorError> {
        let block = self.get_block_by_number(number).await?;
        Ok((
            block.block_hash().to_string(),
            block.header.prev_blockhash.to_string(),
        ))
    }

    /// Exactly one currency must be given and its code must equal this
    /// connector's, case-insensitively.
    pub(crate) fn check_import_currency(
        &self,
        currencies: &[CurrencyInfo],
    ) -> Result<CurrencyInfo, ConnectorError> {
        match currencies {
            [currency] if currency.code.eq_ignore_ascii_case(self.currency_code()) => {
                Ok(currency.clone())
            }
            _ => Err(ConnectorError::InvalidParameters(format!(
                "import expects exactly one {} currency",
                self.currency_code()
            ))),
        }
    }

    /// Scans the block at `number` and returns the deposits paying any of
    /// the watched addresses.
    pub async fn process_block(
        &self,
        number: u64,
        currencies: &[CurrencyInfo],
        watched: &[String],
    ) -> Result<Vec<Operation>, ConnectorError> {
        let currency = self.check_import_currency(currencies)?;
        let block = self.get_block_by_number(number).await?;
        log::debug!(
            "scanning block {number} ({} transactions)",
            block.txdata.len()
        );

        let network = self.network();
        let precision = currency.precision;
        let watched: Arc<Vec<String>> = Arc::new(watched.to_vec());
        let scan: ScanFn =
            Arc::new(move |tx| match_outputs(&tx, network, precision, &watched, None));

        let (operations, failures) =
            scan_in_batches(&block.txdata, self.tx_batch_size, scan).await;
        if !failures.is_empty() {
            return Err(ConnectorError::Transient(failures.join("; ")));
        }
        Ok(operations)
    }
}
