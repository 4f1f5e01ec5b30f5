//! JSON-RPC 1.0 node client.
//!
//! Bitcoin-family nodes speak JSON-RPC 1.0 over HTTP with basic auth. Every
//! request is bounded by the configured timeout. A `null` or missing result
//! maps to [`ConnectorError::NotFound`]; transport failures and node-reported
//! errors surface as [`ConnectorError::Transient`]; broadcast-specific
//! classification happens in the connector on top of that.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ConnectorError;
use crate::types::NodeConfig;

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<Value>,
}

/// Verbose `getrawtransaction` fields the connector consumes.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTransactionInfo {
    #[serde(default)]
    pub blockhash: Option<String>,
    #[serde(default)]
    pub confirmations: Option<i64>,
    #[serde(default)]
    pub hex: Option<String>,
}

/// `getaddressbalance` response from address-index-enabled nodes,
/// denominated in satoshis.
#[derive(Debug, Clone, Deserialize)]
pub struct AddressBalanceInfo {
    pub balance: i64,
    #[serde(default)]
    pub received: i64,
}

pub struct NodeClient {
    url: String,
    user: String,
    password: String,
    http: reqwest::Client,
}

impl NodeClient {
    pub fn new(config: &NodeConfig) -> Result<Self, ConnectorError> {
        if config.host.is_empty() || config.port == 0 {
            return Err(ConnectorError::InvalidParameters(
                "node host and port are required".into(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ConnectorError::Transient(e.to_string()))?;
        Ok(NodeClient {
            url: format!("http://{}:{}", config.host, config.port),
            user: config.user.clone(),
            password: config.password.clone(),
            http,
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, ConnectorError> {
        let body = json!({
            "jsonrpc": "1.0",
            "id": "strongbox",
            "method": method,
            "params": params,
        });
        log::debug!("rpc {method}");
        let response = self
            .http
            .post(&self.url)
            .basic_auth(&self.user, Some(&self.password))
            .json(&body)
            .send()
            .await
            .map_err(|e| ConnectorError::Transient(format!("{method}: {e}")))?;

        // Nodes answer errors with non-2xx statuses but still ship the
        // JSON-RPC error object in the body; parse the body either way.
        let payload: RpcResponse = response
            .json()
            .await
            .map_err(|e| ConnectorError::Transient(format!("{method}: {e}")))?;

        if let Some(error) = payload.error {
            if !error.is_null() {
                let message = error
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| error.to_string());
                return Err(ConnectorError::Transient(format!("{method}: {message}")));
            }
        }
        match payload.result {
            Some(result) if !result.is_null() => serde_json::from_value(result)
                .map_err(|e| ConnectorError::Decode(format!("{method}: {e}"))),
            _ => Err(ConnectorError::NotFound),
        }
    }

    pub async fn get_block_hash(&self, height: u64) -> Result<String, ConnectorError> {
        self.call("getblockhash", json!([height])).await
    }

    /// Raw block bytes (verbosity 0), hex-encoded.
    pub async fn get_block_hex(&self, hash: &str) -> Result<String, ConnectorError> {
        self.call("getblock", json!([hash, 0])).await
    }

    pub async fn get_raw_transaction_verbose(
        &self,
        txid: &str,
    ) -> Result<RawTransactionInfo, ConnectorError> {
        self.call("getrawtransaction", json!([txid, true])).await
    }

    pub async fn send_raw_transaction(&self, tx_hex: &str) -> Result<String, ConnectorError> {
        self.call("sendrawtransaction", json!([tx_hex])).await
    }

    pub async fn get_address_balance(
        &self,
        address: &str,
    ) -> Result<AddressBalanceInfo, ConnectorError> {
        self.call("getaddressbalance", json!([address])).await
    }
}
