//! Strongbox node connector.
//!
//! The orchestrator-side surface of the engine: building unsigned-envelope
//! transactions from wallet parameters and UTXOs, reassembling them once the
//! signer fleet returns signatures, broadcasting, querying status and
//! balances over the node's JSON-RPC interface, and scanning blocks for
//! deposits to watched addresses.
//!
//! Transaction build and rebuild are pure functions; only broadcast, status,
//! balance and block fetching touch the node.

pub mod bch;
pub mod btc;
pub mod error;
pub mod importer;
pub mod rpc;
pub mod types;

pub use bch::BchChainConnector;
pub use btc::BtcChainConnector;
pub use error::ConnectorError;
pub use rpc::NodeClient;
pub use types::{
    AddressBalance, CurrencyInfo, NodeConfig, Operation, TxOutput, TxSignatures, TxStatus, Utxo,
    WalletSpec,
};
