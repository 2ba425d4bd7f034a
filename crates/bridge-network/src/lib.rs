//! Client for the external custodian network.
//!
//! The network is reached over JSON-RPC. It accepts cross-chain
//! transactions, reports their status while it collects confirmations and
//! signs, and publishes the shard keys deposit addresses are derived from.
//! [`NetworkTxSubmitter`] drives one transaction from submission to a
//! terminal status.

use async_trait::async_trait;
use bridge_types::pack::PackError;
use bridge_types::{ErrorKind, HasErrorKind};
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

pub mod implementations {
	pub mod jsonrpc;
}

mod params;
mod submitter;
mod types;

pub use implementations::jsonrpc::JsonRpcNetwork;
pub use params::CrossChainParams;
pub use submitter::NetworkTxSubmitter;
pub use types::{NetworkTransaction, QueryTxResponse, TransactionInput, TxOutput, TxStatus};

static INVALID_PARAMS: LazyLock<Option<Regex>> =
	LazyLock::new(|| Regex::new(r"^invalid params: ").ok());
static NOT_FOUND: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"not found$").ok());
static NOT_READY: LazyLock<Option<Regex>> =
	LazyLock::new(|| Regex::new(r"(not found)|(not available)").ok());

/// Errors returned by the network client.
#[derive(Debug, Error)]
pub enum NetworkError {
	#[error("Invalid params: {0}")]
	InvalidParams(String),
	#[error("Transaction not found: {0}")]
	NotFound(String),
	#[error("Network error: {0}")]
	Rpc(String),
	#[error("Invalid response: {0}")]
	InvalidResponse(String),
	#[error("Network transaction reverted: {0}")]
	Reverted(String),
	#[error("Operation cancelled")]
	Cancelled,
	#[error("Pack error: {0}")]
	Pack(#[from] PackError),
}

impl NetworkError {
	/// Classifies an error message returned by the node for a transaction query.
	pub fn from_query_message(message: &str) -> Self {
		let matches = |re: &LazyLock<Option<Regex>>| {
			re.as_ref().map(|re| re.is_match(message)).unwrap_or(false)
		};
		if matches(&INVALID_PARAMS) {
			NetworkError::InvalidParams(message.to_string())
		} else if matches(&NOT_FOUND) {
			NetworkError::NotFound(message.to_string())
		} else {
			NetworkError::Rpc(message.to_string())
		}
	}

	/// True for errors the node returns while a transaction is still
	/// propagating, which status polling skips over.
	pub fn is_not_ready(&self) -> bool {
		match self {
			NetworkError::NotFound(_) => true,
			NetworkError::Rpc(message) => NOT_READY
				.as_ref()
				.map(|re| re.is_match(message))
				.unwrap_or(false),
			_ => false,
		}
	}
}

impl HasErrorKind for NetworkError {
	fn kind(&self) -> ErrorKind {
		match self {
			NetworkError::InvalidParams(_) => ErrorKind::ParameterError,
			NetworkError::NotFound(_) => ErrorKind::TransactionNotFound,
			NetworkError::Rpc(_) => ErrorKind::NetworkError,
			NetworkError::InvalidResponse(_) => ErrorKind::Internal,
			NetworkError::Reverted(_) => ErrorKind::Reverted,
			NetworkError::Cancelled => ErrorKind::Cancelled,
			NetworkError::Pack(_) => ErrorKind::ParameterError,
		}
	}
}

/// Operations the bridge needs from the custodian network.
#[async_trait]
pub trait NetworkInterface: Send + Sync {
	/// Submits a transaction. The node rejects one it already knows.
	async fn submit_tx(&self, tx: &TransactionInput) -> Result<(), NetworkError>;

	/// Looks up a transaction by its URL-safe base64 hash.
	async fn query_tx(&self, tx_hash: &str) -> Result<QueryTxResponse, NetworkError>;

	/// Compressed public key of the shard currently handling `asset`.
	async fn select_shard(&self, asset: &str) -> Result<Vec<u8>, NetworkError>;

	/// Confirmations the network waits for on `chain` before signing.
	async fn confirmation_target(&self, chain: &str) -> Result<u64, NetworkError>;
}
