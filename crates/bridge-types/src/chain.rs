//! Chain transaction records and chain-agnostic transaction types.
//!
//! `ChainTransaction` is the canonical identity of a transaction on any chain
//! the bridge touches. Its `txid` is always derived from `tx_hash`, so the
//! fields are private and the only ways in are the constructors below or
//! deserialization, which re-checks the relationship.

use crate::utils::{from_url_base64, to_url_base64, with_0x_prefix, without_0x_prefix};
use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Chain name used for transactions on the external custodian network.
pub const NETWORK_CHAIN: &str = "RenVM";

/// Blockchain transaction hash stored as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionHash(pub Vec<u8>);

impl TransactionHash {
	/// Hex representation with a 0x prefix.
	pub fn to_hex(&self) -> String {
		with_0x_prefix(&hex::encode(&self.0))
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl From<B256> for TransactionHash {
	fn from(hash: B256) -> Self {
		Self(hash.0.to_vec())
	}
}

#[derive(Debug, Error)]
pub enum ChainTransactionError {
	#[error("Invalid transaction hash '{0}'")]
	InvalidHash(String),
	#[error("txid '{txid}' does not match transaction hash '{tx_hash}'")]
	Mismatch { txid: String, tx_hash: String },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawChainTransaction {
	chain: String,
	tx_hash: String,
	txid: String,
	txindex: String,
	#[serde(default)]
	explorer_link: Option<String>,
}

/// Canonical cross-chain transaction identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawChainTransaction")]
pub struct ChainTransaction {
	chain: String,
	tx_hash: String,
	txid: String,
	txindex: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	explorer_link: Option<String>,
}

impl ChainTransaction {
	/// Builds a record for an EVM-style transaction whose native hash is hex.
	pub fn from_hash(chain: impl Into<String>, hash: &[u8], explorer_link: Option<String>) -> Self {
		Self {
			chain: chain.into(),
			tx_hash: with_0x_prefix(&hex::encode(hash)),
			txid: to_url_base64(hash),
			txindex: "0".to_string(),
			explorer_link,
		}
	}

	/// Builds a record from a 0x-prefixed (or bare) hex hash string.
	pub fn from_hex(
		chain: impl Into<String>,
		tx_hash: &str,
		explorer_link: Option<String>,
	) -> Result<Self, ChainTransactionError> {
		let bytes = hex::decode(without_0x_prefix(tx_hash))
			.map_err(|_| ChainTransactionError::InvalidHash(tx_hash.to_string()))?;
		Ok(Self::from_hash(chain, &bytes, explorer_link))
	}

	/// Builds a record for a transaction on the custodian network, whose
	/// native hash representation is already URL-safe base64.
	pub fn network(hash: &[u8]) -> Self {
		let encoded = to_url_base64(hash);
		Self {
			chain: NETWORK_CHAIN.to_string(),
			tx_hash: encoded.clone(),
			txid: encoded,
			txindex: "0".to_string(),
			explorer_link: None,
		}
	}

	/// A completed transaction whose hash could not be discovered.
	pub fn unknown(chain: impl Into<String>) -> Self {
		Self {
			chain: chain.into(),
			tx_hash: String::new(),
			txid: String::new(),
			txindex: "0".to_string(),
			explorer_link: None,
		}
	}

	pub fn chain(&self) -> &str {
		&self.chain
	}

	pub fn tx_hash(&self) -> &str {
		&self.tx_hash
	}

	pub fn txid(&self) -> &str {
		&self.txid
	}

	pub fn txindex(&self) -> &str {
		&self.txindex
	}

	pub fn explorer_link(&self) -> Option<&str> {
		self.explorer_link.as_deref()
	}

	/// True when the record stands for a transaction with no known hash.
	pub fn is_unknown(&self) -> bool {
		self.tx_hash.is_empty()
	}

	/// Raw bytes of the transaction identifier.
	pub fn txid_bytes(&self) -> Vec<u8> {
		from_url_base64(&self.txid).unwrap_or_default()
	}

	pub fn with_explorer_link(mut self, link: Option<String>) -> Self {
		self.explorer_link = link;
		self
	}
}

fn canonical_hash_bytes(tx_hash: &str) -> Option<Vec<u8>> {
	if tx_hash.starts_with("0x") || tx_hash.starts_with("0X") {
		hex::decode(without_0x_prefix(tx_hash)).ok()
	} else {
		from_url_base64(tx_hash).ok()
	}
}

impl TryFrom<RawChainTransaction> for ChainTransaction {
	type Error = ChainTransactionError;

	fn try_from(raw: RawChainTransaction) -> Result<Self, Self::Error> {
		if !raw.tx_hash.is_empty() {
			let bytes = canonical_hash_bytes(&raw.tx_hash)
				.ok_or_else(|| ChainTransactionError::InvalidHash(raw.tx_hash.clone()))?;
			if to_url_base64(&bytes) != raw.txid {
				return Err(ChainTransactionError::Mismatch {
					txid: raw.txid,
					tx_hash: raw.tx_hash,
				});
			}
		} else if !raw.txid.is_empty() {
			return Err(ChainTransactionError::Mismatch {
				txid: raw.txid,
				tx_hash: raw.tx_hash,
			});
		}
		Ok(Self {
			chain: raw.chain,
			tx_hash: raw.tx_hash,
			txid: raw.txid,
			txindex: raw.txindex,
			explorer_link: raw.explorer_link,
		})
	}
}

/// A lock or burn observed on an origin chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputChainTransaction {
	#[serde(flatten)]
	pub tx: ChainTransaction,
	pub asset: String,
	/// Integer amount in the asset's smallest unit.
	pub amount: String,
	/// 32-byte nonce, URL-safe base64.
	pub nonce: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub to_recipient: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub to_chain: Option<String>,
	/// Routed payload, URL-safe base64.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub to_payload: Option<String>,
}

impl InputChainTransaction {
	/// Nonce as raw bytes.
	pub fn nonce_bytes(&self) -> Vec<u8> {
		from_url_base64(&self.nonce).unwrap_or_default()
	}
}

/// A fully materialized transaction ready for signing and submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
	pub chain_id: u64,
	pub to: Address,
	pub data: Bytes,
	pub value: U256,
	pub gas_limit: Option<u64>,
}

/// Handle to a transaction that has been broadcast but may not be mined yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransaction {
	pub hash: TransactionHash,
	pub from: Address,
	pub nonce: u64,
	/// Latest block when the transaction was broadcast. Replacement searches start here.
	pub submitted_at_block: u64,
}

/// Result of searching a block range for a replacement transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplacementScan {
	pub replacement: Option<TransactionHash>,
	/// First block the next search should cover. Blocks before it have been checked.
	pub next_block: u64,
}

impl ReplacementScan {
	pub fn found(hash: TransactionHash, next_block: u64) -> Self {
		Self {
			replacement: Some(hash),
			next_block,
		}
	}

	pub fn not_found(next_block: u64) -> Self {
		Self {
			replacement: None,
			next_block,
		}
	}
}

/// An event log emitted by a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Log {
	pub address: Address,
	pub topics: Vec<B256>,
	pub data: Bytes,
	pub transaction_hash: Option<TransactionHash>,
	pub block_number: Option<u64>,
}

/// Receipt of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
	pub hash: TransactionHash,
	pub block_number: u64,
	pub success: bool,
	pub logs: Vec<Log>,
}

/// Query for past event logs of one event emitted by one contract.
///
/// `topics` holds the indexed topics 1 to 3; `None` matches anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
	pub address: Address,
	pub event_signature: B256,
	pub topics: [Option<B256>; 3],
	pub from_block: u64,
	pub to_block: u64,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_txid_matches_hash() {
		let tx = ChainTransaction::from_hash("Ethereum", &[0xab; 32], None);
		assert_eq!(tx.tx_hash(), format!("0x{}", "ab".repeat(32)));
		assert_eq!(tx.txid_bytes(), vec![0xab; 32]);
		assert_eq!(tx.txindex(), "0");
	}

	#[test]
	fn test_deserialize_rejects_mismatched_txid() {
		let json = serde_json::json!({
			"chain": "Ethereum",
			"txHash": format!("0x{}", "ab".repeat(32)),
			"txid": to_url_base64([0xcd; 32]),
			"txindex": "0",
		});
		assert!(serde_json::from_value::<ChainTransaction>(json).is_err());
	}

	#[test]
	fn test_input_transaction_serde_flattens_identity() {
		let input = InputChainTransaction {
			tx: ChainTransaction::from_hash("Ethereum", &[1; 32], None),
			asset: "BTC".into(),
			amount: "100000".into(),
			nonce: to_url_base64([0u8; 32]),
			to_recipient: Some("bc1qexample".into()),
			to_chain: None,
			to_payload: None,
		};
		let value = serde_json::to_value(&input).unwrap();
		assert_eq!(value["chain"], "Ethereum");
		assert_eq!(value["toRecipient"], "bc1qexample");
		let back: InputChainTransaction = serde_json::from_value(value).unwrap();
		assert_eq!(back, input);
	}

	#[test]
	fn test_network_and_unknown_records() {
		let tx = ChainTransaction::network(&[7; 32]);
		assert_eq!(tx.chain(), NETWORK_CHAIN);
		assert_eq!(tx.tx_hash(), tx.txid());

		let unknown = ChainTransaction::unknown("Ethereum");
		assert!(unknown.is_unknown());
		let json = serde_json::to_value(&unknown).unwrap();
		assert!(serde_json::from_value::<ChainTransaction>(json).is_ok());
	}
}
