//! Request and response shapes of the network's RPC methods.

use alloy_primitives::{B256, U256};
use bridge_types::pack::TypedPackValue;
use bridge_types::from_url_base64;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Status the network reports for a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
	Nil,
	Confirming,
	Pending,
	Executing,
	Done,
	Reverted,
}

/// A transaction as submitted with `ren_submitTx`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionInput {
	/// URL-safe base64 of the transaction hash.
	pub hash: String,
	pub version: String,
	pub selector: String,
	#[serde(rename = "in")]
	pub input: TypedPackValue,
}

/// Output fields the network fills in once it has signed.
///
/// Byte values are URL-safe base64 and integers are decimal strings. Every
/// field is optional because the node omits the output until the
/// transaction is executed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TxOutput {
	#[serde(default)]
	pub amount: Option<String>,
	#[serde(default)]
	pub hash: Option<String>,
	#[serde(default)]
	pub sighash: Option<String>,
	#[serde(default)]
	pub sig: Option<String>,
	#[serde(default)]
	pub txid: Option<String>,
	#[serde(default)]
	pub txindex: Option<String>,
	#[serde(default)]
	pub revert: Option<String>,
}

impl TxOutput {
	/// Amount after fees, in the asset's smallest unit.
	pub fn amount(&self) -> Option<U256> {
		self.amount.as_deref().and_then(|a| U256::from_str(a).ok())
	}

	pub fn signature(&self) -> Option<Vec<u8>> {
		decode_non_empty(self.sig.as_deref())
	}

	pub fn sig_hash(&self) -> Option<B256> {
		decode_non_empty(self.sighash.as_deref())
			.filter(|bytes| bytes.len() == 32)
			.map(|bytes| B256::from_slice(&bytes))
	}

	/// Identifier of a release the network submitted itself.
	pub fn txid(&self) -> Option<Vec<u8>> {
		decode_non_empty(self.txid.as_deref())
	}

	pub fn revert_reason(&self) -> Option<&str> {
		self.revert.as_deref().filter(|r| !r.is_empty())
	}
}

fn decode_non_empty(value: Option<&str>) -> Option<Vec<u8>> {
	value
		.filter(|v| !v.is_empty())
		.and_then(|v| from_url_base64(v).ok())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputValue {
	#[serde(default)]
	pub v: TxOutput,
}

/// A transaction as returned by `ren_queryTx`.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkTransaction {
	pub hash: String,
	#[serde(default)]
	pub version: String,
	pub selector: String,
	/// Input as sent, left untyped.
	#[serde(rename = "in", default)]
	pub input: serde_json::Value,
	#[serde(default)]
	pub out: Option<OutputValue>,
}

impl NetworkTransaction {
	pub fn output(&self) -> Option<&TxOutput> {
		self.out.as_ref().map(|o| &o.v)
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryTxResponse {
	pub tx: NetworkTransaction,
	pub tx_status: TxStatus,
}
