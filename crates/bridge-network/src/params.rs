//! Input of a cross-chain network transaction.

use crate::types::TransactionInput;
use alloy_primitives::{B256, U256};
use bridge_types::pack::{PackError, PackType, PackValue, TypedPackValue};
use bridge_types::{generate_transaction_hash, to_url_base64, TRANSACTION_VERSION};
use std::collections::BTreeMap;

/// Deposit details and transfer hashes the network verifies before signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossChainParams {
	/// Identifier of the deposit transaction.
	pub txid: Vec<u8>,
	pub txindex: u32,
	pub amount: U256,
	pub payload: Vec<u8>,
	pub p_hash: B256,
	/// Recipient as the host chain writes it.
	pub to: String,
	pub nonce: B256,
	pub n_hash: B256,
	/// Gateway public key; empty when the deposit did not go to a gateway address.
	pub gpubkey: Vec<u8>,
	pub g_hash: B256,
}

impl CrossChainParams {
	pub fn pack_type() -> PackType {
		PackType::Struct(vec![
			("txid".into(), PackType::Bytes),
			("txindex".into(), PackType::U32),
			("amount".into(), PackType::U256),
			("payload".into(), PackType::Bytes),
			("phash".into(), PackType::Bytes32),
			("to".into(), PackType::Str),
			("nonce".into(), PackType::Bytes32),
			("nhash".into(), PackType::Bytes32),
			("gpubkey".into(), PackType::Bytes),
			("ghash".into(), PackType::Bytes32),
		])
	}

	pub fn to_typed(&self) -> TypedPackValue {
		let mut v = BTreeMap::new();
		v.insert("txid".to_string(), PackValue::Bytes(self.txid.clone()));
		v.insert("txindex".to_string(), PackValue::Uint(U256::from(self.txindex)));
		v.insert("amount".to_string(), PackValue::Uint(self.amount));
		v.insert("payload".to_string(), PackValue::Bytes(self.payload.clone()));
		v.insert("phash".to_string(), PackValue::Bytes(self.p_hash.to_vec()));
		v.insert("to".to_string(), PackValue::Str(self.to.clone()));
		v.insert("nonce".to_string(), PackValue::Bytes(self.nonce.to_vec()));
		v.insert("nhash".to_string(), PackValue::Bytes(self.n_hash.to_vec()));
		v.insert("gpubkey".to_string(), PackValue::Bytes(self.gpubkey.clone()));
		v.insert("ghash".to_string(), PackValue::Bytes(self.g_hash.to_vec()));
		TypedPackValue::new(Self::pack_type(), PackValue::Struct(v))
	}

	pub fn transaction_hash(&self, selector: &str) -> Result<B256, PackError> {
		generate_transaction_hash(TRANSACTION_VERSION, selector, &self.to_typed())
	}

	/// Builds the `ren_submitTx` transaction for `selector`.
	pub fn to_input(&self, selector: &str) -> Result<TransactionInput, PackError> {
		let input = self.to_typed();
		let hash = generate_transaction_hash(TRANSACTION_VERSION, selector, &input)?;
		Ok(TransactionInput {
			hash: to_url_base64(hash),
			version: TRANSACTION_VERSION.to_string(),
			selector: selector.to_string(),
			input,
		})
	}
}
