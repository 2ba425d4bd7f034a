//! Transfer-scoped hashes.
//!
//! A transfer is bound to its payload, destination, recipient and nonce by a
//! small family of keccak256 hashes. The network recomputes the same values
//! when it validates a submission, so the byte layouts here are fixed:
//!
//! * `pHash   = keccak(payload)`
//! * `sHash   = keccak(normalized selector)`
//! * `gHash   = keccak(pHash ‖ sHash ‖ to ‖ nonce)`
//! * `nHash   = keccak(nonce ‖ txid ‖ u32be(txindex))`
//! * `sigHash = keccak(pHash ‖ u256be(amount) ‖ sHash ‖ pad32(to) ‖ nHash)`

use crate::pack::{marshal_string, PackError, TypedPackValue};
use crate::utils::left_pad_32;
use alloy_primitives::{keccak256, B256, U256};
use sha2::{Digest, Sha256};

/// Version string committed to by every network transaction hash.
pub const TRANSACTION_VERSION: &str = "1";

/// Payload hash.
pub fn generate_p_hash(payload: &[u8]) -> B256 {
	keccak256(payload)
}

/// Rewrites `ASSET/<anything>To<Chain>` as `ASSET/to<Chain>`.
///
/// The match runs from the first '/' to the last "To" after it, so a
/// burn-and-mint selector hashes like the mint selector of its destination.
pub fn normalize_selector(selector: &str) -> String {
	if let Some(slash) = selector.find('/') {
		if let Some(to) = selector[slash + 1..].rfind("To") {
			let to = slash + 1 + to;
			return format!("{}/to{}", &selector[..slash], &selector[to + 2..]);
		}
	}
	selector.to_string()
}

/// Selector hash.
pub fn generate_s_hash(selector: &str) -> B256 {
	keccak256(normalize_selector(selector).as_bytes())
}

/// Gateway hash. The only transfer input, besides the shard key, to
/// deposit-address derivation.
pub fn generate_g_hash(p_hash: &B256, s_hash: &B256, to: &[u8], nonce: &B256) -> B256 {
	let mut buf = Vec::with_capacity(96 + to.len());
	buf.extend_from_slice(p_hash.as_slice());
	buf.extend_from_slice(s_hash.as_slice());
	buf.extend_from_slice(to);
	buf.extend_from_slice(nonce.as_slice());
	keccak256(buf)
}

/// Nonce hash: identifies one deposit.
pub fn generate_n_hash(nonce: &B256, txid: &[u8], txindex: u32) -> B256 {
	let mut buf = Vec::with_capacity(36 + txid.len());
	buf.extend_from_slice(nonce.as_slice());
	buf.extend_from_slice(txid);
	buf.extend_from_slice(&txindex.to_be_bytes());
	keccak256(buf)
}

/// Signature hash: the value the network signs for a mint or release.
pub fn generate_sig_hash(
	p_hash: &B256,
	amount: U256,
	to: &[u8],
	s_hash: &B256,
	n_hash: &B256,
) -> B256 {
	let mut buf = Vec::with_capacity(160);
	buf.extend_from_slice(p_hash.as_slice());
	buf.extend_from_slice(&amount.to_be_bytes::<32>());
	buf.extend_from_slice(s_hash.as_slice());
	buf.extend_from_slice(&left_pad_32(to));
	buf.extend_from_slice(n_hash.as_slice());
	keccak256(buf)
}

/// Hash of a network transaction: sha256 over the version, the selector and
/// the typed input, each in binary pack form.
pub fn generate_transaction_hash(
	version: &str,
	selector: &str,
	input: &TypedPackValue,
) -> Result<B256, PackError> {
	let mut hasher = Sha256::new();
	hasher.update(marshal_string(version));
	hasher.update(marshal_string(selector));
	hasher.update(input.marshal()?);
	Ok(B256::from_slice(&hasher.finalize()))
}

/// Selector for a lock on `asset`'s origin chain minted on `to_chain`.
pub fn mint_selector(asset: &str, to_chain: &str) -> String {
	format!("{}/to{}", asset, to_chain)
}

/// Selector for a burn on `from_chain` released on `asset`'s origin chain.
pub fn release_selector(asset: &str, from_chain: &str) -> String {
	format!("{}/from{}", asset, from_chain)
}

/// Selector for a burn on `from_chain` minted again on `to_chain`.
pub fn burn_and_mint_selector(asset: &str, from_chain: &str, to_chain: &str) -> String {
	format!("{}/from{}_to{}", asset, from_chain, to_chain)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::pack::{PackType, PackValue};
	use alloy_primitives::b256;
	use std::collections::BTreeMap;

	#[test]
	fn test_p_hash_of_abi_encoded_one() {
		let payload = U256::from(1u64).to_be_bytes::<32>();
		assert_eq!(
			generate_p_hash(&payload),
			b256!("b10e2d527612073b26eecdfd717e6a320cf44b4afac2b0732d9fcbe2b7fa0cf6")
		);
	}

	#[test]
	fn test_s_hash_normalization() {
		assert_eq!(
			generate_s_hash("BTC/toEthereum"),
			b256!("1fb79ec5bb04cf1aa8eb8fdeda8d3f986e5ebaba72d0e12048cec0a95188fe5e")
		);
		assert_eq!(normalize_selector("BTC/fromFantomToEthereum"), "BTC/toEthereum");
		assert_eq!(normalize_selector("BTC/fromEthereum"), "BTC/fromEthereum");
		assert_eq!(
			generate_s_hash("BTC/fromFantomToEthereum"),
			generate_s_hash("BTC/toEthereum")
		);
	}

	#[test]
	fn test_g_hash_layout() {
		assert_eq!(
			generate_g_hash(&B256::ZERO, &B256::ZERO, &[0u8; 20], &B256::ZERO),
			b256!("3bdd562417b2b6c29b6c37a0fbf5c08139fe63f7baf013194f112d8319bf8b32")
		);
	}

	#[test]
	fn test_n_hash_layout() {
		assert_eq!(
			generate_n_hash(&B256::ZERO, &[1u8; 32], 0),
			b256!("d769241b2ce730b2a242d3ff3c56fabf7a8691e578de532db085ef3df477ae26")
		);
	}

	#[test]
	fn test_sig_hash_of_zeroes() {
		assert_eq!(
			generate_sig_hash(&B256::ZERO, U256::ZERO, &[0u8; 20], &B256::ZERO, &B256::ZERO),
			b256!("dfded4ed5ac76ba7379cfe7b3b0f53e768dca8d45a34854e649cfc3c18cbd9cd")
		);
	}

	#[test]
	fn test_transaction_hash() {
		let mut v = BTreeMap::new();
		v.insert("to".to_string(), PackValue::Str("ab".into()));
		let input = TypedPackValue::new(
			PackType::Struct(vec![("to".into(), PackType::Str)]),
			PackValue::Struct(v),
		);
		assert_eq!(
			generate_transaction_hash(TRANSACTION_VERSION, "BTC/toEthereum", &input).unwrap(),
			b256!("a18deebc87293c8694e1460a62cc948fd171ae06c729a0a3f5c575d57bec322c")
		);
	}

	#[test]
	fn test_selectors() {
		assert_eq!(mint_selector("BTC", "Ethereum"), "BTC/toEthereum");
		assert_eq!(release_selector("BTC", "Ethereum"), "BTC/fromEthereum");
		assert_eq!(
			burn_and_mint_selector("BTC", "Fantom", "Ethereum"),
			"BTC/fromFantom_toEthereum"
		);
	}
}
