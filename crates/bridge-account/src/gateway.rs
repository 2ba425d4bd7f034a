//! Deposit address derivation.
//!
//! A gateway address is the address of the public key
//! `shard_public_key + gHash·G`. The network can sign for it because it
//! holds the shard's private key and learns `gHash` from the deposit, while
//! nobody else can, and every distinct gHash gives a distinct address.

use alloy_primitives::{keccak256, Address, B256};
use bridge_types::{ErrorKind, HasErrorKind};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{FieldBytes, PublicKey, SecretKey};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
	#[error("Invalid shard public key: {0}")]
	InvalidShardKey(String),
	#[error("gHash is not a valid secp256k1 scalar")]
	InvalidGHash,
	#[error("Combined gateway key is the point at infinity")]
	DegenerateKey,
	#[error("Gateway requested for chain {requested}, deriver handles {expected}")]
	ChainMismatch { requested: String, expected: String },
}

impl HasErrorKind for GatewayError {
	fn kind(&self) -> ErrorKind {
		ErrorKind::ParameterError
	}
}

/// Adds `gHash·G` to the shard key and returns the combined public key.
pub fn derive_gateway_public_key(
	shard_public_key: &[u8],
	g_hash: &B256,
) -> Result<PublicKey, GatewayError> {
	let shard = PublicKey::from_sec1_bytes(shard_public_key)
		.map_err(|e| GatewayError::InvalidShardKey(e.to_string()))?;
	let offset = SecretKey::from_bytes(FieldBytes::from_slice(g_hash.as_slice()))
		.map_err(|_| GatewayError::InvalidGHash)?;

	let combined = shard.to_projective() + offset.public_key().to_projective();
	PublicKey::from_affine(combined.to_affine()).map_err(|_| GatewayError::DegenerateKey)
}

/// Chain-specific rule turning the combined key into a deposit address.
pub trait GatewayAddressDeriver: Send + Sync {
	/// Chain selector this deriver produces addresses for.
	fn chain(&self) -> &str;

	/// Address for an already combined public key.
	fn address_from_public_key(&self, public_key: &PublicKey) -> String;

	/// Deposit address for `gHash` under the given shard key.
	///
	/// Deterministic and performs no I/O.
	fn derive_address(&self, shard_public_key: &[u8], g_hash: &B256) -> Result<String, GatewayError> {
		let public_key = derive_gateway_public_key(shard_public_key, g_hash)?;
		Ok(self.address_from_public_key(&public_key))
	}

	/// Like [`derive_address`](Self::derive_address), but first checks that the
	/// transfer deposits on this deriver's chain.
	fn create_gateway_address(
		&self,
		deposit_chain: &str,
		shard_public_key: &[u8],
		g_hash: &B256,
	) -> Result<String, GatewayError> {
		if deposit_chain != self.chain() {
			return Err(GatewayError::ChainMismatch {
				requested: deposit_chain.to_string(),
				expected: self.chain().to_string(),
			});
		}
		let address = self.derive_address(shard_public_key, g_hash)?;
		tracing::debug!(chain = %deposit_chain, %address, "Derived gateway address");
		Ok(address)
	}
}

/// EVM rule: last 20 bytes of keccak256 over the uncompressed key without its prefix.
#[derive(Debug, Clone)]
pub struct EvmGatewayDeriver {
	chain: String,
}

impl EvmGatewayDeriver {
	pub fn new(chain: impl Into<String>) -> Self {
		Self {
			chain: chain.into(),
		}
	}
}

pub fn evm_address(public_key: &PublicKey) -> Address {
	let encoded = public_key.to_encoded_point(false);
	let hash = keccak256(&encoded.as_bytes()[1..]);
	Address::from_slice(&hash[12..])
}

impl GatewayAddressDeriver for EvmGatewayDeriver {
	fn chain(&self) -> &str {
		&self.chain
	}

	fn address_from_public_key(&self, public_key: &PublicKey) -> String {
		evm_address(public_key).to_checksum(None)
	}
}
