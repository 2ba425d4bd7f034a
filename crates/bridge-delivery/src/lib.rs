//! Chain access for the bridge.
//!
//! `DeliveryInterface` is the Provider/Signer capability the rest of the
//! bridge is written against: send a transaction, read receipts, blocks,
//! balances and logs, and make read-only calls. `DeliveryService` routes each
//! request to the implementation registered for the chain id.

use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use bridge_types::{
	ConfigSchema, ErrorKind, HasErrorKind, ImplementationRegistry, LogFilter, NetworksConfig,
	PendingTransaction, ReplacementScan, SecretString, Transaction, TransactionHash,
	TransactionReceipt,
};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub mod implementations {
	pub mod evm {
		pub mod alloy;
	}
}

#[cfg(any(test, feature = "testing"))]
pub mod mock;

#[derive(Debug, Error)]
pub enum DeliveryError {
	#[error("Network error: {0}")]
	Network(String),
	#[error("Invalid request: {0}")]
	InvalidRequest(String),
	#[error("No provider available for chain {0}")]
	NoProviderAvailable(u64),
}

impl HasErrorKind for DeliveryError {
	fn kind(&self) -> ErrorKind {
		match self {
			DeliveryError::Network(_) => ErrorKind::NetworkError,
			DeliveryError::InvalidRequest(_) => ErrorKind::ParameterError,
			DeliveryError::NoProviderAvailable(_) => ErrorKind::ParameterError,
		}
	}
}

/// Access to one or more EVM chains.
#[async_trait]
pub trait DeliveryInterface: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Chain ids this implementation serves.
	fn chain_ids(&self) -> Vec<u64>;

	/// Address transactions on `chain_id` are sent from.
	fn signer_address(&self, chain_id: u64) -> Option<Address>;

	/// Signs and broadcasts a transaction on `tx.chain_id`.
	async fn submit(&self, tx: Transaction) -> Result<PendingTransaction, DeliveryError>;

	/// Receipt of a mined transaction, `None` while it is pending or unknown.
	async fn get_receipt(
		&self,
		hash: &TransactionHash,
		chain_id: u64,
	) -> Result<Option<TransactionReceipt>, DeliveryError>;

	/// Looks for a mined transaction that took the pending transaction's
	/// sender nonce under a different hash, searching from `from_block` up to
	/// the chain head. The returned `next_block` is where the following call
	/// should resume, so each block is fetched at most once.
	async fn find_replacement(
		&self,
		pending: &PendingTransaction,
		from_block: u64,
		chain_id: u64,
	) -> Result<ReplacementScan, DeliveryError>;

	/// Replays a mined transaction at its block to recover the revert message.
	async fn revert_reason(
		&self,
		hash: &TransactionHash,
		chain_id: u64,
	) -> Result<Option<String>, DeliveryError>;

	async fn get_block_number(&self, chain_id: u64) -> Result<u64, DeliveryError>;

	/// Native balance of `address`.
	async fn get_balance(&self, address: Address, chain_id: u64) -> Result<U256, DeliveryError>;

	/// Read-only call against the latest block.
	async fn call(&self, to: Address, data: Bytes, chain_id: u64) -> Result<Bytes, DeliveryError>;

	async fn get_logs(
		&self,
		filter: &LogFilter,
		chain_id: u64,
	) -> Result<Vec<bridge_types::Log>, DeliveryError>;
}

/// Factory signature shared by delivery implementations.
pub type DeliveryFactory = fn(
	&toml::Value,
	&NetworksConfig,
	&SecretString,
) -> Result<Box<dyn DeliveryInterface>, DeliveryError>;

pub trait DeliveryRegistry: ImplementationRegistry<Factory = DeliveryFactory> {}

/// All delivery implementations as (name, factory) pairs.
pub fn get_all_implementations() -> Vec<(&'static str, DeliveryFactory)> {
	use implementations::evm::alloy;

	vec![(alloy::Registry::NAME, alloy::Registry::factory())]
}

/// Routes chain requests to the implementation serving each chain id.
pub struct DeliveryService {
	providers: HashMap<u64, Arc<dyn DeliveryInterface>>,
	poll_interval: std::time::Duration,
}

impl DeliveryService {
	pub fn new(
		providers: HashMap<u64, Arc<dyn DeliveryInterface>>,
		poll_interval: std::time::Duration,
	) -> Self {
		Self {
			providers,
			poll_interval,
		}
	}

	/// Registers every chain an implementation serves.
	pub fn from_implementations(
		implementations: Vec<Box<dyn DeliveryInterface>>,
		poll_interval: std::time::Duration,
	) -> Self {
		let mut providers = HashMap::new();
		for implementation in implementations {
			let implementation: Arc<dyn DeliveryInterface> = Arc::from(implementation);
			for chain_id in implementation.chain_ids() {
				providers.insert(chain_id, implementation.clone());
			}
		}
		Self::new(providers, poll_interval)
	}

	/// Interval between confirmation checks.
	pub fn poll_interval(&self) -> std::time::Duration {
		self.poll_interval
	}

	pub fn supports(&self, chain_id: u64) -> bool {
		self.providers.contains_key(&chain_id)
	}

	fn provider(&self, chain_id: u64) -> Result<&Arc<dyn DeliveryInterface>, DeliveryError> {
		self.providers
			.get(&chain_id)
			.ok_or(DeliveryError::NoProviderAvailable(chain_id))
	}

	pub fn signer_address(&self, chain_id: u64) -> Option<Address> {
		self.providers.get(&chain_id)?.signer_address(chain_id)
	}

	pub async fn submit(&self, tx: Transaction) -> Result<PendingTransaction, DeliveryError> {
		self.provider(tx.chain_id)?.submit(tx).await
	}

	pub async fn get_receipt(
		&self,
		hash: &TransactionHash,
		chain_id: u64,
	) -> Result<Option<TransactionReceipt>, DeliveryError> {
		self.provider(chain_id)?.get_receipt(hash, chain_id).await
	}

	pub async fn find_replacement(
		&self,
		pending: &PendingTransaction,
		from_block: u64,
		chain_id: u64,
	) -> Result<ReplacementScan, DeliveryError> {
		self.provider(chain_id)?
			.find_replacement(pending, from_block, chain_id)
			.await
	}

	pub async fn revert_reason(
		&self,
		hash: &TransactionHash,
		chain_id: u64,
	) -> Result<Option<String>, DeliveryError> {
		self.provider(chain_id)?.revert_reason(hash, chain_id).await
	}

	pub async fn get_block_number(&self, chain_id: u64) -> Result<u64, DeliveryError> {
		self.provider(chain_id)?.get_block_number(chain_id).await
	}

	pub async fn get_balance(&self, address: Address, chain_id: u64) -> Result<U256, DeliveryError> {
		self.provider(chain_id)?.get_balance(address, chain_id).await
	}

	pub async fn call(
		&self,
		to: Address,
		data: Bytes,
		chain_id: u64,
	) -> Result<Bytes, DeliveryError> {
		self.provider(chain_id)?.call(to, data, chain_id).await
	}

	pub async fn get_logs(
		&self,
		filter: &LogFilter,
		chain_id: u64,
	) -> Result<Vec<bridge_types::Log>, DeliveryError> {
		self.provider(chain_id)?.get_logs(filter, chain_id).await
	}

	/// Confirmations of a mined transaction: `latest - mined_block + 1`.
	pub async fn confirmations(
		&self,
		receipt: &TransactionReceipt,
		chain_id: u64,
	) -> Result<u64, DeliveryError> {
		let latest = self.get_block_number(chain_id).await?;
		Ok(confirmations_at(latest, receipt.block_number))
	}
}

/// Confirmation count of a transaction mined in `mined_block` when the chain head is `latest`.
pub fn confirmations_at(latest: u64, mined_block: u64) -> u64 {
	if latest < mined_block {
		return 0;
	}
	latest - mined_block + 1
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::mock::MockDelivery;

	fn service() -> DeliveryService {
		let chain = MockDelivery::new(1)
			.with_head(12, 0)
			.with_receipt(&[1; 32], 10, true);
		DeliveryService::from_implementations(vec![Box::new(chain)], std::time::Duration::from_secs(1))
	}

	#[tokio::test]
	async fn test_routes_by_chain_id() {
		let service = service();
		assert!(service.supports(1));
		assert_eq!(service.get_block_number(1).await.unwrap(), 12);
		assert!(matches!(
			service.get_block_number(5).await,
			Err(DeliveryError::NoProviderAvailable(5))
		));
	}

	#[tokio::test]
	async fn test_confirmations_count_mined_block() {
		let service = service();
		let receipt = service
			.get_receipt(&TransactionHash(vec![1; 32]), 1)
			.await
			.unwrap()
			.unwrap();
		// Mined in 10, head at 12: blocks 10, 11 and 12.
		assert_eq!(service.confirmations(&receipt, 1).await.unwrap(), 3);
	}

	#[tokio::test]
	async fn test_replacement_search_resumes_after_scanned_blocks() {
		let pending = PendingTransaction {
			hash: TransactionHash(vec![0xaa; 32]),
			from: Address::repeat_byte(0x11),
			nonce: 7,
			submitted_at_block: 100,
		};
		let replacement = TransactionHash(vec![0xbb; 32]);
		let chain = MockDelivery::new(1)
			.with_head(100, 60)
			.with_replacement(replacement.clone(), 200);
		let service = DeliveryService::from_implementations(
			vec![Box::new(chain)],
			std::time::Duration::from_secs(1),
		);

		// Head at 160: nothing yet, resume after it.
		let first = service.find_replacement(&pending, 100, 1).await.unwrap();
		assert_eq!(first, ReplacementScan::not_found(161));
		// Head at 220: mined in 200, well past the submission block.
		let second = service.find_replacement(&pending, first.next_block, 1).await.unwrap();
		assert_eq!(second, ReplacementScan::found(replacement.clone(), 201));
		assert!(service.get_receipt(&replacement, 1).await.unwrap().is_some());
	}

	#[test]
	fn test_confirmations_at() {
		assert_eq!(confirmations_at(100, 100), 1);
		assert_eq!(confirmations_at(99, 100), 0);
		assert_eq!(confirmations_at(129, 100), 30);
	}
}
