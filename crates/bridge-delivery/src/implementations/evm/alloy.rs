//! Alloy-based delivery over HTTP JSON-RPC.
//!
//! One provider per configured chain, all signing with the configured
//! account. Nonces are taken from the pending block and set explicitly so
//! that replacements can be matched by sender and nonce.

use crate::{DeliveryError, DeliveryInterface};
use alloy_consensus::Transaction as _;
use alloy_network::{EthereumWallet, TransactionResponse};
use alloy_primitives::{Address, Bytes, FixedBytes, U256};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::{BlockId, BlockNumberOrTag, BlockTransactionsKind, Filter, TransactionRequest};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use alloy_transport_http::Http;
use async_trait::async_trait;
use bridge_types::{
	truncate_id, ConfigSchema, Field, FieldType, Log, LogFilter, NetworksConfig,
	PendingTransaction, ReplacementScan, Schema, SecretString, Transaction, TransactionHash,
	TransactionReceipt, ValidationError,
};
use std::collections::HashMap;
use std::sync::Arc;

type HttpProvider = Arc<dyn Provider<Http<reqwest::Client>> + Send + Sync>;

pub struct AlloyDelivery {
	providers: HashMap<u64, HttpProvider>,
	signer_address: Address,
}

impl AlloyDelivery {
	/// Builds providers for the given network selectors.
	pub fn new(
		network_ids: &[String],
		networks: &NetworksConfig,
		signer: PrivateKeySigner,
		poll_interval: std::time::Duration,
	) -> Result<Self, DeliveryError> {
		if network_ids.is_empty() {
			return Err(DeliveryError::InvalidRequest(
				"At least one network_id must be specified".to_string(),
			));
		}

		let mut providers = HashMap::new();
		for selector in network_ids {
			let network = networks.get(selector).ok_or_else(|| {
				DeliveryError::InvalidRequest(format!(
					"Network {} not found in configuration",
					selector
				))
			})?;
			let url = network.rpc_url.parse().map_err(|e| {
				DeliveryError::InvalidRequest(format!("Invalid RPC URL for {}: {}", selector, e))
			})?;

			let wallet = EthereumWallet::from(signer.clone().with_chain_id(Some(network.chain_id)));
			let provider = ProviderBuilder::new()
				.with_recommended_fillers()
				.wallet(wallet)
				.on_http(url);
			provider.client().set_poll_interval(poll_interval);

			providers.insert(network.chain_id, Arc::new(provider) as HttpProvider);
		}

		Ok(Self {
			providers,
			signer_address: signer.address(),
		})
	}

	fn get_provider(&self, chain_id: u64) -> Result<&HttpProvider, DeliveryError> {
		self.providers
			.get(&chain_id)
			.ok_or(DeliveryError::NoProviderAvailable(chain_id))
	}
}

fn hash_bytes(hash: &TransactionHash) -> Result<FixedBytes<32>, DeliveryError> {
	if hash.0.len() != 32 {
		return Err(DeliveryError::InvalidRequest(format!(
			"Transaction hash must be 32 bytes, got {}",
			hash.0.len()
		)));
	}
	Ok(FixedBytes::<32>::from_slice(&hash.0))
}

fn convert_log(log: &alloy_rpc_types::Log) -> Log {
	Log {
		address: log.inner.address,
		topics: log.inner.data.topics().to_vec(),
		data: log.inner.data.data.clone(),
		transaction_hash: log.transaction_hash.map(TransactionHash::from),
		block_number: log.block_number,
	}
}

pub struct AlloyDeliverySchema;

impl AlloyDeliverySchema {
	pub fn validate_config(config: &toml::Value) -> Result<(), ValidationError> {
		AlloyDeliverySchema.validate(config)
	}
}

impl ConfigSchema for AlloyDeliverySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("network_ids", FieldType::Array(Box::new(FieldType::String)))
					.with_validator(|value| match value.as_array() {
						Some(ids) if ids.is_empty() => Err("network_ids cannot be empty".to_string()),
						_ => Ok(()),
					}),
			],
			vec![Field::new(
				"poll_interval_seconds",
				FieldType::Integer {
					min: Some(1),
					max: Some(300),
				},
			)],
		);
		schema.validate(config)
	}
}

#[async_trait]
impl DeliveryInterface for AlloyDelivery {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(AlloyDeliverySchema)
	}

	fn chain_ids(&self) -> Vec<u64> {
		self.providers.keys().copied().collect()
	}

	fn signer_address(&self, chain_id: u64) -> Option<Address> {
		self.providers
			.contains_key(&chain_id)
			.then_some(self.signer_address)
	}

	async fn submit(&self, tx: Transaction) -> Result<PendingTransaction, DeliveryError> {
		let chain_id = tx.chain_id;
		let provider = self.get_provider(chain_id)?;

		let nonce = provider
			.get_transaction_count(self.signer_address)
			.pending()
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to get nonce: {}", e)))?;
		let submitted_at_block = provider
			.get_block_number()
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to get block number: {}", e)))?;

		let mut request = TransactionRequest::default()
			.from(self.signer_address)
			.to(tx.to)
			.input(tx.data.into())
			.value(tx.value)
			.nonce(nonce);
		if let Some(gas_limit) = tx.gas_limit {
			request = request.gas_limit(gas_limit);
		}

		let pending = provider
			.send_transaction(request)
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to send transaction: {}", e)))?;
		let hash = TransactionHash::from(*pending.tx_hash());
		tracing::info!(
			tx_hash = %truncate_id(&hash.to_hex()),
			chain_id,
			nonce,
			"Submitted transaction"
		);

		Ok(PendingTransaction {
			hash,
			from: self.signer_address,
			nonce,
			submitted_at_block,
		})
	}

	async fn get_receipt(
		&self,
		hash: &TransactionHash,
		chain_id: u64,
	) -> Result<Option<TransactionReceipt>, DeliveryError> {
		let provider = self.get_provider(chain_id)?;
		let receipt = provider
			.get_transaction_receipt(hash_bytes(hash)?)
			.await
			.map_err(|e| {
				DeliveryError::Network(format!("Failed to get receipt on chain {}: {}", chain_id, e))
			})?;

		Ok(receipt.and_then(|receipt| {
			// Pending receipts have no block yet.
			let block_number = receipt.block_number?;
			Some(TransactionReceipt {
				hash: TransactionHash::from(receipt.transaction_hash),
				block_number,
				success: receipt.status(),
				logs: receipt.inner.logs().iter().map(convert_log).collect(),
			})
		}))
	}

	async fn find_replacement(
		&self,
		pending: &PendingTransaction,
		from_block: u64,
		chain_id: u64,
	) -> Result<ReplacementScan, DeliveryError> {
		let provider = self.get_provider(chain_id)?;
		let from_block = from_block.max(pending.submitted_at_block);

		let known = provider
			.get_transaction_by_hash(hash_bytes(&pending.hash)?)
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to get transaction: {}", e)))?;
		if known.is_some() {
			return Ok(ReplacementScan::not_found(from_block));
		}

		// Only a mined transaction can have consumed the nonce.
		let mined_nonce = provider
			.get_transaction_count(pending.from)
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to get nonce: {}", e)))?;
		if mined_nonce <= pending.nonce {
			return Ok(ReplacementScan::not_found(from_block));
		}

		let latest = provider
			.get_block_number()
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to get block number: {}", e)))?;
		for number in from_block..=latest {
			let block = provider
				.get_block_by_number(BlockNumberOrTag::Number(number), BlockTransactionsKind::Full)
				.await
				.map_err(|e| DeliveryError::Network(format!("Failed to get block {}: {}", number, e)))?;
			let Some(block) = block else {
				// Not served yet; resume here on the next call.
				return Ok(ReplacementScan::not_found(number));
			};
			let replacement = block.transactions.txns().find(|tx| {
				tx.from() == pending.from
					&& alloy_consensus::Transaction::nonce(*tx) == pending.nonce
					&& tx.tx_hash().as_slice() != pending.hash.0.as_slice()
			});
			if let Some(tx) = replacement {
				return Ok(ReplacementScan::found(TransactionHash::from(tx.tx_hash()), number + 1));
			}
		}
		tracing::debug!(
			tx_hash = %truncate_id(&pending.hash.to_hex()),
			from_block,
			latest,
			"Nonce consumed but no replacement found yet"
		);
		Ok(ReplacementScan::not_found((latest + 1).max(from_block)))
	}

	async fn revert_reason(
		&self,
		hash: &TransactionHash,
		chain_id: u64,
	) -> Result<Option<String>, DeliveryError> {
		let provider = self.get_provider(chain_id)?;
		let Some(tx) = provider
			.get_transaction_by_hash(hash_bytes(hash)?)
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to get transaction: {}", e)))?
		else {
			return Ok(None);
		};
		let Some(block) = tx.block_number else {
			return Ok(None);
		};

		let request = tx.into_request();
		match provider.call(&request).block(BlockId::number(block)).await {
			Ok(_) => Ok(None),
			Err(e) => Ok(Some(
				e.as_error_resp()
					.map(|resp| resp.message.to_string())
					.unwrap_or_else(|| e.to_string()),
			)),
		}
	}

	async fn get_block_number(&self, chain_id: u64) -> Result<u64, DeliveryError> {
		self.get_provider(chain_id)?
			.get_block_number()
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to get block number: {}", e)))
	}

	async fn get_balance(&self, address: Address, chain_id: u64) -> Result<U256, DeliveryError> {
		self.get_provider(chain_id)?
			.get_balance(address)
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to get balance: {}", e)))
	}

	async fn call(&self, to: Address, data: Bytes, chain_id: u64) -> Result<Bytes, DeliveryError> {
		let request = TransactionRequest::default().to(to).input(data.into());
		self.get_provider(chain_id)?
			.call(&request)
			.await
			.map_err(|e| DeliveryError::Network(format!("Call to {} failed: {}", to, e)))
	}

	async fn get_logs(&self, filter: &LogFilter, chain_id: u64) -> Result<Vec<Log>, DeliveryError> {
		let mut query = Filter::new()
			.address(filter.address)
			.event_signature(filter.event_signature)
			.from_block(filter.from_block)
			.to_block(filter.to_block);
		if let Some(topic) = filter.topics[0] {
			query = query.topic1(topic);
		}
		if let Some(topic) = filter.topics[1] {
			query = query.topic2(topic);
		}
		if let Some(topic) = filter.topics[2] {
			query = query.topic3(topic);
		}

		let logs = self
			.get_provider(chain_id)?
			.get_logs(&query)
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to get logs: {}", e)))?;
		Ok(logs.iter().map(convert_log).collect())
	}
}

/// Builds an [`AlloyDelivery`] for the networks listed in `network_ids`.
pub fn create_http_delivery(
	config: &toml::Value,
	networks: &NetworksConfig,
	private_key: &SecretString,
) -> Result<Box<dyn DeliveryInterface>, DeliveryError> {
	AlloyDeliverySchema::validate_config(config)
		.map_err(|e| DeliveryError::InvalidRequest(format!("Invalid configuration: {}", e)))?;

	let network_ids: Vec<String> = config
		.get("network_ids")
		.and_then(|v| v.as_array())
		.map(|ids| {
			ids.iter()
				.filter_map(|v| v.as_str().map(str::to_string))
				.collect()
		})
		.unwrap_or_default();
	let poll_interval = config
		.get("poll_interval_seconds")
		.and_then(|v| v.as_integer())
		.map(|s| std::time::Duration::from_secs(s as u64))
		.unwrap_or(std::time::Duration::from_secs(7));

	let signer: PrivateKeySigner = private_key.with_exposed(|key| {
		key.parse()
			.map_err(|_| DeliveryError::InvalidRequest("Invalid private key format".to_string()))
	})?;

	Ok(Box::new(AlloyDelivery::new(
		&network_ids,
		networks,
		signer,
		poll_interval,
	)?))
}

pub struct Registry;

impl bridge_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "evm_alloy";
	type Factory = crate::DeliveryFactory;

	fn factory() -> Self::Factory {
		create_http_delivery
	}
}

impl crate::DeliveryRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_schema_requires_network_ids() {
		let empty: toml::Value = toml::from_str("network_ids = []").unwrap();
		assert!(AlloyDeliverySchema::validate_config(&empty).is_err());

		let numeric: toml::Value = toml::from_str("network_ids = [1]").unwrap();
		assert!(AlloyDeliverySchema::validate_config(&numeric).is_err());

		let valid: toml::Value =
			toml::from_str("network_ids = [\"Ethereum\"]\npoll_interval_seconds = 3").unwrap();
		assert!(AlloyDeliverySchema::validate_config(&valid).is_ok());
	}

	#[test]
	fn test_hash_length_checked() {
		assert!(hash_bytes(&TransactionHash(vec![0; 31])).is_err());
		assert!(hash_bytes(&TransactionHash(vec![0; 32])).is_ok());
	}
}
