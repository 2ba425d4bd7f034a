//! Per-chain network configuration.
//!
//! A `NetworkConfig` is built once at startup from the configuration file and
//! never mutated. Networks are keyed by their selector, the chain name used
//! in transfer selectors such as `BTC/toEthereum`.

use alloy_primitives::Address;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// The chain's native asset.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NativeAsset {
	pub name: String,
	pub symbol: String,
	pub decimals: u8,
}

/// Contract addresses the bridge needs on a chain.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NetworkAddresses {
	/// Registry mapping asset selectors to gateway and token contracts.
	pub gateway_registry: Address,
	/// Bridge contract that lets anyone submit mints and releases.
	#[serde(default)]
	pub basic_bridge: Option<Address>,
	/// Forwarder that emits `LogTransferred` for native-asset deposits.
	#[serde(default)]
	pub transfer_with_log: Option<Address>,
}

/// Configuration for a single chain.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NetworkConfig {
	/// Chain name. Filled from the table key when loaded from TOML.
	#[serde(default)]
	pub selector: String,
	pub chain_id: u64,
	pub rpc_url: String,
	#[serde(default)]
	pub is_testnet: bool,
	/// Explorer base URL; transaction links are `{explorer_url}/tx/{hash}`.
	#[serde(default)]
	pub explorer_url: Option<String>,
	/// Confirmations required before a deposit on this chain is final.
	#[serde(default = "default_confirmation_target")]
	pub confirmation_target: u64,
	/// Block window for past-log queries. `None` searches from genesis.
	#[serde(default)]
	pub log_request_limit: Option<u64>,
	/// Expected seconds per confirmation.
	#[serde(default = "default_average_confirmation_time")]
	pub average_confirmation_time: u64,
	pub native_asset: NativeAsset,
	pub addresses: NetworkAddresses,
}

fn default_confirmation_target() -> u64 {
	1
}

fn default_average_confirmation_time() -> u64 {
	15
}

impl NetworkConfig {
	/// Explorer link for a transaction, if an explorer is configured.
	pub fn transaction_explorer_link(&self, tx_hash: &str) -> Option<String> {
		if tx_hash.is_empty() {
			return None;
		}
		self.explorer_url
			.as_ref()
			.map(|url| format!("{}/tx/{}", url.trim_end_matches('/'), tx_hash))
	}
}

/// Networks keyed by selector.
pub type NetworksConfig = HashMap<String, NetworkConfig>;

/// Deserializes the networks table, copying each key into `selector`.
pub fn deserialize_networks<'de, D>(deserializer: D) -> Result<NetworksConfig, D::Error>
where
	D: Deserializer<'de>,
{
	let raw: HashMap<String, NetworkConfig> = HashMap::deserialize(deserializer)?;
	Ok(raw
		.into_iter()
		.map(|(selector, mut network)| {
			network.selector = selector.clone();
			(selector, network)
		})
		.collect())
}
