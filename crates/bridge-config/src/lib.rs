//! Configuration for the bridge client.
//!
//! Configuration is read from TOML. String values may reference environment
//! variables as `${NAME}` or `${NAME:-default}`, and a file may pull in
//! other files with `include = ["networks.toml"]`. A top-level section can
//! only be defined in one file.

mod loader;

use bridge_types::{networks::deserialize_networks, NetworksConfig};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

pub use loader::ConfigLoader;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Configuration error: {0}")]
	Parse(String),
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// The full error embeds the whole input; keep only the message.
		ConfigError::Parse(err.message().to_string())
	}
}

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	pub bridge: BridgeConfig,
	/// Endpoint of the external custodian network.
	pub renvm: RenVmConfig,
	/// Chains keyed by selector (e.g. `Ethereum`).
	#[serde(deserialize_with = "deserialize_networks")]
	pub networks: NetworksConfig,
	pub account: AccountConfig,
	pub delivery: DeliveryConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BridgeConfig {
	/// Identifier of this client instance, used in logs.
	pub id: String,
	/// Confirmations to wait for on deposits. 0 uses the network's target.
	#[serde(default)]
	pub default_confirmations: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RenVmConfig {
	pub rpc_url: String,
	/// Per-request timeout.
	#[serde(default = "default_rpc_timeout_seconds")]
	pub timeout_seconds: u64,
	/// Extra attempts made for a failed request.
	#[serde(default = "default_rpc_retries")]
	pub retries: u32,
	/// Interval between transaction status queries.
	#[serde(default = "default_network_poll_interval_seconds")]
	pub poll_interval_seconds: u64,
}

fn default_rpc_timeout_seconds() -> u64 {
	120
}

fn default_rpc_retries() -> u32 {
	2
}

fn default_network_poll_interval_seconds() -> u64 {
	15
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountConfig {
	/// Name of the implementation used for signing.
	pub primary: String,
	pub implementations: HashMap<String, toml::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeliveryConfig {
	/// Delivery implementations by name, each with its own table.
	pub implementations: HashMap<String, toml::Value>,
	/// Interval between confirmation checks for submitted transactions.
	#[serde(default = "default_delivery_poll_interval_seconds")]
	pub poll_interval_seconds: u64,
}

fn default_delivery_poll_interval_seconds() -> u64 {
	7
}

/// Replaces `${NAME}` and `${NAME:-default}` with environment values.
///
/// Inputs over 1MB are rejected.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last = 0;
	for cap in re.captures_iter(input) {
		let (Some(whole), Some(name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let value = match std::env::var(name.as_str()) {
			Ok(v) => v,
			Err(_) => match cap.get(2) {
				Some(default) => default.as_str().to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						name.as_str()
					)))
				},
			},
		};
		result.push_str(&input[last..whole.start()]);
		result.push_str(&value);
		last = whole.end();
	}
	result.push_str(&input[last..]);

	Ok(result)
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;

		let mut loader = ConfigLoader::new(base_dir);
		loader.load_config(file_name).await
	}

	/// Default confirmations for deposits on `selector`.
	pub fn confirmations_for(&self, selector: &str) -> Option<u64> {
		let network = self.networks.get(selector)?;
		Some(match self.bridge.default_confirmations {
			0 => network.confirmation_target,
			n => n,
		})
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.bridge.id.is_empty() {
			return Err(ConfigError::Validation("Bridge ID cannot be empty".into()));
		}

		if !self.renvm.rpc_url.starts_with("http://") && !self.renvm.rpc_url.starts_with("https://")
		{
			return Err(ConfigError::Validation(format!(
				"renvm.rpc_url must be an http(s) URL, got '{}'",
				self.renvm.rpc_url
			)));
		}
		if self.renvm.poll_interval_seconds == 0 {
			return Err(ConfigError::Validation(
				"renvm.poll_interval_seconds must be greater than 0".into(),
			));
		}

		if self.networks.is_empty() {
			return Err(ConfigError::Validation(
				"Networks configuration cannot be empty".into(),
			));
		}
		for (selector, network) in &self.networks {
			if network.rpc_url.is_empty() {
				return Err(ConfigError::Validation(format!(
					"Network {} must have an rpc_url",
					selector
				)));
			}
			if network.chain_id == 0 {
				return Err(ConfigError::Validation(format!(
					"Network {} must have a non-zero chain_id",
					selector
				)));
			}
		}

		if self.account.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one account implementation required".into(),
			));
		}
		if !self
			.account
			.implementations
			.contains_key(&self.account.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary account '{}' not found in implementations",
				self.account.primary
			)));
		}

		if self.delivery.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one delivery implementation required".into(),
			));
		}
		if self.delivery.poll_interval_seconds == 0 {
			return Err(ConfigError::Validation(
				"delivery.poll_interval_seconds must be greater than 0".into(),
			));
		}
		self.validate_delivery_networks()
	}

	/// Every network referenced by a delivery implementation must be configured.
	fn validate_delivery_networks(&self) -> Result<(), ConfigError> {
		for (name, implementation) in &self.delivery.implementations {
			let Some(ids) = implementation.get("network_ids").and_then(|v| v.as_array()) else {
				continue;
			};
			for id in ids {
				let selector = id.as_str().ok_or_else(|| {
					ConfigError::Validation(format!(
						"Delivery '{}' network_ids must be network selectors",
						name
					))
				})?;
				if !self.networks.contains_key(selector) {
					return Err(ConfigError::Validation(format!(
						"Delivery '{}' references unknown network '{}'",
						name, selector
					)));
				}
			}
		}
		Ok(())
	}
}

impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	pub(crate) const BASE_CONFIG: &str = r#"
[bridge]
id = "bridge-test"

[renvm]
rpc_url = "https://rpc.testnet.renproject.io"

[networks.Ethereum]
chain_id = 1
rpc_url = "http://localhost:8545"
confirmation_target = 30
[networks.Ethereum.native_asset]
name = "Ether"
symbol = "ETH"
decimals = 18
[networks.Ethereum.addresses]
gateway_registry = "0xf36666C230Fa12333579b9Bd6196CB634D6BC506"

[account]
primary = "local"
[account.implementations.local]
private_key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"

[delivery]
[delivery.implementations.evm_alloy]
network_ids = ["Ethereum"]
"#;

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("BRIDGE_TEST_HOST", "localhost");
		std::env::set_var("BRIDGE_TEST_PORT", "8545");

		let result = resolve_env_vars("url = \"${BRIDGE_TEST_HOST}:${BRIDGE_TEST_PORT}\"").unwrap();
		assert_eq!(result, "url = \"localhost:8545\"");

		std::env::remove_var("BRIDGE_TEST_HOST");
		std::env::remove_var("BRIDGE_TEST_PORT");
	}

	#[test]
	fn test_env_var_with_default() {
		let result = resolve_env_vars("value = \"${BRIDGE_MISSING_VAR:-fallback}\"").unwrap();
		assert_eq!(result, "value = \"fallback\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let result = resolve_env_vars("value = \"${BRIDGE_MISSING_VAR}\"");
		assert!(result.unwrap_err().to_string().contains("BRIDGE_MISSING_VAR"));
	}

	#[test]
	fn test_defaults_applied() {
		let config: Config = BASE_CONFIG.parse().unwrap();
		assert_eq!(config.renvm.timeout_seconds, 120);
		assert_eq!(config.renvm.retries, 2);
		assert_eq!(config.renvm.poll_interval_seconds, 15);
		assert_eq!(config.delivery.poll_interval_seconds, 7);
		assert_eq!(config.networks["Ethereum"].selector, "Ethereum");
		assert_eq!(config.confirmations_for("Ethereum"), Some(30));
		assert_eq!(config.confirmations_for("Solana"), None);
	}

	#[test]
	fn test_explicit_confirmations_override_network_target() {
		let config: Config = BASE_CONFIG
			.replace("id = \"bridge-test\"", "id = \"bridge-test\"\ndefault_confirmations = 3")
			.parse()
			.unwrap();
		assert_eq!(config.confirmations_for("Ethereum"), Some(3));
	}

	#[test]
	fn test_primary_account_must_exist() {
		let result = BASE_CONFIG
			.replace("primary = \"local\"", "primary = \"kms\"")
			.parse::<Config>();
		assert!(result.unwrap_err().to_string().contains("Primary account 'kms'"));
	}

	#[test]
	fn test_delivery_references_unknown_network() {
		let result = BASE_CONFIG
			.replace("network_ids = [\"Ethereum\"]", "network_ids = [\"Polygon\"]")
			.parse::<Config>();
		assert!(result.unwrap_err().to_string().contains("unknown network 'Polygon'"));
	}

	#[test]
	fn test_rejects_non_http_rpc_url() {
		let result = BASE_CONFIG
			.replace("https://rpc.testnet.renproject.io", "ws://rpc")
			.parse::<Config>();
		assert!(matches!(result, Err(ConfigError::Validation(_))));
	}
}
