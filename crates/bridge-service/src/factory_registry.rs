//! Registry of the account and delivery implementations compiled into the
//! binary, keyed by the names used in the configuration file.

use bridge_account::AccountFactory;
use bridge_config::Config;
use bridge_core::{Bridge, BridgeBuilder, BridgeFactories};
use bridge_delivery::DeliveryFactory;
use std::collections::HashMap;
use std::sync::OnceLock;

pub struct FactoryRegistry {
	pub account: HashMap<String, AccountFactory>,
	pub delivery: HashMap<String, DeliveryFactory>,
}

impl FactoryRegistry {
	pub fn new() -> Self {
		Self {
			account: HashMap::new(),
			delivery: HashMap::new(),
		}
	}

	pub fn register_account(&mut self, name: impl Into<String>, factory: AccountFactory) {
		self.account.insert(name.into(), factory);
	}

	pub fn register_delivery(&mut self, name: impl Into<String>, factory: DeliveryFactory) {
		self.delivery.insert(name.into(), factory);
	}
}

static REGISTRY: OnceLock<FactoryRegistry> = OnceLock::new();

pub fn get_registry() -> &'static FactoryRegistry {
	REGISTRY.get_or_init(|| {
		let mut registry = FactoryRegistry::new();

		for (name, factory) in bridge_account::get_all_implementations() {
			tracing::debug!("Registering account implementation: {}", name);
			registry.register_account(name, factory);
		}

		for (name, factory) in bridge_delivery::get_all_implementations() {
			tracing::debug!("Registering delivery implementation: {}", name);
			registry.register_delivery(name, factory);
		}

		registry
	})
}

/// Picks the registered factory for every implementation the config names.
macro_rules! build_factories {
	($registry:expr, $config_impls:expr, $registry_field:ident, $type_name:literal) => {{
		let mut factories = HashMap::new();
		for name in $config_impls.keys() {
			if let Some(factory) = $registry.$registry_field.get(name) {
				factories.insert(name.clone(), *factory);
			} else {
				let mut available: Vec<_> = $registry.$registry_field.keys().cloned().collect();
				available.sort();
				return Err(format!(
					"Unknown {} implementation '{}'. Available: [{}]",
					$type_name,
					name,
					available.join(", ")
				)
				.into());
			}
		}
		factories
	}};
}

pub async fn build_bridge_from_config(config: Config) -> Result<Bridge, Box<dyn std::error::Error>> {
	let registry = get_registry();

	let account_factories =
		build_factories!(registry, config.account.implementations, account, "account");
	let delivery_factories = build_factories!(
		registry,
		config.delivery.implementations,
		delivery,
		"delivery"
	);

	let factories = BridgeFactories {
		account_factories,
		delivery_factories,
	};

	Ok(BridgeBuilder::new(config).build(factories).await?)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_registry_contains_builtin_implementations() {
		let registry = get_registry();
		assert!(registry.account.contains_key("local"));
		assert!(registry.delivery.contains_key("evm_alloy"));
	}

	#[tokio::test]
	async fn test_unknown_implementation_is_rejected() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("bridge.toml");
		std::fs::write(
			&path,
			r#"
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
[delivery.implementations.evm_websocket]
network_ids = ["Ethereum"]
"#,
		)
		.unwrap();

		let config = Config::from_file(path.to_str().unwrap()).await.unwrap();
		let err = build_bridge_from_config(config).await.err().unwrap();
		assert_eq!(
			err.to_string(),
			"Unknown delivery implementation 'evm_websocket'. Available: [evm_alloy]"
		);
	}
}
