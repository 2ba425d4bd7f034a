//! Construction of a [`Bridge`] from configuration.
//!
//! Account and delivery implementations are created through factory
//! functions keyed by the implementation name used in the configuration
//! file, so binaries decide which implementations are available.

use crate::chain::EvmChain;
use crate::engine::{event_bus::EventBus, Bridge};
use bridge_account::{AccountError, AccountInterface, AccountService};
use bridge_config::Config;
use bridge_delivery::{DeliveryError, DeliveryInterface, DeliveryService};
use bridge_network::{JsonRpcNetwork, NetworkInterface};
use bridge_types::{NetworksConfig, SecretString};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while building a bridge.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions for each pluggable component.
pub struct BridgeFactories<AF, DF> {
	pub account_factories: HashMap<String, AF>,
	pub delivery_factories: HashMap<String, DF>,
}

/// Builds a [`Bridge`] from configuration.
pub struct BridgeBuilder {
	config: Config,
	network: Option<Arc<dyn NetworkInterface>>,
	event_bus: EventBus,
}

impl BridgeBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			network: None,
			event_bus: EventBus::default(),
		}
	}

	/// Uses `network` instead of a JSON-RPC client for `renvm.rpc_url`.
	pub fn with_network(mut self, network: Arc<dyn NetworkInterface>) -> Self {
		self.network = Some(network);
		self
	}

	pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
		self.event_bus = event_bus;
		self
	}

	pub async fn build<AF, DF>(self, factories: BridgeFactories<AF, DF>) -> Result<Bridge, BuilderError>
	where
		AF: Fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError>,
		DF: Fn(
			&toml::Value,
			&NetworksConfig,
			&SecretString,
		) -> Result<Box<dyn DeliveryInterface>, DeliveryError>,
	{
		let mut account_services = HashMap::new();
		for (name, config) in &self.config.account.implementations {
			if let Some(factory) = factories.account_factories.get(name) {
				match factory(config) {
					Ok(implementation) => {
						account_services.insert(name.clone(), AccountService::new(implementation));
						let is_primary = &self.config.account.primary == name;
						tracing::info!(component = "account", implementation = %name, enabled = %is_primary, "Loaded");
					},
					Err(e) => {
						tracing::error!(
							component = "account",
							implementation = %name,
							error = %e,
							"Failed to create account implementation"
						);
						return Err(BuilderError::Config(format!(
							"Failed to create account implementation '{}': {}",
							name, e
						)));
					},
				}
			}
		}

		let primary_account = self.config.account.primary.as_str();
		let account = account_services.get(primary_account).ok_or_else(|| {
			BuilderError::MissingComponent(format!(
				"Primary account '{}' failed to load",
				primary_account
			))
		})?;
		let signer = account.get_address().await.map_err(|e| {
			BuilderError::Config(format!("Failed to get signer address: {}", e))
		})?;
		tracing::info!(component = "account", %signer, "Signer ready");
		let private_key = account.get_private_key();

		let mut delivery_implementations = Vec::new();
		for (name, config) in &self.config.delivery.implementations {
			if let Some(factory) = factories.delivery_factories.get(name) {
				match factory(config, &self.config.networks, &private_key) {
					Ok(implementation) => {
						for chain_id in implementation.chain_ids() {
							tracing::info!(component = "delivery", implementation = %name, chain_id, "Loaded");
						}
						delivery_implementations.push(implementation);
					},
					Err(e) => {
						tracing::error!(
							component = "delivery",
							implementation = %name,
							error = %e,
							"Failed to create delivery implementation"
						);
						return Err(BuilderError::Config(format!(
							"Failed to create delivery implementation '{}': {}",
							name, e
						)));
					},
				}
			}
		}

		if delivery_implementations.is_empty() {
			return Err(BuilderError::MissingComponent(
				"No delivery implementations available".to_string(),
			));
		}

		let delivery = Arc::new(DeliveryService::from_implementations(
			delivery_implementations,
			Duration::from_secs(self.config.delivery.poll_interval_seconds),
		));

		let mut chains = HashMap::new();
		for (selector, network) in &self.config.networks {
			if !delivery.supports(network.chain_id) {
				tracing::warn!(chain = %selector, chain_id = network.chain_id, "No delivery for chain, skipping");
				continue;
			}
			chains.insert(
				selector.clone(),
				Arc::new(EvmChain::new(network.clone(), delivery.clone())),
			);
			tracing::info!(component = "chain", chain = %selector, "Loaded");
		}

		let network = match self.network {
			Some(network) => network,
			None => {
				let client = JsonRpcNetwork::new(
					self.config.renvm.rpc_url.clone(),
					Duration::from_secs(self.config.renvm.timeout_seconds),
					self.config.renvm.retries,
				)
				.map_err(|e| BuilderError::Config(format!("Failed to create network client: {}", e)))?;
				tracing::info!(component = "network", url = %self.config.renvm.rpc_url, "Loaded");
				Arc::new(client)
			},
		};

		Ok(Bridge::new(self.config, network, chains, self.event_bus))
	}
}
