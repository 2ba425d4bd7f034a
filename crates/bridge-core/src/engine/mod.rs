//! The assembled bridge: configured chains, the network client and the
//! event bus shared by every transfer.

pub mod event_bus;
pub mod transfer;

use crate::chain::EvmChain;
use crate::TransferError;
use bridge_config::Config;
use bridge_network::NetworkInterface;
use event_bus::EventBus;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use transfer::TransferOrchestrator;

/// Entry point for running transfers between configured chains.
#[derive(Clone)]
pub struct Bridge {
	config: Config,
	network: Arc<dyn NetworkInterface>,
	chains: HashMap<String, Arc<EvmChain>>,
	event_bus: EventBus,
}

impl Bridge {
	pub fn new(
		config: Config,
		network: Arc<dyn NetworkInterface>,
		chains: HashMap<String, Arc<EvmChain>>,
		event_bus: EventBus,
	) -> Self {
		Self {
			config,
			network,
			chains,
			event_bus,
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn network(&self) -> &Arc<dyn NetworkInterface> {
		&self.network
	}

	pub fn event_bus(&self) -> &EventBus {
		&self.event_bus
	}

	/// Selectors of every configured chain, sorted.
	pub fn chains(&self) -> Vec<&str> {
		let mut selectors: Vec<&str> = self.chains.keys().map(String::as_str).collect();
		selectors.sort_unstable();
		selectors
	}

	pub fn chain(&self, selector: &str) -> Result<Arc<EvmChain>, TransferError> {
		self.chains
			.get(selector)
			.cloned()
			.ok_or_else(|| TransferError::UnknownChain(selector.to_string()))
	}

	/// Orchestrator for transfers from `from` to `to`.
	///
	/// Deposits wait for the configured confirmation count when one is set,
	/// otherwise for the network's target.
	pub fn orchestrator(&self, from: &str, to: &str) -> Result<TransferOrchestrator, TransferError> {
		let confirmations = match self.config.bridge.default_confirmations {
			0 => None,
			_ => self.config.confirmations_for(from),
		};
		Ok(TransferOrchestrator::new(
			self.network.clone(),
			self.chain(from)?,
			self.chain(to)?,
			self.event_bus.clone(),
			Duration::from_secs(self.config.renvm.poll_interval_seconds),
		)
		.with_confirmations(confirmations))
	}
}
