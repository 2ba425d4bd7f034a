//! Signing identity and gateway address derivation.
//!
//! The account is the address that submits mints, releases and setup calls.
//! The gateway module derives the per-transfer deposit address from the
//! network's shard key.

use alloy_primitives::Address;
use async_trait::async_trait;
use bridge_types::{ConfigSchema, ErrorKind, HasErrorKind, ImplementationRegistry, SecretString};
use thiserror::Error;

pub mod gateway;

pub mod implementations {
	pub mod local;
}

pub use gateway::{EvmGatewayDeriver, GatewayAddressDeriver, GatewayError};

#[derive(Debug, Error)]
pub enum AccountError {
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	#[error("Implementation error: {0}")]
	Implementation(String),
}

impl HasErrorKind for AccountError {
	fn kind(&self) -> ErrorKind {
		match self {
			AccountError::InvalidKey(_) => ErrorKind::ParameterError,
			AccountError::Implementation(_) => ErrorKind::Internal,
		}
	}
}

/// A source of the signing key used for chain submissions.
#[async_trait]
pub trait AccountInterface: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Address transactions are sent from.
	async fn address(&self) -> Result<Address, AccountError>;

	/// Private key with 0x prefix, handed to delivery implementations.
	fn get_private_key(&self) -> SecretString;
}

pub type AccountFactory = fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError>;

pub trait AccountRegistry: ImplementationRegistry<Factory = AccountFactory> {}

/// All account implementations as (name, factory) pairs.
pub fn get_all_implementations() -> Vec<(&'static str, AccountFactory)> {
	use implementations::local;

	vec![(local::Registry::NAME, local::Registry::factory())]
}

/// Wraps the configured account implementation.
pub struct AccountService {
	implementation: Box<dyn AccountInterface>,
}

impl AccountService {
	pub fn new(implementation: Box<dyn AccountInterface>) -> Self {
		Self { implementation }
	}

	pub async fn get_address(&self) -> Result<Address, AccountError> {
		self.implementation.address().await
	}

	pub fn get_private_key(&self) -> SecretString {
		self.implementation.get_private_key()
	}
}
