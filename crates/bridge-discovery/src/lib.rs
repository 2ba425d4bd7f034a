//! Deposit and output discovery for EVM chains.
//!
//! The [`DepositLocator`] answers the questions a transfer needs answered
//! from chain state: which gateway and token contracts serve an asset, what
//! deposits a transaction made, and whether a lock, burn, mint or release
//! already happened for a given nonce or nHash.

pub mod cache;
pub mod contracts;
pub mod events;
pub mod locator;

pub use cache::LookupCache;
pub use events::{decode_deposit_events, decode_input_events, DepositEvent};
pub use locator::{DepositLocator, InputKind, LookupKind, OutputKind};

use bridge_delivery::DeliveryError;
use bridge_types::{ErrorKind, HasErrorKind};
use thiserror::Error;

/// Errors that can occur while reading gateway state.
#[derive(Debug, Error)]
pub enum LocatorError {
	/// The registry has no contract for the asset.
	#[error("Asset '{asset}' not supported on {chain}")]
	AssetNotSupported { asset: String, chain: String },
	/// A registry or chain read failed.
	#[error("Network error: {0}")]
	Network(String),
	#[error("Transaction not found: {0}")]
	TransactionNotFound(String),
	/// Logs or return data could not be decoded.
	#[error("Decode error: {0}")]
	Decode(String),
	#[error(transparent)]
	Delivery(#[from] DeliveryError),
}

impl HasErrorKind for LocatorError {
	fn kind(&self) -> ErrorKind {
		match self {
			LocatorError::AssetNotSupported { .. } => ErrorKind::AssetNotSupported,
			LocatorError::Network(_) => ErrorKind::NetworkError,
			LocatorError::TransactionNotFound(_) => ErrorKind::TransactionNotFound,
			LocatorError::Decode(_) => ErrorKind::ParameterError,
			LocatorError::Delivery(e) => e.kind(),
		}
	}
}
