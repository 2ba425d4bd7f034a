//! Transfer engine for the cross-chain bridge client.
//!
//! This crate ties the lower layers together: an [`EvmChain`] adapter per
//! configured chain, a [`TransactionSubmitter`] that takes a payload to a
//! confirmed chain transaction, and the [`TransferOrchestrator`] that runs a
//! transfer from deposit to output. [`BridgeBuilder`] assembles everything
//! from configuration.

pub mod builder;
pub mod chain;
pub mod engine;
pub mod monitoring;

pub use builder::{BridgeBuilder, BridgeFactories, BuilderError};
pub use chain::{Authorization, ContextParams, EvmChain};
pub use engine::event_bus::EventBus;
pub use engine::transfer::{PreparedTransfer, TransferOrchestrator, TransferRequest};
pub use engine::Bridge;
pub use monitoring::transaction::TransactionSubmitter;

use bridge_account::GatewayError;
use bridge_delivery::DeliveryError;
use bridge_discovery::LocatorError;
use bridge_network::NetworkError;
use bridge_payload::PayloadError;
use bridge_types::{ErrorKind, HasErrorKind};
use thiserror::Error;

/// Errors from submitting and confirming a chain transaction.
#[derive(Debug, Error)]
pub enum SubmitError {
	#[error(transparent)]
	Payload(#[from] PayloadError),
	#[error(transparent)]
	Delivery(#[from] DeliveryError),
	#[error("Transaction {hash} reverted: {reason}")]
	Reverted { hash: String, reason: String },
	#[error("Transaction already submitted")]
	AlreadySubmitted,
	#[error("No transaction to wait for")]
	NotSubmitted,
	#[error("Operation cancelled")]
	Cancelled,
}

impl HasErrorKind for SubmitError {
	fn kind(&self) -> ErrorKind {
		match self {
			SubmitError::Payload(e) => e.kind(),
			SubmitError::Delivery(e) => e.kind(),
			SubmitError::Reverted { .. } => ErrorKind::Reverted,
			SubmitError::AlreadySubmitted | SubmitError::NotSubmitted => ErrorKind::Internal,
			SubmitError::Cancelled => ErrorKind::Cancelled,
		}
	}
}

/// Errors from running a transfer.
#[derive(Debug, Error)]
pub enum TransferError {
	#[error("Invalid parameter: {0}")]
	Parameter(String),
	#[error("Chain {0} is not configured")]
	UnknownChain(String),
	#[error("Transaction not found: {0}")]
	TransactionNotFound(String),
	#[error(transparent)]
	Payload(#[from] PayloadError),
	#[error(transparent)]
	Locator(#[from] LocatorError),
	#[error(transparent)]
	Network(#[from] NetworkError),
	#[error(transparent)]
	Submit(#[from] SubmitError),
	#[error(transparent)]
	Gateway(#[from] GatewayError),
	#[error(transparent)]
	Delivery(#[from] DeliveryError),
	#[error("Operation cancelled")]
	Cancelled,
	#[error("Internal error: {0}")]
	Internal(String),
}

impl HasErrorKind for TransferError {
	fn kind(&self) -> ErrorKind {
		match self {
			TransferError::Parameter(_) | TransferError::UnknownChain(_) => {
				ErrorKind::ParameterError
			},
			TransferError::TransactionNotFound(_) => ErrorKind::TransactionNotFound,
			TransferError::Payload(e) => e.kind(),
			TransferError::Locator(e) => e.kind(),
			TransferError::Network(e) => e.kind(),
			TransferError::Submit(e) => e.kind(),
			TransferError::Gateway(e) => e.kind(),
			TransferError::Delivery(e) => e.kind(),
			TransferError::Cancelled => ErrorKind::Cancelled,
			TransferError::Internal(_) => ErrorKind::Internal,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_kinds_survive_wrapping() {
		let err = TransferError::from(SubmitError::Reverted {
			hash: "0xab".into(),
			reason: "paused".into(),
		});
		assert_eq!(err.kind(), ErrorKind::Reverted);
		assert_eq!(err.to_string(), "Transaction 0xab reverted: paused");

		let err = TransferError::from(NetworkError::NotFound("tx x not found".into()));
		assert_eq!(err.kind(), ErrorKind::TransactionNotFound);

		let err = TransferError::from(LocatorError::AssetNotSupported {
			asset: "DOGE".into(),
			chain: "Ethereum".into(),
		});
		assert_eq!(err.kind().as_str(), "ASSET_NOT_SUPPORTED");
		assert_eq!(TransferError::Cancelled.kind(), ErrorKind::Cancelled);
	}
}
