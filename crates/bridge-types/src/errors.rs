//! Failure classes that every public error in the bridge maps onto.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable classification of a failure.
///
/// Concrete error enums differ per crate, but each of them reports one of
/// these kinds so callers can decide whether to retry, resubmit or give up
/// without inspecting error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
	/// Malformed or missing caller input. Not retryable.
	ParameterError,
	/// The registry has no mapping for the asset. Not retryable.
	AssetNotSupported,
	/// Registry, chain or network RPC failure. Retryable at the caller's discretion.
	NetworkError,
	/// The queried transaction does not exist.
	TransactionNotFound,
	/// On-chain execution failed.
	Reverted,
	/// The caller cancelled the operation.
	Cancelled,
	/// Anything else.
	Internal,
}

impl ErrorKind {
	/// Returns the canonical error code.
	pub fn as_str(&self) -> &'static str {
		match self {
			ErrorKind::ParameterError => "PARAMETER_ERROR",
			ErrorKind::AssetNotSupported => "ASSET_NOT_SUPPORTED",
			ErrorKind::NetworkError => "NETWORK_ERROR",
			ErrorKind::TransactionNotFound => "TRANSACTION_NOT_FOUND",
			ErrorKind::Reverted => "REVERTED",
			ErrorKind::Cancelled => "CANCELLED",
			ErrorKind::Internal => "INTERNAL_ERROR",
		}
	}

	/// Whether an operation failing with this kind may succeed if repeated.
	pub fn is_retryable(&self) -> bool {
		matches!(self, ErrorKind::NetworkError | ErrorKind::TransactionNotFound)
	}
}

impl fmt::Display for ErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Implemented by every public error type in the bridge crates.
pub trait HasErrorKind {
	fn kind(&self) -> ErrorKind;
}
