use bridge_delivery::DeliveryError;
use bridge_types::{ErrorKind, HasErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PayloadError {
	#[error("Payload parameter '{0}' is undefined")]
	MissingParameter(String),
	#[error("Invalid value for '{name}': {reason}")]
	InvalidParameter { name: String, reason: String },
	#[error("Error encoding {chain} parameters: {reason}")]
	Encoding { chain: String, reason: String },
	#[error("Unsupported payload: {0}")]
	Unsupported(String),
	/// A resolver failed while looking up a parameter.
	#[error("{message}")]
	Lookup { kind: ErrorKind, message: String },
	#[error(transparent)]
	Delivery(#[from] DeliveryError),
}

impl PayloadError {
	pub(crate) fn invalid(name: impl Into<String>, reason: impl ToString) -> Self {
		PayloadError::InvalidParameter {
			name: name.into(),
			reason: reason.to_string(),
		}
	}
}

impl HasErrorKind for PayloadError {
	fn kind(&self) -> ErrorKind {
		match self {
			PayloadError::MissingParameter(_)
			| PayloadError::InvalidParameter { .. }
			| PayloadError::Encoding { .. }
			| PayloadError::Unsupported(_) => ErrorKind::ParameterError,
			PayloadError::Lookup { kind, .. } => *kind,
			PayloadError::Delivery(e) => e.kind(),
		}
	}
}
