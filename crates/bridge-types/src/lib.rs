//! Common types for the cross-chain bridge client.
//!
//! This crate holds the records, hashes and encodings shared by every other
//! bridge crate so that a transfer is described the same way from address
//! derivation through to the output transaction.

/// Chain transaction records and the chain-agnostic transaction/receipt types.
pub mod chain;
/// Error classification shared across crates.
pub mod errors;
/// Progress and event types for long-running operations.
pub mod events;
/// Transfer-scoped hashes and selector helpers.
pub mod hashes;
/// Network configuration types.
pub mod networks;
/// Binary and JSON encoding of typed values understood by the network.
pub mod pack;
/// Registry trait for self-registering implementations.
pub mod registry;
/// Secret string type for private keys.
pub mod secret_string;
/// Formatting and encoding helpers.
pub mod utils;
/// Configuration validation framework.
pub mod validation;

pub use chain::*;
pub use errors::{ErrorKind, HasErrorKind};
pub use events::*;
pub use hashes::*;
pub use networks::{NativeAsset, NetworkAddresses, NetworkConfig, NetworksConfig};
pub use registry::ImplementationRegistry;
pub use secret_string::SecretString;
pub use utils::{
	from_url_base64, to_url_base64, truncate_id, with_0x_prefix, without_0x_prefix,
};
pub use validation::*;
