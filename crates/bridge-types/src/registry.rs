//! Registry trait for self-registering implementations.

/// Implemented by each pluggable implementation's `Registry` marker struct.
///
/// `NAME` is the key of the implementation's table in the configuration file,
/// e.g. `evm_alloy` for `[delivery.implementations.evm_alloy]`.
pub trait ImplementationRegistry {
	const NAME: &'static str;

	/// Factory signature, defined by the crate that owns the interface.
	type Factory;

	fn factory() -> Self::Factory;
}
