//! Symbolic parameters and the per-attempt context that resolves them.

use crate::PayloadError;
use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{Address, U256};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// A value only known once a transfer is underway.
///
/// Payload arguments reference these by name (`__EVM_AMOUNT__`, ...) and
/// are substituted from a [`ParamContext`] at resolution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvmParam {
	InputType,
	OutputType,
	/// Same as `OutputType` for outputs and `InputType` for inputs, or `setup`.
	TransactionType,
	TokenAddress,
	TokenDecimals,
	GatewayIsDepositAsset,
	GatewayDepositAddress,
	TransferWithLogContract,
	Account,
	AccountIsContract,
	Gateway,
	Asset,
	Chain,
	// Mint and release only.
	Amount,
	NHash,
	PHash,
	Signature,
	SignatureR,
	SignatureS,
	SignatureV,
	// Lock and burn only.
	ToChain,
	ToAddress,
	ToAddressBytes,
	ToPayload,
}

const ALL_PARAMS: [EvmParam; 24] = [
	EvmParam::InputType,
	EvmParam::OutputType,
	EvmParam::TransactionType,
	EvmParam::TokenAddress,
	EvmParam::TokenDecimals,
	EvmParam::GatewayIsDepositAsset,
	EvmParam::GatewayDepositAddress,
	EvmParam::TransferWithLogContract,
	EvmParam::Account,
	EvmParam::AccountIsContract,
	EvmParam::Gateway,
	EvmParam::Asset,
	EvmParam::Chain,
	EvmParam::Amount,
	EvmParam::NHash,
	EvmParam::PHash,
	EvmParam::Signature,
	EvmParam::SignatureR,
	EvmParam::SignatureS,
	EvmParam::SignatureV,
	EvmParam::ToChain,
	EvmParam::ToAddress,
	EvmParam::ToAddressBytes,
	EvmParam::ToPayload,
];

impl EvmParam {
	pub fn as_str(&self) -> &'static str {
		match self {
			EvmParam::InputType => "__EVM_INPUT_TYPE__",
			EvmParam::OutputType => "__EVM_OUTPUT_TYPE__",
			EvmParam::TransactionType => "__EVM_TRANSACTION_TYPE__",
			EvmParam::TokenAddress => "__EVM_TOKEN_ADDRESS__",
			EvmParam::TokenDecimals => "__EVM_TOKEN_DECIMALS__",
			EvmParam::GatewayIsDepositAsset => "__EVM_GATEWAY_IS_DEPOSIT_ASSET__",
			EvmParam::GatewayDepositAddress => "__EVM_GATEWAY_DEPOSIT_ADDRESS__",
			EvmParam::TransferWithLogContract => "__EVM_TRANSFER_WITH_LOG_CONTRACT__",
			EvmParam::Account => "__EVM_ACCOUNT__",
			EvmParam::AccountIsContract => "__EVM_ACCOUNT_IS_CONTRACT__",
			EvmParam::Gateway => "__EVM_GATEWAY__",
			EvmParam::Asset => "__EVM_ASSET__",
			EvmParam::Chain => "__EVM_CHAIN__",
			EvmParam::Amount => "__EVM_AMOUNT__",
			EvmParam::NHash => "__EVM_NHASH__",
			EvmParam::PHash => "__EVM_PHASH__",
			EvmParam::Signature => "__EVM_SIGNATURE__",
			EvmParam::SignatureR => "__EVM_SIGNATURE_R__",
			EvmParam::SignatureS => "__EVM_SIGNATURE_S__",
			EvmParam::SignatureV => "__EVM_SIGNATURE_V__",
			EvmParam::ToChain => "__EVM_TO_CHAIN__",
			EvmParam::ToAddress => "__EVM_TO_ADDRESS__",
			EvmParam::ToAddressBytes => "__EVM_TO_ADDRESS_BYTES__",
			EvmParam::ToPayload => "__EVM_TO_PAYLOAD__",
		}
	}

	/// Parameters only valid for the final mint or release call.
	pub fn is_authorization(&self) -> bool {
		matches!(
			self,
			EvmParam::Amount
				| EvmParam::NHash
				| EvmParam::PHash
				| EvmParam::Signature
				| EvmParam::SignatureR
				| EvmParam::SignatureS
				| EvmParam::SignatureV
		)
	}
}

impl fmt::Display for EvmParam {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for EvmParam {
	type Err = PayloadError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		ALL_PARAMS
			.iter()
			.find(|p| p.as_str() == s)
			.copied()
			.ok_or_else(|| PayloadError::invalid(s, "unknown parameter"))
	}
}

/// Kind of chain transaction being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionType {
	Setup,
	Lock,
	Burn,
	Mint,
	Release,
}

impl TransactionType {
	pub fn as_str(&self) -> &'static str {
		match self {
			TransactionType::Setup => "setup",
			TransactionType::Lock => "lock",
			TransactionType::Burn => "burn",
			TransactionType::Mint => "mint",
			TransactionType::Release => "release",
		}
	}

	pub fn is_input(&self) -> bool {
		matches!(self, TransactionType::Lock | TransactionType::Burn)
	}

	pub fn is_output(&self) -> bool {
		matches!(self, TransactionType::Mint | TransactionType::Release)
	}
}

impl FromStr for TransactionType {
	type Err = PayloadError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"setup" => Ok(TransactionType::Setup),
			"lock" => Ok(TransactionType::Lock),
			"burn" => Ok(TransactionType::Burn),
			"mint" => Ok(TransactionType::Mint),
			"release" => Ok(TransactionType::Release),
			other => Err(PayloadError::invalid(
				EvmParam::TransactionType.as_str(),
				format!("unknown transaction type '{}'", other),
			)),
		}
	}
}

/// Lazily computes a parameter. `Ok(None)` means the value is undefined.
pub type ParamResolver =
	Arc<dyn Fn() -> BoxFuture<'static, Result<Option<DynSolValue>, PayloadError>> + Send + Sync>;

#[derive(Clone)]
enum ParamEntry {
	Value(DynSolValue),
	Resolver(ParamResolver),
}

/// Values for the symbolic parameters of one transfer attempt.
///
/// Cheap to clone; resolvers are shared.
#[derive(Clone, Default)]
pub struct ParamContext {
	entries: HashMap<EvmParam, ParamEntry>,
}

impl fmt::Debug for ParamContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut names: Vec<_> = self.entries.keys().map(|p| p.as_str()).collect();
		names.sort_unstable();
		f.debug_struct("ParamContext").field("params", &names).finish()
	}
}

impl ParamContext {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_value(mut self, param: EvmParam, value: DynSolValue) -> Self {
		self.insert_value(param, value);
		self
	}

	pub fn with_resolver<F, Fut>(mut self, param: EvmParam, resolver: F) -> Self
	where
		F: Fn() -> Fut + Send + Sync + 'static,
		Fut: std::future::Future<Output = Result<Option<DynSolValue>, PayloadError>> + Send + 'static,
	{
		self.entries.insert(
			param,
			ParamEntry::Resolver(Arc::new(move || Box::pin(resolver()))),
		);
		self
	}

	pub fn insert_value(&mut self, param: EvmParam, value: DynSolValue) {
		self.entries.insert(param, ParamEntry::Value(value));
	}

	pub fn contains(&self, param: EvmParam) -> bool {
		self.entries.contains_key(&param)
	}

	/// Current value of a parameter, running its resolver if it has one.
	pub async fn get(&self, param: EvmParam) -> Result<Option<DynSolValue>, PayloadError> {
		match self.entries.get(&param) {
			None => Ok(None),
			Some(ParamEntry::Value(value)) => Ok(Some(value.clone())),
			Some(ParamEntry::Resolver(resolver)) => resolver().await,
		}
	}

	/// Like [`get`](Self::get) but an undefined value is an error.
	pub async fn require(&self, param: EvmParam) -> Result<DynSolValue, PayloadError> {
		self.get(param)
			.await?
			.ok_or_else(|| PayloadError::MissingParameter(param.as_str().to_string()))
	}

	pub async fn require_address(&self, param: EvmParam) -> Result<Address, PayloadError> {
		match self.require(param).await? {
			DynSolValue::Address(address) => Ok(address),
			DynSolValue::String(s) => s.parse().map_err(|e| PayloadError::invalid(param.as_str(), e)),
			other => Err(PayloadError::invalid(
				param.as_str(),
				format!("expected an address, got {:?}", other),
			)),
		}
	}

	pub async fn bool_or_false(&self, param: EvmParam) -> Result<bool, PayloadError> {
		Ok(matches!(self.get(param).await?, Some(DynSolValue::Bool(true))))
	}

	pub async fn token_decimals(&self) -> Result<u8, PayloadError> {
		let param = EvmParam::TokenDecimals;
		match self.require(param).await? {
			DynSolValue::Uint(n, _) if n <= U256::from(u8::MAX) => Ok(n.to::<u8>()),
			other => Err(PayloadError::invalid(
				param.as_str(),
				format!("expected decimals, got {:?}", other),
			)),
		}
	}

	pub async fn transaction_type(&self) -> Result<TransactionType, PayloadError> {
		let param = EvmParam::TransactionType;
		match self.require(param).await? {
			DynSolValue::String(s) => s.parse(),
			other => Err(PayloadError::invalid(
				param.as_str(),
				format!("expected a string, got {:?}", other),
			)),
		}
	}

	/// Bytes of a parameter, empty when undefined.
	pub async fn bytes_or_empty(&self, param: EvmParam) -> Result<Vec<u8>, PayloadError> {
		Ok(match self.get(param).await? {
			Some(DynSolValue::Bytes(bytes)) => bytes,
			Some(DynSolValue::FixedBytes(word, size)) => word[..size].to_vec(),
			Some(other) => {
				return Err(PayloadError::invalid(
					param.as_str(),
					format!("expected bytes, got {:?}", other),
				))
			},
			None => Vec::new(),
		})
	}

	/// Context for setup calls: the same values, without the authorization
	/// material and with the transaction type set to `setup`.
	pub fn for_setup(&self) -> Self {
		let mut context = self.clone();
		context.entries.retain(|param, _| !param.is_authorization());
		context.insert_value(
			EvmParam::TransactionType,
			DynSolValue::String(TransactionType::Setup.as_str().to_string()),
		);
		context
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};

	#[test]
	fn test_param_names_round_trip() {
		for param in ALL_PARAMS {
			assert_eq!(param.as_str().parse::<EvmParam>().unwrap(), param);
		}
		assert!("__EVM_UNKNOWN__".parse::<EvmParam>().is_err());
	}

	#[tokio::test]
	async fn test_resolver_invoked_on_each_get() {
		let calls = Arc::new(AtomicUsize::new(0));
		let counter = calls.clone();
		let context = ParamContext::new().with_resolver(EvmParam::Gateway, move || {
			counter.fetch_add(1, Ordering::SeqCst);
			async { Ok(Some(DynSolValue::Address(Address::repeat_byte(0x22)))) }
		});

		assert_eq!(
			context.require_address(EvmParam::Gateway).await.unwrap(),
			Address::repeat_byte(0x22)
		);
		context.get(EvmParam::Gateway).await.unwrap();
		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn test_missing_parameter() {
		let context = ParamContext::new();
		assert!(context.get(EvmParam::Amount).await.unwrap().is_none());
		assert!(matches!(
			context.require(EvmParam::Amount).await,
			Err(PayloadError::MissingParameter(name)) if name == "__EVM_AMOUNT__"
		));
		assert!(!context.bool_or_false(EvmParam::GatewayIsDepositAsset).await.unwrap());
	}

	#[tokio::test]
	async fn test_setup_context_drops_authorization() {
		let context = ParamContext::new()
			.with_value(EvmParam::TransactionType, DynSolValue::String("mint".into()))
			.with_value(EvmParam::Amount, DynSolValue::Uint(U256::from(1), 256))
			.with_value(EvmParam::Signature, DynSolValue::Bytes(vec![1; 65]))
			.with_value(EvmParam::Asset, DynSolValue::String("BTC".into()));

		let setup = context.for_setup();
		assert_eq!(setup.transaction_type().await.unwrap(), TransactionType::Setup);
		assert!(!setup.contains(EvmParam::Amount));
		assert!(!setup.contains(EvmParam::Signature));
		assert!(setup.contains(EvmParam::Asset));
		assert_eq!(context.transaction_type().await.unwrap(), TransactionType::Mint);
	}
}
