//! Payload variants.

use crate::EvmParam;
use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{Address, U256};
use bridge_types::ChainTransaction;
use std::collections::{BTreeMap, HashMap};

/// Value of a payload argument before resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
	Literal(DynSolValue),
	Param(EvmParam),
	Undefined,
}

impl ArgValue {
	/// Parses `__EVM_*__` names as parameters and anything else as a string literal.
	pub fn from_text(text: &str) -> Self {
		match text.parse::<EvmParam>() {
			Ok(param) => ArgValue::Param(param),
			Err(_) => ArgValue::Literal(DynSolValue::String(text.to_string())),
		}
	}
}

impl From<EvmParam> for ArgValue {
	fn from(param: EvmParam) -> Self {
		ArgValue::Param(param)
	}
}

impl From<Address> for ArgValue {
	fn from(address: Address) -> Self {
		ArgValue::Literal(DynSolValue::Address(address))
	}
}

impl From<U256> for ArgValue {
	fn from(value: U256) -> Self {
		ArgValue::Literal(DynSolValue::Uint(value, 256))
	}
}

impl From<Vec<u8>> for ArgValue {
	fn from(bytes: Vec<u8>) -> Self {
		ArgValue::Literal(DynSolValue::Bytes(bytes))
	}
}

/// One argument of a contract call.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractArg {
	pub name: String,
	/// Solidity type, e.g. `bytes32`.
	pub ty: String,
	pub value: ArgValue,
	/// Passed to the call but excluded from the payload hash.
	pub not_in_payload: bool,
	/// Included in the payload hash but not passed to the call.
	pub only_in_payload: bool,
}

impl ContractArg {
	pub fn new(name: impl Into<String>, ty: impl Into<String>, value: impl Into<ArgValue>) -> Self {
		Self {
			name: name.into(),
			ty: ty.into(),
			value: value.into(),
			not_in_payload: false,
			only_in_payload: false,
		}
	}

	pub fn not_in_payload(mut self) -> Self {
		self.not_in_payload = true;
		self
	}

	pub fn only_in_payload(mut self) -> Self {
		self.only_in_payload = true;
		self
	}
}

/// Value and gas settings for the submitted transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxConfig {
	pub value: Option<U256>,
	pub gas_limit: Option<u64>,
}

impl TxConfig {
	/// Fields set in `other` take precedence.
	pub fn merge(&self, other: &TxConfig) -> TxConfig {
		TxConfig {
			value: other.value.or(self.value),
			gas_limit: other.gas_limit.or(self.gas_limit),
		}
	}
}

/// Caller-supplied replacements applied when materializing a transaction.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
	/// Argument values by argument name.
	pub args: HashMap<String, DynSolValue>,
	pub tx_config: TxConfig,
}

/// Transfer to or from a plain address; expands to a gateway call as needed.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressParams {
	pub address: ArgValue,
	/// Integer amount, or a decimal amount in whole units with `convert_unit`.
	pub amount: Option<String>,
	/// Submit through the basic bridge so any account can send the output.
	pub anyone_can_submit: bool,
	pub convert_unit: bool,
	pub infinite_approval: bool,
}

impl AddressParams {
	pub fn new(address: impl Into<ArgValue>) -> Self {
		Self {
			address: address.into(),
			amount: None,
			anyone_can_submit: false,
			convert_unit: false,
			infinite_approval: false,
		}
	}
}

/// Arbitrary contract call.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractParams {
	pub to: ArgValue,
	pub method: String,
	pub args: Vec<ContractArg>,
	pub tx_config: TxConfig,
}

/// ERC20 `approve(spender, amount)` on `token`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalParams {
	pub token: ArgValue,
	pub spender: ArgValue,
	pub amount: Option<String>,
	pub convert_unit: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PayloadKind {
	Address(AddressParams),
	Contract(ContractParams),
	Approval(ApprovalParams),
	/// An existing transaction, used to resume from a known deposit.
	Transaction(ChainTransaction),
	/// Only carries a transfer nonce.
	Nonce(U256),
}

impl PayloadKind {
	pub fn name(&self) -> &'static str {
		match self {
			PayloadKind::Address(_) => "address",
			PayloadKind::Contract(_) => "contract",
			PayloadKind::Approval(_) => "approval",
			PayloadKind::Transaction(_) => "transaction",
			PayloadKind::Nonce(_) => "nonce",
		}
	}
}

/// A chain call description plus the named calls that must succeed first.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
	pub chain: String,
	pub kind: PayloadKind,
	pub setup: BTreeMap<String, Payload>,
}

impl Payload {
	pub fn new(chain: impl Into<String>, kind: PayloadKind) -> Self {
		Self {
			chain: chain.into(),
			kind,
			setup: BTreeMap::new(),
		}
	}

	pub fn address(chain: impl Into<String>, params: AddressParams) -> Self {
		Self::new(chain, PayloadKind::Address(params))
	}

	pub fn contract(chain: impl Into<String>, params: ContractParams) -> Self {
		Self::new(chain, PayloadKind::Contract(params))
	}

	pub fn approval(chain: impl Into<String>, params: ApprovalParams) -> Self {
		Self::new(chain, PayloadKind::Approval(params))
	}

	pub fn with_setup(mut self, name: impl Into<String>, payload: Payload) -> Self {
		self.setup.insert(name.into(), payload);
		self
	}
}
