//! Contract-call payloads: argument resolution, payload encoding and calldata.

use crate::{ArgValue, ContractParams, Overrides, ParamContext, PayloadError, TxConfig};
use alloy_dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::{keccak256, Address, B256};
use bridge_types::Transaction;

#[derive(Debug, Clone)]
pub(crate) struct ResolvedArg {
	pub name: String,
	pub ty: DynSolType,
	pub value: Option<DynSolValue>,
	pub not_in_payload: bool,
	pub only_in_payload: bool,
}

/// A contract call with every parameter substituted.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedContract {
	pub chain: String,
	pub to: Option<Address>,
	pub method: String,
	pub args: Vec<ResolvedArg>,
	pub tx_config: TxConfig,
}

pub(crate) async fn resolve_value(
	value: &ArgValue,
	context: &ParamContext,
) -> Result<Option<DynSolValue>, PayloadError> {
	match value {
		ArgValue::Literal(value) => Ok(Some(value.clone())),
		ArgValue::Param(param) => context.get(*param).await,
		ArgValue::Undefined => Ok(None),
	}
}

/// Converts a value to the argument's ABI type where the conversion is lossless.
pub(crate) fn coerce(
	name: &str,
	ty: &DynSolType,
	value: DynSolValue,
) -> Result<DynSolValue, PayloadError> {
	let value = match (ty, value) {
		(DynSolType::String, value @ DynSolValue::String(_)) => value,
		(ty, DynSolValue::String(text)) => ty
			.coerce_str(&text)
			.map_err(|e| PayloadError::invalid(name, e))?,
		(DynSolType::FixedBytes(size), DynSolValue::Bytes(bytes)) if bytes.len() == *size => {
			let mut word = B256::ZERO;
			word[..*size].copy_from_slice(&bytes);
			DynSolValue::FixedBytes(word, *size)
		},
		(DynSolType::Bytes, DynSolValue::FixedBytes(word, size)) => {
			DynSolValue::Bytes(word[..size].to_vec())
		},
		(DynSolType::Uint(bits), DynSolValue::Uint(n, _)) => {
			if n.bit_len() > *bits {
				return Err(PayloadError::invalid(
					name,
					format!("{} does not fit in uint{}", n, bits),
				));
			}
			DynSolValue::Uint(n, *bits)
		},
		(_, value) => value,
	};
	if !ty.matches(&value) {
		return Err(PayloadError::invalid(
			name,
			format!("expected {}, got {:?}", ty.sol_type_name(), value),
		));
	}
	Ok(value)
}

pub(crate) fn resolve_target(
	value: Option<DynSolValue>,
) -> Result<Option<Address>, PayloadError> {
	match value {
		None => Ok(None),
		Some(DynSolValue::Address(address)) => Ok(Some(address)),
		Some(DynSolValue::String(text)) => text
			.parse()
			.map(Some)
			.map_err(|e| PayloadError::invalid("to", e)),
		Some(other) => Err(PayloadError::invalid(
			"to",
			format!("expected an address, got {:?}", other),
		)),
	}
}

pub(crate) async fn resolve_contract(
	chain: &str,
	params: &ContractParams,
	context: &ParamContext,
) -> Result<ResolvedContract, PayloadError> {
	let to = resolve_target(resolve_value(&params.to, context).await?)?;

	let mut args = Vec::with_capacity(params.args.len());
	for arg in &params.args {
		let ty = DynSolType::parse(&arg.ty).map_err(|e| PayloadError::invalid(&arg.name, e))?;
		let value = match resolve_value(&arg.value, context).await? {
			Some(value) => Some(coerce(&arg.name, &ty, value)?),
			None => None,
		};
		args.push(ResolvedArg {
			name: arg.name.clone(),
			ty,
			value,
			not_in_payload: arg.not_in_payload,
			only_in_payload: arg.only_in_payload,
		});
	}

	Ok(ResolvedContract {
		chain: chain.to_string(),
		to,
		method: params.method.clone(),
		args,
		tx_config: params.tx_config.clone(),
	})
}

impl ResolvedContract {
	/// ABI encoding of the arguments that make up the payload hash.
	pub fn payload_bytes(&self) -> Result<(Address, Vec<u8>), PayloadError> {
		let mut values = Vec::new();
		for arg in self.args.iter().filter(|arg| !arg.not_in_payload) {
			let value = arg
				.value
				.clone()
				.ok_or_else(|| PayloadError::MissingParameter(arg.name.clone()))?;
			values.push(value);
		}
		let to = self
			.to
			.ok_or_else(|| PayloadError::MissingParameter("to".to_string()))?;
		Ok((to, DynSolValue::Tuple(values).abi_encode_params()))
	}

	/// Builds the transaction, applying argument overrides by name.
	pub fn materialize(
		mut self,
		chain_id: u64,
		overrides: &Overrides,
	) -> Result<Transaction, PayloadError> {
		for arg in &mut self.args {
			if let Some(value) = overrides.args.get(&arg.name) {
				arg.value = Some(coerce(&arg.name, &arg.ty, value.clone())?);
			}
		}

		let call_args: Vec<&ResolvedArg> = self.args.iter().filter(|a| !a.only_in_payload).collect();
		let mut values = Vec::with_capacity(call_args.len());
		for arg in &call_args {
			let value = arg
				.value
				.clone()
				.ok_or_else(|| PayloadError::MissingParameter(arg.name.clone()))?;
			values.push(value);
		}
		let to = self
			.to
			.ok_or_else(|| PayloadError::MissingParameter("to".to_string()))?;

		let types: Vec<String> = call_args
			.iter()
			.map(|arg| arg.ty.sol_type_name().into_owned())
			.collect();
		let signature = format!("{}({})", self.method, types.join(","));
		let mut data = keccak256(signature.as_bytes())[..4].to_vec();
		data.extend(DynSolValue::Tuple(values).abi_encode_params());

		let tx_config = self.tx_config.merge(&overrides.tx_config);
		Ok(Transaction {
			chain_id,
			to,
			data: data.into(),
			value: tx_config.value.unwrap_or_default(),
			gas_limit: tx_config.gas_limit,
		})
	}

	/// Back to an unresolved description with literal values.
	pub fn into_params(self) -> ContractParams {
		ContractParams {
			to: self
				.to
				.map(|to| ArgValue::Literal(DynSolValue::Address(to)))
				.unwrap_or(ArgValue::Undefined),
			method: self.method,
			args: self
				.args
				.into_iter()
				.map(|arg| crate::ContractArg {
					name: arg.name,
					ty: arg.ty.sol_type_name().into_owned(),
					value: arg.value.map(ArgValue::Literal).unwrap_or(ArgValue::Undefined),
					not_in_payload: arg.not_in_payload,
					only_in_payload: arg.only_in_payload,
				})
				.collect(),
			tx_config: self.tx_config,
		}
	}
}
