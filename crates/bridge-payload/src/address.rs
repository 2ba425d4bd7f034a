//! Address payloads.
//!
//! An address payload names a recipient (or sender) and an amount. Depending
//! on the transaction type and the asset it expands into the matching
//! gateway call, or into nothing when the network pays the address directly.

use crate::approval::parse_amount;
use crate::contract::resolve_value;
use crate::{
	AddressParams, ApprovalParams, ArgValue, ContractArg, ContractParams, EvmParam, ParamContext,
	Payload, PayloadError, TransactionType, TxConfig,
};
use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{Address, U256};
use bridge_types::NetworkConfig;

fn gateway_mint_args() -> Vec<ContractArg> {
	vec![
		ContractArg::new("pHash", "bytes32", EvmParam::PHash).not_in_payload(),
		ContractArg::new("amount", "uint256", EvmParam::Amount).not_in_payload(),
		ContractArg::new("nHash", "bytes32", EvmParam::NHash).not_in_payload(),
		ContractArg::new("sig", "bytes", EvmParam::Signature).not_in_payload(),
	]
}

fn basic_bridge_args(recipient: &ArgValue) -> Vec<ContractArg> {
	vec![
		ContractArg::new("symbol", "string", EvmParam::Asset),
		ContractArg::new("recipient", "address", recipient.clone()),
		ContractArg::new("amount", "uint256", EvmParam::Amount).not_in_payload(),
		ContractArg::new("nHash", "bytes32", EvmParam::NHash).not_in_payload(),
		ContractArg::new("sig", "bytes", EvmParam::Signature).not_in_payload(),
	]
}

fn burn_to_args(to_payload: ArgValue, amount: U256) -> Vec<ContractArg> {
	vec![
		ContractArg::new("recipientAddress", "string", EvmParam::ToAddress),
		ContractArg::new("recipientChain", "string", EvmParam::ToChain),
		ContractArg::new("recipientPayload", "bytes", to_payload),
		ContractArg::new("amount", "uint256", amount),
	]
}

fn call(to: impl Into<ArgValue>, method: &str, args: Vec<ContractArg>) -> ContractParams {
	ContractParams {
		to: to.into(),
		method: method.to_string(),
		args,
		tx_config: TxConfig::default(),
	}
}

async fn is_output_mint(context: &ParamContext) -> Result<bool, PayloadError> {
	Ok(matches!(
		context.get(EvmParam::OutputType).await?,
		Some(DynSolValue::String(s)) if s == TransactionType::Mint.as_str()
	))
}

fn output_call(
	network: &NetworkConfig,
	params: &AddressParams,
	method: &str,
) -> Result<ContractParams, PayloadError> {
	if params.anyone_can_submit {
		let bridge = network.addresses.basic_bridge.ok_or_else(|| {
			PayloadError::Unsupported(format!(
				"{} has no basic bridge for anyone-can-submit {}",
				network.selector, method
			))
		})?;
		return Ok(call(bridge, method, basic_bridge_args(&params.address)));
	}
	Ok(call(EvmParam::Gateway, method, gateway_mint_args()))
}

/// The gateway call behind an address payload, or `None` when the
/// transfer needs no contract call.
pub(crate) async fn contract_from_address(
	network: &NetworkConfig,
	params: &AddressParams,
	context: &ParamContext,
) -> Result<Option<ContractParams>, PayloadError> {
	let amount = parse_amount(params.amount.as_deref(), params.convert_unit, context).await?;
	let require_amount = || {
		amount.ok_or_else(|| PayloadError::MissingParameter("amount".to_string()))
	};

	let contract = match context.transaction_type().await? {
		TransactionType::Lock => {
			let amount = require_amount()?;
			if context.bool_or_false(EvmParam::GatewayIsDepositAsset).await? {
				let mut transfer = call(
					EvmParam::TransferWithLogContract,
					"transferWithLog",
					vec![ContractArg::new("to", "address", EvmParam::GatewayDepositAddress)],
				);
				transfer.tx_config.value = Some(amount);
				transfer
			} else {
				call(
					EvmParam::Gateway,
					"lock",
					burn_to_args(ArgValue::Param(EvmParam::ToPayload), amount),
				)
			}
		},
		TransactionType::Burn => {
			let amount = require_amount()?;
			let to_payload = context.bytes_or_empty(EvmParam::ToPayload).await?;
			if is_output_mint(context).await? || !to_payload.is_empty() {
				call(
					EvmParam::Gateway,
					"burnWithPayload",
					burn_to_args(ArgValue::from(to_payload), amount),
				)
			} else {
				call(
					EvmParam::Gateway,
					"burn",
					vec![
						ContractArg::new("to", "bytes", EvmParam::ToAddressBytes),
						ContractArg::new("amount", "uint256", amount),
					],
				)
			}
		},
		TransactionType::Mint => output_call(network, params, "mint")?,
		TransactionType::Release => {
			if context.bool_or_false(EvmParam::GatewayIsDepositAsset).await? {
				return Ok(None);
			}
			output_call(network, params, "release")?
		},
		TransactionType::Setup => {
			return Err(PayloadError::Unsupported(
				"address payloads cannot be used for setup calls".to_string(),
			))
		},
	};
	Ok(Some(contract))
}

/// Resolved recipient address of the payload.
pub(crate) async fn resolve_address(
	network: &NetworkConfig,
	params: &AddressParams,
	context: &ParamContext,
) -> Result<Address, PayloadError> {
	let missing = || {
		let reason = if params.address == ArgValue::Param(EvmParam::Account) {
			format!("Must connect {} signer", network.selector)
		} else {
			format!("Empty {} recipient", network.selector)
		};
		PayloadError::invalid("address", reason)
	};
	match resolve_value(&params.address, context).await? {
		Some(DynSolValue::Address(address)) => Ok(address),
		Some(DynSolValue::String(text)) if !text.is_empty() => {
			text.parse().map_err(|e| PayloadError::invalid("address", e))
		},
		_ => Err(missing()),
	}
}

/// Approval the gateway needs before a lock or burn, if any.
pub(crate) async fn setup_approval(
	network: &NetworkConfig,
	params: &AddressParams,
	context: &ParamContext,
) -> Result<Option<Payload>, PayloadError> {
	if contract_from_address(network, params, context).await?.is_none() {
		return Ok(None);
	}
	let amount = if params.infinite_approval {
		Some(U256::MAX)
	} else {
		parse_amount(params.amount.as_deref(), params.convert_unit, context).await?
	};
	let Some(amount) = amount else {
		return Ok(None);
	};
	if context.bool_or_false(EvmParam::GatewayIsDepositAsset).await? {
		return Ok(None);
	}

	Ok(Some(Payload::approval(
		network.selector.clone(),
		ApprovalParams {
			token: ArgValue::Param(EvmParam::TokenAddress),
			spender: ArgValue::Param(EvmParam::Gateway),
			amount: Some(amount.to_string()),
			convert_unit: false,
		},
	)))
}
