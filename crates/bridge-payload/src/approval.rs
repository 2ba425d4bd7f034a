//! ERC20 approvals, usually produced as setup for a lock or burn.

use crate::contract::{resolve_target, resolve_value};
use crate::{ApprovalParams, ArgValue, ContractArg, ContractParams, EvmParam, ParamContext, PayloadError, TxConfig};
use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{Address, U256};
use alloy_sol_types::{sol, SolCall};
use bridge_delivery::DeliveryService;
use bridge_types::utils::parse_units;

sol! {
	interface IERC20Allowance {
		function allowance(address owner, address spender) external view returns (uint256);
	}
}

/// Parses a payload amount, shifting by the token decimals when requested.
pub(crate) async fn parse_amount(
	amount: Option<&str>,
	convert_unit: bool,
	context: &ParamContext,
) -> Result<Option<U256>, PayloadError> {
	let Some(amount) = amount else {
		return Ok(None);
	};
	let decimals = if convert_unit {
		context.token_decimals().await?
	} else {
		0
	};
	parse_units(amount, decimals)
		.map(Some)
		.map_err(|e| PayloadError::invalid("amount", e))
}

pub(crate) async fn resolve_approval(
	params: &ApprovalParams,
	context: &ParamContext,
) -> Result<(Address, Address, Option<U256>), PayloadError> {
	let token = resolve_target(resolve_value(&params.token, context).await?)?
		.ok_or_else(|| PayloadError::MissingParameter("token".to_string()))?;
	let spender = resolve_target(resolve_value(&params.spender, context).await?)?
		.ok_or_else(|| PayloadError::MissingParameter("spender".to_string()))?;
	let amount = parse_amount(params.amount.as_deref(), params.convert_unit, context).await?;
	Ok((token, spender, amount))
}

/// `approve(spender, amount)` on the token.
pub(crate) async fn contract_from_approval(
	params: &ApprovalParams,
	context: &ParamContext,
) -> Result<ContractParams, PayloadError> {
	let (token, spender, amount) = resolve_approval(params, context).await?;
	Ok(ContractParams {
		to: ArgValue::from(token),
		method: "approve".to_string(),
		args: vec![
			ContractArg::new("to", "address", spender),
			ContractArg::new(
				"amount",
				"uint256",
				amount.map(ArgValue::from).unwrap_or(ArgValue::Undefined),
			),
		],
		tx_config: TxConfig::default(),
	})
}

/// Whether the account's current allowance falls short of the approval amount.
///
/// Without a known account or chain access the approval is assumed necessary.
pub(crate) async fn approval_required(
	params: &ApprovalParams,
	context: &ParamContext,
	chain: Option<(&DeliveryService, u64)>,
) -> Result<bool, PayloadError> {
	let (token, spender, amount) = resolve_approval(params, context).await?;
	let Some(amount) = amount else {
		return Ok(false);
	};
	let account = match context.get(EvmParam::Account).await? {
		Some(DynSolValue::Address(account)) => account,
		_ => return Ok(true),
	};
	let Some((delivery, chain_id)) = chain else {
		return Ok(true);
	};

	let call = IERC20Allowance::allowanceCall {
		owner: account,
		spender,
	};
	let output = delivery
		.call(token, call.abi_encode().into(), chain_id)
		.await?;
	let allowance = IERC20Allowance::allowanceCall::abi_decode_returns(&output, true)
		.map_err(|e| PayloadError::Lookup {
			kind: bridge_types::ErrorKind::NetworkError,
			message: format!("Invalid allowance response from {}: {}", token, e),
		})?
		._0;

	tracing::debug!(%token, %spender, %allowance, %amount, "Checked allowance");
	Ok(allowance < amount)
}
