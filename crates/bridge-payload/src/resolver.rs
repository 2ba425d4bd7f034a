//! Payload resolution, hashing and materialization.

use crate::address::{contract_from_address, resolve_address, setup_approval};
use crate::approval::{approval_required, contract_from_approval, resolve_approval};
use crate::contract::{resolve_contract, ResolvedContract};
use crate::{ArgValue, EvmParam, Overrides, ParamContext, Payload, PayloadError, PayloadKind};
use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{Address, B256};
use bridge_delivery::DeliveryService;
use bridge_types::{generate_p_hash, NetworkConfig, Transaction};
use std::collections::BTreeMap;
use std::sync::Arc;

/// The parts of a payload the network commits to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPayload {
	/// Recipient, or the contract for contract calls.
	pub to: Address,
	pub to_bytes: Vec<u8>,
	/// ABI encoding of the hashed arguments.
	pub payload: Vec<u8>,
}

impl ResolvedPayload {
	pub fn p_hash(&self) -> B256 {
		generate_p_hash(&self.payload)
	}
}

/// Resolves payloads for one EVM chain.
pub struct PayloadResolver {
	network: NetworkConfig,
	delivery: Option<Arc<DeliveryService>>,
}

impl PayloadResolver {
	pub fn new(network: NetworkConfig, delivery: Option<Arc<DeliveryService>>) -> Self {
		Self { network, delivery }
	}

	pub fn network(&self) -> &NetworkConfig {
		&self.network
	}

	fn check_chain(&self, payload: &Payload) -> Result<(), PayloadError> {
		if payload.chain != self.network.selector {
			return Err(PayloadError::invalid(
				"chain",
				format!(
					"payload is for {}, resolver handles {}",
					payload.chain, self.network.selector
				),
			));
		}
		Ok(())
	}

	/// Substitutes every symbolic parameter with its value from `context`.
	///
	/// Setup payloads are resolved against the setup context.
	pub async fn resolve(&self, payload: &Payload, context: &ParamContext) -> Result<Payload, PayloadError> {
		self.check_chain(payload)?;
		let kind = match &payload.kind {
			PayloadKind::Address(params) => {
				let mut params = params.clone();
				params.address = ArgValue::Literal(DynSolValue::Address(
					resolve_address(&self.network, &params, context).await?,
				));
				PayloadKind::Address(params)
			},
			PayloadKind::Contract(params) => PayloadKind::Contract(
				resolve_contract(&payload.chain, params, context)
					.await?
					.into_params(),
			),
			PayloadKind::Approval(params) => {
				let (token, spender, _) = resolve_approval(params, context).await?;
				let mut params = params.clone();
				params.token = ArgValue::from(token);
				params.spender = ArgValue::from(spender);
				PayloadKind::Approval(params)
			},
			kind @ (PayloadKind::Transaction(_) | PayloadKind::Nonce(_)) => kind.clone(),
		};

		let setup_context = context.for_setup();
		let mut setup = BTreeMap::new();
		for (name, inner) in &payload.setup {
			setup.insert(
				name.clone(),
				Box::pin(self.resolve(inner, &setup_context)).await?,
			);
		}
		Ok(Payload {
			chain: payload.chain.clone(),
			kind,
			setup,
		})
	}

	/// The contract call a payload stands for, with parameters resolved.
	///
	/// `None` for address payloads the network pays out to directly.
	async fn underlying_call(
		&self,
		payload: &Payload,
		context: &ParamContext,
	) -> Result<Option<ResolvedContract>, PayloadError> {
		self.check_chain(payload)?;
		let params = match &payload.kind {
			PayloadKind::Address(params) => {
				match contract_from_address(&self.network, params, context).await? {
					Some(contract) => contract,
					None => return Ok(None),
				}
			},
			PayloadKind::Contract(params) => params.clone(),
			PayloadKind::Approval(params) => contract_from_approval(params, context).await?,
			PayloadKind::Transaction(_) | PayloadKind::Nonce(_) => {
				return Err(PayloadError::Unsupported(format!(
					"{} payloads do not describe a chain call",
					payload.kind.name()
				)))
			},
		};
		resolve_contract(&payload.chain, &params, context).await.map(Some)
	}

	/// Recipient and encoded payload, excluding arguments marked not-in-payload.
	pub async fn compute_payload(
		&self,
		payload: &Payload,
		context: &ParamContext,
	) -> Result<ResolvedPayload, PayloadError> {
		let Some(contract) = self.underlying_call(payload, context).await? else {
			let PayloadKind::Address(params) = &payload.kind else {
				return Err(PayloadError::Unsupported("empty payload".to_string()));
			};
			let to = resolve_address(&self.network, params, context).await?;
			return Ok(ResolvedPayload {
				to,
				to_bytes: to.to_vec(),
				payload: Vec::new(),
			});
		};

		let (mut to, encoded) = contract.payload_bytes()?;
		// A gateway call made on behalf of an address commits to that address.
		if let PayloadKind::Address(params) = &payload.kind {
			let gateway = context.require_address(EvmParam::Gateway).await?;
			if to == gateway {
				to = resolve_address(&self.network, params, context).await?;
			}
		}
		Ok(ResolvedPayload {
			to,
			to_bytes: to.to_vec(),
			payload: encoded,
		})
	}

	/// `pHash` of the payload.
	pub async fn compute_payload_hash(
		&self,
		payload: &Payload,
		context: &ParamContext,
	) -> Result<B256, PayloadError> {
		Ok(self.compute_payload(payload, context).await?.p_hash())
	}

	/// A submittable transaction for the payload.
	pub async fn materialize(
		&self,
		payload: &Payload,
		context: &ParamContext,
		overrides: &Overrides,
	) -> Result<Transaction, PayloadError> {
		let contract = self.underlying_call(payload, context).await?.ok_or_else(|| {
			PayloadError::Unsupported(format!(
				"no transaction needed for a {} release to an address",
				self.network.selector
			))
		})?;
		contract.materialize(self.network.chain_id, overrides)
	}

	/// Named payloads that must be confirmed before `payload`.
	///
	/// For address payloads this includes a token approval when the current
	/// allowance does not cover the amount.
	pub async fn get_setup(
		&self,
		payload: &Payload,
		context: &ParamContext,
	) -> Result<BTreeMap<String, Payload>, PayloadError> {
		self.check_chain(payload)?;
		let mut setup = payload.setup.clone();
		if let PayloadKind::Address(params) = &payload.kind {
			if let Some(approval) = setup_approval(&self.network, params, context).await? {
				if self.approval_required(&approval, context).await? {
					setup.insert("approval".to_string(), approval);
				}
			}
		}
		Ok(setup)
	}

	/// Whether an approval payload still needs to be submitted.
	pub async fn approval_required(
		&self,
		payload: &Payload,
		context: &ParamContext,
	) -> Result<bool, PayloadError> {
		let PayloadKind::Approval(params) = &payload.kind else {
			return Ok(true);
		};
		let chain = self
			.delivery
			.as_deref()
			.map(|delivery| (delivery, self.network.chain_id));
		approval_required(params, context, chain).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{AddressParams, ContractArg, ContractParams, TransactionType, TxConfig};
	use alloy_primitives::{keccak256, U256};
	use alloy_sol_types::SolValue;
	use bridge_delivery::mock::MockDelivery;
	use bridge_types::{NativeAsset, NetworkAddresses};

	const RECIPIENT: Address = Address::repeat_byte(0x42);
	const GATEWAY: Address = Address::repeat_byte(0x6a);
	const TOKEN: Address = Address::repeat_byte(0x70);
	const ACCOUNT: Address = Address::repeat_byte(0x11);

	fn network() -> NetworkConfig {
		NetworkConfig {
			selector: "Ethereum".to_string(),
			chain_id: 1,
			rpc_url: "http://localhost:8545".to_string(),
			is_testnet: true,
			explorer_url: None,
			confirmation_target: 1,
			log_request_limit: None,
			average_confirmation_time: 15,
			native_asset: NativeAsset {
				name: "Ether".to_string(),
				symbol: "ETH".to_string(),
				decimals: 18,
			},
			addresses: NetworkAddresses {
				gateway_registry: Address::repeat_byte(0x99),
				basic_bridge: Some(Address::repeat_byte(0xbb)),
				transfer_with_log: None,
			},
		}
	}

	fn base_context(tx_type: TransactionType) -> ParamContext {
		ParamContext::new()
			.with_value(EvmParam::TransactionType, DynSolValue::String(tx_type.as_str().into()))
			.with_value(EvmParam::OutputType, DynSolValue::String("mint".into()))
			.with_value(EvmParam::Gateway, DynSolValue::Address(GATEWAY))
			.with_value(EvmParam::TokenAddress, DynSolValue::Address(TOKEN))
			.with_value(EvmParam::TokenDecimals, DynSolValue::Uint(U256::from(8), 8))
			.with_value(EvmParam::Asset, DynSolValue::String("BTC".into()))
			.with_value(EvmParam::Account, DynSolValue::Address(ACCOUNT))
	}

	fn with_authorization(context: ParamContext) -> ParamContext {
		context
			.with_value(EvmParam::Amount, DynSolValue::Uint(U256::from(100_000), 256))
			.with_value(EvmParam::PHash, DynSolValue::FixedBytes(B256::repeat_byte(1), 32))
			.with_value(EvmParam::NHash, DynSolValue::FixedBytes(B256::repeat_byte(2), 32))
			.with_value(EvmParam::Signature, DynSolValue::Bytes(vec![3; 65]))
	}

	fn mint_to_recipient() -> Payload {
		Payload::address("Ethereum", AddressParams::new(RECIPIENT))
	}

	#[tokio::test]
	async fn test_mint_to_address_commits_to_recipient() {
		let resolver = PayloadResolver::new(network(), None);
		let resolved = resolver
			.compute_payload(&mint_to_recipient(), &base_context(TransactionType::Mint))
			.await
			.unwrap();

		assert_eq!(resolved.to, RECIPIENT);
		assert_eq!(resolved.to_bytes, RECIPIENT.to_vec());
		assert!(resolved.payload.is_empty());
		assert_eq!(resolved.p_hash(), keccak256([0u8; 0]));
	}

	#[tokio::test]
	async fn test_payload_hash_ignores_authorization_values() {
		let resolver = PayloadResolver::new(network(), None);
		let payload = Payload::contract(
			"Ethereum",
			ContractParams {
				to: ArgValue::from(Address::repeat_byte(0xc0)),
				method: "mintThenSwap".to_string(),
				args: vec![
					ContractArg::new("recipient", "address", RECIPIENT),
					ContractArg::new("minOut", "uint256", U256::from(5)),
					ContractArg::new("amount", "uint256", EvmParam::Amount).not_in_payload(),
					ContractArg::new("nHash", "bytes32", EvmParam::NHash).not_in_payload(),
					ContractArg::new("sig", "bytes", EvmParam::Signature).not_in_payload(),
				],
				tx_config: TxConfig::default(),
			},
		);

		let without = base_context(TransactionType::Mint);
		let with = with_authorization(without.clone());
		let hash_without = resolver.compute_payload_hash(&payload, &without).await.unwrap();
		let hash_with = resolver.compute_payload_hash(&payload, &with).await.unwrap();

		assert_eq!(hash_without, hash_with);
		assert_eq!(hash_with, keccak256((RECIPIENT, U256::from(5)).abi_encode_params()));

		// The call itself still needs the authorization values.
		assert!(resolver
			.materialize(&payload, &without, &Overrides::default())
			.await
			.is_err());
		let tx = resolver
			.materialize(&payload, &with, &Overrides::default())
			.await
			.unwrap();
		assert_eq!(tx.to, Address::repeat_byte(0xc0));
	}

	#[tokio::test]
	async fn test_mint_materializes_gateway_call() {
		let resolver = PayloadResolver::new(network(), None);
		let context = with_authorization(base_context(TransactionType::Mint));
		let tx = resolver
			.materialize(&mint_to_recipient(), &context, &Overrides::default())
			.await
			.unwrap();
		assert_eq!(tx.to, GATEWAY);
		assert_eq!(&tx.data[..4], &keccak256(b"mint(bytes32,uint256,bytes32,bytes)")[..4]);

		let missing = resolver
			.materialize(&mint_to_recipient(), &base_context(TransactionType::Mint), &Overrides::default())
			.await
			.unwrap_err();
		assert_eq!(
			bridge_types::HasErrorKind::kind(&missing),
			bridge_types::ErrorKind::ParameterError
		);
	}

	#[tokio::test]
	async fn test_anyone_can_submit_uses_basic_bridge() {
		let resolver = PayloadResolver::new(network(), None);
		let mut params = AddressParams::new(RECIPIENT);
		params.anyone_can_submit = true;
		let payload = Payload::address("Ethereum", params);

		let context = with_authorization(base_context(TransactionType::Mint));
		let resolved = resolver.compute_payload(&payload, &context).await.unwrap();
		// Not a gateway call, so the payload commits to the bridge contract.
		assert_eq!(resolved.to, Address::repeat_byte(0xbb));
		assert_eq!(resolved.payload, ("BTC".to_string(), RECIPIENT).abi_encode_params());

		let tx = resolver
			.materialize(&payload, &context, &Overrides::default())
			.await
			.unwrap();
		assert_eq!(
			&tx.data[..4],
			&keccak256(b"mint(string,address,uint256,bytes32,bytes)")[..4]
		);
	}

	#[tokio::test]
	async fn test_native_release_needs_no_call() {
		let resolver = PayloadResolver::new(network(), None);
		let context = base_context(TransactionType::Release)
			.with_value(EvmParam::GatewayIsDepositAsset, DynSolValue::Bool(true));
		let resolved = resolver.compute_payload(&mint_to_recipient(), &context).await.unwrap();
		assert_eq!(resolved.to, RECIPIENT);
		assert!(resolver
			.materialize(&mint_to_recipient(), &context, &Overrides::default())
			.await
			.is_err());
	}

	#[tokio::test]
	async fn test_burn_with_convert_unit() {
		let resolver = PayloadResolver::new(network(), None);
		let mut params = AddressParams::new(EvmParam::Account);
		params.amount = Some("0.5".to_string());
		params.convert_unit = true;
		let payload = Payload::address("Ethereum", params);
		let context = base_context(TransactionType::Burn)
			.with_value(EvmParam::ToAddress, DynSolValue::String("bc1qrecipient".into()))
			.with_value(EvmParam::ToChain, DynSolValue::String("Bitcoin".into()));

		let tx = resolver
			.materialize(&payload, &context, &Overrides::default())
			.await
			.unwrap();
		assert_eq!(tx.to, GATEWAY);
		// Output type is mint, so the payload-carrying burn is used.
		assert_eq!(
			&tx.data[..4],
			&keccak256(b"burnWithPayload(string,string,bytes,uint256)")[..4]
		);
		// 0.5 BTC in satoshis, the fourth head word.
		assert_eq!(U256::from_be_slice(&tx.data[4 + 96..4 + 128]), U256::from(50_000_000u64));
	}

	fn resolver_with_allowance(allowance: u64) -> PayloadResolver {
		let chain = MockDelivery::new(1)
			.with_signer(Some(ACCOUNT))
			.with_call_handler(move |to, _data| {
				assert_eq!(to, TOKEN);
				Ok(U256::from(allowance).abi_encode().into())
			});
		let delivery = DeliveryService::from_implementations(
			vec![Box::new(chain)],
			std::time::Duration::from_millis(10),
		);
		PayloadResolver::new(network(), Some(Arc::new(delivery)))
	}

	fn lock_payload() -> Payload {
		let mut params = AddressParams::new(EvmParam::Account);
		params.amount = Some("1000".to_string());
		Payload::address("Ethereum", params)
	}

	#[tokio::test]
	async fn test_setup_requires_approval_when_allowance_short() {
		let context = base_context(TransactionType::Lock)
			.with_value(EvmParam::ToPayload, DynSolValue::Bytes(vec![]));

		let setup = resolver_with_allowance(999)
			.get_setup(&lock_payload(), &context)
			.await
			.unwrap();
		let approval = setup.get("approval").unwrap();
		assert!(matches!(&approval.kind, PayloadKind::Approval(p) if p.amount.as_deref() == Some("1000")));

		let setup = resolver_with_allowance(1000)
			.get_setup(&lock_payload(), &context)
			.await
			.unwrap();
		assert!(setup.is_empty());
	}

	#[tokio::test]
	async fn test_deposit_asset_lock_skips_approval() {
		let context = base_context(TransactionType::Lock)
			.with_value(EvmParam::GatewayIsDepositAsset, DynSolValue::Bool(true))
			.with_value(
				EvmParam::TransferWithLogContract,
				DynSolValue::Address(Address::repeat_byte(0x77)),
			)
			.with_value(
				EvmParam::GatewayDepositAddress,
				DynSolValue::Address(Address::repeat_byte(0x66)),
			);
		let resolver = resolver_with_allowance(0);
		assert!(resolver.get_setup(&lock_payload(), &context).await.unwrap().is_empty());

		let tx = resolver
			.materialize(&lock_payload(), &context, &Overrides::default())
			.await
			.unwrap();
		assert_eq!(tx.to, Address::repeat_byte(0x77));
		assert_eq!(tx.value, U256::from(1000));
	}

	#[tokio::test]
	async fn test_resolve_substitutes_params() {
		let resolver = PayloadResolver::new(network(), None);
		let payload = Payload::address("Ethereum", AddressParams::new(EvmParam::Account));
		let resolved = resolver
			.resolve(&payload, &base_context(TransactionType::Mint))
			.await
			.unwrap();
		assert!(matches!(
			resolved.kind,
			PayloadKind::Address(AddressParams {
				address: ArgValue::Literal(DynSolValue::Address(a)),
				..
			}) if a == ACCOUNT
		));

		let wrong_chain = Payload::address("Polygon", AddressParams::new(RECIPIENT));
		assert!(resolver
			.resolve(&wrong_chain, &base_context(TransactionType::Mint))
			.await
			.is_err());
	}
}
