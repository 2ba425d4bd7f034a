//! EVM chain adapter.
//!
//! One [`EvmChain`] per configured network composes the network config, the
//! chain access, a [`DepositLocator`] and a [`PayloadResolver`]. Everything
//! the orchestrator needs from a chain goes through it.

use crate::{TransactionSubmitter, TransferError};
use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{hex, Address, B256, U256};
use bridge_account::{EvmGatewayDeriver, GatewayAddressDeriver, GatewayError};
use bridge_delivery::DeliveryService;
use bridge_discovery::{DepositLocator, LocatorError, LookupKind};
use bridge_payload::{EvmParam, ParamContext, Payload, PayloadError, PayloadResolver, TransactionType};
use bridge_types::{
	to_url_base64, without_0x_prefix, ChainTransaction, HasErrorKind, NetworkConfig,
	TransactionHash,
};
use std::sync::Arc;

/// Mint or release authorization returned by the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
	pub amount: U256,
	pub n_hash: B256,
	pub p_hash: B256,
	/// 65-byte `r ‖ s ‖ v` signature.
	pub signature: Vec<u8>,
}

/// Transfer facts used to populate a [`ParamContext`].
#[derive(Debug, Clone)]
pub struct ContextParams {
	pub asset: String,
	pub transaction_type: TransactionType,
	pub input_type: TransactionType,
	pub output_type: TransactionType,
	/// Destination chain of a lock or burn.
	pub to_chain: Option<String>,
	/// Recipient of a lock or burn, as the destination chain writes it.
	pub to_address: Option<String>,
	pub to_payload: Vec<u8>,
	pub gateway_deposit_address: Option<Address>,
	pub authorization: Option<Authorization>,
}

impl ContextParams {
	pub fn new(
		asset: impl Into<String>,
		transaction_type: TransactionType,
		input_type: TransactionType,
		output_type: TransactionType,
	) -> Self {
		Self {
			asset: asset.into(),
			transaction_type,
			input_type,
			output_type,
			to_chain: None,
			to_address: None,
			to_payload: Vec::new(),
			gateway_deposit_address: None,
			authorization: None,
		}
	}
}

fn lookup_error(e: LocatorError) -> PayloadError {
	PayloadError::Lookup {
		kind: e.kind(),
		message: e.to_string(),
	}
}

fn string_value(s: &str) -> DynSolValue {
	DynSolValue::String(s.to_string())
}

pub struct EvmChain {
	network: NetworkConfig,
	delivery: Arc<DeliveryService>,
	locator: Arc<DepositLocator>,
	resolver: Arc<PayloadResolver>,
	deriver: EvmGatewayDeriver,
}

impl EvmChain {
	pub fn new(network: NetworkConfig, delivery: Arc<DeliveryService>) -> Self {
		let locator = Arc::new(DepositLocator::new(network.clone(), delivery.clone()));
		let resolver = Arc::new(PayloadResolver::new(network.clone(), Some(delivery.clone())));
		let deriver = EvmGatewayDeriver::new(network.selector.clone());
		Self {
			network,
			delivery,
			locator,
			resolver,
			deriver,
		}
	}

	pub fn selector(&self) -> &str {
		&self.network.selector
	}

	pub fn network(&self) -> &NetworkConfig {
		&self.network
	}

	pub fn delivery(&self) -> &Arc<DeliveryService> {
		&self.delivery
	}

	pub fn locator(&self) -> &Arc<DepositLocator> {
		&self.locator
	}

	pub fn resolver(&self) -> &Arc<PayloadResolver> {
		&self.resolver
	}

	/// Account transactions are sent from, if a signer serves this chain.
	pub fn signer(&self) -> Option<Address> {
		self.delivery.signer_address(self.network.chain_id)
	}

	/// `0x` followed by 40 hex characters. Mixed-case addresses must carry a
	/// valid EIP-55 checksum.
	pub fn validate_address(&self, address: &str) -> bool {
		let Some(digits) = address.strip_prefix("0x") else {
			return false;
		};
		if digits.len() != 40 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
			return false;
		}
		let has_lower = digits.chars().any(|c| c.is_ascii_lowercase());
		let has_upper = digits.chars().any(|c| c.is_ascii_uppercase());
		if has_lower && has_upper {
			return Address::parse_checksummed(address, None).is_ok();
		}
		true
	}

	/// Checks that a transaction record belongs to this chain and that its
	/// `txid` is the encoding of its hash.
	pub fn validate_transaction(&self, tx: &ChainTransaction) -> Result<(), TransferError> {
		if tx.chain() != self.network.selector {
			return Err(TransferError::Parameter(format!(
				"Transaction is on {}, expected {}",
				tx.chain(),
				self.network.selector
			)));
		}
		let hash = tx.tx_hash();
		let digits = hash.strip_prefix("0x").unwrap_or_default();
		if digits.len() != 64 {
			return Err(TransferError::Parameter(format!(
				"Invalid {} transaction hash: {}",
				self.network.selector, hash
			)));
		}
		let bytes = hex::decode(digits).map_err(|_| {
			TransferError::Parameter(format!(
				"Invalid {} transaction hash: {}",
				self.network.selector, hash
			))
		})?;
		if tx.txid() != to_url_base64(&bytes) {
			return Err(TransferError::Parameter(format!(
				"txid {} does not match transaction hash {}",
				tx.txid(),
				hash
			)));
		}
		Ok(())
	}

	pub fn address_to_bytes(&self, address: &str) -> Result<Vec<u8>, TransferError> {
		if !self.validate_address(address) {
			return Err(TransferError::Parameter(format!(
				"Invalid {} address: {}",
				self.network.selector, address
			)));
		}
		hex::decode(without_0x_prefix(address))
			.map_err(|e| TransferError::Parameter(format!("Invalid address {}: {}", address, e)))
	}

	pub fn transaction_explorer_link(&self, tx: &ChainTransaction) -> Option<String> {
		self.network.transaction_explorer_link(tx.tx_hash())
	}

	pub fn is_deposit_asset(&self, asset: &str) -> bool {
		self.locator.is_deposit_asset(asset)
	}

	pub async fn is_lock_asset(&self, asset: &str) -> Result<bool, TransferError> {
		Ok(self.locator.is_lock_asset(asset).await?)
	}

	pub async fn is_mint_asset(&self, asset: &str) -> Result<bool, TransferError> {
		Ok(self.locator.is_mint_asset(asset).await?)
	}

	/// Balance of `owner` in the asset's smallest unit, the signer when `None`.
	pub async fn get_balance(&self, asset: &str, owner: Option<Address>) -> Result<U256, TransferError> {
		let owner = owner.or_else(|| self.signer()).ok_or_else(|| {
			TransferError::Parameter(format!("Must connect {} signer", self.network.selector))
		})?;
		Ok(self.locator.asset_balance(asset, owner).await?)
	}

	/// Deposit address on this chain for a transfer of its native asset.
	pub fn create_gateway_address(
		&self,
		shard_public_key: &[u8],
		g_hash: &B256,
	) -> Result<String, GatewayError> {
		self.deriver
			.create_gateway_address(&self.network.selector, shard_public_key, g_hash)
	}

	/// Context for a transaction of `params.transaction_type` on this chain.
	///
	/// Registry-backed values (gateway, token and decimals) are resolved
	/// lazily and cached by the locator.
	pub fn build_context(&self, params: &ContextParams) -> ParamContext {
		let mut context = ParamContext::new()
			.with_value(
				EvmParam::TransactionType,
				string_value(params.transaction_type.as_str()),
			)
			.with_value(EvmParam::InputType, string_value(params.input_type.as_str()))
			.with_value(EvmParam::OutputType, string_value(params.output_type.as_str()))
			.with_value(EvmParam::Asset, string_value(&params.asset))
			.with_value(EvmParam::Chain, string_value(&self.network.selector))
			.with_value(
				EvmParam::GatewayIsDepositAsset,
				DynSolValue::Bool(self.is_deposit_asset(&params.asset)),
			)
			.with_value(EvmParam::ToPayload, DynSolValue::Bytes(params.to_payload.clone()));

		if let Some(account) = self.signer() {
			context.insert_value(EvmParam::Account, DynSolValue::Address(account));
		}
		if let Some(contract) = self.network.addresses.transfer_with_log {
			context.insert_value(EvmParam::TransferWithLogContract, DynSolValue::Address(contract));
		}
		if let Some(address) = params.gateway_deposit_address {
			context.insert_value(EvmParam::GatewayDepositAddress, DynSolValue::Address(address));
		}
		if let Some(to_chain) = &params.to_chain {
			context.insert_value(EvmParam::ToChain, string_value(to_chain));
		}
		if let Some(to_address) = &params.to_address {
			context.insert_value(EvmParam::ToAddress, string_value(to_address));
			context.insert_value(
				EvmParam::ToAddressBytes,
				DynSolValue::Bytes(to_address.as_bytes().to_vec()),
			);
		}

		let gateway_kind = match params.transaction_type {
			TransactionType::Lock | TransactionType::Release => LookupKind::LockGateway,
			TransactionType::Burn | TransactionType::Mint | TransactionType::Setup => {
				LookupKind::MintGateway
			},
		};
		let (locator, asset) = (self.locator.clone(), params.asset.clone());
		context = context.with_resolver(EvmParam::Gateway, move || {
			let (locator, asset) = (locator.clone(), asset.clone());
			async move {
				let gateway = locator
					.resolve_gateway_or_asset(&asset, gateway_kind)
					.await
					.map_err(lookup_error)?;
				Ok(Some(DynSolValue::Address(gateway)))
			}
		});

		let (locator, asset) = (self.locator.clone(), params.asset.clone());
		context = context.with_resolver(EvmParam::TokenAddress, move || {
			let (locator, asset) = (locator.clone(), asset.clone());
			async move {
				if locator.is_deposit_asset(&asset) {
					return Ok(None);
				}
				let token = locator.asset_token(&asset).await.map_err(lookup_error)?;
				Ok(Some(DynSolValue::Address(token)))
			}
		});

		let (locator, asset) = (self.locator.clone(), params.asset.clone());
		context = context.with_resolver(EvmParam::TokenDecimals, move || {
			let (locator, asset) = (locator.clone(), asset.clone());
			async move {
				let decimals = locator.asset_decimals(&asset).await.map_err(lookup_error)?;
				Ok(Some(DynSolValue::Uint(U256::from(decimals), 8)))
			}
		});

		if let Some(auth) = &params.authorization {
			add_authorization(&mut context, auth);
		}
		context
	}

	/// Submitter for a payload on this chain.
	pub fn submitter(&self, payload: Payload, context: ParamContext, target: u64) -> TransactionSubmitter {
		TransactionSubmitter::new(
			self.resolver.clone(),
			self.delivery.clone(),
			payload,
			context,
			target,
		)
	}

	/// Waiter for a transaction that is already on chain.
	///
	/// Fails with a not-found error if the chain has no receipt for it.
	pub async fn existing_submitter(
		&self,
		tx: &ChainTransaction,
		target: u64,
	) -> Result<TransactionSubmitter, TransferError> {
		self.validate_transaction(tx)?;
		let hash = TransactionHash(tx.txid_bytes());
		if self
			.delivery
			.get_receipt(&hash, self.network.chain_id)
			.await?
			.is_none()
		{
			return Err(TransferError::TransactionNotFound(format!(
				"{} transaction {}",
				self.network.selector,
				tx.tx_hash()
			)));
		}
		let tx = tx.clone().with_explorer_link(self.transaction_explorer_link(tx));
		Ok(TransactionSubmitter::existing(
			self.network.clone(),
			self.delivery.clone(),
			&tx,
			target,
		))
	}
}

fn add_authorization(context: &mut ParamContext, auth: &Authorization) {
	context.insert_value(EvmParam::Amount, DynSolValue::Uint(auth.amount, 256));
	context.insert_value(EvmParam::NHash, DynSolValue::FixedBytes(auth.n_hash, 32));
	context.insert_value(EvmParam::PHash, DynSolValue::FixedBytes(auth.p_hash, 32));
	context.insert_value(EvmParam::Signature, DynSolValue::Bytes(auth.signature.clone()));
	if auth.signature.len() == 65 {
		let sig = &auth.signature;
		context.insert_value(
			EvmParam::SignatureR,
			DynSolValue::FixedBytes(B256::from_slice(&sig[..32]), 32),
		);
		context.insert_value(
			EvmParam::SignatureS,
			DynSolValue::FixedBytes(B256::from_slice(&sig[32..64]), 32),
		);
		context.insert_value(EvmParam::SignatureV, DynSolValue::Uint(U256::from(sig[64]), 8));
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_sol_types::SolValue;
	use bridge_delivery::mock::MockDelivery;
	use bridge_delivery::DeliveryInterface;
	use bridge_types::{ErrorKind, NativeAsset, NetworkAddresses};
	use std::collections::HashMap;
	use std::time::Duration;

	const REGISTRY: Address = Address::repeat_byte(0x99);
	const GATEWAY: Address = Address::repeat_byte(0x6a);
	const SIGNER: Address = Address::repeat_byte(0x11);
	const MINED: [u8; 32] = [0xaa; 32];

	fn network() -> NetworkConfig {
		NetworkConfig {
			selector: "Ethereum".to_string(),
			chain_id: 1,
			rpc_url: "http://localhost:8545".to_string(),
			is_testnet: true,
			explorer_url: Some("https://etherscan.io".to_string()),
			confirmation_target: 3,
			log_request_limit: None,
			average_confirmation_time: 15,
			native_asset: NativeAsset {
				name: "Ether".to_string(),
				symbol: "ETH".to_string(),
				decimals: 18,
			},
			addresses: NetworkAddresses {
				gateway_registry: REGISTRY,
				basic_bridge: None,
				transfer_with_log: Some(Address::repeat_byte(0x77)),
			},
		}
	}

	/// Registry that maps every asset to the same contract, which reports 8 decimals.
	fn registry_chain() -> MockDelivery {
		MockDelivery::new(1)
			.with_signer(Some(SIGNER))
			.with_head(10, 0)
			.with_receipt(&MINED, 10, true)
			.with_balance(U256::from(5))
			.with_call_handler(|to, _data| {
				if to == REGISTRY {
					Ok(GATEWAY.abi_encode().into())
				} else {
					Ok(U256::from(8).abi_encode().into())
				}
			})
	}

	fn chain() -> (EvmChain, Arc<MockDelivery>) {
		let mock = Arc::new(registry_chain());
		let mut providers: HashMap<u64, Arc<dyn DeliveryInterface>> = HashMap::new();
		providers.insert(1, mock.clone());
		let delivery = Arc::new(DeliveryService::new(providers, Duration::from_secs(7)));
		(EvmChain::new(network(), delivery), mock)
	}

	#[test]
	fn test_validate_address() {
		let (chain, _) = chain();
		assert!(chain.validate_address("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"));
		assert!(chain.validate_address("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"));
		assert!(chain.validate_address("0x5AAEB6053F3E94C9B9A09F33669435E7EF1BEAED"));
		// Last character's case flipped breaks the checksum.
		assert!(!chain.validate_address("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAeD"));
		assert!(!chain.validate_address("9e3feaf5f0483b2e196db31635734f627fdfd254"));
		assert!(!chain.validate_address("0x9e3feaf5"));
		assert!(!chain.validate_address("bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq"));
	}

	#[test]
	fn test_validate_transaction() {
		let (chain, _) = chain();
		let tx = ChainTransaction::from_hash("Ethereum", &MINED, None);
		assert!(chain.validate_transaction(&tx).is_ok());

		let other = ChainTransaction::from_hash("Fantom", &MINED, None);
		assert_eq!(
			chain.validate_transaction(&other).unwrap_err().kind(),
			ErrorKind::ParameterError
		);

		let short = ChainTransaction::from_hash("Ethereum", &[1, 2, 3], None);
		assert!(chain.validate_transaction(&short).is_err());
	}

	#[test]
	fn test_address_to_bytes() {
		let (chain, _) = chain();
		let bytes = chain
			.address_to_bytes("0x9e3feaf5f0483b2e196db31635734f627fdfd254")
			.unwrap();
		assert_eq!(bytes.len(), 20);
		assert_eq!(bytes[0], 0x9e);
		assert!(chain.address_to_bytes("0x12").is_err());
	}

	#[tokio::test]
	async fn test_build_context_resolves_registry_values_once() {
		let (chain, mock) = chain();
		let mut params = ContextParams::new(
			"BTC",
			TransactionType::Mint,
			TransactionType::Lock,
			TransactionType::Mint,
		);
		params.authorization = Some(Authorization {
			amount: U256::from(1000),
			n_hash: B256::repeat_byte(2),
			p_hash: B256::repeat_byte(1),
			signature: [vec![0x0a; 32], vec![0x0b; 32], vec![27]].concat(),
		});
		let context = chain.build_context(&params);

		assert_eq!(context.require_address(EvmParam::Gateway).await.unwrap(), GATEWAY);
		assert_eq!(context.require_address(EvmParam::Gateway).await.unwrap(), GATEWAY);
		assert_eq!(context.require_address(EvmParam::Account).await.unwrap(), SIGNER);
		assert_eq!(context.token_decimals().await.unwrap(), 8);
		assert_eq!(
			context.transaction_type().await.unwrap(),
			TransactionType::Mint
		);
		assert!(!context.bool_or_false(EvmParam::GatewayIsDepositAsset).await.unwrap());
		assert_eq!(
			context.require(EvmParam::SignatureV).await.unwrap(),
			DynSolValue::Uint(U256::from(27), 8)
		);
		assert_eq!(
			context.require(EvmParam::SignatureS).await.unwrap(),
			DynSolValue::FixedBytes(B256::repeat_byte(0x0b), 32)
		);
		// Mint gateway once, then asset lookups and decimals once each.
		let calls = mock.call_count();
		let _ = context.token_decimals().await.unwrap();
		assert_eq!(mock.call_count(), calls);
	}

	#[tokio::test]
	async fn test_native_asset_context() {
		let (chain, _) = chain();
		let mut params = ContextParams::new(
			"ETH",
			TransactionType::Lock,
			TransactionType::Lock,
			TransactionType::Mint,
		);
		params.gateway_deposit_address = Some(Address::repeat_byte(0x42));
		let context = chain.build_context(&params);

		assert!(context.bool_or_false(EvmParam::GatewayIsDepositAsset).await.unwrap());
		assert_eq!(context.get(EvmParam::TokenAddress).await.unwrap(), None);
		assert_eq!(context.token_decimals().await.unwrap(), 18);
		assert_eq!(
			context.require_address(EvmParam::TransferWithLogContract).await.unwrap(),
			Address::repeat_byte(0x77)
		);
		assert_eq!(chain.get_balance("ETH", None).await.unwrap(), U256::from(5));
	}

	#[tokio::test]
	async fn test_existing_submitter_requires_receipt() {
		let (chain, _) = chain();
		let mined = ChainTransaction::from_hash("Ethereum", &MINED, None);
		let waiter = chain.existing_submitter(&mined, 1).await.unwrap();
		let progress = waiter.progress().await;
		assert_eq!(
			progress.transaction.unwrap().explorer_link(),
			Some(format!("https://etherscan.io/tx/0x{}", "aa".repeat(32)).as_str())
		);

		let missing = ChainTransaction::from_hash("Ethereum", &[0xbb; 32], None);
		let err = chain.existing_submitter(&missing, 1).await.err().unwrap();
		assert_eq!(err.kind(), ErrorKind::TransactionNotFound);
	}
}
