//! Gateway lookups and existing-transaction discovery for one chain.

use crate::cache::LookupCache;
use crate::contracts::{IERC20Metadata, IGatewayRegistry, ILockGateway, IMintGateway};
use crate::events::{decode_deposit_log, DepositEvent};
use crate::LocatorError;
use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::{SolCall, SolEvent, SolValue};
use bridge_delivery::DeliveryService;
use bridge_types::{
	generate_s_hash, mint_selector, truncate_id, ChainTransaction, InputChainTransaction, Log,
	LogFilter, NetworkConfig, TransactionHash,
};
use std::fmt;
use std::sync::Arc;
use tracing::instrument;

/// Contract kinds held by the gateway registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupKind {
	MintGateway,
	LockGateway,
	/// The wrapped token minted on this chain.
	MintAsset,
	/// The token native to this chain.
	LockAsset,
}

impl LookupKind {
	fn calldata(&self, asset_hash: B256) -> Vec<u8> {
		match self {
			LookupKind::MintGateway => {
				IGatewayRegistry::getMintGatewayBySymbolCall { assetHash: asset_hash }.abi_encode()
			},
			LookupKind::LockGateway => {
				IGatewayRegistry::getLockGatewayBySymbolCall { assetHash: asset_hash }.abi_encode()
			},
			LookupKind::MintAsset => {
				IGatewayRegistry::getRenAssetBySymbolCall { assetHash: asset_hash }.abi_encode()
			},
			LookupKind::LockAsset => {
				IGatewayRegistry::getLockAssetBySymbolCall { assetHash: asset_hash }.abi_encode()
			},
		}
	}
}

impl fmt::Display for LookupKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			LookupKind::MintGateway => "mint gateway",
			LookupKind::LockGateway => "lock gateway",
			LookupKind::MintAsset => "mint asset",
			LookupKind::LockAsset => "lock asset",
		};
		f.write_str(name)
	}
}

/// Host-chain side of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
	Mint,
	Release,
}

/// Origin-chain side of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
	Lock,
	Burn,
}

/// Reads gateway state on a single EVM chain.
///
/// Registry addresses and token decimals are cached for the lifetime of the
/// locator. Balances and logs are always read fresh.
pub struct DepositLocator {
	network: NetworkConfig,
	delivery: Arc<DeliveryService>,
	contracts: LookupCache<(String, LookupKind), Address>,
	decimals: LookupCache<String, u8>,
}

impl DepositLocator {
	pub fn new(network: NetworkConfig, delivery: Arc<DeliveryService>) -> Self {
		Self {
			network,
			delivery,
			contracts: LookupCache::new(),
			decimals: LookupCache::new(),
		}
	}

	pub fn network(&self) -> &NetworkConfig {
		&self.network
	}

	pub fn delivery(&self) -> &Arc<DeliveryService> {
		&self.delivery
	}

	async fn read(&self, to: Address, data: Vec<u8>, what: &str) -> Result<Vec<u8>, LocatorError> {
		self.delivery
			.call(to, data.into(), self.network.chain_id)
			.await
			.map(|output| output.to_vec())
			.map_err(|e| {
				LocatorError::Network(format!(
					"Failed to read {} on {}: {}",
					what, self.network.selector, e
				))
			})
	}

	async fn lookup_registry(&self, asset: &str, kind: LookupKind) -> Result<Address, LocatorError> {
		let asset_hash = generate_s_hash(&mint_selector(asset, &self.network.selector));
		let what = format!("{} for {}", kind, asset);
		let output = self
			.read(self.network.addresses.gateway_registry, kind.calldata(asset_hash), &what)
			.await?;
		let address = Address::abi_decode(&output, true)
			.map_err(|e| LocatorError::Decode(format!("Invalid {} response: {}", what, e)))?;
		if address.is_zero() {
			return Err(LocatorError::AssetNotSupported {
				asset: asset.to_string(),
				chain: self.network.selector.clone(),
			});
		}
		tracing::debug!(chain = %self.network.selector, %asset, %kind, %address, "Resolved registry entry");
		Ok(address)
	}

	/// Registry lookup of a gateway or token contract. Zero addresses mean
	/// the asset is not supported.
	pub async fn resolve_gateway_or_asset(
		&self,
		asset: &str,
		kind: LookupKind,
	) -> Result<Address, LocatorError> {
		self.contracts
			.get_or_try_init((asset.to_string(), kind), || self.lookup_registry(asset, kind))
			.await
	}

	pub async fn mint_gateway(&self, asset: &str) -> Result<Address, LocatorError> {
		self.resolve_gateway_or_asset(asset, LookupKind::MintGateway).await
	}

	pub async fn lock_gateway(&self, asset: &str) -> Result<Address, LocatorError> {
		self.resolve_gateway_or_asset(asset, LookupKind::LockGateway).await
	}

	/// True for the chain's native asset.
	pub fn is_deposit_asset(&self, asset: &str) -> bool {
		asset == self.network.native_asset.symbol
	}

	async fn has_entry(&self, asset: &str, kind: LookupKind) -> Result<bool, LocatorError> {
		match self.resolve_gateway_or_asset(asset, kind).await {
			Ok(_) => Ok(true),
			Err(LocatorError::AssetNotSupported { .. }) => Ok(false),
			Err(e) => Err(e),
		}
	}

	/// Whether the asset originates on this chain.
	pub async fn is_lock_asset(&self, asset: &str) -> Result<bool, LocatorError> {
		if self.is_deposit_asset(asset) {
			return Ok(true);
		}
		self.has_entry(asset, LookupKind::LockAsset).await
	}

	/// Whether this chain hosts a wrapped version of the asset.
	pub async fn is_mint_asset(&self, asset: &str) -> Result<bool, LocatorError> {
		self.has_entry(asset, LookupKind::MintAsset).await
	}

	/// The ERC20 contract representing the asset on this chain.
	pub async fn asset_token(&self, asset: &str) -> Result<Address, LocatorError> {
		if !self.is_deposit_asset(asset) && self.is_lock_asset(asset).await? {
			return self.resolve_gateway_or_asset(asset, LookupKind::LockAsset).await;
		}
		if self.is_mint_asset(asset).await? {
			return self.resolve_gateway_or_asset(asset, LookupKind::MintAsset).await;
		}
		Err(LocatorError::AssetNotSupported {
			asset: asset.to_string(),
			chain: self.network.selector.clone(),
		})
	}

	pub async fn asset_decimals(&self, asset: &str) -> Result<u8, LocatorError> {
		if self.is_deposit_asset(asset) {
			return Ok(self.network.native_asset.decimals);
		}
		self.decimals
			.get_or_try_init(asset.to_string(), || async {
				let token = self.asset_token(asset).await?;
				let output = self
					.read(token, IERC20Metadata::decimalsCall {}.abi_encode(), "decimals")
					.await?;
				let decimals = IERC20Metadata::decimalsCall::abi_decode_returns(&output, true)
					.map_err(|e| LocatorError::Decode(format!("Invalid decimals: {}", e)))?
					._0;
				if decimals > U256::from(u8::MAX) {
					return Err(LocatorError::Decode(format!(
						"Decimals out of range for {}: {}",
						asset, decimals
					)));
				}
				Ok(decimals.to::<u8>())
			})
			.await
	}

	/// Balance of `owner` in the asset's smallest unit.
	pub async fn asset_balance(&self, asset: &str, owner: Address) -> Result<U256, LocatorError> {
		if self.is_deposit_asset(asset) {
			return Ok(self.delivery.get_balance(owner, self.network.chain_id).await?);
		}
		let token = self.asset_token(asset).await?;
		let output = self
			.read(
				token,
				IERC20Metadata::balanceOfCall { owner }.abi_encode(),
				"balanceOf",
			)
			.await?;
		Ok(IERC20Metadata::balanceOfCall::abi_decode_returns(&output, true)
			.map_err(|e| LocatorError::Decode(format!("Invalid balance: {}", e)))?
			._0)
	}

	/// Logs for one event over the configured lookback window.
	pub async fn get_past_logs(
		&self,
		address: Address,
		event_signature: B256,
		topics: [Option<B256>; 3],
	) -> Result<Vec<Log>, LocatorError> {
		let latest = self.delivery.get_block_number(self.network.chain_id).await?;
		let from_block = match self.network.log_request_limit {
			Some(limit) if limit > 0 => latest.saturating_sub(limit - 1),
			_ => 0,
		};
		let filter = LogFilter {
			address,
			event_signature,
			topics,
			from_block,
			to_block: latest,
		};
		let logs = self.delivery.get_logs(&filter, self.network.chain_id).await?;
		Ok(logs
			.into_iter()
			.filter(|log| log.topics.first() == Some(&event_signature))
			.collect())
	}

	fn chain_transaction(&self, hash: &TransactionHash) -> ChainTransaction {
		let tx = ChainTransaction::from_hash(self.network.selector.clone(), &hash.0, None);
		let link = self.network.transaction_explorer_link(tx.tx_hash());
		tx.with_explorer_link(link)
	}

	fn first_transaction(&self, logs: &[Log], event: &str) -> Option<ChainTransaction> {
		if logs.len() > 1 {
			tracing::warn!(
				chain = %self.network.selector,
				count = logs.len(),
				"Found more than one {} log",
				event
			);
		}
		logs.iter()
			.find_map(|log| log.transaction_hash.as_ref())
			.map(|hash| self.chain_transaction(hash))
	}

	async fn gateway_status(&self, gateway: Address, sig_hash: B256) -> Result<bool, LocatorError> {
		let output = self
			.read(
				gateway,
				IMintGateway::statusCall { sigHash: sig_hash }.abi_encode(),
				"gateway status",
			)
			.await?;
		Ok(IMintGateway::statusCall::abi_decode_returns(&output, true)
			.map_err(|e| LocatorError::Decode(format!("Invalid status: {}", e)))?
			._0)
	}

	/// Looks for a mint or release already made for `n_hash`.
	///
	/// Returns `Some` with an unknown transaction (empty hash) when the
	/// gateway reports `sig_hash` as used but no log is in range, and `None`
	/// when the output has not happened.
	#[instrument(skip_all, fields(chain = %self.network.selector, asset = %asset, n_hash = %truncate_id(&n_hash.to_string())))]
	pub async fn find_existing_output(
		&self,
		kind: OutputKind,
		asset: &str,
		n_hash: B256,
		sig_hash: Option<B256>,
	) -> Result<Option<ChainTransaction>, LocatorError> {
		let (gateway, signature, event) = match kind {
			OutputKind::Mint => (
				self.mint_gateway(asset).await?,
				IMintGateway::LogMint::SIGNATURE_HASH,
				"mint",
			),
			OutputKind::Release => (
				self.lock_gateway(asset).await?,
				ILockGateway::LogRelease::SIGNATURE_HASH,
				"release",
			),
		};

		let logs = self
			.get_past_logs(gateway, signature, [None, None, Some(n_hash)])
			.await?;
		if let Some(tx) = self.first_transaction(&logs, event) {
			return Ok(Some(tx));
		}

		let Some(sig_hash) = sig_hash else {
			return Ok(None);
		};
		if !self.gateway_status(gateway, sig_hash).await? {
			return Ok(None);
		}
		// Older gateways indexed the signature hash in the nHash position.
		let logs = self
			.get_past_logs(gateway, signature, [None, None, Some(sig_hash)])
			.await?;
		let tx = self
			.first_transaction(&logs, event)
			.unwrap_or_else(|| ChainTransaction::unknown(self.network.selector.clone()));
		tracing::info!(tx_hash = %tx.tx_hash(), "Output already submitted");
		Ok(Some(tx))
	}

	/// Looks for a lock or burn already made with `nonce`.
	#[instrument(skip_all, fields(chain = %self.network.selector, asset = %asset))]
	pub async fn find_existing_input(
		&self,
		kind: InputKind,
		asset: &str,
		nonce: B256,
	) -> Result<Option<InputChainTransaction>, LocatorError> {
		let gateway = match kind {
			InputKind::Burn => self.mint_gateway(asset).await?,
			// Native deposits carry no nonce to search by.
			InputKind::Lock if self.is_deposit_asset(asset) => return Ok(None),
			InputKind::Lock => self.lock_gateway(asset).await?,
		};

		for event in DepositEvent::for_input(kind) {
			if *event == DepositEvent::Transferred {
				continue;
			}
			let logs = self
				.get_past_logs(gateway, event.signature_hash(), [Some(nonce), None, None])
				.await?;
			if logs.len() > 1 {
				tracing::warn!(count = logs.len(), "Found more than one input log for nonce");
			}
			if let Some(log) = logs.first() {
				return decode_deposit_log(&self.network, asset, *event, log).map(Some);
			}
		}
		Ok(None)
	}

	/// Native deposits sent to `gateway` through the transfer-with-log contract.
	#[instrument(skip_all, fields(chain = %self.network.selector, %gateway))]
	pub async fn find_gateway_deposits(
		&self,
		asset: &str,
		gateway: Address,
	) -> Result<Vec<InputChainTransaction>, LocatorError> {
		let contract = self.network.addresses.transfer_with_log.ok_or_else(|| {
			LocatorError::AssetNotSupported {
				asset: asset.to_string(),
				chain: self.network.selector.clone(),
			}
		})?;
		let event = DepositEvent::Transferred;
		let logs = self
			.get_past_logs(contract, event.signature_hash(), [None, Some(gateway.into_word()), None])
			.await?;
		logs.iter()
			.map(|log| decode_deposit_log(&self.network, asset, event, log))
			.collect()
	}
}
