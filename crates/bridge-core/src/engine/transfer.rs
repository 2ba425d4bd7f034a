//! End-to-end transfer orchestration.
//!
//! A transfer runs in fixed order: derive the deposit address (native
//! deposits only), submit or locate the input, wait for its confirmations,
//! submit it to the network and wait for the signature, then submit the
//! output unless an earlier run already did. Every step checks the
//! cancellation token and reports progress on the event bus.

use crate::chain::{Authorization, ContextParams, EvmChain};
use crate::engine::event_bus::EventBus;
use crate::{TransactionSubmitter, TransferError};
use alloy_primitives::{Address, B256, U256};
use bridge_discovery::{decode_input_events, InputKind, OutputKind};
use bridge_network::{CrossChainParams, NetworkInterface, NetworkTxSubmitter, TxOutput};
use bridge_payload::{Overrides, ParamContext, Payload, PayloadKind, ResolvedPayload, TransactionType};
use bridge_types::{
	burn_and_mint_selector, generate_g_hash, generate_n_hash, generate_s_hash, generate_sig_hash,
	mint_selector, release_selector, truncate_id, ChainTransaction, ChainTransactionProgress,
	ErrorKind, HasErrorKind, InputChainTransaction, TransactionHash, TransferEvent, TransferStage,
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Confirmations awaited on output and setup transactions.
const OUTPUT_CONFIRMATIONS: u64 = 1;

/// What to transfer and where.
#[derive(Debug, Clone)]
pub struct TransferRequest {
	pub asset: String,
	/// Input on the origin chain. A `transaction` payload resumes from a
	/// known deposit.
	pub from: Payload,
	/// Output on the host chain.
	pub to: Payload,
	/// Transfer nonce, zero when `None`.
	pub nonce: Option<B256>,
}

/// Deposit address and the shard key it was derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayDeposit {
	pub address: String,
	pub shard_public_key: Vec<u8>,
}

/// A transfer with its kinds, selector and hashes fixed.
#[derive(Debug, Clone)]
pub struct PreparedTransfer {
	pub asset: String,
	pub selector: String,
	pub input_type: TransactionType,
	pub output_type: TransactionType,
	pub input: Payload,
	pub output: Payload,
	pub nonce: B256,
	pub resolved: ResolvedPayload,
	pub p_hash: B256,
	pub g_hash: B256,
	pub gateway: Option<GatewayDeposit>,
}

impl PreparedTransfer {
	fn input_kind(&self) -> InputKind {
		match self.input_type {
			TransactionType::Burn => InputKind::Burn,
			_ => InputKind::Lock,
		}
	}

	fn output_kind(&self) -> OutputKind {
		match self.output_type {
			TransactionType::Release => OutputKind::Release,
			_ => OutputKind::Mint,
		}
	}

	fn recipient(&self) -> String {
		self.resolved.to.to_checksum(None)
	}
}

/// Drives transfers from one chain to another.
pub struct TransferOrchestrator {
	network: Arc<dyn NetworkInterface>,
	from: Arc<EvmChain>,
	to: Arc<EvmChain>,
	event_bus: EventBus,
	poll_interval: Duration,
	/// Deposit confirmations; the network's target when `None`.
	confirmations: Option<u64>,
}

impl TransferOrchestrator {
	pub fn new(
		network: Arc<dyn NetworkInterface>,
		from: Arc<EvmChain>,
		to: Arc<EvmChain>,
		event_bus: EventBus,
		poll_interval: Duration,
	) -> Self {
		Self {
			network,
			from,
			to,
			event_bus,
			poll_interval,
			confirmations: None,
		}
	}

	pub fn with_confirmations(mut self, confirmations: Option<u64>) -> Self {
		self.confirmations = confirmations;
		self
	}

	pub fn event_bus(&self) -> &EventBus {
		&self.event_bus
	}

	fn check_cancelled(cancel: &CancellationToken) -> Result<(), TransferError> {
		if cancel.is_cancelled() {
			return Err(TransferError::Cancelled);
		}
		Ok(())
	}

	async fn transfer_types(&self, asset: &str) -> Result<(TransactionType, TransactionType), TransferError> {
		let input_type = if self.from.is_lock_asset(asset).await? {
			TransactionType::Lock
		} else if self.from.is_mint_asset(asset).await? {
			TransactionType::Burn
		} else {
			return Err(TransferError::Parameter(format!(
				"{} is not supported on {}",
				asset,
				self.from.selector()
			)));
		};
		let output_type = if self.to.is_lock_asset(asset).await? {
			TransactionType::Release
		} else if self.to.is_mint_asset(asset).await? {
			TransactionType::Mint
		} else {
			return Err(TransferError::Parameter(format!(
				"{} is not supported on {}",
				asset,
				self.to.selector()
			)));
		};
		Ok((input_type, output_type))
	}

	fn selector(
		&self,
		asset: &str,
		input_type: TransactionType,
		output_type: TransactionType,
	) -> Result<String, TransferError> {
		match (input_type, output_type) {
			(TransactionType::Lock, TransactionType::Mint) => Ok(mint_selector(asset, self.to.selector())),
			(TransactionType::Burn, TransactionType::Release) => {
				Ok(release_selector(asset, self.from.selector()))
			},
			(TransactionType::Burn, TransactionType::Mint) => Ok(burn_and_mint_selector(
				asset,
				self.from.selector(),
				self.to.selector(),
			)),
			_ => Err(TransferError::Parameter(format!(
				"Cannot {} {} on {} and {} it on {}",
				input_type.as_str(),
				asset,
				self.from.selector(),
				output_type.as_str(),
				self.to.selector()
			))),
		}
	}

	fn output_context(&self, prepared: &PreparedTransfer, authorization: Option<Authorization>) -> ParamContext {
		let mut params = ContextParams::new(
			prepared.asset.clone(),
			prepared.output_type,
			prepared.input_type,
			prepared.output_type,
		);
		params.authorization = authorization;
		self.to.build_context(&params)
	}

	fn input_context(&self, prepared: &PreparedTransfer) -> Result<ParamContext, TransferError> {
		let mut params = ContextParams::new(
			prepared.asset.clone(),
			prepared.input_type,
			prepared.input_type,
			prepared.output_type,
		);
		params.to_chain = Some(self.to.selector().to_string());
		params.to_address = Some(prepared.recipient());
		params.to_payload = prepared.resolved.payload.clone();
		if let Some(gateway) = &prepared.gateway {
			let address = Address::from_str(&gateway.address)
				.map_err(|e| TransferError::Internal(format!("Invalid gateway address: {}", e)))?;
			params.gateway_deposit_address = Some(address);
		}
		Ok(self.from.build_context(&params))
	}

	/// Fixes the transfer kinds, selector and hashes.
	#[instrument(skip_all, fields(asset = %request.asset, from = %self.from.selector(), to = %self.to.selector()))]
	pub async fn prepare(&self, request: TransferRequest) -> Result<PreparedTransfer, TransferError> {
		if request.from.chain != self.from.selector() || request.to.chain != self.to.selector() {
			return Err(TransferError::Parameter(format!(
				"Payloads are for {} -> {}, orchestrator handles {} -> {}",
				request.from.chain,
				request.to.chain,
				self.from.selector(),
				self.to.selector()
			)));
		}
		let (input_type, output_type) = self.transfer_types(&request.asset).await?;
		let selector = self.selector(&request.asset, input_type, output_type)?;
		let nonce = request.nonce.unwrap_or_default();

		let mut prepared = PreparedTransfer {
			asset: request.asset,
			selector,
			input_type,
			output_type,
			input: request.from,
			output: request.to,
			nonce,
			resolved: ResolvedPayload {
				to: Address::ZERO,
				to_bytes: Vec::new(),
				payload: Vec::new(),
			},
			p_hash: B256::ZERO,
			g_hash: B256::ZERO,
			gateway: None,
		};

		let context = self.output_context(&prepared, None);
		prepared.resolved = self
			.to
			.resolver()
			.compute_payload(&prepared.output, &context)
			.await?;
		prepared.p_hash = prepared.resolved.p_hash();
		prepared.g_hash = self.g_hash(&prepared, &nonce);

		tracing::info!(
			selector = %prepared.selector,
			g_hash = %truncate_id(&prepared.g_hash.to_string()),
			"Prepared transfer"
		);
		Ok(prepared)
	}

	fn g_hash(&self, prepared: &PreparedTransfer, nonce: &B256) -> B256 {
		let s_hash = generate_s_hash(&mint_selector(&prepared.asset, self.to.selector()));
		generate_g_hash(&prepared.p_hash, &s_hash, &prepared.resolved.to_bytes, nonce)
	}

	/// Whether the input is a native-asset transfer to a derived deposit address.
	pub fn uses_gateway_address(&self, prepared: &PreparedTransfer) -> bool {
		prepared.input_type == TransactionType::Lock && self.from.is_deposit_asset(&prepared.asset)
	}

	/// Derives the deposit address for the transfer and records it.
	pub async fn gateway_address(&self, prepared: &mut PreparedTransfer) -> Result<String, TransferError> {
		if !self.uses_gateway_address(prepared) {
			return Err(TransferError::Parameter(format!(
				"{} deposits of {} do not use a gateway address",
				self.from.selector(),
				prepared.asset
			)));
		}
		let shard_public_key = self.network.select_shard(&prepared.asset).await?;
		let address = self
			.from
			.create_gateway_address(&shard_public_key, &prepared.g_hash)?;
		tracing::info!(selector = %prepared.selector, %address, "Derived gateway address");
		self.event_bus
			.publish(TransferEvent::GatewayAddress {
				selector: prepared.selector.clone(),
				address: address.clone(),
			})
			.ok();
		prepared.gateway = Some(GatewayDeposit {
			address: address.clone(),
			shard_public_key,
		});
		Ok(address)
	}

	/// Deposits made by a transaction on the origin chain.
	pub async fn deposit_from_transaction(
		&self,
		prepared: &PreparedTransfer,
		tx: &ChainTransaction,
	) -> Result<Vec<InputChainTransaction>, TransferError> {
		self.from.validate_transaction(tx)?;
		let receipt = self
			.from
			.delivery()
			.get_receipt(&TransactionHash(tx.txid_bytes()), self.from.network().chain_id)
			.await?
			.ok_or_else(|| {
				TransferError::TransactionNotFound(format!(
					"{} transaction {}",
					self.from.selector(),
					tx.tx_hash()
				))
			})?;
		Ok(decode_input_events(
			self.from.network(),
			&prepared.asset,
			&receipt,
			prepared.input_kind(),
		)?)
	}

	/// Returns the transfer's deposits, submitting the input first if it has
	/// not been made yet.
	#[instrument(skip_all, fields(selector = %prepared.selector))]
	pub async fn submit_input(
		&self,
		prepared: &mut PreparedTransfer,
		cancel: &CancellationToken,
	) -> Result<Vec<InputChainTransaction>, TransferError> {
		if let PayloadKind::Transaction(tx) = &prepared.input.kind {
			return self.deposit_from_transaction(prepared, tx).await;
		}

		if self.uses_gateway_address(prepared) {
			if prepared.gateway.is_none() {
				self.gateway_address(prepared).await?;
			}
		} else if let Some(existing) = self
			.from
			.locator()
			.find_existing_input(prepared.input_kind(), &prepared.asset, prepared.nonce)
			.await?
		{
			tracing::info!(tx_hash = %existing.tx.tx_hash(), "Input already submitted");
			return Ok(vec![existing]);
		}

		let context = self.input_context(prepared)?;
		self.run_setup(&self.from, prepared, &prepared.input, &context, cancel)
			.await?;

		Self::check_cancelled(cancel)?;
		let submitter = self.from.submitter(prepared.input.clone(), context, OUTPUT_CONFIRMATIONS);
		let progress = self
			.submit_and_wait(submitter, &prepared.selector, TransferStage::Input, cancel)
			.await?;
		let tx = progress
			.transaction
			.ok_or_else(|| TransferError::Internal("Input has no transaction".to_string()))?;
		self.deposit_from_transaction(prepared, &tx).await
	}

	async fn run_setup(
		&self,
		chain: &EvmChain,
		prepared: &PreparedTransfer,
		payload: &Payload,
		context: &ParamContext,
		cancel: &CancellationToken,
	) -> Result<(), TransferError> {
		let setup = chain.resolver().get_setup(payload, context).await?;
		let setup_context = context.for_setup();
		for (name, step) in setup {
			Self::check_cancelled(cancel)?;
			tracing::info!(setup = %name, chain = %chain.selector(), "Submitting setup transaction");
			let submitter = chain.submitter(step, setup_context.clone(), OUTPUT_CONFIRMATIONS);
			self.submit_and_wait(submitter, &prepared.selector, TransferStage::Setup, cancel)
				.await?;
		}
		Ok(())
	}

	async fn submit_and_wait(
		&self,
		submitter: TransactionSubmitter,
		selector: &str,
		stage: TransferStage,
		cancel: &CancellationToken,
	) -> Result<ChainTransactionProgress, TransferError> {
		let forwarder = self.forward_progress(submitter.subscribe(), selector, stage);
		let result = async {
			submitter.submit(&Overrides::default()).await?;
			submitter.wait(None, cancel).await
		}
		.await;
		drop(submitter);
		forwarder.await.ok();
		Ok(result?)
	}

	async fn wait_existing(
		&self,
		submitter: TransactionSubmitter,
		selector: &str,
		stage: TransferStage,
		cancel: &CancellationToken,
	) -> Result<ChainTransactionProgress, TransferError> {
		let forwarder = self.forward_progress(submitter.subscribe(), selector, stage);
		let result = submitter.wait(None, cancel).await;
		drop(submitter);
		forwarder.await.ok();
		Ok(result?)
	}

	fn forward_progress(
		&self,
		mut updates: broadcast::Receiver<ChainTransactionProgress>,
		selector: &str,
		stage: TransferStage,
	) -> JoinHandle<()> {
		let bus = self.event_bus.clone();
		let selector = selector.to_string();
		tokio::spawn(async move {
			loop {
				match updates.recv().await {
					Ok(progress) => {
						bus.publish(TransferEvent::Progress {
							selector: selector.clone(),
							stage,
							progress,
						})
						.ok();
					},
					Err(broadcast::error::RecvError::Lagged(_)) => continue,
					Err(broadcast::error::RecvError::Closed) => break,
				}
			}
		})
	}

	fn forward_network_progress(
		&self,
		mut updates: watch::Receiver<ChainTransactionProgress>,
		selector: &str,
	) -> JoinHandle<()> {
		let bus = self.event_bus.clone();
		let selector = selector.to_string();
		tokio::spawn(async move {
			while updates.changed().await.is_ok() {
				let progress = updates.borrow_and_update().clone();
				bus.publish(TransferEvent::Progress {
					selector: selector.clone(),
					stage: TransferStage::Network,
					progress,
				})
				.ok();
			}
		})
	}

	async fn deposit_target(&self) -> u64 {
		if let Some(confirmations) = self.confirmations {
			return confirmations;
		}
		match self.network.confirmation_target(self.from.selector()).await {
			Ok(target) => target,
			Err(e) => {
				let fallback = self.from.network().confirmation_target;
				tracing::warn!(error = %e, fallback, "Failed to fetch confirmation target");
				fallback
			},
		}
	}

	async fn network_params(
		&self,
		prepared: &PreparedTransfer,
		deposit: &InputChainTransaction,
	) -> Result<CrossChainParams, TransferError> {
		let txid = deposit.tx.txid_bytes();
		let txindex: u32 = deposit.tx.txindex().parse().map_err(|_| {
			TransferError::Parameter(format!("Invalid txindex {}", deposit.tx.txindex()))
		})?;
		let amount = U256::from_str(&deposit.amount)
			.map_err(|_| TransferError::Parameter(format!("Invalid amount {}", deposit.amount)))?;

		// Native deposits are identified by the transfer nonce and the gateway
		// key; contract deposits by the nonce in their event.
		let (nonce, gpubkey) = if self.uses_gateway_address(prepared) {
			let shard = match &prepared.gateway {
				Some(gateway) => gateway.shard_public_key.clone(),
				None => self.network.select_shard(&prepared.asset).await?,
			};
			(prepared.nonce, shard)
		} else {
			let bytes = deposit.nonce_bytes();
			if bytes.len() != 32 {
				return Err(TransferError::Parameter(format!(
					"Deposit nonce must be 32 bytes, got {}",
					bytes.len()
				)));
			}
			(B256::from_slice(&bytes), Vec::new())
		};

		Ok(CrossChainParams {
			n_hash: generate_n_hash(&nonce, &txid, txindex),
			g_hash: self.g_hash(prepared, &nonce),
			txid,
			txindex,
			amount,
			payload: prepared.resolved.payload.clone(),
			p_hash: prepared.p_hash,
			to: prepared.recipient(),
			nonce,
			gpubkey,
		})
	}

	fn authorization(
		&self,
		prepared: &PreparedTransfer,
		params: &CrossChainParams,
		output: &TxOutput,
	) -> Result<(Authorization, B256), TransferError> {
		let signature = output
			.signature()
			.ok_or_else(|| TransferError::Internal("Network output has no signature".to_string()))?;
		let amount = output.amount().unwrap_or(params.amount);
		let sig_hash = output.sig_hash().unwrap_or_else(|| {
			let s_hash = generate_s_hash(&mint_selector(&prepared.asset, self.to.selector()));
			generate_sig_hash(
				&params.p_hash,
				amount,
				&prepared.resolved.to_bytes,
				&s_hash,
				&params.n_hash,
			)
		});
		Ok((
			Authorization {
				amount,
				n_hash: params.n_hash,
				p_hash: params.p_hash,
				signature,
			},
			sig_hash,
		))
	}

	fn publish_completed(&self, prepared: &PreparedTransfer, output: &ChainTransaction) {
		tracing::info!(selector = %prepared.selector, tx_hash = %output.tx_hash(), "Transfer complete");
		self.event_bus
			.publish(TransferEvent::Completed {
				selector: prepared.selector.clone(),
				output: output.clone(),
			})
			.ok();
	}

	/// Takes a detected deposit through to the output transaction.
	///
	/// Publishes a `Failed` event before returning any error.
	#[instrument(skip_all, fields(selector = %prepared.selector, deposit = %deposit.tx.tx_hash()))]
	pub async fn run(
		&self,
		prepared: &PreparedTransfer,
		deposit: &InputChainTransaction,
		cancel: &CancellationToken,
	) -> Result<ChainTransaction, TransferError> {
		match self.run_steps(prepared, deposit, cancel).await {
			Ok(output) => Ok(output),
			Err(e) => {
				tracing::warn!(error = %e, kind = e.kind().as_str(), "Transfer failed");
				self.event_bus
					.publish(TransferEvent::Failed {
						selector: prepared.selector.clone(),
						kind: e.kind(),
						error: e.to_string(),
					})
					.ok();
				Err(e)
			},
		}
	}

	async fn run_steps(
		&self,
		prepared: &PreparedTransfer,
		deposit: &InputChainTransaction,
		cancel: &CancellationToken,
	) -> Result<ChainTransaction, TransferError> {
		Self::check_cancelled(cancel)?;
		self.event_bus
			.publish(TransferEvent::DepositDetected {
				selector: prepared.selector.clone(),
				deposit: deposit.clone(),
			})
			.ok();

		let target = self.deposit_target().await;
		let waiter = self.from.existing_submitter(&deposit.tx, target).await?;
		self.wait_existing(waiter, &prepared.selector, TransferStage::Input, cancel)
			.await?;

		Self::check_cancelled(cancel)?;
		let params = self.network_params(prepared, deposit).await?;
		let submitter = NetworkTxSubmitter::new(
			self.network.clone(),
			&prepared.selector,
			&params,
			self.poll_interval,
		)?;
		tracing::info!(hash = %truncate_id(submitter.hash()), "Submitting to network");
		let forwarder = self.forward_network_progress(submitter.subscribe(), &prepared.selector);
		let result = async {
			submitter.submit().await?;
			submitter.wait(cancel).await
		}
		.await;
		drop(submitter);
		forwarder.await.ok();
		let response = result?;
		let output = response.tx.output().cloned().unwrap_or_default();

		Self::check_cancelled(cancel)?;
		if prepared.output_type == TransactionType::Release && self.to.is_deposit_asset(&prepared.asset) {
			// The network sends native releases itself.
			let txid = output.txid().ok_or_else(|| {
				TransferError::Internal("Network output has no release transaction".to_string())
			})?;
			let tx = ChainTransaction::from_hash(self.to.selector(), &txid, None);
			let tx = tx.clone().with_explorer_link(self.to.transaction_explorer_link(&tx));
			self.publish_completed(prepared, &tx);
			return Ok(tx);
		}

		let (authorization, sig_hash) = self.authorization(prepared, &params, &output)?;
		if let Some(existing) = self
			.to
			.locator()
			.find_existing_output(prepared.output_kind(), &prepared.asset, params.n_hash, Some(sig_hash))
			.await?
		{
			self.event_bus
				.publish(TransferEvent::OutputAlreadyDone {
					selector: prepared.selector.clone(),
					transaction: existing.clone(),
				})
				.ok();
			self.publish_completed(prepared, &existing);
			return Ok(existing);
		}

		Self::check_cancelled(cancel)?;
		let context = self.output_context(prepared, Some(authorization));
		self.run_setup(&self.to, prepared, &prepared.output, &context, cancel)
			.await?;

		Self::check_cancelled(cancel)?;
		let submitter = self
			.to
			.submitter(prepared.output.clone(), context, OUTPUT_CONFIRMATIONS);
		let progress = self
			.submit_and_wait(submitter, &prepared.selector, TransferStage::Output, cancel)
			.await?;
		let tx = progress
			.transaction
			.ok_or_else(|| TransferError::Internal("Output has no transaction".to_string()))?;
		self.publish_completed(prepared, &tx);
		Ok(tx)
	}

	/// Polls the origin chain until a native deposit reaches the derived
	/// gateway address.
	///
	/// Returns every deposit the gateway has received, oldest first, and
	/// publishes `DepositDetected` for each. Every deposit is minted by its own
	/// `run`. RPC failures are logged and retried until `cancel` fires.
	pub async fn wait_for_deposits(
		&self,
		prepared: &PreparedTransfer,
		cancel: &CancellationToken,
	) -> Result<Vec<InputChainTransaction>, TransferError> {
		let gateway = prepared
			.gateway
			.as_ref()
			.ok_or_else(|| TransferError::Parameter("Gateway address not derived".to_string()))?;
		let address = Address::from_str(&gateway.address)
			.map_err(|e| TransferError::Parameter(format!("Invalid gateway address: {}", e)))?;
		loop {
			Self::check_cancelled(cancel)?;
			match self
				.from
				.locator()
				.find_gateway_deposits(&prepared.asset, address)
				.await
			{
				Ok(deposits) if !deposits.is_empty() => {
					tracing::info!(gateway = %gateway.address, count = deposits.len(), "Found gateway deposits");
					for deposit in &deposits {
						self.event_bus
							.publish(TransferEvent::DepositDetected {
								selector: prepared.selector.clone(),
								deposit: deposit.clone(),
							})
							.ok();
					}
					return Ok(deposits);
				},
				Ok(_) => tracing::debug!(gateway = %gateway.address, "No deposit yet"),
				Err(e) if e.kind() == ErrorKind::NetworkError => {
					tracing::warn!(gateway = %gateway.address, error = %e, "Failed to query gateway deposits");
				},
				Err(e) => return Err(e.into()),
			}
			tokio::select! {
				_ = cancel.cancelled() => return Err(TransferError::Cancelled),
				_ = tokio::time::sleep(self.poll_interval) => {},
			}
		}
	}

	/// Prepares, submits or locates the input, and runs the first deposit.
	pub async fn execute(
		&self,
		request: TransferRequest,
		cancel: &CancellationToken,
	) -> Result<ChainTransaction, TransferError> {
		let mut prepared = self.prepare(request).await?;
		let deposits = self.submit_input(&mut prepared, cancel).await?;
		if deposits.len() > 1 {
			tracing::warn!(count = deposits.len(), "Input made more than one deposit, using the first");
		}
		let deposit = deposits
			.first()
			.ok_or_else(|| TransferError::Internal("No deposit found".to_string()))?;
		self.run(&prepared, deposit, cancel).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::hex;
	use alloy_sol_types::{SolCall, SolEvent, SolValue};
	use async_trait::async_trait;
	use bridge_delivery::mock::MockDelivery;
	use bridge_delivery::{DeliveryInterface, DeliveryService};
	use bridge_discovery::contracts::{IGatewayRegistry, IMintGateway, ITransferWithLog};
	use bridge_network::{NetworkError, QueryTxResponse, TransactionInput};
	use bridge_payload::AddressParams;
	use bridge_types::pack::PackValue;
	use bridge_types::{
		to_url_base64, ChainTransactionStatus, ErrorKind, Log, NativeAsset, NetworkAddresses,
		NetworkConfig,
	};
	use serde_json::json;
	use std::collections::HashMap;
	use std::sync::Mutex;

	const REGISTRY: Address = Address::repeat_byte(0x99);
	const GATEWAY: Address = Address::repeat_byte(0x6a);
	const RECIPIENT: Address = Address::repeat_byte(0x42);
	const DEPOSIT: [u8; 32] = [0xd0; 32];
	const OUTPUT: [u8; 32] = [0xcc; 32];
	const GENERATOR: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

	/// EVM chain whose registry knows every asset as a mint asset only.
	/// `spent` is what the gateway's `status(sigHash)` returns.
	fn chain(chain_id: u64, spent: bool) -> MockDelivery {
		MockDelivery::new(chain_id)
			.with_head(20, 0)
			.with_receipt(&DEPOSIT, 10, true)
			.mine_submitted(10, true)
			.with_call_handler(move |to, data| {
				let selector: [u8; 4] = data[..4].try_into().unwrap();
				let output = if to == REGISTRY {
					let lock_lookup = selector == IGatewayRegistry::getLockAssetBySymbolCall::SELECTOR
						|| selector == IGatewayRegistry::getLockGatewayBySymbolCall::SELECTOR;
					if lock_lookup {
						Address::ZERO.abi_encode()
					} else {
						GATEWAY.abi_encode()
					}
				} else if selector == IMintGateway::statusCall::SELECTOR {
					spent.abi_encode()
				} else {
					U256::from(18).abi_encode()
				};
				Ok(output.into())
			})
	}

	#[derive(Default)]
	struct MockNetwork {
		submitted: Mutex<Vec<TransactionInput>>,
		/// Output returned once the transaction is done.
		output: serde_json::Value,
	}

	#[async_trait]
	impl NetworkInterface for MockNetwork {
		async fn submit_tx(&self, tx: &TransactionInput) -> Result<(), NetworkError> {
			self.submitted.lock().unwrap().push(tx.clone());
			Ok(())
		}
		async fn query_tx(&self, tx_hash: &str) -> Result<QueryTxResponse, NetworkError> {
			serde_json::from_value(json!({
				"tx": {
					"hash": tx_hash,
					"version": "1",
					"selector": "ETH/toFantom",
					"out": { "v": self.output },
				},
				"txStatus": "done",
			}))
			.map_err(|e| NetworkError::InvalidResponse(e.to_string()))
		}
		async fn select_shard(&self, _asset: &str) -> Result<Vec<u8>, NetworkError> {
			Ok(hex::decode(GENERATOR).unwrap())
		}
		async fn confirmation_target(&self, _chain: &str) -> Result<u64, NetworkError> {
			Ok(5)
		}
	}

	fn network_config(selector: &str, chain_id: u64, symbol: &str) -> NetworkConfig {
		NetworkConfig {
			selector: selector.to_string(),
			chain_id,
			rpc_url: "http://localhost:8545".to_string(),
			is_testnet: true,
			explorer_url: Some(format!("https://{}.example", selector.to_lowercase())),
			confirmation_target: 3,
			log_request_limit: Some(1000),
			average_confirmation_time: 15,
			native_asset: NativeAsset {
				name: symbol.to_string(),
				symbol: symbol.to_string(),
				decimals: 18,
			},
			addresses: NetworkAddresses {
				gateway_registry: REGISTRY,
				basic_bridge: None,
				transfer_with_log: Some(Address::repeat_byte(0x77)),
			},
		}
	}

	struct Setup {
		orchestrator: TransferOrchestrator,
		network: Arc<MockNetwork>,
		ethereum: Arc<MockDelivery>,
		fantom: Arc<MockDelivery>,
	}

	/// Ethereum <-> Fantom, with ETH native to Ethereum.
	fn setup(eth_to_fantom: bool, spent: bool, output: serde_json::Value) -> Setup {
		setup_with(eth_to_fantom, output, chain(1, spent), chain(250, spent))
	}

	fn setup_with(
		eth_to_fantom: bool,
		output: serde_json::Value,
		ethereum: MockDelivery,
		fantom: MockDelivery,
	) -> Setup {
		let ethereum = Arc::new(ethereum);
		let fantom = Arc::new(fantom);
		let mut providers: HashMap<u64, Arc<dyn DeliveryInterface>> = HashMap::new();
		providers.insert(1, ethereum.clone());
		providers.insert(250, fantom.clone());
		let delivery = Arc::new(DeliveryService::new(providers, Duration::from_secs(7)));

		let eth_chain = Arc::new(EvmChain::new(network_config("Ethereum", 1, "ETH"), delivery.clone()));
		let ftm_chain = Arc::new(EvmChain::new(network_config("Fantom", 250, "FTM"), delivery));
		let (from, to) = if eth_to_fantom {
			(eth_chain, ftm_chain)
		} else {
			(ftm_chain, eth_chain)
		};
		let network = Arc::new(MockNetwork {
			output,
			..Default::default()
		});
		let orchestrator = TransferOrchestrator::new(
			network.clone(),
			from,
			to,
			EventBus::new(256),
			Duration::from_secs(15),
		)
		.with_confirmations(Some(1));
		Setup {
			orchestrator,
			network,
			ethereum,
			fantom,
		}
	}

	fn request(from: &str, to: &str, nonce: Option<B256>) -> TransferRequest {
		let mut input = AddressParams::new(Address::repeat_byte(0x11));
		input.amount = Some("100000".to_string());
		TransferRequest {
			asset: "ETH".to_string(),
			from: Payload::address(from, input),
			to: Payload::address(to, AddressParams::new(RECIPIENT)),
			nonce,
		}
	}

	fn deposit(chain: &str) -> InputChainTransaction {
		InputChainTransaction {
			tx: ChainTransaction::from_hash(chain, &DEPOSIT, None),
			asset: "ETH".to_string(),
			amount: "100000".to_string(),
			nonce: to_url_base64(B256::repeat_byte(5)),
			to_recipient: None,
			to_chain: None,
			to_payload: None,
		}
	}

	fn signed_output() -> serde_json::Value {
		json!({
			"amount": "99000",
			"sig": to_url_base64([7u8; 65]),
			"sighash": to_url_base64([8u8; 32]),
			"revert": "",
		})
	}

	fn drain(rx: &mut broadcast::Receiver<TransferEvent>) -> Vec<TransferEvent> {
		let mut events = Vec::new();
		while let Ok(event) = rx.try_recv() {
			events.push(event);
		}
		events
	}

	#[tokio::test]
	async fn test_prepare_lock_and_mint() {
		let s = setup(true, false, signed_output());
		let prepared = s
			.orchestrator
			.prepare(request("Ethereum", "Fantom", None))
			.await
			.unwrap();
		assert_eq!(prepared.selector, "ETH/toFantom");
		assert_eq!(prepared.input_type, TransactionType::Lock);
		assert_eq!(prepared.output_type, TransactionType::Mint);
		// Every gateway mint argument is excluded from the payload.
		assert!(prepared.resolved.payload.is_empty());
		assert_eq!(prepared.resolved.to, RECIPIENT);
		assert!(s.orchestrator.uses_gateway_address(&prepared));
	}

	#[tokio::test]
	async fn test_gateway_address_is_deterministic_per_nonce() {
		let s = setup(true, false, signed_output());
		let mut rx = s.orchestrator.event_bus().subscribe();

		let mut first = s
			.orchestrator
			.prepare(request("Ethereum", "Fantom", Some(B256::ZERO)))
			.await
			.unwrap();
		let mut again = first.clone();
		let a = s.orchestrator.gateway_address(&mut first).await.unwrap();
		let b = s.orchestrator.gateway_address(&mut again).await.unwrap();
		assert_eq!(a, b);
		assert!(a.starts_with("0x") && a.len() == 42);

		let mut nonce = [0u8; 32];
		nonce[0] = 1;
		let mut other = s
			.orchestrator
			.prepare(request("Ethereum", "Fantom", Some(B256::from(nonce))))
			.await
			.unwrap();
		assert_ne!(other.g_hash, first.g_hash);
		assert_ne!(s.orchestrator.gateway_address(&mut other).await.unwrap(), a);

		let events = drain(&mut rx);
		assert_eq!(events.len(), 3);
		assert!(matches!(&events[0], TransferEvent::GatewayAddress { address, .. } if *address == a));
	}

	#[tokio::test(start_paused = true)]
	async fn test_run_mints_after_signature() {
		let s = setup(true, false, signed_output());
		let mut rx = s.orchestrator.event_bus().subscribe();
		let prepared = s
			.orchestrator
			.prepare(request("Ethereum", "Fantom", None))
			.await
			.unwrap();

		let output = s
			.orchestrator
			.run(&prepared, &deposit("Ethereum"), &CancellationToken::new())
			.await
			.unwrap();
		assert_eq!(output.chain(), "Fantom");
		assert_eq!(output.tx_hash(), format!("0x{}", "cc".repeat(32)));

		// One mint on Fantom carrying the network's signature.
		let submitted = s.fantom.submitted();
		assert_eq!(submitted.len(), 1);
		assert_eq!(submitted[0].to, GATEWAY);
		assert!(s.ethereum.submitted().is_empty());

		// Native deposits commit to the transfer nonce and the shard key.
		let network_tx = s.network.submitted.lock().unwrap()[0].clone();
		assert_eq!(network_tx.selector, "ETH/toFantom");
		let n_hash = generate_n_hash(&B256::ZERO, &DEPOSIT, 0);
		assert_eq!(
			network_tx.input.field("nhash"),
			Some(&PackValue::Bytes(n_hash.to_vec()))
		);
		assert_eq!(
			network_tx.input.field("gpubkey"),
			Some(&PackValue::Bytes(hex::decode(GENERATOR).unwrap()))
		);

		let events = drain(&mut rx);
		assert!(matches!(events.first(), Some(TransferEvent::DepositDetected { .. })));
		assert!(matches!(events.last(), Some(TransferEvent::Completed { .. })));
		let stages: Vec<_> = events
			.iter()
			.filter_map(|e| match e {
				TransferEvent::Progress { stage, progress, .. } => Some((*stage, progress.status)),
				_ => None,
			})
			.collect();
		assert!(stages.contains(&(TransferStage::Input, ChainTransactionStatus::Done)));
		assert!(stages.contains(&(TransferStage::Network, ChainTransactionStatus::Done)));
		assert!(stages.contains(&(TransferStage::Output, ChainTransactionStatus::Done)));
	}

	#[tokio::test(start_paused = true)]
	async fn test_run_skips_output_already_spent() {
		let s = setup(true, true, signed_output());
		let mut rx = s.orchestrator.event_bus().subscribe();
		let prepared = s
			.orchestrator
			.prepare(request("Ethereum", "Fantom", None))
			.await
			.unwrap();

		let output = s
			.orchestrator
			.run(&prepared, &deposit("Ethereum"), &CancellationToken::new())
			.await
			.unwrap();
		assert!(output.is_unknown());
		assert!(s.fantom.submitted().is_empty());
		assert!(drain(&mut rx)
			.iter()
			.any(|e| matches!(e, TransferEvent::OutputAlreadyDone { .. })));
	}

	#[tokio::test(start_paused = true)]
	async fn test_native_release_uses_network_txid() {
		let mut output = signed_output();
		output["txid"] = json!(to_url_base64([0xee; 32]));
		let s = setup(false, false, output);
		let prepared = s
			.orchestrator
			.prepare(request("Fantom", "Ethereum", None))
			.await
			.unwrap();
		assert_eq!(prepared.selector, "ETH/fromFantom");
		assert_eq!(prepared.input_type, TransactionType::Burn);
		assert_eq!(prepared.output_type, TransactionType::Release);

		let release = s
			.orchestrator
			.run(&prepared, &deposit("Fantom"), &CancellationToken::new())
			.await
			.unwrap();
		assert_eq!(release.chain(), "Ethereum");
		assert_eq!(release.tx_hash(), format!("0x{}", "ee".repeat(32)));
		assert_eq!(
			release.explorer_link(),
			Some(format!("https://ethereum.example/tx/0x{}", "ee".repeat(32)).as_str())
		);
		assert!(s.ethereum.submitted().is_empty());

		// Contract deposits commit to the nonce from their event.
		let network_tx = s.network.submitted.lock().unwrap()[0].clone();
		assert_eq!(
			network_tx.input.field("nonce"),
			Some(&PackValue::Bytes(vec![5u8; 32]))
		);
		assert_eq!(network_tx.input.field("gpubkey"), Some(&PackValue::Bytes(vec![])));
	}

	#[tokio::test]
	async fn test_cancelled_run_reports_failure() {
		let s = setup(true, false, signed_output());
		let mut rx = s.orchestrator.event_bus().subscribe();
		let prepared = s
			.orchestrator
			.prepare(request("Ethereum", "Fantom", None))
			.await
			.unwrap();
		let cancel = CancellationToken::new();
		cancel.cancel();

		let err = s
			.orchestrator
			.run(&prepared, &deposit("Ethereum"), &cancel)
			.await
			.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Cancelled);
		assert!(s.network.submitted.lock().unwrap().is_empty());
		match drain(&mut rx).pop() {
			Some(TransferEvent::Failed { kind, .. }) => assert_eq!(kind, ErrorKind::Cancelled),
			other => panic!("unexpected event {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_missing_deposit_transaction() {
		let s = setup(true, false, signed_output());
		let prepared = s
			.orchestrator
			.prepare(request("Ethereum", "Fantom", None))
			.await
			.unwrap();
		let unknown = ChainTransaction::from_hash("Ethereum", &[0xab; 32], None);
		let err = s
			.orchestrator
			.deposit_from_transaction(&prepared, &unknown)
			.await
			.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::TransactionNotFound);
	}

	#[tokio::test(start_paused = true)]
	async fn test_wait_for_deposits_polls_until_cancelled() {
		let s = setup(true, false, signed_output());
		let mut prepared = s
			.orchestrator
			.prepare(request("Ethereum", "Fantom", None))
			.await
			.unwrap();
		let cancel = CancellationToken::new();

		let err = s
			.orchestrator
			.wait_for_deposits(&prepared, &cancel)
			.await
			.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::ParameterError);

		s.orchestrator.gateway_address(&mut prepared).await.unwrap();
		let stop = cancel.clone();
		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_secs(40)).await;
			stop.cancel();
		});
		let err = s
			.orchestrator
			.wait_for_deposits(&prepared, &cancel)
			.await
			.unwrap_err();
		assert!(matches!(err, TransferError::Cancelled));
	}

	fn transferred_log(gateway: Address, tx_byte: u8) -> Log {
		let data = ITransferWithLog::LogTransferred {
			from: Address::repeat_byte(0x11),
			to: gateway,
			amount: U256::from(100_000),
		}
		.encode_log_data();
		Log {
			address: Address::repeat_byte(0x77),
			topics: data.topics().to_vec(),
			data: data.data,
			transaction_hash: Some(TransactionHash(vec![tx_byte; 32])),
			block_number: Some(15),
		}
	}

	#[tokio::test(start_paused = true)]
	async fn test_wait_for_deposits_survives_rpc_errors_and_reports_each_deposit() {
		let ethereum = chain(1, false).failing_log_queries(1);
		let s = setup_with(true, signed_output(), ethereum, chain(250, false));
		let mut prepared = s
			.orchestrator
			.prepare(request("Ethereum", "Fantom", None))
			.await
			.unwrap();
		let gateway = s.orchestrator.gateway_address(&mut prepared).await.unwrap();
		let gateway = Address::from_str(&gateway).unwrap();

		// The first query fails, later ones find nothing until cancelled.
		let cancel = CancellationToken::new();
		let stop = cancel.clone();
		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_secs(40)).await;
			stop.cancel();
		});
		let err = s
			.orchestrator
			.wait_for_deposits(&prepared, &cancel)
			.await
			.unwrap_err();
		assert!(matches!(err, TransferError::Cancelled));
		assert!(s.ethereum.filters().len() >= 2);

		s.ethereum.insert_log(transferred_log(gateway, 0xd1));
		s.ethereum.insert_log(transferred_log(Address::repeat_byte(0x56), 0xd2));
		s.ethereum.insert_log(transferred_log(gateway, 0xd3));
		let mut rx = s.orchestrator.event_bus().subscribe();
		let deposits = s
			.orchestrator
			.wait_for_deposits(&prepared, &CancellationToken::new())
			.await
			.unwrap();
		let hashes: Vec<_> = deposits.iter().map(|d| d.tx.txid_bytes()).collect();
		assert_eq!(hashes, vec![vec![0xd1; 32], vec![0xd3; 32]]);

		let detected: Vec<_> = drain(&mut rx)
			.into_iter()
			.filter_map(|e| match e {
				TransferEvent::DepositDetected { deposit, .. } => Some(deposit.tx.txid_bytes()),
				_ => None,
			})
			.collect();
		assert_eq!(detected, hashes);
	}
}
