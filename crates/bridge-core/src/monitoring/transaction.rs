//! Submission and confirmation tracking for chain transactions.
//!
//! A submitter owns the state of one transaction: `Ready` while it is being
//! prepared, `Confirming` while confirmations accumulate, then `Done` or
//! `Reverted`.
//! Every change is broadcast to subscribers. If the chain replaces the
//! pending transaction (same sender nonce, different hash), tracking moves to
//! the replacement and the old handle is reported as `replaced`.

use crate::SubmitError;
use bridge_delivery::DeliveryService;
use bridge_payload::{Overrides, ParamContext, Payload, PayloadResolver};
use bridge_types::{
	truncate_id, ChainTransaction, ChainTransactionProgress, ChainTransactionStatus,
	NetworkConfig, PendingTransaction, TransactionHash,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

const UPDATE_CAPACITY: usize = 128;

struct PayloadSource {
	resolver: Arc<PayloadResolver>,
	payload: Payload,
	context: ParamContext,
}

struct State {
	progress: ChainTransactionProgress,
	hash: Option<TransactionHash>,
	/// Set for transactions this submitter broadcast, used to look for replacements.
	pending: Option<PendingTransaction>,
	/// First block the next replacement search covers.
	next_scan_block: u64,
}

pub struct TransactionSubmitter {
	network: NetworkConfig,
	delivery: Arc<DeliveryService>,
	source: Option<PayloadSource>,
	target: u64,
	poll_interval: Duration,
	state: Mutex<State>,
	updates: broadcast::Sender<ChainTransactionProgress>,
}

impl TransactionSubmitter {
	/// Submitter for a payload that has not been sent yet.
	pub fn new(
		resolver: Arc<PayloadResolver>,
		delivery: Arc<DeliveryService>,
		payload: Payload,
		context: ParamContext,
		target: u64,
	) -> Self {
		let network = resolver.network().clone();
		let source = PayloadSource {
			resolver,
			payload,
			context,
		};
		Self::build(network, delivery, Some(source), target, None)
	}

	/// Submitter that only waits for an already broadcast transaction.
	pub fn existing(
		network: NetworkConfig,
		delivery: Arc<DeliveryService>,
		transaction: &ChainTransaction,
		target: u64,
	) -> Self {
		Self::build(network, delivery, None, target, Some(transaction))
	}

	fn build(
		network: NetworkConfig,
		delivery: Arc<DeliveryService>,
		source: Option<PayloadSource>,
		target: u64,
		existing: Option<&ChainTransaction>,
	) -> Self {
		let mut progress = ChainTransactionProgress::ready(network.selector.clone(), target);
		let mut hash = None;
		if let Some(tx) = existing {
			progress.status = ChainTransactionStatus::Confirming;
			progress.transaction = Some(tx.clone());
			hash = Some(TransactionHash(tx.txid_bytes()));
		}
		let (updates, _) = broadcast::channel(UPDATE_CAPACITY);
		Self {
			poll_interval: delivery.poll_interval(),
			network,
			delivery,
			source,
			target,
			state: Mutex::new(State {
				progress,
				hash,
				pending: None,
				next_scan_block: 0,
			}),
			updates,
		}
	}

	pub fn chain(&self) -> &str {
		&self.network.selector
	}

	pub fn target(&self) -> u64 {
		self.target
	}

	/// Receives every status change from now on.
	pub fn subscribe(&self) -> broadcast::Receiver<ChainTransactionProgress> {
		self.updates.subscribe()
	}

	pub async fn progress(&self) -> ChainTransactionProgress {
		self.state.lock().await.progress.clone()
	}

	fn chain_transaction(&self, hash: &TransactionHash) -> ChainTransaction {
		let tx = ChainTransaction::from_hash(self.network.selector.clone(), &hash.0, None);
		let link = self.network.transaction_explorer_link(tx.tx_hash());
		tx.with_explorer_link(link)
	}

	async fn update(&self, f: impl FnOnce(&mut ChainTransactionProgress)) -> ChainTransactionProgress {
		let mut state = self.state.lock().await;
		f(&mut state.progress);
		let progress = state.progress.clone();
		drop(state);
		// No subscribers is fine.
		let _ = self.updates.send(progress.clone());
		progress
	}

	/// Materializes the payload and broadcasts it.
	///
	/// Each call that gets past materialization sends a new transaction, so
	/// a second call is rejected.
	#[instrument(skip_all, fields(chain = %self.network.selector))]
	pub async fn submit(&self, overrides: &Overrides) -> Result<ChainTransaction, SubmitError> {
		let source = self.source.as_ref().ok_or(SubmitError::AlreadySubmitted)?;
		if self.state.lock().await.hash.is_some() {
			return Err(SubmitError::AlreadySubmitted);
		}
		self.update(|p| p.status = ChainTransactionStatus::Ready).await;

		let tx = source
			.resolver
			.materialize(&source.payload, &source.context, overrides)
			.await?;
		let pending = self.delivery.submit(tx).await?;
		let transaction = self.chain_transaction(&pending.hash);

		{
			let mut state = self.state.lock().await;
			state.hash = Some(pending.hash.clone());
			state.next_scan_block = pending.submitted_at_block;
			state.pending = Some(pending);
		}
		let tracked = transaction.clone();
		self.update(move |p| {
			p.status = ChainTransactionStatus::Confirming;
			p.confirmations = Some(0);
			p.transaction = Some(tracked);
		})
		.await;

		tracing::info!(tx_hash = %truncate_id(transaction.tx_hash()), "Submitted transaction");
		Ok(transaction)
	}

	/// Waits until the transaction has `target` confirmations (the
	/// submitter's own target when `None`).
	///
	/// RPC errors are logged and retried until `cancel` fires.
	#[instrument(skip_all, fields(chain = %self.network.selector))]
	pub async fn wait(
		&self,
		target: Option<u64>,
		cancel: &CancellationToken,
	) -> Result<ChainTransactionProgress, SubmitError> {
		let target = target.unwrap_or(self.target);
		let mut last_confirmations = self.state.lock().await.progress.confirmations;

		loop {
			if cancel.is_cancelled() {
				return Err(SubmitError::Cancelled);
			}

			let (hash, pending, from_block) = {
				let state = self.state.lock().await;
				match &state.hash {
					Some(hash) => (hash.clone(), state.pending.clone(), state.next_scan_block),
					None => return Err(SubmitError::NotSubmitted),
				}
			};

			match self.delivery.get_receipt(&hash, self.network.chain_id).await {
				Ok(Some(receipt)) if !receipt.success => {
					let reason = match self.delivery.revert_reason(&hash, self.network.chain_id).await {
						Ok(Some(reason)) => reason,
						_ => "Transaction reverted".to_string(),
					};
					let transaction = self.chain_transaction(&hash);
					tracing::warn!(tx_hash = %truncate_id(transaction.tx_hash()), reason = %reason, "Transaction reverted");
					let revert = reason.clone();
					self.update(move |p| {
						p.status = ChainTransactionStatus::Reverted;
						p.revert_reason = Some(revert);
					})
					.await;
					return Err(SubmitError::Reverted {
						hash: transaction.tx_hash().to_string(),
						reason,
					});
				},
				Ok(Some(receipt)) => {
					match self
						.delivery
						.confirmations(&receipt, self.network.chain_id)
						.await
					{
						Ok(confirmations) if confirmations >= target => {
							let progress = self
								.update(move |p| {
									p.status = ChainTransactionStatus::Done;
									p.target = target;
									p.confirmations = Some(confirmations);
								})
								.await;
							tracing::info!(confirmations, target, "Transaction confirmed");
							return Ok(progress);
						},
						Ok(confirmations) => {
							if last_confirmations.is_none_or(|last| confirmations > last) {
								last_confirmations = Some(confirmations);
								self.update(move |p| {
									p.status = ChainTransactionStatus::Confirming;
									p.target = target;
									p.confirmations = Some(confirmations);
								})
								.await;
								tracing::debug!(confirmations, target, "Confirmations increased");
							}
						},
						Err(e) => tracing::warn!(error = %e, "Failed to count confirmations"),
					}
				},
				Ok(None) => {
					if let Some(pending) = pending {
						match self
							.delivery
							.find_replacement(&pending, from_block, self.network.chain_id)
							.await
						{
							Ok(scan) => {
								self.state.lock().await.next_scan_block = scan.next_block;
								if let Some(replacement) = scan.replacement {
									self.track_replacement(&hash, replacement).await;
									continue;
								}
							},
							Err(e) => tracing::warn!(error = %e, "Failed to check for replacement"),
						}
					}
				},
				Err(e) => tracing::warn!(error = %e, "Failed to fetch transaction receipt"),
			}

			tokio::select! {
				_ = cancel.cancelled() => return Err(SubmitError::Cancelled),
				_ = tokio::time::sleep(self.poll_interval) => {},
			}
		}
	}

	async fn track_replacement(&self, old: &TransactionHash, replacement: TransactionHash) {
		let replaced = self.chain_transaction(old);
		let transaction = self.chain_transaction(&replacement);
		tracing::info!(
			replaced = %truncate_id(replaced.tx_hash()),
			tx_hash = %truncate_id(transaction.tx_hash()),
			"Transaction replaced"
		);
		{
			let mut state = self.state.lock().await;
			state.hash = Some(replacement);
			// The replacement was not sent by us, so there is nothing further to track.
			state.pending = None;
		}
		self.update(move |p| {
			p.transaction = Some(transaction);
			p.replaced = Some(replaced);
		})
		.await;
	}
}
