//! Submission and status polling of a single network transaction.

use crate::params::CrossChainParams;
use crate::types::{QueryTxResponse, TransactionInput, TxStatus};
use crate::{NetworkError, NetworkInterface};
use bridge_types::{
	from_url_base64, truncate_id, ChainTransaction, ChainTransactionProgress,
	ChainTransactionStatus, NETWORK_CHAIN,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Drives one cross-chain transaction on the network.
///
/// Status changes are published on a watch channel. The network does not
/// report confirmation counts, so the progress target is always 0.
pub struct NetworkTxSubmitter {
	network: Arc<dyn NetworkInterface>,
	tx: TransactionInput,
	poll_interval: Duration,
	status: watch::Sender<ChainTransactionProgress>,
}

impl NetworkTxSubmitter {
	pub fn new(
		network: Arc<dyn NetworkInterface>,
		selector: &str,
		params: &CrossChainParams,
		poll_interval: Duration,
	) -> Result<Self, NetworkError> {
		let tx = params.to_input(selector)?;
		let (status, _) = watch::channel(ChainTransactionProgress::ready(NETWORK_CHAIN, 0));
		Ok(Self {
			network,
			tx,
			poll_interval,
			status,
		})
	}

	/// URL-safe base64 hash of the transaction.
	pub fn hash(&self) -> &str {
		&self.tx.hash
	}

	pub fn selector(&self) -> &str {
		&self.tx.selector
	}

	pub fn subscribe(&self) -> watch::Receiver<ChainTransactionProgress> {
		self.status.subscribe()
	}

	pub fn progress(&self) -> ChainTransactionProgress {
		self.status.borrow().clone()
	}

	fn transaction(&self) -> ChainTransaction {
		ChainTransaction::network(&from_url_base64(&self.tx.hash).unwrap_or_default())
	}

	fn update(&self, f: impl FnOnce(&mut ChainTransactionProgress)) {
		self.status.send_modify(f);
	}

	/// Submits the transaction.
	///
	/// The node rejects a transaction it already knows, so a failed submit is
	/// followed by a query. Only if that fails too is the submit repeated.
	#[instrument(skip_all, fields(hash = %truncate_id(&self.tx.hash), selector = %self.tx.selector))]
	pub async fn submit(&self) -> Result<(), NetworkError> {
		if let Err(submit_error) = self.network.submit_tx(&self.tx).await {
			tracing::debug!(error = %submit_error, "Submit failed, checking if transaction is known");
			if self.network.query_tx(&self.tx.hash).await.is_err() {
				self.network.submit_tx(&self.tx).await?;
			}
		}

		let transaction = self.transaction();
		self.update(|p| {
			p.status = ChainTransactionStatus::Confirming;
			p.transaction = Some(transaction);
		});
		tracing::info!("Submitted to network");
		Ok(())
	}

	/// Polls the network until the transaction is done or reverted.
	#[instrument(skip_all, fields(hash = %truncate_id(&self.tx.hash), selector = %self.tx.selector))]
	pub async fn wait(&self, cancel: &CancellationToken) -> Result<QueryTxResponse, NetworkError> {
		loop {
			if cancel.is_cancelled() {
				return Err(NetworkError::Cancelled);
			}

			match self.network.query_tx(&self.tx.hash).await {
				Ok(response) => match response.tx_status {
					TxStatus::Done | TxStatus::Reverted => return self.finish(response),
					status => {
						tracing::debug!(?status, "Network transaction in progress");
						let transaction = self.transaction();
						self.update(|p| {
							p.status = ChainTransactionStatus::Confirming;
							p.transaction = Some(transaction);
						});
					},
				},
				Err(e) if e.is_not_ready() => {},
				Err(e @ NetworkError::InvalidParams(_)) => return Err(e),
				Err(e) => {
					tracing::warn!(error = %e, "Failed to query network transaction");
				},
			}

			tokio::select! {
				_ = cancel.cancelled() => return Err(NetworkError::Cancelled),
				_ = tokio::time::sleep(self.poll_interval) => {},
			}
		}
	}

	fn finish(&self, response: QueryTxResponse) -> Result<QueryTxResponse, NetworkError> {
		let reason = response
			.tx
			.output()
			.and_then(|out| out.revert_reason())
			.map(str::to_string)
			.or_else(|| {
				(response.tx_status == TxStatus::Reverted).then(|| "transaction reverted".to_string())
			});

		let transaction = self.transaction();
		if let Some(reason) = reason {
			tracing::warn!(reason = %reason, "Network transaction reverted");
			self.update(|p| {
				p.status = ChainTransactionStatus::Reverted;
				p.transaction = Some(transaction);
				p.revert_reason = Some(reason.clone());
			});
			return Err(NetworkError::Reverted(reason));
		}

		self.update(|p| {
			p.status = ChainTransactionStatus::Done;
			p.transaction = Some(transaction);
		});
		tracing::info!("Network transaction done");
		Ok(response)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::{NetworkTransaction, OutputValue, TxOutput};
	use alloy_primitives::{B256, U256};
	use async_trait::async_trait;
	use bridge_types::{ErrorKind, HasErrorKind};
	use std::collections::VecDeque;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::Mutex;

	enum Reply {
		Status(TxStatus, Option<TxOutput>),
		NotFound,
		Failure(&'static str),
	}

	#[derive(Default)]
	struct MockNetwork {
		submit_failures: AtomicUsize,
		submits: AtomicUsize,
		queries: Mutex<VecDeque<Reply>>,
	}

	impl MockNetwork {
		fn with_replies(replies: Vec<Reply>) -> Self {
			Self {
				queries: Mutex::new(replies.into()),
				..Default::default()
			}
		}
	}

	#[async_trait]
	impl NetworkInterface for MockNetwork {
		async fn submit_tx(&self, _tx: &TransactionInput) -> Result<(), NetworkError> {
			self.submits.fetch_add(1, Ordering::SeqCst);
			let remaining = self.submit_failures.load(Ordering::SeqCst);
			if remaining > 0 {
				self.submit_failures.store(remaining - 1, Ordering::SeqCst);
				return Err(NetworkError::Rpc("tx already exists".into()));
			}
			Ok(())
		}

		async fn query_tx(&self, tx_hash: &str) -> Result<QueryTxResponse, NetworkError> {
			let reply = self.queries.lock().unwrap().pop_front().unwrap_or(Reply::NotFound);
			match reply {
				Reply::Status(tx_status, out) => Ok(QueryTxResponse {
					tx: NetworkTransaction {
						hash: tx_hash.to_string(),
						version: "1".into(),
						selector: "BTC/toEthereum".into(),
						input: serde_json::Value::Null,
						out: out.map(|v| OutputValue { v }),
					},
					tx_status,
				}),
				Reply::NotFound => Err(NetworkError::NotFound(format!("tx {} not found", tx_hash))),
				Reply::Failure(message) => Err(NetworkError::from_query_message(message)),
			}
		}

		async fn select_shard(&self, _asset: &str) -> Result<Vec<u8>, NetworkError> {
			Ok(vec![2u8; 33])
		}

		async fn confirmation_target(&self, _chain: &str) -> Result<u64, NetworkError> {
			Ok(1)
		}
	}

	fn params() -> CrossChainParams {
		CrossChainParams {
			txid: vec![1u8; 32],
			txindex: 0,
			amount: U256::from(100_000u64),
			payload: vec![],
			p_hash: B256::ZERO,
			to: "0x0000000000000000000000000000000000000001".into(),
			nonce: B256::ZERO,
			n_hash: B256::repeat_byte(9),
			gpubkey: vec![],
			g_hash: B256::ZERO,
		}
	}

	fn submitter(network: Arc<MockNetwork>) -> NetworkTxSubmitter {
		NetworkTxSubmitter::new(network, "BTC/toEthereum", &params(), Duration::from_secs(15)).unwrap()
	}

	fn signed_output() -> TxOutput {
		TxOutput {
			amount: Some("99000".into()),
			sig: Some("AQID".into()),
			revert: Some(String::new()),
			..Default::default()
		}
	}

	#[tokio::test]
	async fn test_submit_known_transaction_is_not_resubmitted() {
		let network = Arc::new(MockNetwork::with_replies(vec![Reply::Status(TxStatus::Pending, None)]));
		network.submit_failures.store(1, Ordering::SeqCst);
		let submitter = submitter(network.clone());

		submitter.submit().await.unwrap();
		assert_eq!(network.submits.load(Ordering::SeqCst), 1);
		let progress = submitter.progress();
		assert_eq!(progress.status, ChainTransactionStatus::Confirming);
		assert_eq!(progress.transaction.unwrap().tx_hash(), submitter.hash());
	}

	#[tokio::test]
	async fn test_submit_retries_once_when_unknown() {
		let network = Arc::new(MockNetwork::default());
		network.submit_failures.store(1, Ordering::SeqCst);
		let submitter = submitter(network.clone());

		submitter.submit().await.unwrap();
		assert_eq!(network.submits.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn test_submit_fails_when_retry_fails() {
		let network = Arc::new(MockNetwork::default());
		network.submit_failures.store(2, Ordering::SeqCst);
		let submitter = submitter(network);

		assert_eq!(submitter.submit().await.unwrap_err().kind(), ErrorKind::NetworkError);
		assert_eq!(submitter.progress().status, ChainTransactionStatus::Ready);
	}

	#[tokio::test(start_paused = true)]
	async fn test_wait_skips_not_found_until_done() {
		let network = Arc::new(MockNetwork::with_replies(vec![
			Reply::NotFound,
			Reply::Failure("result not available"),
			Reply::Failure("connection reset"),
			Reply::Status(TxStatus::Executing, None),
			Reply::Status(TxStatus::Done, Some(signed_output())),
		]));
		let submitter = submitter(network);
		let mut updates = submitter.subscribe();

		let response = submitter.wait(&CancellationToken::new()).await.unwrap();
		assert_eq!(response.tx.output().unwrap().signature(), Some(vec![1, 2, 3]));
		assert!(updates.has_changed().unwrap());
		let progress = updates.borrow_and_update().clone();
		assert_eq!(progress.status, ChainTransactionStatus::Done);
		assert_eq!(progress.target, 0);
	}

	#[tokio::test(start_paused = true)]
	async fn test_wait_reports_revert() {
		let output = TxOutput {
			revert: Some("insufficient amount".into()),
			..Default::default()
		};
		let network = Arc::new(MockNetwork::with_replies(vec![Reply::Status(
			TxStatus::Done,
			Some(output),
		)]));
		let submitter = submitter(network);

		let err = submitter.wait(&CancellationToken::new()).await.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Reverted);
		let progress = submitter.progress();
		assert_eq!(progress.status, ChainTransactionStatus::Reverted);
		assert_eq!(progress.revert_reason.as_deref(), Some("insufficient amount"));
	}

	#[tokio::test(start_paused = true)]
	async fn test_wait_stops_on_invalid_params() {
		let network = Arc::new(MockNetwork::with_replies(vec![Reply::Failure(
			"invalid params: malformed hash",
		)]));
		let err = submitter(network).wait(&CancellationToken::new()).await.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::ParameterError);
	}

	#[tokio::test(start_paused = true)]
	async fn test_wait_cancelled() {
		let network = Arc::new(MockNetwork::default());
		let submitter = submitter(network);
		let cancel = CancellationToken::new();

		let canceller = cancel.clone();
		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_secs(60)).await;
			canceller.cancel();
		});

		let err = submitter.wait(&cancel).await.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Cancelled);
	}
}
