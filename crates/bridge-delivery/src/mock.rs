//! Scriptable in-memory chain for tests.
//!
//! Enabled for this crate's own tests and, through the `testing`
//! feature, for the test modules of crates built on top of it.

use crate::{DeliveryError, DeliveryInterface};
use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use bridge_types::{
	ConfigSchema, Log, LogFilter, PendingTransaction, ReplacementScan, Schema, Transaction,
	TransactionHash, TransactionReceipt, ValidationError,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Schema that accepts any table.
pub struct NoSchema;

impl ConfigSchema for NoSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Answers `call(to, calldata)`.
pub type CallHandler = Box<dyn Fn(Address, &[u8]) -> Result<Bytes, DeliveryError> + Send + Sync>;

/// Hash of the transaction `submit` returns unless configured otherwise.
pub const SUBMITTED_HASH: [u8; 32] = [0xcc; 32];

/// An EVM chain whose state is set up front.
///
/// The head starts at `head` and moves by `head_step` every time it is read,
/// through `get_block_number` or a replacement search. Logs are filtered by
/// address, signature and indexed topics like a node would.
pub struct MockDelivery {
	chain_ids: Vec<u64>,
	signer: Option<Address>,
	head: AtomicU64,
	head_step: u64,
	pending: PendingTransaction,
	/// Block and status the submitted transaction is mined with.
	mine_submitted: Option<(u64, bool)>,
	receipts: Mutex<HashMap<Vec<u8>, TransactionReceipt>>,
	/// Replacement hash and the block it is mined in.
	replacement: Option<(TransactionHash, u64)>,
	revert_reason: Option<String>,
	balance: U256,
	call_handler: Option<CallHandler>,
	logs: Mutex<Vec<Log>>,
	fail_calls: bool,
	failing_log_queries: AtomicUsize,
	submitted: Mutex<Vec<Transaction>>,
	calls: AtomicUsize,
	filters: Mutex<Vec<LogFilter>>,
	scans: Mutex<Vec<u64>>,
}

impl MockDelivery {
	pub fn new(chain_id: u64) -> Self {
		Self {
			chain_ids: vec![chain_id],
			signer: Some(Address::repeat_byte(0x11)),
			head: AtomicU64::new(0),
			head_step: 0,
			pending: PendingTransaction {
				hash: TransactionHash(SUBMITTED_HASH.to_vec()),
				from: Address::repeat_byte(0x11),
				nonce: 0,
				submitted_at_block: 0,
			},
			mine_submitted: None,
			receipts: Mutex::new(HashMap::new()),
			replacement: None,
			revert_reason: None,
			balance: U256::ZERO,
			call_handler: None,
			logs: Mutex::new(Vec::new()),
			fail_calls: false,
			failing_log_queries: AtomicUsize::new(0),
			submitted: Mutex::new(Vec::new()),
			calls: AtomicUsize::new(0),
			filters: Mutex::new(Vec::new()),
			scans: Mutex::new(Vec::new()),
		}
	}

	pub fn with_chain_ids(mut self, chain_ids: Vec<u64>) -> Self {
		self.chain_ids = chain_ids;
		self
	}

	pub fn with_signer(mut self, signer: Option<Address>) -> Self {
		self.signer = signer;
		self
	}

	pub fn with_head(self, head: u64, step: u64) -> Self {
		self.head.store(head, Ordering::SeqCst);
		Self {
			head_step: step,
			..self
		}
	}

	/// Handle returned by `submit`.
	pub fn with_pending(mut self, pending: PendingTransaction) -> Self {
		self.pending = pending;
		self
	}

	/// Mines every submitted transaction in `block`.
	pub fn mine_submitted(mut self, block: u64, success: bool) -> Self {
		self.mine_submitted = Some((block, success));
		self
	}

	pub fn with_receipt(self, hash: &[u8], block: u64, success: bool) -> Self {
		self.insert_receipt(hash, block, success);
		self
	}

	/// Replaces the pending transaction with `hash`, mined in `block`.
	pub fn with_replacement(mut self, hash: TransactionHash, block: u64) -> Self {
		self.replacement = Some((hash, block));
		self
	}

	pub fn with_revert_reason(mut self, reason: impl Into<String>) -> Self {
		self.revert_reason = Some(reason.into());
		self
	}

	pub fn with_balance(mut self, balance: U256) -> Self {
		self.balance = balance;
		self
	}

	pub fn with_call_handler<F>(mut self, handler: F) -> Self
	where
		F: Fn(Address, &[u8]) -> Result<Bytes, DeliveryError> + Send + Sync + 'static,
	{
		self.call_handler = Some(Box::new(handler));
		self
	}

	pub fn with_logs(self, logs: Vec<Log>) -> Self {
		for log in logs {
			self.insert_log(log);
		}
		self
	}

	/// Every `call` fails with a network error.
	pub fn failing_calls(mut self) -> Self {
		self.fail_calls = true;
		self
	}

	/// The next `count` log queries fail with a network error.
	pub fn failing_log_queries(self, count: usize) -> Self {
		self.failing_log_queries.store(count, Ordering::SeqCst);
		self
	}

	pub fn insert_receipt(&self, hash: &[u8], block: u64, success: bool) {
		let receipt = TransactionReceipt {
			hash: TransactionHash(hash.to_vec()),
			block_number: block,
			success,
			logs: vec![],
		};
		if let Ok(mut receipts) = self.receipts.lock() {
			receipts.insert(hash.to_vec(), receipt);
		}
	}

	pub fn insert_log(&self, log: Log) {
		if let Ok(mut logs) = self.logs.lock() {
			logs.push(log);
		}
	}

	pub fn submitted(&self) -> Vec<Transaction> {
		self.submitted.lock().map(|s| s.clone()).unwrap_or_default()
	}

	pub fn call_count(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	pub fn filters(&self) -> Vec<LogFilter> {
		self.filters.lock().map(|f| f.clone()).unwrap_or_default()
	}

	/// `from_block` of every replacement search, in order.
	pub fn replacement_scans(&self) -> Vec<u64> {
		self.scans.lock().map(|s| s.clone()).unwrap_or_default()
	}

	fn read_head(&self) -> u64 {
		self.head.fetch_add(self.head_step, Ordering::SeqCst) + self.head_step
	}
}

#[async_trait]
impl DeliveryInterface for MockDelivery {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(NoSchema)
	}

	fn chain_ids(&self) -> Vec<u64> {
		self.chain_ids.clone()
	}

	fn signer_address(&self, _chain_id: u64) -> Option<Address> {
		self.signer
	}

	async fn submit(&self, tx: Transaction) -> Result<PendingTransaction, DeliveryError> {
		if let Ok(mut submitted) = self.submitted.lock() {
			submitted.push(tx);
		}
		if let Some((block, success)) = self.mine_submitted {
			self.insert_receipt(&self.pending.hash.0, block, success);
		}
		Ok(self.pending.clone())
	}

	async fn get_receipt(
		&self,
		hash: &TransactionHash,
		_chain_id: u64,
	) -> Result<Option<TransactionReceipt>, DeliveryError> {
		let receipts = self
			.receipts
			.lock()
			.map_err(|_| DeliveryError::Network("receipts poisoned".into()))?;
		Ok(receipts.get(&hash.0).cloned())
	}

	async fn find_replacement(
		&self,
		_pending: &PendingTransaction,
		from_block: u64,
		_chain_id: u64,
	) -> Result<ReplacementScan, DeliveryError> {
		if let Ok(mut scans) = self.scans.lock() {
			scans.push(from_block);
		}
		let head = self.read_head();
		let next_block = (head + 1).max(from_block);
		match &self.replacement {
			Some((hash, mined)) if (from_block..=head).contains(mined) => {
				self.insert_receipt(&hash.0, *mined, true);
				Ok(ReplacementScan::found(hash.clone(), mined + 1))
			},
			_ => Ok(ReplacementScan::not_found(next_block)),
		}
	}

	async fn revert_reason(
		&self,
		_hash: &TransactionHash,
		_chain_id: u64,
	) -> Result<Option<String>, DeliveryError> {
		Ok(self.revert_reason.clone())
	}

	async fn get_block_number(&self, _chain_id: u64) -> Result<u64, DeliveryError> {
		Ok(self.read_head())
	}

	async fn get_balance(&self, _address: Address, _chain_id: u64) -> Result<U256, DeliveryError> {
		Ok(self.balance)
	}

	async fn call(&self, to: Address, data: Bytes, _chain_id: u64) -> Result<Bytes, DeliveryError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		if self.fail_calls {
			return Err(DeliveryError::Network("connection refused".into()));
		}
		match &self.call_handler {
			Some(handler) => handler(to, &data),
			None => Ok(Bytes::new()),
		}
	}

	async fn get_logs(&self, filter: &LogFilter, _chain_id: u64) -> Result<Vec<Log>, DeliveryError> {
		if let Ok(mut filters) = self.filters.lock() {
			filters.push(filter.clone());
		}
		let failing = self
			.failing_log_queries
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
			.is_ok();
		if failing {
			return Err(DeliveryError::Network("503 Service Unavailable".into()));
		}
		let logs = self
			.logs
			.lock()
			.map_err(|_| DeliveryError::Network("logs poisoned".into()))?;
		Ok(logs
			.iter()
			.filter(|log| log.address == filter.address)
			.filter(|log| log.topics.first() == Some(&filter.event_signature))
			.filter(|log| {
				filter.topics.iter().enumerate().all(|(i, topic)| match topic {
					Some(topic) => log.topics.get(i + 1) == Some(topic),
					None => true,
				})
			})
			.cloned()
			.collect())
	}
}
