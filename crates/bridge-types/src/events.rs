//! Progress and event types emitted by long-running operations.

use crate::chain::{ChainTransaction, InputChainTransaction};
use serde::{Deserialize, Serialize};

/// Lifecycle of a submitted chain transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainTransactionStatus {
	Ready,
	Confirming,
	Done,
	Reverted,
}

impl ChainTransactionStatus {
	pub fn is_terminal(&self) -> bool {
		matches!(self, ChainTransactionStatus::Done | ChainTransactionStatus::Reverted)
	}
}

/// Snapshot of a transaction's submission state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainTransactionProgress {
	pub chain: String,
	pub status: ChainTransactionStatus,
	pub confirmations: Option<u64>,
	pub target: u64,
	pub transaction: Option<ChainTransaction>,
	/// Transaction that was replaced by `transaction`, if any.
	pub replaced: Option<ChainTransaction>,
	pub revert_reason: Option<String>,
}

impl ChainTransactionProgress {
	pub fn ready(chain: impl Into<String>, target: u64) -> Self {
		Self {
			chain: chain.into(),
			status: ChainTransactionStatus::Ready,
			confirmations: None,
			target,
			transaction: None,
			replaced: None,
			revert_reason: None,
		}
	}
}

/// Stage of a transfer reported on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransferStage {
	Setup,
	Input,
	Network,
	Output,
}

/// Events published while a transfer runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TransferEvent {
	/// The deposit address for the transfer is known.
	GatewayAddress { selector: String, address: String },
	/// A deposit matching the transfer was found on the origin chain.
	DepositDetected {
		selector: String,
		deposit: InputChainTransaction,
	},
	/// A transaction in one of the transfer's stages changed status.
	Progress {
		selector: String,
		stage: TransferStage,
		progress: ChainTransactionProgress,
	},
	/// The output was already submitted by an earlier run.
	OutputAlreadyDone {
		selector: String,
		transaction: ChainTransaction,
	},
	/// The transfer finished.
	Completed {
		selector: String,
		output: ChainTransaction,
	},
	/// The transfer stopped with an error.
	Failed {
		selector: String,
		kind: crate::ErrorKind,
		error: String,
	},
}
