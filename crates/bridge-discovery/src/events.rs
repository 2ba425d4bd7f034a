//! Deposit event decoding.
//!
//! Each lock or burn the gateways emit maps onto an
//! [`InputChainTransaction`]. Nonces are 32-byte big-endian values carried
//! as URL-safe base64, the same form the network expects.

use crate::contracts::{ILockGateway, IMintGateway, ITransferWithLog};
use crate::{InputKind, LocatorError};
use alloy_primitives::{Bytes, B256, U256};
use alloy_sol_types::SolEvent;
use bridge_types::{
	to_url_base64, ChainTransaction, InputChainTransaction, Log, NetworkConfig, TransactionReceipt,
};

/// Gateway events that record a deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepositEvent {
	/// `LogBurn`: burn to a plain address on the origin chain.
	Burn,
	/// `LogBurnToChain`: burn routed to another host chain.
	BurnToChain,
	/// `LogLockToChain`: lock of a token on its origin chain.
	LockToChain,
	/// `LogTransferred`: native-asset transfer into the gateway.
	Transferred,
}

impl DepositEvent {
	pub fn signature_hash(&self) -> B256 {
		match self {
			DepositEvent::Burn => IMintGateway::LogBurn::SIGNATURE_HASH,
			DepositEvent::BurnToChain => IMintGateway::LogBurnToChain::SIGNATURE_HASH,
			DepositEvent::LockToChain => ILockGateway::LogLockToChain::SIGNATURE_HASH,
			DepositEvent::Transferred => ITransferWithLog::LogTransferred::SIGNATURE_HASH,
		}
	}

	/// Events that can record a deposit of the given kind.
	pub fn for_input(kind: InputKind) -> &'static [DepositEvent] {
		match kind {
			InputKind::Burn => &[DepositEvent::Burn, DepositEvent::BurnToChain],
			InputKind::Lock => &[DepositEvent::LockToChain, DepositEvent::Transferred],
		}
	}

	fn name(&self) -> &'static str {
		match self {
			DepositEvent::Burn => "LogBurn",
			DepositEvent::BurnToChain => "LogBurnToChain",
			DepositEvent::LockToChain => "LogLockToChain",
			DepositEvent::Transferred => "LogTransferred",
		}
	}
}

struct DecodedDeposit {
	amount: U256,
	nonce: B256,
	to_recipient: Option<String>,
	to_chain: Option<String>,
	to_payload: Option<Bytes>,
}

fn decode_error(event: DepositEvent, e: impl std::fmt::Display) -> LocatorError {
	LocatorError::Decode(format!("Failed to decode {} event: {}", event.name(), e))
}

/// Burn recipients are usually address strings stored as bytes.
fn recipient_text(to: &[u8]) -> String {
	match std::str::from_utf8(to) {
		Ok(text) if !text.is_empty() => text.to_string(),
		_ => format!("0x{}", hex::encode(to)),
	}
}

fn decode_fields(event: DepositEvent, log: &Log) -> Result<DecodedDeposit, LocatorError> {
	let topics = log.topics.iter().copied();
	let data = log.data.as_ref();
	let decoded = match event {
		DepositEvent::Burn => {
			let e = IMintGateway::LogBurn::decode_raw_log(topics, data, true)
				.map_err(|e| decode_error(event, e))?;
			DecodedDeposit {
				amount: e.amount,
				nonce: B256::from(e.burnNonce.to_be_bytes::<32>()),
				to_recipient: Some(recipient_text(&e.to)),
				to_chain: None,
				to_payload: None,
			}
		},
		DepositEvent::BurnToChain => {
			let e = IMintGateway::LogBurnToChain::decode_raw_log(topics, data, true)
				.map_err(|e| decode_error(event, e))?;
			DecodedDeposit {
				amount: e.amount,
				nonce: B256::from(e.burnNonce.to_be_bytes::<32>()),
				to_recipient: Some(e.recipientAddress),
				to_chain: Some(e.recipientChain),
				to_payload: Some(e.recipientPayload),
			}
		},
		DepositEvent::LockToChain => {
			let e = ILockGateway::LogLockToChain::decode_raw_log(topics, data, true)
				.map_err(|e| decode_error(event, e))?;
			DecodedDeposit {
				amount: e.amount,
				nonce: B256::from(e.lockNonce.to_be_bytes::<32>()),
				to_recipient: Some(e.recipientAddress),
				to_chain: Some(e.recipientChain),
				to_payload: Some(e.recipientPayload),
			}
		},
		DepositEvent::Transferred => {
			let e = ITransferWithLog::LogTransferred::decode_raw_log(topics, data, true)
				.map_err(|e| decode_error(event, e))?;
			// Native transfers carry no nonce.
			DecodedDeposit {
				amount: e.amount,
				nonce: B256::ZERO,
				to_recipient: None,
				to_chain: None,
				to_payload: None,
			}
		},
	};
	Ok(decoded)
}

/// Decodes one deposit log into a transfer input record.
pub fn decode_deposit_log(
	network: &NetworkConfig,
	asset: &str,
	event: DepositEvent,
	log: &Log,
) -> Result<InputChainTransaction, LocatorError> {
	let hash = log.transaction_hash.as_ref().ok_or_else(|| {
		LocatorError::Decode(format!("{} log has no transaction hash", event.name()))
	})?;
	let fields = decode_fields(event, log)?;
	let tx = ChainTransaction::from_hash(network.selector.clone(), &hash.0, None);
	let explorer_link = network.transaction_explorer_link(tx.tx_hash());

	Ok(InputChainTransaction {
		tx: tx.with_explorer_link(explorer_link),
		asset: asset.to_string(),
		amount: fields.amount.to_string(),
		nonce: to_url_base64(fields.nonce),
		to_recipient: fields.to_recipient,
		to_chain: fields.to_chain,
		to_payload: fields.to_payload.map(to_url_base64),
	})
}

/// Decodes every log of a receipt that matches `event`.
pub fn decode_deposit_events(
	network: &NetworkConfig,
	asset: &str,
	receipt: &TransactionReceipt,
	event: DepositEvent,
) -> Result<Vec<InputChainTransaction>, LocatorError> {
	let signature = event.signature_hash();
	receipt
		.logs
		.iter()
		.filter(|log| log.topics.first() == Some(&signature))
		.map(|log| {
			let mut log = log.clone();
			if log.transaction_hash.is_none() {
				log.transaction_hash = Some(receipt.hash.clone());
			}
			decode_deposit_log(network, asset, event, &log)
		})
		.collect()
}

/// All deposits of `kind` made by a transaction. Fails if there are none.
pub fn decode_input_events(
	network: &NetworkConfig,
	asset: &str,
	receipt: &TransactionReceipt,
	kind: InputKind,
) -> Result<Vec<InputChainTransaction>, LocatorError> {
	let mut inputs = Vec::new();
	for event in DepositEvent::for_input(kind) {
		inputs.extend(decode_deposit_events(network, asset, receipt, *event)?);
	}
	if inputs.is_empty() {
		return Err(LocatorError::Decode(format!(
			"No inputs found in transaction {}",
			receipt.hash.to_hex()
		)));
	}
	Ok(inputs)
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::{keccak256, Address};
	use bridge_types::{
		from_url_base64, generate_n_hash, NativeAsset, NetworkAddresses, TransactionHash,
	};

	fn network() -> NetworkConfig {
		NetworkConfig {
			selector: "Ethereum".to_string(),
			chain_id: 1,
			rpc_url: "http://localhost:8545".to_string(),
			is_testnet: false,
			explorer_url: Some("https://etherscan.io".to_string()),
			confirmation_target: 30,
			log_request_limit: Some(1000),
			average_confirmation_time: 15,
			native_asset: NativeAsset {
				name: "Ether".to_string(),
				symbol: "ETH".to_string(),
				decimals: 18,
			},
			addresses: NetworkAddresses {
				gateway_registry: Address::repeat_byte(0x99),
				basic_bridge: None,
				transfer_with_log: None,
			},
		}
	}

	fn to_log(data: alloy_primitives::LogData, tx_hash: Option<B256>) -> Log {
		Log {
			address: Address::repeat_byte(0x6a),
			topics: data.topics().to_vec(),
			data: data.data,
			transaction_hash: tx_hash.map(TransactionHash::from),
			block_number: Some(100),
		}
	}

	fn lock_log(nonce: B256, amount: u64) -> alloy_primitives::LogData {
		ILockGateway::LogLockToChain {
			recipientAddress: "0x4242424242424242424242424242424242424242".to_string(),
			recipientChain: "Polygon".to_string(),
			recipientPayload: Bytes::from(vec![0xab, 0xcd]),
			amount: U256::from(amount),
			lockNonce: U256::from_be_bytes(nonce.0),
			recipientAddressIndexed: keccak256("0x4242424242424242424242424242424242424242"),
			recipientChainIndexed: keccak256("Polygon"),
		}
		.encode_log_data()
	}

	#[test]
	fn test_lock_event_round_trips_to_n_hash() {
		let nonce = B256::with_last_byte(7);
		let tx_hash = B256::repeat_byte(0x1f);
		let receipt = TransactionReceipt {
			hash: TransactionHash::from(tx_hash),
			block_number: 100,
			success: true,
			logs: vec![to_log(lock_log(nonce, 100_000), Some(tx_hash))],
		};

		let inputs = decode_deposit_events(&network(), "USDC", &receipt, DepositEvent::LockToChain)
			.unwrap();
		assert_eq!(inputs.len(), 1);
		let input = &inputs[0];
		assert_eq!(input.amount, "100000");
		assert_eq!(input.asset, "USDC");
		assert_eq!(input.to_chain.as_deref(), Some("Polygon"));
		assert_eq!(input.to_payload, Some(to_url_base64([0xab, 0xcd])));
		assert_eq!(
			input.tx.explorer_link(),
			Some(format!("https://etherscan.io/tx/0x{}", hex::encode(tx_hash)).as_str())
		);

		let decoded_nonce = B256::from_slice(&input.nonce_bytes());
		let from_record = generate_n_hash(&decoded_nonce, &input.tx.txid_bytes(), 0);
		let from_event = generate_n_hash(&nonce, tx_hash.as_slice(), 0);
		assert_eq!(from_record, from_event);
	}

	#[test]
	fn test_burn_event_recipient_and_nonce() {
		let burn = IMintGateway::LogBurn {
			to: Bytes::from(b"bc1qrecipient".to_vec()),
			amount: U256::from(5000u64),
			burnNonce: U256::from(3u64),
			indexedTo: keccak256(b"bc1qrecipient"),
		}
		.encode_log_data();
		let tx_hash = B256::repeat_byte(0x2e);
		let receipt = TransactionReceipt {
			hash: TransactionHash::from(tx_hash),
			block_number: 10,
			success: true,
			// Receipt logs may omit the transaction hash.
			logs: vec![to_log(burn, None)],
		};

		let inputs = decode_input_events(&network(), "BTC", &receipt, InputKind::Burn).unwrap();
		assert_eq!(inputs.len(), 1);
		assert_eq!(inputs[0].to_recipient.as_deref(), Some("bc1qrecipient"));
		assert_eq!(inputs[0].to_chain, None);
		assert_eq!(from_url_base64(&inputs[0].nonce).unwrap(), B256::with_last_byte(3).to_vec());
		assert_eq!(inputs[0].tx.tx_hash(), format!("0x{}", hex::encode(tx_hash)));
	}

	#[test]
	fn test_transfer_event_has_zero_nonce() {
		let transfer = ITransferWithLog::LogTransferred {
			from: Address::repeat_byte(1),
			to: Address::repeat_byte(2),
			amount: U256::from(10u64).pow(U256::from(18u64)),
		}
		.encode_log_data();
		let receipt = TransactionReceipt {
			hash: TransactionHash::from(B256::repeat_byte(3)),
			block_number: 10,
			success: true,
			logs: vec![to_log(transfer, None)],
		};

		let inputs = decode_input_events(&network(), "ETH", &receipt, InputKind::Lock).unwrap();
		assert_eq!(inputs[0].amount, "1000000000000000000");
		assert_eq!(inputs[0].nonce_bytes(), vec![0u8; 32]);
	}

	#[test]
	fn test_receipt_without_deposits_is_rejected() {
		let receipt = TransactionReceipt {
			hash: TransactionHash::from(B256::repeat_byte(4)),
			block_number: 10,
			success: true,
			logs: vec![to_log(lock_log(B256::ZERO, 1), None)],
		};
		let err = decode_input_events(&network(), "BTC", &receipt, InputKind::Burn).unwrap_err();
		assert!(matches!(err, LocatorError::Decode(ref m) if m.starts_with("No inputs found")));
	}
}
