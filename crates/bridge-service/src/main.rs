//! Command-line client for the cross-chain bridge.
//!
//! Derives deposit addresses, resumes transfers from a known deposit
//! transaction and looks up network transactions. Transfer progress is
//! printed to stdout as one JSON event per line.

use alloy_primitives::{Address, B256};
use bridge_config::Config;
use bridge_core::{Bridge, TransferRequest};
use bridge_payload::{AddressParams, Payload, PayloadKind};
use bridge_types::{from_url_base64, ChainTransaction, TransferEvent};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

mod factory_registry;

#[derive(Parser, Debug)]
#[command(name = "bridge", author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,

	#[command(subcommand)]
	command: Command,
}

/// Asset and route shared by the transfer commands.
#[derive(clap::Args, Debug, Clone)]
struct TransferArgs {
	/// Asset symbol, e.g. ETH
	#[arg(long)]
	asset: String,

	/// Chain the deposit is made on
	#[arg(long)]
	from: String,

	/// Chain the output is made on
	#[arg(long)]
	to: String,

	/// Recipient on the destination chain
	#[arg(long)]
	recipient: String,

	/// 32-byte hex transfer nonce
	#[arg(long)]
	nonce: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Derive the deposit address for a native-asset transfer
	GatewayAddress {
		#[command(flatten)]
		transfer: TransferArgs,

		/// Wait for a deposit to the address and complete the transfer
		#[arg(long)]
		wait: bool,
	},
	/// Complete a transfer from an existing deposit transaction
	ResumeMint {
		#[command(flatten)]
		transfer: TransferArgs,

		/// Hash of the deposit transaction
		#[arg(long)]
		tx: String,
	},
	/// Look up a network transaction by its URL-safe base64 hash
	Query {
		#[arg(long)]
		hash: String,
	},
}

fn parse_nonce(nonce: Option<&str>) -> Result<Option<B256>, Box<dyn std::error::Error>> {
	match nonce {
		Some(n) => match B256::from_str(n) {
			Ok(nonce) => Ok(Some(nonce)),
			Err(e) => Err(format!("Invalid nonce '{}': {}", n, e).into()),
		},
		None => Ok(None),
	}
}

fn transfer_request(
	bridge: &Bridge,
	args: &TransferArgs,
	input: PayloadKind,
) -> Result<TransferRequest, Box<dyn std::error::Error>> {
	let to_chain = bridge.chain(&args.to)?;
	if !to_chain.validate_address(&args.recipient) {
		return Err(format!("Invalid {} address '{}'", args.to, args.recipient).into());
	}
	let recipient = Address::from_str(&args.recipient)?;
	Ok(TransferRequest {
		asset: args.asset.clone(),
		from: Payload::new(args.from.clone(), input),
		to: Payload::address(args.to.clone(), AddressParams::new(recipient)),
		nonce: parse_nonce(args.nonce.as_deref())?,
	})
}

/// Prints events until the bus closes or the transfer finishes.
fn print_events(mut events: broadcast::Receiver<TransferEvent>) -> tokio::task::JoinHandle<()> {
	tokio::spawn(async move {
		loop {
			match events.recv().await {
				Ok(event) => {
					let last = matches!(
						event,
						TransferEvent::Completed { .. } | TransferEvent::Failed { .. }
					);
					match serde_json::to_string(&event) {
						Ok(line) => println!("{}", line),
						Err(e) => tracing::warn!(error = %e, "Failed to encode event"),
					}
					if last {
						break;
					}
				},
				Err(broadcast::error::RecvError::Lagged(skipped)) => {
					tracing::warn!(skipped, "Dropped transfer events");
				},
				Err(broadcast::error::RecvError::Closed) => break,
			}
		}
	})
}

async fn gateway_address(
	bridge: &Bridge,
	args: &TransferArgs,
	wait: bool,
	cancel: &CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
	let orchestrator = bridge.orchestrator(&args.from, &args.to)?;
	// The deposit itself is made by sending funds, so the input carries no call.
	let placeholder = AddressParams::new(Address::ZERO);
	let request = transfer_request(bridge, args, PayloadKind::Address(placeholder))?;
	let mut prepared = orchestrator.prepare(request).await?;
	let address = orchestrator.gateway_address(&mut prepared).await?;
	println!("{}", address);
	if !wait {
		return Ok(());
	}

	let deposits = orchestrator.wait_for_deposits(&prepared, cancel).await?;
	let deposit = deposits.first().ok_or("No deposit found")?;
	for other in deposits.iter().skip(1) {
		tracing::warn!(tx_hash = %other.tx.tx_hash(), "Gateway holds another deposit, mint it with resume-mint");
	}
	let printer = print_events(bridge.event_bus().subscribe());
	let result = orchestrator.run(&prepared, deposit, cancel).await;
	// `run` publishes its own terminal event.
	printer.await.ok();
	let output = result?;
	tracing::info!(chain = %output.chain(), tx_hash = %output.tx_hash(), "Transfer complete");
	Ok(())
}

async fn resume_mint(
	bridge: &Bridge,
	args: &TransferArgs,
	tx: &str,
	cancel: &CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
	let orchestrator = bridge.orchestrator(&args.from, &args.to)?;
	let deposit = ChainTransaction::from_hex(args.from.clone(), tx, None)?;
	let request = transfer_request(bridge, args, PayloadKind::Transaction(deposit))?;

	let printer = print_events(bridge.event_bus().subscribe());
	let output = match orchestrator.execute(request, cancel).await {
		Ok(output) => {
			printer.await.ok();
			output
		},
		Err(e) => {
			// Failures before the deposit is found publish no event.
			printer.abort();
			return Err(e.into());
		},
	};
	tracing::info!(chain = %output.chain(), tx_hash = %output.tx_hash(), "Transfer complete");
	Ok(())
}

async fn query(bridge: &Bridge, hash: &str) -> Result<(), Box<dyn std::error::Error>> {
	from_url_base64(hash).map_err(|e| format!("Invalid hash '{}': {}", hash, e))?;
	let response = bridge.network().query_tx(hash).await?;
	println!("selector: {}", response.tx.selector);
	println!("status: {:?}", response.tx_status);
	if let Some(out) = response.tx.output() {
		if let Some(amount) = out.amount() {
			println!("amount: {}", amount);
		}
		if let Some(reason) = out.revert_reason() {
			println!("revert: {}", reason);
		}
	}
	Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_writer(std::io::stderr)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	let config_path = args
		.config
		.to_str()
		.ok_or_else(|| format!("Invalid config path {:?}", args.config))?;
	let config = Config::from_file(config_path).await?;
	tracing::info!("Loaded configuration [{}]", config.bridge.id);

	let bridge = factory_registry::build_bridge_from_config(config).await?;

	let cancel = CancellationToken::new();
	let on_interrupt = cancel.clone();
	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			tracing::info!("Interrupted, cancelling");
			on_interrupt.cancel();
		}
	});

	match &args.command {
		Command::GatewayAddress { transfer, wait } => {
			gateway_address(&bridge, transfer, *wait, &cancel).await?
		},
		Command::ResumeMint { transfer, tx } => resume_mint(&bridge, transfer, tx, &cancel).await?,
		Command::Query { hash } => query(&bridge, hash).await?,
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use clap::CommandFactory;

	#[test]
	fn test_cli_definition_is_valid() {
		Args::command().debug_assert();
	}

	#[test]
	fn test_parse_resume_mint() {
		let args = Args::try_parse_from([
			"bridge",
			"--config",
			"bridge.toml",
			"resume-mint",
			"--asset",
			"ETH",
			"--from",
			"Ethereum",
			"--to",
			"Fantom",
			"--recipient",
			"0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
			"--tx",
			"0xabcd",
		])
		.unwrap();

		assert_eq!(args.config, PathBuf::from("bridge.toml"));
		assert_eq!(args.log_level, "info");
		match args.command {
			Command::ResumeMint { transfer, tx } => {
				assert_eq!(transfer.asset, "ETH");
				assert_eq!(transfer.to, "Fantom");
				assert_eq!(transfer.nonce, None);
				assert_eq!(tx, "0xabcd");
			},
			other => panic!("unexpected command {:?}", other),
		}
	}

	#[test]
	fn test_parse_gateway_address_wait() {
		let args = Args::try_parse_from([
			"bridge",
			"gateway-address",
			"--asset",
			"ETH",
			"--from",
			"Ethereum",
			"--to",
			"Fantom",
			"--recipient",
			"0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
			"--wait",
		])
		.unwrap();

		assert_eq!(args.config, PathBuf::from("config.toml"));
		match args.command {
			Command::GatewayAddress { transfer, wait } => {
				assert_eq!(transfer.from, "Ethereum");
				assert!(wait);
			},
			other => panic!("unexpected command {:?}", other),
		}
	}

	#[test]
	fn test_parse_nonce() {
		assert_eq!(parse_nonce(None).unwrap(), None);
		let nonce = format!("0x{}", "01".repeat(32));
		assert_eq!(parse_nonce(Some(&nonce)).unwrap(), Some(B256::repeat_byte(1)));
		assert!(parse_nonce(Some("0x1234")).is_err());
	}
}
