//! JSON-RPC transport to a network node.
//!
//! Requests are JSON-RPC 2.0 POSTs with `id = 1`. A request that fails at
//! the HTTP level is retried a configurable number of times. An error the
//! node returns in the response body is final.

use crate::types::{QueryTxResponse, TransactionInput};
use crate::{NetworkError, NetworkInterface};
use async_trait::async_trait;
use bridge_types::from_url_base64;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;

const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Failure of a single request.
#[derive(Debug, PartialEq, Eq)]
enum RpcFailure {
	/// The request did not produce a usable HTTP response.
	Transport(String),
	/// The node answered with an error or without a result.
	Node(String),
}

impl RpcFailure {
	fn message(self) -> String {
		match self {
			RpcFailure::Transport(m) | RpcFailure::Node(m) => m,
		}
	}
}

/// Network client speaking JSON-RPC over HTTP.
pub struct JsonRpcNetwork {
	client: reqwest::Client,
	url: String,
	retries: u32,
}

impl JsonRpcNetwork {
	pub fn new(url: impl Into<String>, timeout: Duration, retries: u32) -> Result<Self, NetworkError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| NetworkError::Rpc(format!("Failed to build HTTP client: {}", e)))?;
		Ok(Self {
			client,
			url: url.into(),
			retries,
		})
	}

	pub fn url(&self) -> &str {
		&self.url
	}

	async fn send_once(&self, body: &Value) -> Result<Value, RpcFailure> {
		let response = self
			.client
			.post(&self.url)
			.json(body)
			.send()
			.await
			.map_err(|e| RpcFailure::Transport(e.to_string()))?;
		let status = response.status().as_u16();
		let json = response
			.json::<Value>()
			.await
			.map_err(|e| RpcFailure::Transport(e.to_string()))?;
		parse_response(status, json)
	}

	/// Sends `method` and returns its `result`, retrying transport failures.
	async fn send_raw(&self, method: &str, params: Value) -> Result<Value, RpcFailure> {
		let body = request_body(method, params);
		let mut attempt = 0;
		loop {
			match self.send_once(&body).await {
				Err(RpcFailure::Transport(message)) if attempt < self.retries => {
					attempt += 1;
					tracing::warn!(method, attempt, error = %message, "Network request failed, retrying");
					tokio::time::sleep(RETRY_DELAY).await;
				},
				result => return result,
			}
		}
	}

	async fn send_message<T: DeserializeOwned>(
		&self,
		method: &str,
		params: Value,
	) -> Result<T, NetworkError> {
		let result = self
			.send_raw(method, params)
			.await
			.map_err(|e| NetworkError::Rpc(e.message()))?;
		serde_json::from_value(result).map_err(|e| NetworkError::InvalidResponse(e.to_string()))
	}
}

#[async_trait]
impl NetworkInterface for JsonRpcNetwork {
	async fn submit_tx(&self, tx: &TransactionInput) -> Result<(), NetworkError> {
		tracing::debug!(hash = %tx.hash, selector = %tx.selector, "Submitting network transaction");
		self.send_message::<Value>("ren_submitTx", json!({ "tx": tx }))
			.await
			.map(|_| ())
	}

	async fn query_tx(&self, tx_hash: &str) -> Result<QueryTxResponse, NetworkError> {
		let result = self
			.send_raw("ren_queryTx", json!({ "txHash": tx_hash }))
			.await
			.map_err(|e| NetworkError::from_query_message(&e.message()))?;
		serde_json::from_value(result).map_err(|e| NetworkError::InvalidResponse(e.to_string()))
	}

	async fn select_shard(&self, asset: &str) -> Result<Vec<u8>, NetworkError> {
		let result = self
			.send_raw("ren_queryBlockState", json!({ "contract": asset }))
			.await
			.map_err(|e| NetworkError::Rpc(format!("Error fetching shards: {}", e.message())))?;
		shard_public_key(&result, asset)
	}

	async fn confirmation_target(&self, chain: &str) -> Result<u64, NetworkError> {
		let result = self
			.send_raw("ren_queryConfig", json!({}))
			.await
			.map_err(|e| NetworkError::Rpc(e.message()))?;
		confirmation_target(&result, chain)
	}
}

fn request_body(method: &str, params: Value) -> Value {
	json!({
		"id": 1,
		"jsonrpc": "2.0",
		"method": method,
		"params": params,
	})
}

fn parse_response(status: u16, body: Value) -> Result<Value, RpcFailure> {
	if status != 200 {
		return Err(RpcFailure::Transport(format!("Unexpected status code {}", status)));
	}
	if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
		let message = error
			.get("message")
			.and_then(Value::as_str)
			.map(str::to_string)
			.unwrap_or_else(|| error.to_string());
		return Err(RpcFailure::Node(message));
	}
	match body.get("result") {
		Some(result) if !result.is_null() => Ok(result.clone()),
		_ => Err(RpcFailure::Node("Empty result returned from node".into())),
	}
}

/// Reads the first shard key for `asset` out of a `ren_queryBlockState` result.
fn shard_public_key(result: &Value, asset: &str) -> Result<Vec<u8>, NetworkError> {
	let state = result
		.pointer("/state/v")
		.and_then(|v| v.get(asset))
		.ok_or_else(|| NetworkError::InvalidResponse(format!("No block state found for {}", asset)))?;

	let key = state
		.pointer("/shards/0/pubKey")
		.and_then(Value::as_str)
		.filter(|k| !k.is_empty())
		.ok_or_else(|| {
			NetworkError::InvalidResponse(format!("Unable to fetch public key for {}", asset))
		})?;

	from_url_base64(key).map_err(|e| NetworkError::InvalidResponse(format!("Invalid shard key: {}", e)))
}

fn confirmation_target(result: &Value, chain: &str) -> Result<u64, NetworkError> {
	let value = result
		.pointer("/confirmations")
		.and_then(|c| c.get(chain))
		.ok_or_else(|| {
			NetworkError::InvalidResponse(format!("No confirmation target for {}", chain))
		})?;
	match value {
		Value::String(s) => s.parse().ok(),
		Value::Number(n) => n.as_u64(),
		_ => None,
	}
	.ok_or_else(|| NetworkError::InvalidResponse(format!("Invalid confirmation target: {}", value)))
}
