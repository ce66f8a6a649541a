//! JSON-RPC chain client.
//!
//! Talks to an Ethereum-compatible node over HTTP JSON-RPC
//! (`eth_getBlockByNumber`, `eth_getBlockReceipts`, `eth_blockNumber`).
//! Head notifications are produced by polling `eth_blockNumber` at a
//! configurable interval.

use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256, U64};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::chain::{BlockHeader, ChainClient, LogEntry, TransactionReceipt};
use crate::utils::error::{CirclesIndexerError, Result};

/// JSON-RPC implementation of [`ChainClient`].
///
/// # Example
///
/// ```no_run
/// use circles_indexer::RpcChainClient;
///
/// let client = RpcChainClient::new("http://127.0.0.1:8545", 5);
/// ```
#[derive(Clone)]
pub struct RpcChainClient {
    http: reqwest::Client,
    rpc_url: String,
    poll_interval: Duration,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<serde_json::Value>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcBlock {
    number: U64,
    hash: B256,
    timestamp: U64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: B256,
    transaction_index: U64,
    #[serde(default)]
    logs: Vec<RpcLog>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    address: Address,
    topics: Vec<B256>,
    data: Bytes,
    log_index: U64,
}

impl RpcChainClient {
    /// Creates a new client for `rpc_url`, polling the head every
    /// `poll_interval_secs` seconds.
    #[must_use]
    pub fn new(rpc_url: impl Into<String>, poll_interval_secs: u64) -> Self {
        Self {
            http: reqwest::Client::new(),
            rpc_url: rpc_url.into(),
            poll_interval: Duration::from_secs(poll_interval_secs.max(1)),
        }
    }

    async fn request_value(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CirclesIndexerError::RpcError(format!("{method}: {e}")))?;

        let payload: RpcResponse = response
            .json()
            .await
            .map_err(|e| CirclesIndexerError::RpcError(format!("{method}: invalid response: {e}")))?;

        if let Some(error) = payload.error {
            return Err(CirclesIndexerError::RpcError(format!(
                "{method}: {} (code {})",
                error.message, error.code
            )));
        }

        Ok(payload.result.unwrap_or(serde_json::Value::Null))
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T> {
        let value = self.request_value(method, params).await?;
        if value.is_null() {
            return Err(CirclesIndexerError::RpcError(format!(
                "{method}: empty result"
            )));
        }
        serde_json::from_value(value)
            .map_err(|e| CirclesIndexerError::RpcError(format!("{method}: malformed result: {e}")))
    }

    async fn request_optional<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<Option<T>> {
        let value = self.request_value(method, params).await?;
        if value.is_null() {
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| CirclesIndexerError::RpcError(format!("{method}: malformed result: {e}")))
    }
}

impl From<RpcBlock> for BlockHeader {
    fn from(block: RpcBlock) -> Self {
        BlockHeader {
            number: block.number.to::<u64>(),
            hash: block.hash,
            timestamp: block.timestamp.to::<u64>(),
        }
    }
}

impl From<RpcReceipt> for TransactionReceipt {
    fn from(receipt: RpcReceipt) -> Self {
        TransactionReceipt {
            transaction_hash: receipt.transaction_hash,
            transaction_index: receipt.transaction_index.to::<u32>(),
            logs: receipt
                .logs
                .into_iter()
                .map(|log| LogEntry {
                    address: log.address,
                    topics: log.topics,
                    data: log.data,
                    log_index: log.log_index.to::<u32>(),
                })
                .collect(),
        }
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn block_by_number(&self, number: u64) -> Result<BlockHeader> {
        let block: RpcBlock = self
            .request(
                "eth_getBlockByNumber",
                serde_json::json!([format!("0x{number:x}"), false]),
            )
            .await?;
        Ok(block.into())
    }

    async fn receipts_for_block(&self, block: &BlockHeader) -> Result<Vec<TransactionReceipt>> {
        let receipts: Vec<RpcReceipt> = self
            .request(
                "eth_getBlockReceipts",
                serde_json::json!([format!("0x{:x}", block.number)]),
            )
            .await?;
        Ok(receipts.into_iter().map(Into::into).collect())
    }

    async fn canonical_hash(&self, number: u64) -> Result<Option<B256>> {
        let block: Option<RpcBlock> = self
            .request_optional(
                "eth_getBlockByNumber",
                serde_json::json!([format!("0x{number:x}"), false]),
            )
            .await?;
        Ok(block.map(|b| b.hash))
    }

    async fn head_number(&self) -> Result<u64> {
        let head: U64 = self.request("eth_blockNumber", serde_json::json!([])).await?;
        Ok(head.to::<u64>())
    }

    fn subscribe_heads(&self, cancel: CancellationToken) -> mpsc::Receiver<u64> {
        let (tx, rx) = mpsc::channel(16);
        let client = self.clone();

        tokio::spawn(async move {
            let mut last_seen = 0u64;
            let mut ticker = tokio::time::interval(client.poll_interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => match client.head_number().await {
                        Ok(head) if head > last_seen => {
                            last_seen = head;
                            if tx.send(head).await.is_err() {
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(e) => log::warn!("head poll failed: {e}"),
                    }
                }
            }
        });

        rx
    }
}
