//! Chain client abstraction and raw chain data types.
//!
//! The engine consumes the chain through the [`ChainClient`] trait only:
//! block-by-number lookup, receipt lookup, canonical-hash lookup and a
//! new-head subscription. The production implementation is the JSON-RPC
//! client in [`rpc`]; tests inject a mock through the same trait.

pub mod rpc;

use alloy_primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::utils::error::Result;

/// A block header as consumed by the import pipeline.
///
/// Identity is the block number; a header is superseded wholesale on reorg,
/// never mutated in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub number: u64,
    pub hash: B256,
    pub timestamp: u64,
}

/// One raw log entry of a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// The contract address that emitted the log.
    pub address: Address,
    /// Ordered topic hashes; `topics[0]` is the event signature.
    pub topics: Vec<B256>,
    /// Opaque ABI-encoded payload.
    pub data: Bytes,
    /// Position of the log within its block.
    pub log_index: u32,
}

/// A transaction receipt with all of its logs.
///
/// The decoder needs the full log list of a receipt for cross-log
/// correlation (the signup-bonus mint).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    pub transaction_index: u32,
    pub logs: Vec<LogEntry>,
}

/// Abstract interface to an Ethereum-compatible chain client.
///
/// Chain data is trusted as delivered; the engine performs no cryptographic
/// verification.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Fetches the block header for `number`.
    async fn block_by_number(&self, number: u64) -> Result<BlockHeader>;

    /// Fetches all transaction receipts of `block`.
    async fn receipts_for_block(&self, block: &BlockHeader) -> Result<Vec<TransactionReceipt>>;

    /// The canonical hash currently at `number`, or `None` if the chain has
    /// no block there.
    async fn canonical_hash(&self, number: u64) -> Result<Option<B256>>;

    /// The current chain head number.
    async fn head_number(&self) -> Result<u64>;

    /// Subscribes to new-head notifications. Each received value is the new
    /// head number. The subscription ends when `cancel` fires.
    fn subscribe_heads(&self, cancel: CancellationToken) -> mpsc::Receiver<u64>;
}
