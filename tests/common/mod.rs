//! Shared test fixtures: an in-memory store, a scriptable chain client and
//! builders for raw logs and receipts.

#![allow(dead_code)]

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use circles_indexer::core::decoder::topics;
use circles_indexer::storage::schema::{self, TableSchema};
use circles_indexer::{
    BlockHeader, ChainClient, CirclesIndexerError, LogEntry, Result, SelectFilter, SqlRow,
    SqlValue, Store, TransactionReceipt,
};

/// In-memory [`Store`] used by the pipeline and sync tests.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<&'static str, Vec<SqlRow>>>,
    /// When set, every `write_batch` call acquires one permit first; tests
    /// use this to stall the sink and observe backpressure.
    write_gate: Option<Arc<Semaphore>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            write_gate: Some(gate),
        }
    }

    pub fn rows_in(&self, table: &TableSchema) -> Vec<SqlRow> {
        self.tables
            .lock()
            .get(table.name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn block_numbers(&self) -> Vec<u64> {
        let mut numbers: Vec<u64> = self
            .rows_in(&schema::BLOCK)
            .iter()
            .filter_map(|row| match row.first() {
                Some(SqlValue::BigInt(n)) => u64::try_from(*n).ok(),
                _ => None,
            })
            .collect();
        numbers.sort_unstable();
        numbers
    }

    fn block_number_of(row: &SqlRow) -> u64 {
        match row.first() {
            Some(SqlValue::BigInt(n)) => u64::try_from(*n).unwrap_or(0),
            _ => 0,
        }
    }
}

fn cmp_values(a: &SqlValue, b: &SqlValue) -> Ordering {
    match (a, b) {
        (SqlValue::BigInt(x), SqlValue::BigInt(y)) => x.cmp(y),
        (SqlValue::Numeric(x), SqlValue::Numeric(y)) => x.cmp(y),
        (SqlValue::Text(x), SqlValue::Text(y)) => x.cmp(y),
        (SqlValue::Address(x), SqlValue::Address(y)) => x.cmp(y),
        (SqlValue::Hash(x), SqlValue::Hash(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn migrate(&self) -> Result<()> {
        Ok(())
    }

    async fn write_batch(&self, table: &TableSchema, rows: Vec<SqlRow>) -> Result<()> {
        if let Some(gate) = &self.write_gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| CirclesIndexerError::InternalError(e.to_string()))?;
            permit.forget();
        }
        for row in &rows {
            assert_eq!(
                row.len(),
                table.columns.len(),
                "row width mismatch for table {}",
                table.name
            );
        }
        self.tables
            .lock()
            .entry(table.name)
            .or_default()
            .extend(rows);
        Ok(())
    }

    async fn latest_block(&self) -> Result<Option<u64>> {
        Ok(self.block_numbers().last().copied())
    }

    async fn first_gap(&self) -> Result<Option<u64>> {
        let numbers = self.block_numbers();
        for pair in numbers.windows(2) {
            if pair[1] > pair[0] + 1 {
                return Ok(Some(pair[0] + 1));
            }
        }
        Ok(None)
    }

    async fn last_persisted_blocks(&self, n: u32) -> Result<Vec<(u64, B256)>> {
        let mut rows = self.rows_in(&schema::BLOCK);
        rows.sort_by_key(|row| std::cmp::Reverse(Self::block_number_of(row)));
        rows.truncate(n as usize);
        Ok(rows
            .into_iter()
            .map(|row| {
                let hash = match row.get(1) {
                    Some(SqlValue::Hash(h)) => *h,
                    _ => B256::ZERO,
                };
                (Self::block_number_of(&row), hash)
            })
            .collect())
    }

    async fn delete_from_block_onwards(&self, from_block: u64) -> Result<u64> {
        let mut deleted = 0u64;
        let mut tables = self.tables.lock();
        for rows in tables.values_mut() {
            let before = rows.len();
            // block_number is the first column of every base table.
            rows.retain(|row| Self::block_number_of(row) < from_block);
            deleted += (before - rows.len()) as u64;
        }
        Ok(deleted)
    }

    async fn select(
        &self,
        table: &'static TableSchema,
        filter: SelectFilter,
    ) -> Result<Vec<SqlRow>> {
        let mut rows = self.rows_in(table);

        if let Some((column, value)) = &filter.where_eq {
            let index = table
                .columns
                .iter()
                .position(|c| c.name == *column)
                .ok_or_else(|| {
                    CirclesIndexerError::InternalError(format!("unknown column {column}"))
                })?;
            rows.retain(|row| row.get(index) == Some(value));
        }

        if !filter.order_by.is_empty() {
            let indexes: Vec<usize> = filter
                .order_by
                .iter()
                .filter_map(|name| table.columns.iter().position(|c| c.name == *name))
                .collect();
            rows.sort_by(|a, b| {
                for &i in &indexes {
                    let ordering = cmp_values(&a[i], &b[i]);
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }

        if let Some(limit) = filter.limit {
            rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }
        Ok(rows)
    }
}

/// Scriptable [`ChainClient`] backed by in-memory block data.
pub struct MockChainClient {
    blocks: Mutex<HashMap<u64, (BlockHeader, Vec<TransactionReceipt>)>>,
    canonical: Mutex<HashMap<u64, B256>>,
    head: AtomicU64,
    heads_tx: mpsc::Sender<u64>,
    heads_rx: Mutex<Option<mpsc::Receiver<u64>>>,
}

impl MockChainClient {
    pub fn new() -> Self {
        let (heads_tx, heads_rx) = mpsc::channel(16);
        Self {
            blocks: Mutex::new(HashMap::new()),
            canonical: Mutex::new(HashMap::new()),
            head: AtomicU64::new(0),
            heads_tx,
            heads_rx: Mutex::new(Some(heads_rx)),
        }
    }

    /// Installs a block (and makes it canonical). Raises the head if the
    /// block is beyond it.
    pub fn add_block(&self, header: BlockHeader, receipts: Vec<TransactionReceipt>) {
        self.canonical.lock().insert(header.number, header.hash);
        self.blocks.lock().insert(header.number, (header, receipts));
        self.head.fetch_max(header.number, AtomicOrdering::SeqCst);
    }

    /// Sends a head notification to the subscribed state machine.
    pub async fn notify_head(&self, number: u64) {
        self.head.fetch_max(number, AtomicOrdering::SeqCst);
        self.heads_tx.send(number).await.expect("machine gone");
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn block_by_number(&self, number: u64) -> Result<BlockHeader> {
        self.blocks
            .lock()
            .get(&number)
            .map(|(header, _)| *header)
            .ok_or_else(|| CirclesIndexerError::RpcError(format!("unknown block {number}")))
    }

    async fn receipts_for_block(&self, block: &BlockHeader) -> Result<Vec<TransactionReceipt>> {
        self.blocks
            .lock()
            .get(&block.number)
            .map(|(_, receipts)| receipts.clone())
            .ok_or_else(|| {
                CirclesIndexerError::RpcError(format!("unknown block {}", block.number))
            })
    }

    async fn canonical_hash(&self, number: u64) -> Result<Option<B256>> {
        Ok(self.canonical.lock().get(&number).copied())
    }

    async fn head_number(&self) -> Result<u64> {
        Ok(self.head.load(AtomicOrdering::SeqCst))
    }

    fn subscribe_heads(&self, _cancel: CancellationToken) -> mpsc::Receiver<u64> {
        self.heads_rx
            .lock()
            .take()
            .expect("heads already subscribed")
    }
}

// ---- builders -------------------------------------------------------------

pub fn addr(n: u64) -> Address {
    Address::from_word(B256::from(U256::from(n)))
}

pub fn header(number: u64) -> BlockHeader {
    header_with_salt(number, 0)
}

/// A deterministic header; different `salt` values produce the competing
/// hashes needed for reorg scenarios.
pub fn header_with_salt(number: u64, salt: u64) -> BlockHeader {
    let mut preimage = [0u8; 16];
    preimage[..8].copy_from_slice(&number.to_be_bytes());
    preimage[8..].copy_from_slice(&salt.to_be_bytes());
    BlockHeader {
        number,
        hash: keccak256(preimage),
        timestamp: 1_600_000_000 + number,
    }
}

pub fn receipt(transaction_index: u32, logs: Vec<LogEntry>) -> TransactionReceipt {
    TransactionReceipt {
        transaction_hash: keccak256(transaction_index.to_be_bytes()),
        transaction_index,
        logs,
    }
}

pub fn topic_from_address(address: Address) -> B256 {
    address.into_word()
}

pub fn word(value: U256) -> [u8; 32] {
    value.to_be_bytes::<32>()
}

pub fn address_word(address: Address) -> [u8; 32] {
    address.into_word().0
}

pub fn signup_log(hub: Address, account: Address, token: Address, log_index: u32) -> LogEntry {
    LogEntry {
        address: hub,
        topics: vec![*topics::SIGNUP, topic_from_address(account)],
        data: Bytes::copy_from_slice(&address_word(token)),
        log_index,
    }
}

pub fn organization_signup_log(hub: Address, organization: Address, log_index: u32) -> LogEntry {
    LogEntry {
        address: hub,
        topics: vec![*topics::ORGANIZATION_SIGNUP, topic_from_address(organization)],
        data: Bytes::new(),
        log_index,
    }
}

pub fn trust_log(
    hub: Address,
    truster: Address,
    trustee: Address,
    limit: U256,
    log_index: u32,
) -> LogEntry {
    LogEntry {
        address: hub,
        topics: vec![
            *topics::TRUST,
            topic_from_address(truster),
            topic_from_address(trustee),
        ],
        data: Bytes::copy_from_slice(&word(limit)),
        log_index,
    }
}

pub fn hub_transfer_log(
    hub: Address,
    from: Address,
    to: Address,
    amount: U256,
    log_index: u32,
) -> LogEntry {
    LogEntry {
        address: hub,
        topics: vec![
            *topics::HUB_TRANSFER,
            topic_from_address(from),
            topic_from_address(to),
        ],
        data: Bytes::copy_from_slice(&word(amount)),
        log_index,
    }
}

pub fn transfer_log(
    token: Address,
    from: Address,
    to: Address,
    amount: U256,
    log_index: u32,
) -> LogEntry {
    LogEntry {
        address: token,
        topics: vec![
            *topics::ERC20_TRANSFER,
            topic_from_address(from),
            topic_from_address(to),
        ],
        data: Bytes::copy_from_slice(&word(amount)),
        log_index,
    }
}

pub fn mint_log(token: Address, to: Address, amount: U256, log_index: u32) -> LogEntry {
    transfer_log(token, Address::ZERO, to, amount, log_index)
}
