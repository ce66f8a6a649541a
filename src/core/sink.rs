//! Single-writer apply stage of the import pipeline.
//!
//! The sink routes every decoded event to its table-specific batch and to
//! the derived caches, buffers block headers in the [`InsertBuffer`] and
//! flushes everything as bulk batches once the buffer crosses the configured
//! threshold. Flushing is size-triggered only, never time-triggered; the
//! pipeline flushes the partial buffer explicitly on shutdown.

use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::DerivedCaches;
use crate::chain::BlockHeader;
use crate::core::buffer::InsertBuffer;
use crate::storage::schema::{self, TableSchema};
use crate::storage::{SqlRow, SqlValue, Store};
use crate::types::events::{
    Erc1155TransferBatch, Erc1155TransferSingle, Erc20Transfer, HubTransfer, IndexEvent,
    OrganizationSignup, RegisterHuman, RegisterOrganization, Signup, Trust, TrustV2,
};
use crate::utils::error::Result;

/// Batch-accumulating event sink. Strictly single-writer: one sink instance
/// is driven by exactly one pipeline run.
pub struct Sink {
    store: Arc<dyn Store>,
    caches: Arc<DerivedCaches>,
    buffer: InsertBuffer<BlockHeader>,
    batches: HashMap<&'static str, (&'static TableSchema, Vec<SqlRow>)>,
    flush_threshold: usize,
    total_events: usize,
}

impl Sink {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, caches: Arc<DerivedCaches>, flush_threshold: usize) -> Self {
        Self {
            store,
            caches,
            buffer: InsertBuffer::new(),
            batches: HashMap::new(),
            flush_threshold: flush_threshold.max(1),
            total_events: 0,
        }
    }

    /// Applies one pipeline unit: all events of a block, then the block
    /// header itself. Triggers a flush when the header buffer crosses the
    /// threshold.
    pub async fn apply(&mut self, block: BlockHeader, events: Vec<IndexEvent>) -> Result<()> {
        for event in &events {
            self.add_event(event);
        }
        self.buffer.append(block);
        if self.buffer.len() >= self.flush_threshold {
            self.flush().await?;
        }
        Ok(())
    }

    /// Adds one event to its table batch and applies it to the caches.
    pub fn add_event(&mut self, event: &IndexEvent) {
        self.push_row(event.table(), event.row());
        self.caches.apply_event(event);
        self.total_events += 1;
    }

    pub fn add_signup(&mut self, event: Signup) {
        self.add_event(&IndexEvent::Signup(event));
    }

    pub fn add_organization_signup(&mut self, event: OrganizationSignup) {
        self.add_event(&IndexEvent::OrganizationSignup(event));
    }

    pub fn add_trust(&mut self, event: Trust) {
        self.add_event(&IndexEvent::Trust(event));
    }

    pub fn add_hub_transfer(&mut self, event: HubTransfer) {
        self.add_event(&IndexEvent::HubTransfer(event));
    }

    pub fn add_erc20_transfer(&mut self, event: Erc20Transfer) {
        self.add_event(&IndexEvent::Erc20Transfer(event));
    }

    pub fn add_register_human(&mut self, event: RegisterHuman) {
        self.add_event(&IndexEvent::RegisterHuman(event));
    }

    pub fn add_register_organization(&mut self, event: RegisterOrganization) {
        self.add_event(&IndexEvent::RegisterOrganization(event));
    }

    pub fn add_trust_v2(&mut self, event: TrustV2) {
        self.add_event(&IndexEvent::TrustV2(event));
    }

    pub fn add_erc1155_transfer_single(&mut self, event: Erc1155TransferSingle) {
        self.add_event(&IndexEvent::Erc1155TransferSingle(event));
    }

    pub fn add_erc1155_transfer_batch(&mut self, event: Erc1155TransferBatch) {
        self.add_event(&IndexEvent::Erc1155TransferBatch(event));
    }

    /// Writes all accumulated event batches, then the snapshotted block
    /// headers, through the store's bulk path.
    ///
    /// The block table is written last: a persisted block number marks its
    /// events as fully committed, so an interrupted flush leaves a
    /// detectable gap instead of a silently incomplete block.
    pub async fn flush(&mut self) -> Result<()> {
        let batches: Vec<(&'static TableSchema, Vec<SqlRow>)> = self
            .batches
            .drain()
            .map(|(_, batch)| batch)
            .filter(|(_, rows)| !rows.is_empty())
            .collect();
        for (table, rows) in batches {
            self.store.write_batch(table, rows).await?;
        }

        let headers = self.buffer.snapshot();
        if !headers.is_empty() {
            let rows = headers.iter().map(block_row).collect();
            self.store.write_batch(&schema::BLOCK, rows).await?;
        }
        Ok(())
    }

    /// Total number of events applied through this sink.
    #[must_use]
    pub fn total_events(&self) -> usize {
        self.total_events
    }

    fn push_row(&mut self, table: &'static TableSchema, row: SqlRow) {
        self.batches
            .entry(table.name)
            .or_insert_with(|| (table, Vec::new()))
            .1
            .push(row);
    }
}

fn block_row(block: &BlockHeader) -> SqlRow {
    vec![
        SqlValue::BigInt(i64::try_from(block.number).unwrap_or(i64::MAX)),
        SqlValue::Hash(block.hash),
        SqlValue::BigInt(i64::try_from(block.timestamp).unwrap_or(i64::MAX)),
    ]
}
