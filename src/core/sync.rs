//! Sync state machine.
//!
//! Orchestrates bootstrap catch-up, live-head following and reorg
//! detection/rollback:
//!
//! ```text
//! Initial ──► ImportHistoric ──► WaitForNewHead ──► ReorgCheck ──► ImportNew
//!                    ▲                 ▲                │              │
//!                    └──── Reorg ◄─────┼────────────────┘              │
//!                                      └───────────────────────────────┘
//! ```
//!
//! There is no terminal state; the machine runs until externally cancelled.
//! Transient import failures are logged and retried on the next head
//! notification rather than halting the process.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cache::DerivedCaches;
use crate::chain::ChainClient;
use crate::config::CirclesIndexerConfig;
use crate::core::decoder::{LogDecoder, TokenRegistry};
use crate::core::pipeline::ImportPipeline;
use crate::core::sink::Sink;
use crate::storage::Store;
use crate::utils::error::{CirclesIndexerError, Result};
use crate::utils::logging;

/// The states of the sync machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Initial,
    ImportHistoric,
    WaitForNewHead,
    ReorgCheck,
    Reorg,
    ImportNew,
}

/// Drives the import pipeline from chain-head and store state.
pub struct SyncStateMachine {
    client: Arc<dyn ChainClient>,
    store: Arc<dyn Store>,
    caches: Arc<DerivedCaches>,
    tokens: Arc<TokenRegistry>,
    pipeline: ImportPipeline,
    config: CirclesIndexerConfig,
    cancel: CancellationToken,
    heads: mpsc::Receiver<u64>,
    state: SyncState,
    pending_head: Option<u64>,
    reorg_from: Option<u64>,
}

impl SyncStateMachine {
    #[must_use]
    pub fn new(
        client: Arc<dyn ChainClient>,
        store: Arc<dyn Store>,
        caches: Arc<DerivedCaches>,
        tokens: Arc<TokenRegistry>,
        decoder: Arc<LogDecoder>,
        config: CirclesIndexerConfig,
        cancel: CancellationToken,
    ) -> Self {
        let heads = client.subscribe_heads(cancel.clone());
        let pipeline = ImportPipeline::new(Arc::clone(&client), decoder, config.pipeline());
        Self {
            client,
            store,
            caches,
            tokens,
            pipeline,
            config,
            cancel,
            heads,
            state: SyncState::Initial,
            pending_head: None,
            reorg_from: None,
        }
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Runs the machine until the cancellation token fires.
    pub async fn run(&mut self) -> Result<()> {
        while !self.cancel.is_cancelled() {
            if let Err(e) = self.step().await {
                logging::log_error("Sync error (retrying on next head)", &e.to_string());
                self.state = SyncState::WaitForNewHead;
            }
        }
        Ok(())
    }

    /// Advances the machine by exactly one transition.
    pub async fn step(&mut self) -> Result<()> {
        match self.state {
            SyncState::Initial => self.step_initial().await,
            SyncState::ImportHistoric => self.step_import_historic().await,
            SyncState::WaitForNewHead => self.step_wait_for_new_head().await,
            SyncState::ReorgCheck => self.step_reorg_check().await,
            SyncState::Reorg => self.step_reorg().await,
            SyncState::ImportNew => self.step_import_new().await,
        }
    }

    async fn step_initial(&mut self) -> Result<()> {
        let head = self.client.head_number().await?;
        let latest = self.store.latest_block().await?;
        let gap = self.store.first_gap().await?;

        let behind = latest.is_none_or(|l| l < head);
        self.state = if gap.is_some() || behind {
            log::info!(
                "unindexed history remains (latest: {latest:?}, gap: {gap:?}, head: {head})"
            );
            SyncState::ImportHistoric
        } else {
            SyncState::WaitForNewHead
        };
        Ok(())
    }

    async fn step_import_historic(&mut self) -> Result<()> {
        // A gap means a previous run was interrupted mid-flush. Roll back to
        // the gap so the partially persisted range is re-imported cleanly.
        if let Some(gap) = self.store.first_gap().await? {
            log::warn!("interrupted run detected, rolling back to block {gap}");
            self.rollback_to(gap).await?;
        }

        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            let head = self.client.head_number().await?;
            let from = match self.store.latest_block().await? {
                Some(latest) => latest + 1,
                None => self.config.start_block,
            };
            if from > head {
                break;
            }
            let to = head.min(from + self.config.historic_batch_size - 1);
            self.import_range(from, to).await?;
        }

        self.state = SyncState::WaitForNewHead;
        Ok(())
    }

    async fn step_wait_for_new_head(&mut self) -> Result<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            head = self.heads.recv() => {
                if let Some(head) = head {
                    self.pending_head = Some(head);
                    self.state = SyncState::ReorgCheck;
                }
                // A closed subscription only happens on shutdown; the run
                // loop observes the cancellation token.
            }
        }
        Ok(())
    }

    async fn step_reorg_check(&mut self) -> Result<()> {
        let persisted = self
            .store
            .last_persisted_blocks(self.config.reorg_check_depth)
            .await?;

        if persisted.is_empty() {
            self.state = SyncState::ImportHistoric;
            return Ok(());
        }

        let mut divergent: Option<u64> = None;
        for (number, hash) in persisted {
            let canonical = self.client.canonical_hash(number).await?;
            if canonical != Some(hash) {
                divergent = Some(divergent.map_or(number, |d| d.min(number)));
            }
        }

        self.state = match divergent {
            Some(number) => {
                self.reorg_from = Some(number);
                SyncState::Reorg
            }
            None => SyncState::ImportNew,
        };
        Ok(())
    }

    async fn step_reorg(&mut self) -> Result<()> {
        let from = self.reorg_from.take().ok_or_else(|| {
            CirclesIndexerError::InternalError("reorg state without divergence point".to_string())
        })?;

        log::warn!("chain reorganization detected at block {from}, rolling back");
        self.rollback_to(from).await?;
        self.state = SyncState::ImportHistoric;
        Ok(())
    }

    async fn step_import_new(&mut self) -> Result<()> {
        let head = match self.pending_head.take() {
            Some(head) => head,
            None => self.client.head_number().await?,
        };
        let from = match self.store.latest_block().await? {
            Some(latest) => latest + 1,
            None => self.config.start_block,
        };

        if from <= head {
            self.import_range(from, head).await?;
        }
        self.state = SyncState::WaitForNewHead;
        Ok(())
    }

    /// Deletes everything from `from` onwards and rebuilds the derived
    /// caches from the events that remain persisted.
    async fn rollback_to(&mut self, from: u64) -> Result<()> {
        let deleted = self.store.delete_from_block_onwards(from).await?;
        log::info!("removed {deleted} rows from block {from} onwards");

        let events = self.store.load_events().await?;
        self.caches.rebuild(&events, &self.tokens);
        log::info!("rebuilt derived caches from {} persisted events", events.len());
        Ok(())
    }

    async fn import_range(&mut self, from: u64, to: u64) -> Result<()> {
        let numbers: Vec<u64> = (from..=to).collect();
        let mut sink = Sink::new(
            Arc::clone(&self.store),
            Arc::clone(&self.caches),
            self.config.flush_threshold,
        );

        let started = Instant::now();
        let range = self.pipeline.run(numbers, &mut sink, &self.cancel).await?;

        if let Some((min, max)) = range {
            let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            logging::log_import(min, max, sink.total_events(), duration_ms);
        }
        Ok(())
    }
}
