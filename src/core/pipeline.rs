//! Concurrent four-stage import pipeline.
//!
//! fetch block → fetch receipts → decode logs → apply (sink). Stages are
//! connected by bounded channels; stages 1–3 run unordered worker pools for
//! throughput, so blocks reach the sink in completion order, not in input
//! order. "Latest persisted block" is therefore only meaningful after a run
//! has fully drained — never mid-run.
//!
//! Backpressure: a full downstream queue suspends its producer, propagating
//! transitively to the block-number source. Completion: closing the number
//! source drains and closes each stage in turn. A stage error cancels the
//! run-scoped token before surfacing, so every stage unwinds instead of
//! deadlocking on a full queue.

use std::future::Future;
use std::sync::Arc;

use futures::stream::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::chain::{BlockHeader, ChainClient, TransactionReceipt};
use crate::core::decoder::LogDecoder;
use crate::core::sink::Sink;
use crate::types::events::IndexEvent;
use crate::utils::error::{CirclesIndexerError, Result};

/// Per-stage queue bounds and worker-pool sizes.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Capacity of every inter-stage queue.
    pub queue_capacity: usize,
    /// Workers fetching block headers (network-bound, kept low).
    pub block_fetch_parallelism: usize,
    /// Workers fetching receipts.
    pub receipt_fetch_parallelism: usize,
    /// Workers decoding logs.
    pub decode_parallelism: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            block_fetch_parallelism: 4,
            receipt_fetch_parallelism: 8,
            decode_parallelism: 8,
        }
    }
}

/// The concurrent import pipeline. One instance is reused across runs; each
/// run gets its own channels, child cancellation token and sink.
pub struct ImportPipeline {
    client: Arc<dyn ChainClient>,
    decoder: Arc<LogDecoder>,
    config: PipelineConfig,
}

impl ImportPipeline {
    #[must_use]
    pub fn new(
        client: Arc<dyn ChainClient>,
        decoder: Arc<LogDecoder>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            client,
            decoder,
            config,
        }
    }

    /// Imports the given block numbers through all four stages.
    ///
    /// Returns the `[min, max]` range actually submitted once the sink has
    /// fully drained and flushed, or `None` for an empty run.
    ///
    /// # Errors
    ///
    /// The first stage or sink error cancels the whole in-flight run and is
    /// returned; there is no per-event isolation, since partial application
    /// of one block's events would leave caches and store inconsistent.
    pub async fn run(
        &self,
        numbers: Vec<u64>,
        sink: &mut Sink,
        cancel: &CancellationToken,
    ) -> Result<Option<(u64, u64)>> {
        if numbers.is_empty() {
            return Ok(None);
        }
        let min = numbers.iter().copied().min().unwrap_or(0);
        let max = numbers.iter().copied().max().unwrap_or(0);

        let cancel = cancel.child_token();
        let capacity = self.config.queue_capacity.max(1);

        let (number_tx, number_rx) = mpsc::channel::<u64>(capacity);
        let (block_tx, block_rx) = mpsc::channel::<BlockHeader>(capacity);
        let (receipts_tx, receipts_rx) =
            mpsc::channel::<(BlockHeader, Vec<TransactionReceipt>)>(capacity);
        let (unit_tx, mut unit_rx) = mpsc::channel::<(BlockHeader, Vec<IndexEvent>)>(capacity);

        let feeder: JoinHandle<Result<()>> = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                for number in numbers {
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        sent = number_tx.send(number) => {
                            if sent.is_err() {
                                return Ok(());
                            }
                        }
                    }
                }
                Ok(())
            })
        };

        let fetch_blocks = {
            let client = Arc::clone(&self.client);
            spawn_stage(
                number_rx,
                block_tx,
                self.config.block_fetch_parallelism,
                cancel.clone(),
                move |number| {
                    let client = Arc::clone(&client);
                    async move { client.block_by_number(number).await }
                },
            )
        };

        let fetch_receipts = {
            let client = Arc::clone(&self.client);
            spawn_stage(
                block_rx,
                receipts_tx,
                self.config.receipt_fetch_parallelism,
                cancel.clone(),
                move |block| {
                    let client = Arc::clone(&client);
                    async move {
                        let receipts = client.receipts_for_block(&block).await?;
                        Ok((block, receipts))
                    }
                },
            )
        };

        let decode = {
            let decoder = Arc::clone(&self.decoder);
            spawn_stage(
                receipts_rx,
                unit_tx,
                self.config.decode_parallelism,
                cancel.clone(),
                move |(block, receipts): (BlockHeader, Vec<TransactionReceipt>)| {
                    let decoder = Arc::clone(&decoder);
                    async move {
                        let events = decoder.decode_block(&block, &receipts)?;
                        Ok((block, events))
                    }
                },
            )
        };

        // Stage 4: the single-writer sink loop.
        let mut outcome: Result<()> = Ok(());
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                unit = unit_rx.recv() => match unit {
                    Some((block, events)) => {
                        if let Err(e) = sink.apply(block, events).await {
                            cancel.cancel();
                            outcome = Err(e);
                            break;
                        }
                    }
                    None => break,
                }
            }
        }

        for handle in [feeder, fetch_blocks, fetch_receipts, decode] {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if outcome.is_ok() {
                        outcome = Err(e);
                    }
                }
                Err(e) => {
                    if outcome.is_ok() {
                        outcome = Err(CirclesIndexerError::InternalError(format!(
                            "pipeline stage panicked: {e}"
                        )));
                    }
                }
            }
        }
        outcome?;

        // Partial header buffer is flushed explicitly on shutdown.
        sink.flush().await?;
        Ok(Some((min, max)))
    }
}

/// Spawns one pipeline stage: an unordered worker pool of `parallelism`
/// concurrent `work` futures over the input channel, forwarding outputs
/// downstream. Honors `cancel` at every queue-wait suspension point and
/// cancels it before surfacing a work error.
fn spawn_stage<T, U, F, Fut>(
    rx: mpsc::Receiver<T>,
    tx: mpsc::Sender<U>,
    parallelism: usize,
    cancel: CancellationToken,
    work: F,
) -> JoinHandle<Result<()>>
where
    T: Send + 'static,
    U: Send + 'static,
    F: FnMut(T) -> Fut + Send + 'static,
    Fut: Future<Output = Result<U>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut results = ReceiverStream::new(rx)
            .map(work)
            .buffer_unordered(parallelism.max(1));

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                next = results.next() => next,
            };
            match next {
                Some(Ok(output)) => {
                    let sent = tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        sent = tx.send(output) => sent,
                    };
                    if sent.is_err() {
                        // Downstream is gone; its own stage reports why.
                        return Ok(());
                    }
                }
                Some(Err(e)) => {
                    cancel.cancel();
                    return Err(e);
                }
                None => return Ok(()),
            }
        }
    })
}
