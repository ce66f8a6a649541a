mod common;

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::U256;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use circles_indexer::core::decoder::{LogDecoder, TokenRegistry};
use circles_indexer::storage::schema;
use circles_indexer::{
    ChainClient, DerivedCaches, ImportPipeline, PipelineConfig, Sink, SqlValue, Store,
};
use common::*;

fn pipeline(client: Arc<MockChainClient>, config: PipelineConfig) -> ImportPipeline {
    let decoder = Arc::new(LogDecoder::new(
        addr(0x10),
        None,
        Arc::new(TokenRegistry::new()),
    ));
    ImportPipeline::new(client as Arc<dyn ChainClient>, decoder, config)
}

fn sink(store: &Arc<MemoryStore>, flush_threshold: usize) -> Sink {
    Sink::new(
        Arc::clone(store) as Arc<dyn Store>,
        Arc::new(DerivedCaches::new()),
        flush_threshold,
    )
}

/// Populates `client` with blocks `from..=to`, each carrying one trust
/// event, and returns the block numbers.
fn seed_blocks(client: &MockChainClient, from: u64, to: u64) -> Vec<u64> {
    let hub = addr(0x10);
    for number in from..=to {
        client.add_block(
            header(number),
            vec![receipt(
                0,
                vec![trust_log(
                    hub,
                    addr(0x20),
                    addr(0x21),
                    U256::from(number),
                    0,
                )],
            )],
        );
    }
    (from..=to).collect()
}

#[tokio::test]
async fn test_run_imports_all_blocks_and_reports_range() {
    let client = Arc::new(MockChainClient::new());
    let numbers = seed_blocks(&client, 1, 20);
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(Arc::clone(&client), PipelineConfig::default());
    let mut sink = sink(&store, 100);

    let range = pipeline
        .run(numbers, &mut sink, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(range, Some((1, 20)));
    assert_eq!(store.block_numbers(), (1..=20).collect::<Vec<_>>());
    assert_eq!(store.rows_in(&schema::CRC_V1_TRUST).len(), 20);
    assert_eq!(Store::latest_block(store.as_ref()).await.unwrap(), Some(20));
}

#[tokio::test]
async fn test_empty_run_returns_none() {
    let client = Arc::new(MockChainClient::new());
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(Arc::clone(&client), PipelineConfig::default());
    let mut sink = sink(&store, 100);

    let range = pipeline
        .run(Vec::new(), &mut sink, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(range, None);
}

#[tokio::test]
async fn test_intra_block_event_order_is_decode_order() {
    let hub = addr(0x10);
    let client = Arc::new(MockChainClient::new());

    // One block, three transactions, several logs each, deliberately
    // installed with ascending (transaction_index, log_index).
    let receipts = vec![
        receipt(
            0,
            vec![
                trust_log(hub, addr(0x20), addr(0x21), U256::from(1u64), 0),
                trust_log(hub, addr(0x20), addr(0x22), U256::from(2u64), 1),
            ],
        ),
        receipt(
            1,
            vec![trust_log(hub, addr(0x23), addr(0x21), U256::from(3u64), 2)],
        ),
        receipt(
            2,
            vec![
                trust_log(hub, addr(0x24), addr(0x21), U256::from(4u64), 3),
                trust_log(hub, addr(0x24), addr(0x22), U256::from(5u64), 4),
            ],
        ),
    ];
    client.add_block(header(7), receipts);

    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(Arc::clone(&client), PipelineConfig::default());
    let mut sink = sink(&store, 100);
    pipeline
        .run(vec![7], &mut sink, &CancellationToken::new())
        .await
        .unwrap();

    let rows = store.rows_in(&schema::CRC_V1_TRUST);
    let keys: Vec<(SqlValue, SqlValue)> = rows
        .iter()
        .map(|row| (row[2].clone(), row[3].clone()))
        .collect();
    let expected: Vec<(SqlValue, SqlValue)> = [(0, 0), (0, 1), (1, 2), (2, 3), (2, 4)]
        .into_iter()
        .map(|(tx, log)| (SqlValue::BigInt(tx), SqlValue::BigInt(log)))
        .collect();
    assert_eq!(keys, expected);
}

#[tokio::test]
async fn test_decode_error_cancels_whole_run() {
    let hub = addr(0x10);
    let client = Arc::new(MockChainClient::new());
    seed_blocks(&client, 1, 19);
    // Block 20 carries a signup with no paired mint.
    client.add_block(
        header(20),
        vec![receipt(0, vec![signup_log(hub, addr(0x20), addr(0x30), 0)])],
    );

    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(Arc::clone(&client), PipelineConfig::default());
    let mut sink = sink(&store, 100);

    let result = pipeline
        .run((1..=20).collect(), &mut sink, &CancellationToken::new())
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_backpressure_suspends_source_until_sink_drains() {
    let client = Arc::new(MockChainClient::new());
    let numbers = seed_blocks(&client, 1, 12);

    // Tight queues, flush on every block, and a store that blocks every
    // write until the gate opens.
    let gate = Arc::new(Semaphore::new(0));
    let store = Arc::new(MemoryStore::gated(Arc::clone(&gate)));
    let config = PipelineConfig {
        queue_capacity: 2,
        block_fetch_parallelism: 2,
        receipt_fetch_parallelism: 2,
        decode_parallelism: 2,
    };
    let pipeline = pipeline(Arc::clone(&client), config);
    let mut sink = sink(&store, 1);

    let cancel = CancellationToken::new();
    let run = pipeline.run(numbers, &mut sink, &cancel);
    tokio::pin!(run);

    // With the sink stalled, the run must not complete: the source stage is
    // suspended on a full queue.
    let stalled = tokio::time::timeout(Duration::from_millis(200), run.as_mut()).await;
    assert!(stalled.is_err(), "run completed despite stalled sink");
    assert!(store.block_numbers().is_empty());

    // Open the gate; the pipeline drains without dropping or reordering.
    gate.add_permits(10_000);
    let range = run.await.unwrap();
    assert_eq!(range, Some((1, 12)));
    assert_eq!(store.block_numbers(), (1..=12).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_load_events_returns_canonical_order() {
    let hub = addr(0x10);
    let client = Arc::new(MockChainClient::new());

    // Mixed kinds across two blocks; load_events must merge the per-table
    // reads back into (block, transaction, log) order.
    client.add_block(
        header(2),
        vec![receipt(
            0,
            vec![trust_log(hub, addr(0x20), addr(0x21), U256::from(9u64), 0)],
        )],
    );
    client.add_block(
        header(1),
        vec![
            receipt(
                0,
                vec![
                    signup_log(hub, addr(0x20), addr(0x30), 0),
                    mint_log(addr(0x30), addr(0x20), U256::from(50u64), 1),
                ],
            ),
            receipt(
                1,
                vec![trust_log(hub, addr(0x21), addr(0x20), U256::from(7u64), 2)],
            ),
        ],
    );

    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(Arc::clone(&client), PipelineConfig::default());
    let mut sink = sink(&store, 100);
    pipeline
        .run(vec![2, 1], &mut sink, &CancellationToken::new())
        .await
        .unwrap();

    let events = Store::load_events(store.as_ref()).await.unwrap();
    let keys: Vec<_> = events.iter().map(|e| e.sort_key()).collect();
    let mut sorted = keys.clone();
    sorted.sort_unstable();
    assert_eq!(keys, sorted);
    assert_eq!(events.len(), 4);
    assert_eq!(events[0].context().block_number, 1);
    assert_eq!(events[3].context().block_number, 2);
}

#[tokio::test]
async fn test_partial_buffer_flushed_on_completion() {
    let client = Arc::new(MockChainClient::new());
    let numbers = seed_blocks(&client, 1, 3);
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(Arc::clone(&client), PipelineConfig::default());
    // Threshold far above the run size: only the shutdown flush persists.
    let mut sink = sink(&store, 1_000);

    pipeline
        .run(numbers, &mut sink, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(store.block_numbers(), vec![1, 2, 3]);
}
