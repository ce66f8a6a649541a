//! `CirclesIndexer` - chain-synchronization and event-indexing engine for
//! the Circles social-currency protocol.
//!
//! The engine continuously ingests blocks and transaction receipts from an
//! Ethereum-compatible chain, decodes Circles protocol events (account
//! signups, trust relationships, token transfers across two protocol
//! versions and the generic ERC20/ERC1155 standards), persists them in
//! PostgreSQL and maintains derived in-memory indexes (trust graph,
//! balances, signup registry) consumed by downstream read APIs.
//!
//! # Quick Start
//!
//! ```no_run
//! use circles_indexer::{CirclesIndexer, CirclesIndexerConfigBuilder};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     dotenvy::dotenv().ok();
//!
//!     let config = CirclesIndexerConfigBuilder::new()
//!         .with_rpc(std::env::var("RPC_URL")?)
//!         .with_database(std::env::var("DATABASE_URL")?)
//!         .with_hub("0x29b9a7fBb8995b2423a71cC17cf9810798F6C543")
//!         .with_start_block(12_529_458)
//!         .build()?;
//!
//!     let indexer = CirclesIndexer::new(config).await?;
//!     indexer.start(CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The engine is a sync state machine driving a concurrent import pipeline:
//!
//! 1. **Sync state machine** - decides what to import and when to roll back
//!    (bootstrap catch-up, live-head following, reorg detection)
//! 2. **Import pipeline** - fetch block → fetch receipts → decode logs →
//!    apply, with bounded queues and per-stage worker pools
//! 3. **Log decoder** - topic-hash dispatch into typed events, including
//!    the cross-log signup-bonus correlation
//! 4. **Sink** - single-writer batch accumulation into PostgreSQL `COPY`
//!    loads plus incremental derived-cache updates
//! 5. **Derived caches** - trust graph, balances and signup registry,
//!    rebuilt wholesale from the persisted event log after a reorg

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

// Public API exports
pub use cache::{BalanceCache, DerivedCaches, SignupCache, TrustGraph};
pub use chain::rpc::RpcChainClient;
pub use chain::{BlockHeader, ChainClient, LogEntry, TransactionReceipt};
pub use config::{CirclesIndexerConfig, CirclesIndexerConfigBuilder};
pub use crate::core::buffer::InsertBuffer;
pub use crate::core::decoder::{LogDecoder, TokenRegistry};
pub use crate::core::indexer::CirclesIndexer;
pub use crate::core::pipeline::{ImportPipeline, PipelineConfig};
pub use crate::core::sink::Sink;
pub use crate::core::sync::{SyncState, SyncStateMachine};
pub use storage::{PgStore, SelectFilter, SqlRow, SqlValue, Store};
pub use types::events::IndexEvent;
pub use utils::error::{CirclesIndexerError, Result};

// Module declarations
pub mod cache;
pub mod chain;
pub mod config;
pub mod core;
pub mod storage;
pub mod types;
pub mod utils;
