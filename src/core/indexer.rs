//! Main indexer orchestrator that integrates all components.
//!
//! This module provides the `CirclesIndexer` struct that wires the store,
//! chain client, decoder, derived caches and sync state machine into a
//! complete indexing engine.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::cache::DerivedCaches;
use crate::chain::rpc::RpcChainClient;
use crate::chain::ChainClient;
use crate::config::CirclesIndexerConfig;
use crate::core::decoder::{LogDecoder, TokenRegistry};
use crate::core::sync::SyncStateMachine;
use crate::storage::{PgStore, Store};
use crate::utils::error::Result;
use crate::utils::logging;

/// The complete indexing engine.
///
/// # Example
///
/// ```no_run
/// use circles_indexer::{CirclesIndexer, CirclesIndexerConfigBuilder};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = CirclesIndexerConfigBuilder::new()
///     .with_rpc("http://127.0.0.1:8545")
///     .with_database("postgresql://localhost/circles")
///     .with_hub("0x29b9a7fBb8995b2423a71cC17cf9810798F6C543")
///     .build()?;
///
/// let indexer = CirclesIndexer::new(config).await?;
/// indexer.start(CancellationToken::new()).await?;
/// # Ok(())
/// # }
/// ```
pub struct CirclesIndexer {
    config: CirclesIndexerConfig,
    store: Arc<dyn Store>,
    client: Arc<dyn ChainClient>,
    caches: Arc<DerivedCaches>,
    tokens: Arc<TokenRegistry>,
    decoder: Arc<LogDecoder>,
}

impl CirclesIndexer {
    /// Creates a new indexer against PostgreSQL and a JSON-RPC node.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails.
    pub async fn new(config: CirclesIndexerConfig) -> Result<Self> {
        let store = Arc::new(PgStore::new(&config.database_url).await?);
        let client = Arc::new(RpcChainClient::new(
            config.rpc_url.clone(),
            config.poll_interval_secs,
        ));
        Ok(Self::with_backends(config, store, client))
    }

    /// Creates a new indexer with injected backends.
    ///
    /// This is useful for testing with a mock chain client and an in-memory
    /// store.
    #[must_use]
    pub fn with_backends(
        config: CirclesIndexerConfig,
        store: Arc<dyn Store>,
        client: Arc<dyn ChainClient>,
    ) -> Self {
        let tokens = Arc::new(TokenRegistry::new());
        let decoder = Arc::new(LogDecoder::new(
            config.hub_address,
            config.hub_v2_address,
            Arc::clone(&tokens),
        ));
        let caches = Arc::new(DerivedCaches::new());

        Self {
            config,
            store,
            client,
            caches,
            tokens,
            decoder,
        }
    }

    /// The derived caches, shared with downstream read APIs.
    #[must_use]
    pub fn caches(&self) -> &Arc<DerivedCaches> {
        &self.caches
    }

    /// The discovered-token registry.
    #[must_use]
    pub fn token_registry(&self) -> &Arc<TokenRegistry> {
        &self.tokens
    }

    /// The persistent store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Migrates the schema, warms the derived caches from the persisted
    /// event log, and runs the sync state machine until `cancel` fires.
    pub async fn start(self, cancel: CancellationToken) -> Result<()> {
        self.store.migrate().await?;

        let events = self.store.load_events().await?;
        self.caches.rebuild(&events, &self.tokens);
        logging::log(
            logging::LogLevel::Success,
            &format!(
                "warmed caches from {} events ({} accounts, {} organizations, {} tokens)",
                events.len(),
                self.caches.signups.person_count(),
                self.caches.signups.organization_count(),
                self.tokens.len()
            ),
        );

        let mut machine = SyncStateMachine::new(
            self.client,
            self.store,
            self.caches,
            self.tokens,
            self.decoder,
            self.config,
            cancel,
        );
        machine.run().await
    }
}
