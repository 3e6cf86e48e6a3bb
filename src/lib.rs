//! Roost - client-side timeline synchronization and caching engine
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     UI layer (external)                      │
//! │  - observes timelines / statuses / users / lists            │
//! │  - issues refresh, load-more, and mutation commands          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service layer                            │
//! │  - per-account data sources                                 │
//! │  - optimistic mutations, lists, direct messages             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Paging engine + remote mediators                │
//! │  - per-key state machine, cursors, stale discard            │
//! │  - one mediator per (backend, feed kind)                    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │            Mappers → Cache store (SQLite, sqlx)              │
//! │  - tagged content unions, transactional page writes         │
//! │  - broadcast change notification                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `config`: Configuration management
//! - `data`: Cache store and row models
//! - `error`: Error types
//! - `mapper`: Wire-to-row normalization per backend
//! - `mediator`: Remote mediators per backend and feed kind
//! - `model`: Key and platform types
//! - `network`: Backend HTTP clients and wire models
//! - `paging`: Backend-agnostic paging engine
//! - `service`: Mutations, lists, messages, per-account facade

pub mod config;
pub mod data;
pub mod error;
pub mod mapper;
pub mod mediator;
pub mod metrics;
pub mod model;
pub mod network;
pub mod paging;
pub mod service;

use std::sync::Arc;

use error::Result;
use model::AccountKey;
use service::account::{AccountDataSource, BackendClient};

/// Engine root shared by all accounts
///
/// Owns the cache store and the HTTP client; accounts are attached with
/// their authenticated backend clients and get their own data sources.
pub struct Engine {
    /// Engine configuration
    pub config: Arc<config::AppConfig>,

    /// Cache store shared by all accounts
    pub store: Arc<data::CacheStore>,

    /// HTTP client shared by all backend clients
    pub http_client: reqwest::Client,
}

impl Engine {
    /// Initialize the engine
    ///
    /// # Steps
    /// 1. Register metrics
    /// 2. Open the cache database
    /// 3. Build the shared HTTP client
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self> {
        tracing::info!("Initializing engine...");

        if let Err(error) = metrics::register_metrics() {
            // Re-initialization in tests re-registers; not fatal.
            tracing::debug!(%error, "Metrics already registered");
        }

        let store = data::CacheStore::connect(&config.database.path).await?;
        tracing::info!(path = %config.database.path.display(), "Cache store opened");

        let http_client = network::build_http_client(&config.network)?;

        Ok(Self {
            config: Arc::new(config),
            store: Arc::new(store),
            http_client,
        })
    }

    /// In-memory engine for tests.
    pub async fn in_memory(config: config::AppConfig) -> Result<Self> {
        let store = data::CacheStore::connect_in_memory().await?;
        let http_client = network::build_http_client(&config.network)?;
        Ok(Self {
            config: Arc::new(config),
            store: Arc::new(store),
            http_client,
        })
    }

    /// Attach an account and get its data source.
    pub fn account(&self, account_key: AccountKey, client: BackendClient) -> AccountDataSource {
        AccountDataSource::new(
            Arc::clone(&self.store),
            account_key,
            client,
            self.config.paging.bounded_page_size(),
        )
    }
}
