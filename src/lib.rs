pub mod backend;
pub mod cache;
pub mod classify;
pub mod config;
pub mod error;
pub mod extract;
pub mod identity;
pub mod mcp;
pub mod orchestrator;
pub mod retry;
pub mod server;
pub mod store;
pub mod types;

use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::ResultCache;
use crate::config::Config;
use crate::error::SearchError;
use crate::orchestrator::Orchestrator;
use crate::store::{LinkStore, MemoryStore, NullStore, SqliteStore};

pub use types::*;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: Arc<Orchestrator>,
    /// Cache backing store; also the audit sink.
    pub store: Arc<dyn LinkStore>,
}

impl AppState {
    pub fn new(config: Config, orchestrator: Orchestrator, store: Arc<dyn LinkStore>) -> Self {
        Self {
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
            store,
        }
    }

    /// Wires the real HTTP backends, store and cache from `config`.
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        let store = open_store(&config).await;
        let cache = ResultCache::new(
            store.clone(),
            config.cache_memory_capacity,
            config.cache_empty_results,
        );
        let backends = backend::http_backends(&config.engines, &http_client);
        let orchestrator = Orchestrator::from_config(&config, backends, cache);
        info!(
            engines = ?orchestrator.backend_names(),
            max_attempts = config.max_attempts,
            cache_empty = config.cache_empty_results,
            "search pipeline ready"
        );

        Ok(Self::new(config, orchestrator, store))
    }

    /// Records the audit event, then runs the search. Audit failures are
    /// logged and never block the search.
    pub async fn search(
        &self,
        request: &SearchRequest,
        event: SearchEvent,
    ) -> Result<SearchReport, SearchError> {
        let identifier = Identifier::parse(&request.identifier)?;
        let platforms = self.config.select_platforms(request.platforms.as_deref())?;
        let cap = request.cap.unwrap_or(self.config.result_cap);

        let event = SearchEvent {
            identifier: identifier.as_str().to_string(),
            ..event
        };
        if let Err(e) = self.store.append_search_event(&event).await {
            warn!("could not record search event: {}", e);
        }

        self.orchestrator
            .search_all(identifier.as_str(), &platforms, cap)
            .await
    }
}

/// Falls back to a store that always misses when the database is unusable.
async fn open_store(config: &Config) -> Arc<dyn LinkStore> {
    let Some(path) = config.db_path.as_deref() else {
        info!("no database configured, caching in memory only");
        return Arc::new(MemoryStore::new());
    };
    let store = match SqliteStore::open(path) {
        Ok(store) => store,
        Err(e) => {
            warn!("result store unavailable ({}), continuing without cache", e);
            return Arc::new(NullStore);
        }
    };
    if let Err(e) = store.create_schema_if_absent().await {
        warn!("could not prepare result store ({}), continuing without cache", e);
        return Arc::new(NullStore);
    }
    Arc::new(store)
}
