//! Result cache: the durable link store, with an in-memory copy of what it
//! last returned.
//!
//! The store is authoritative, so an entry cleared there is gone here too.
//! The memory copy only answers when a store read fails. Store failures never
//! surface here. A failed write is dropped, so searches keep working with the
//! store down.

use moka::future::Cache;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::store::LinkStore;
use crate::types::CacheKey;

#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn LinkStore>,
    memory: Cache<CacheKey, Vec<String>>,
    cache_empty: bool,
}

impl ResultCache {
    /// `cache_empty` decides whether a zero-link result is remembered (and
    /// therefore never re-fetched) or treated as a miss.
    pub fn new(store: Arc<dyn LinkStore>, memory_capacity: u64, cache_empty: bool) -> Self {
        Self {
            store,
            memory: Cache::builder().max_capacity(memory_capacity).build(),
            cache_empty,
        }
    }

    pub fn store(&self) -> &Arc<dyn LinkStore> {
        &self.store
    }

    pub async fn get(&self, key: &CacheKey) -> Option<Vec<String>> {
        let links = match self.store.get_cached_links(key).await {
            Ok(Some(links)) => links,
            Ok(None) => {
                self.memory.invalidate(key).await;
                return None;
            }
            Err(e) => {
                warn!(platform = %key.platform, "cache read failed, using memory copy: {}", e);
                let links = self.memory.get(key).await?;
                return self.admit(links);
            }
        };
        debug!(platform = %key.platform, count = links.len(), "store cache hit");
        self.memory.insert(key.clone(), links.clone()).await;
        self.admit(links)
    }

    fn admit(&self, links: Vec<String>) -> Option<Vec<String>> {
        if links.is_empty() && !self.cache_empty {
            None
        } else {
            Some(links)
        }
    }

    /// Returns whether the entry was recorded.
    pub async fn put(&self, key: &CacheKey, links: &[String]) -> bool {
        if links.is_empty() && !self.cache_empty {
            debug!(platform = %key.platform, "not caching empty result");
            return false;
        }
        match self.store.put_cached_links(key, links).await {
            Ok(()) => {
                self.memory.insert(key.clone(), links.to_vec()).await;
                true
            }
            Err(e) => {
                warn!(platform = %key.platform, "cache write failed: {}", e);
                false
            }
        }
    }

    pub async fn invalidate(&self, key: &CacheKey) {
        self.memory.invalidate(key).await;
        if let Err(e) = self.store.remove_cached_links(key).await {
            warn!(platform = %key.platform, "cache invalidation failed: {}", e);
        }
    }
}
