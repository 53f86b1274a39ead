//! Drives backends for each (identifier, platform) pair and aggregates the
//! per-platform results of a search.

use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::Backend;
use crate::cache::ResultCache;
use crate::classify;
use crate::config::Config;
use crate::error::{ExhaustedReason, SearchError};
use crate::extract::extract_links;
use crate::identity::IdentityPool;
use crate::retry::RetryPolicy;
use crate::types::{
    CacheKey, Identifier, Platform, PlatformResult, Query, ResultLink, ResultOrigin, SearchReport,
};

pub struct Orchestrator {
    backends: Vec<Arc<dyn Backend>>,
    cache: ResultCache,
    retry: RetryPolicy,
    identities: IdentityPool,
    request_timeout: Duration,
    candidate_limit: usize,
    platform_delay: Duration,
    concurrency: usize,
    search_timeout: Duration,
}

impl Orchestrator {
    /// `backends` are tried in the given order.
    pub fn new(backends: Vec<Arc<dyn Backend>>, cache: ResultCache) -> Self {
        Self {
            backends,
            cache,
            retry: RetryPolicy::default(),
            identities: IdentityPool::browsers(),
            request_timeout: Duration::from_secs(20),
            candidate_limit: 100,
            platform_delay: Duration::ZERO,
            concurrency: 3,
            search_timeout: Duration::from_secs(120),
        }
    }

    pub fn from_config(config: &Config, backends: Vec<Arc<dyn Backend>>, cache: ResultCache) -> Self {
        Self::new(backends, cache)
            .with_retry(RetryPolicy::new(
                config.max_attempts,
                config.retry_base_delay,
                config.retry_max_delay,
            ))
            .with_request_timeout(config.request_timeout)
            .with_candidate_limit(config.candidate_limit)
            .with_platform_delay(config.platform_delay)
            .with_concurrency(config.concurrency)
            .with_search_timeout(config.search_timeout)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_identities(mut self, identities: IdentityPool) -> Self {
        self.identities = identities;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_candidate_limit(mut self, limit: usize) -> Self {
        self.candidate_limit = limit.max(1);
        self
    }

    /// Pause a worker takes after a platform search that hit the network.
    pub fn with_platform_delay(mut self, delay: Duration) -> Self {
        self.platform_delay = delay;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_search_timeout(mut self, timeout: Duration) -> Self {
        self.search_timeout = timeout;
        self
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn backend_names(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.name().to_string()).collect()
    }

    /// Profile links for one platform, at most `cap` of them. A zero cap
    /// returns nothing without touching the cache or any backend.
    pub async fn search(&self, identifier: &Identifier, platform: &Platform, cap: usize) -> PlatformResult {
        self.search_with_cancel(identifier, platform, cap, &CancellationToken::new())
            .await
    }

    pub async fn search_with_cancel(
        &self,
        identifier: &Identifier,
        platform: &Platform,
        cap: usize,
        cancel: &CancellationToken,
    ) -> PlatformResult {
        if cap == 0 {
            return PlatformResult {
                platform: platform.name.clone(),
                links: Vec::new(),
                origin: ResultOrigin::Exhausted,
            };
        }
        let key = CacheKey::new(identifier, platform);

        if let Some(cached) = self.cache.get(&key).await {
            if let Some(links) = servable(cached, platform, cap) {
                debug!(platform = %platform.name, count = links.len(), "serving cached links");
                return PlatformResult {
                    platform: platform.name.clone(),
                    links: ResultLink::from_urls(&platform.name, links),
                    origin: ResultOrigin::Cache,
                };
            }
            warn!(platform = %platform.name, "cached entry has no links for this platform, refetching");
        }

        let query = Query::site_qualified(identifier, platform.primary_domain());
        let mut found: Vec<String> = Vec::new();
        let mut first_contributor: Option<String> = None;
        let mut any_backend_answered = false;
        let mut cancelled = false;

        for backend in &self.backends {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let backend_ref: &dyn Backend = backend.as_ref();
            let query_ref = &query;
            let identities = &self.identities;
            let timeout = self.request_timeout;
            let outcome = self
                .retry
                .execute(cancel, |attempt| async move {
                    let lease = identities.checkout();
                    debug!(backend = backend_ref.name(), attempt, "fetch attempt");
                    backend_ref.fetch(query_ref, &lease, timeout).await
                })
                .await;

            let body = match outcome {
                Ok(body) => body,
                Err(exhausted) => {
                    warn!(
                        platform = %platform.name,
                        backend = backend.name(),
                        "backend yielded nothing: {}",
                        exhausted
                    );
                    if exhausted.reason == ExhaustedReason::Cancelled {
                        cancelled = true;
                        break;
                    }
                    continue;
                }
            };
            any_backend_answered = true;

            let before = found.len();
            for url in extract_links(&body, &backend.profile(), self.candidate_limit) {
                if found.len() >= cap {
                    break;
                }
                if classify::accepts(&url, &platform.domains) && !found.contains(&url) {
                    found.push(url);
                }
            }
            let added = found.len() - before;
            debug!(platform = %platform.name, backend = backend.name(), added, "backend results filtered");
            if added > 0 && first_contributor.is_none() {
                first_contributor = Some(backend.name().to_string());
            }
            if found.len() >= cap {
                break;
            }
        }

        let origin = if cancelled {
            ResultOrigin::Cancelled
        } else if let Some(name) = first_contributor {
            ResultOrigin::Backend(name)
        } else {
            ResultOrigin::Exhausted
        };

        // Partial results from a cancelled search, and empty results where no
        // backend ever answered, are not authoritative.
        let cacheable = !cancelled && (!found.is_empty() || any_backend_answered);
        if cacheable {
            self.cache.put(&key, &found).await;
        }

        info!(platform = %platform.name, count = found.len(), ?origin, "platform search finished");
        PlatformResult {
            platform: platform.name.clone(),
            links: ResultLink::from_urls(&platform.name, found),
            origin,
        }
    }

    /// Searches every platform in `platforms`; each platform is independent.
    /// Only a blank identifier is an error.
    pub async fn search_all(
        &self,
        identifier: &str,
        platforms: &[Platform],
        cap: usize,
    ) -> Result<SearchReport, SearchError> {
        self.search_all_with_cancel(identifier, platforms, cap, CancellationToken::new())
            .await
    }

    /// Like [`search_all`](Self::search_all), stopping early when `cancel`
    /// fires or the configured search timeout passes. Platforms that had not
    /// finished by then are reported with no links.
    pub async fn search_all_with_cancel(
        &self,
        identifier: &str,
        platforms: &[Platform],
        cap: usize,
        cancel: CancellationToken,
    ) -> Result<SearchReport, SearchError> {
        let identifier = Identifier::parse(identifier)?;
        let search_id = Uuid::new_v4();
        let cancel = cancel.child_token();
        info!(%search_id, identifier = %identifier, platforms = platforms.len(), "search started");

        let mut finished: HashMap<usize, PlatformResult> = HashMap::new();
        {
            let identifier = &identifier;
            let cancel = &cancel;
            let mut pending = stream::iter(platforms.iter().cloned().enumerate())
                .map(|(index, platform)| async move {
                    (index, self.search_paced(identifier, &platform, cap, cancel).await)
                })
                .buffer_unordered(self.concurrency);

            let deadline = tokio::time::sleep(self.search_timeout);
            tokio::pin!(deadline);

            loop {
                tokio::select! {
                    next = pending.next() => match next {
                        Some((index, result)) => {
                            finished.insert(index, result);
                        }
                        None => break,
                    },
                    _ = &mut deadline => {
                        warn!(%search_id, done = finished.len(), "search deadline reached");
                        cancel.cancel();
                        break;
                    }
                    _ = cancel.cancelled() => {
                        warn!(%search_id, done = finished.len(), "search cancelled");
                        break;
                    }
                }
            }
        }

        let results: Vec<PlatformResult> = platforms
            .iter()
            .enumerate()
            .map(|(index, platform)| {
                finished.remove(&index).unwrap_or_else(|| PlatformResult {
                    platform: platform.name.clone(),
                    links: Vec::new(),
                    origin: ResultOrigin::Cancelled,
                })
            })
            .collect();

        let report = SearchReport {
            search_id,
            identifier: identifier.as_str().to_string(),
            platforms: results,
        };
        info!(%search_id, total = report.total_links(), "search finished");
        Ok(report)
    }

    async fn search_paced(
        &self,
        identifier: &Identifier,
        platform: &Platform,
        cap: usize,
        cancel: &CancellationToken,
    ) -> PlatformResult {
        let result = self.search_with_cancel(identifier, platform, cap, cancel).await;
        let hit_network = !matches!(result.origin, ResultOrigin::Cache | ResultOrigin::Cancelled);
        if hit_network && !self.platform_delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(self.platform_delay) => {}
                _ = cancel.cancelled() => {}
            }
        }
        result
    }
}

/// Re-checks a cache entry against the platform's domains, since rows written
/// by older versions were never classified. An entry that was non-empty but
/// loses every link is not servable. An entry stored empty stays a hit.
fn servable(cached: Vec<String>, platform: &Platform, cap: usize) -> Option<Vec<String>> {
    if cached.is_empty() {
        return Some(cached);
    }
    let mut links: Vec<String> = Vec::new();
    for url in cached {
        if links.len() >= cap {
            break;
        }
        if classify::accepts(&url, &platform.domains) && !links.contains(&url) {
            links.push(url);
        }
    }
    if links.is_empty() {
        None
    } else {
        Some(links)
    }
}
