//! Search backends. Each adapter knows one engine's request shape and
//! nothing about its response beyond status and body text.

use async_trait::async_trait;
use reqwest::{Client, Method};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::error::FetchError;
use crate::extract::{ExtractionProfile, WrapForm};
use crate::identity::ClientIdentity;
use crate::types::Query;

#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;

    /// Selectors and redirect forms for this engine's result pages.
    fn profile(&self) -> ExtractionProfile;

    /// Issue one search request. No retries, no body interpretation.
    async fn fetch(
        &self,
        query: &Query,
        identity: &ClientIdentity,
        timeout: Duration,
    ) -> Result<RawResponse, FetchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    DuckDuckGo,
    Yahoo,
    Yandex,
}

impl BackendKind {
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::DuckDuckGo => "duckduckgo",
            BackendKind::Yahoo => "yahoo",
            BackendKind::Yandex => "yandex",
        }
    }

    pub fn method(self) -> Method {
        Method::GET
    }

    pub fn endpoint(self) -> &'static str {
        match self {
            BackendKind::DuckDuckGo => "https://html.duckduckgo.com/html/",
            BackendKind::Yahoo => "https://search.yahoo.com/search",
            BackendKind::Yandex => "https://yandex.com/search/",
        }
    }

    /// Name of the query-string parameter carrying the search text.
    pub fn query_param(self) -> &'static str {
        match self {
            BackendKind::DuckDuckGo => "q",
            BackendKind::Yahoo => "p",
            BackendKind::Yandex => "text",
        }
    }

    pub fn profile(self) -> ExtractionProfile {
        match self {
            BackendKind::DuckDuckGo => ExtractionProfile {
                selectors: &["a.result__a"],
                wraps: &[WrapForm::QueryParam("uddg"), WrapForm::QueryParam("u")],
                own_domains: &["duckduckgo.com"],
            },
            BackendKind::Yahoo => ExtractionProfile {
                selectors: &["div.Sr a", "h3.title a", "div.compTitle a"],
                wraps: &[WrapForm::PathSegment("RU="), WrapForm::QueryParam("u")],
                own_domains: &["yahoo.com", "yahoo.net", "yimg.com"],
            },
            BackendKind::Yandex => ExtractionProfile {
                selectors: &["a.Link.Link_theme_normal", "a.OrganicTitle-Link"],
                wraps: &[WrapForm::QueryParam("url")],
                own_domains: &["yandex.com", "yandex.ru", "ya.ru"],
            },
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "duckduckgo" | "ddg" => Ok(BackendKind::DuckDuckGo),
            "yahoo" => Ok(BackendKind::Yahoo),
            "yandex" => Ok(BackendKind::Yandex),
            other => Err(format!("unknown search engine: {}", other)),
        }
    }
}

/// A backend reached over HTTP through the shared connection pool.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    kind: BackendKind,
    endpoint: String,
    client: Client,
}

impl HttpBackend {
    pub fn new(kind: BackendKind, client: Client) -> Self {
        Self {
            kind,
            endpoint: kind.endpoint().to_string(),
            client,
        }
    }

    /// Points the adapter at a different host with the same request shape,
    /// e.g. a mirror or a local stub.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl Backend for HttpBackend {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn profile(&self) -> ExtractionProfile {
        self.kind.profile()
    }

    async fn fetch(
        &self,
        query: &Query,
        identity: &ClientIdentity,
        timeout: Duration,
    ) -> Result<RawResponse, FetchError> {
        debug!(backend = self.name(), query = query.as_str(), "sending search request");
        let response = self
            .client
            .request(self.kind.method(), &self.endpoint)
            .query(&[(self.kind.query_param(), query.as_str())])
            .header("User-Agent", identity.user_agent.as_str())
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header("Accept-Language", identity.accept_language.as_str())
            .header("DNT", "1")
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(e, timeout))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(e, timeout))?;
        debug!(backend = self.name(), status, bytes = body.len(), "search response received");
        Ok(RawResponse { status, body })
    }
}

/// One adapter per configured engine, in priority order, sharing `client`.
pub fn http_backends(kinds: &[BackendKind], client: &Client) -> Vec<std::sync::Arc<dyn Backend>> {
    kinds
        .iter()
        .map(|kind| std::sync::Arc::new(HttpBackend::new(*kind, client.clone())) as std::sync::Arc<dyn Backend>)
        .collect()
}
