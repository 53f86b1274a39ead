use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::SearchError;

/// The search subject: a username or "first last". Never blank.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Identifier(String);

impl Identifier {
    /// Trims surrounding whitespace; interior text and case are kept as given.
    pub fn parse(raw: &str) -> Result<Self, SearchError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SearchError::InvalidIdentifier);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A target site and the domain suffixes its profile pages live under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub name: String,
    pub domains: Vec<String>,
}

impl Platform {
    pub fn new(name: &str, domains: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            domains: domains.iter().map(|d| d.to_ascii_lowercase()).collect(),
        }
    }

    /// The domain used for the `site:` qualifier.
    pub fn primary_domain(&self) -> &str {
        self.domains.first().map(String::as_str).unwrap_or_default()
    }
}

/// Search text sent to a backend. Built once per platform search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query(String);

impl Query {
    pub fn plain(identifier: &Identifier) -> Self {
        Self(identifier.as_str().to_string())
    }

    pub fn site_qualified(identifier: &Identifier, domain: &str) -> Self {
        if domain.is_empty() {
            return Self::plain(identifier);
        }
        Self(format!("{} site:{}", identifier.as_str(), domain))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub identifier: String,
    pub platform: String,
}

impl CacheKey {
    pub fn new(identifier: &Identifier, platform: &Platform) -> Self {
        Self {
            identifier: identifier.as_str().to_string(),
            platform: platform.name.clone(),
        }
    }
}

/// A profile link that passed classification for its platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultLink {
    pub platform: String,
    #[serde(rename = "link")]
    pub url: String,
    /// Discovery order within the platform, starting at 0.
    pub rank: usize,
}

impl ResultLink {
    pub fn from_urls(platform: &str, urls: Vec<String>) -> Vec<Self> {
        urls.into_iter()
            .enumerate()
            .map(|(rank, url)| Self {
                platform: platform.to_string(),
                url,
                rank,
            })
            .collect()
    }
}

/// Where a platform's links came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "name")]
pub enum ResultOrigin {
    Cache,
    Backend(String),
    /// Every backend was tried and none produced a matching link.
    Exhausted,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformResult {
    pub platform: String,
    pub links: Vec<ResultLink>,
    pub origin: ResultOrigin,
}

/// Outcome of a multi-platform search, in platform-table order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchReport {
    pub search_id: Uuid,
    pub identifier: String,
    pub platforms: Vec<PlatformResult>,
}

impl SearchReport {
    pub fn links_for(&self, platform: &str) -> &[ResultLink] {
        self.platforms
            .iter()
            .find(|p| p.platform.eq_ignore_ascii_case(platform))
            .map(|p| p.links.as_slice())
            .unwrap_or_default()
    }

    /// Flat list in platform then discovery order.
    pub fn all_links(&self) -> Vec<ResultLink> {
        self.platforms
            .iter()
            .flat_map(|p| p.links.iter().cloned())
            .collect()
    }

    pub fn into_map(self) -> BTreeMap<String, Vec<ResultLink>> {
        self.platforms
            .into_iter()
            .map(|p| (p.platform, p.links))
            .collect()
    }

    pub fn total_links(&self) -> usize {
        self.platforms.iter().map(|p| p.links.len()).sum()
    }
}

/// Audit record for one search request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchEvent {
    pub identifier: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
}

// HTTP / MCP request and response bodies

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchRequest {
    pub identifier: String,
    #[serde(default)]
    pub platforms: Option<Vec<String>>,
    #[serde(default)]
    pub cap: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PlatformInfo {
    pub name: String,
    pub domains: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
