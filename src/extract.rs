//! Link extraction from search result pages.
//!
//! Extraction runs a fixed list of strategies in order. Each strategy is a
//! pure function from the raw HTML to raw attribute values; every value then
//! goes through the same normaliser (redirect unwrapping, absolute-URL check,
//! backend self-link exclusion). The first strategy that yields at least one
//! normalised candidate wins.

use percent_encoding::percent_decode_str;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::debug;

use crate::classify::host_matches;

/// Attributes that may carry a result's destination, in lookup order.
const LINK_ATTRS: &[&str] = &["href", "data-href", "data-redirect"];

/// How a backend hides the real destination inside its own URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapForm {
    /// `...?uddg=<percent-encoded url>&...`
    QueryParam(&'static str),
    /// `.../RU=<percent-encoded url>/RK=...`
    PathSegment(&'static str),
}

/// Backend-specific knowledge the extractor needs.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionProfile {
    /// CSS selectors for result anchors, most specific first.
    pub selectors: &'static [&'static str],
    pub wraps: &'static [WrapForm],
    /// Links back to these hosts are navigation, not results.
    pub own_domains: &'static [&'static str],
}

impl ExtractionProfile {
    /// No selectors, the common wrap forms, no self domains.
    pub const fn generic() -> Self {
        Self {
            selectors: &[],
            wraps: &[
                WrapForm::QueryParam("uddg"),
                WrapForm::QueryParam("u"),
                WrapForm::PathSegment("RU="),
            ],
            own_domains: &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Result anchors found through the DOM.
    AnchorScan,
    /// `href="http..."` occurrences in the raw text.
    PatternScan,
}

pub const STRATEGIES: &[Strategy] = &[Strategy::AnchorScan, Strategy::PatternScan];

impl Strategy {
    fn raw_candidates(self, html: &str, profile: &ExtractionProfile) -> Vec<RawCandidate> {
        match self {
            Strategy::AnchorScan => anchor_scan(html, profile),
            Strategy::PatternScan => pattern_scan(html),
        }
    }
}

/// The attribute values of one element (or one regex match), in lookup order.
#[derive(Debug, Default)]
struct RawCandidate {
    values: Vec<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum Normalized {
    Url(String),
    /// Not usable as-is; the next attribute may be.
    NotAbsolute,
    /// A wrapped redirect that could not be decoded, or a self link.
    Drop,
}

/// Returns up to `max` distinct absolute URLs in document order.
pub fn extract_links(html: &str, profile: &ExtractionProfile, max: usize) -> Vec<String> {
    if max == 0 || html.trim().is_empty() {
        return Vec::new();
    }
    for strategy in STRATEGIES {
        let mut seen = HashSet::new();
        let mut links = Vec::new();
        for candidate in strategy.raw_candidates(html, profile) {
            if let Some(url) = resolve_candidate(&candidate, profile) {
                if seen.insert(url.clone()) {
                    links.push(url);
                    if links.len() >= max {
                        break;
                    }
                }
            }
        }
        if !links.is_empty() {
            debug!(?strategy, count = links.len(), "extracted candidate links");
            return links;
        }
        debug!(?strategy, "strategy produced no candidates");
    }
    Vec::new()
}

fn resolve_candidate(candidate: &RawCandidate, profile: &ExtractionProfile) -> Option<String> {
    for value in &candidate.values {
        match normalize(value, profile) {
            Normalized::Url(url) => return Some(url),
            Normalized::Drop => return None,
            Normalized::NotAbsolute => continue,
        }
    }
    None
}

fn normalize(raw: &str, profile: &ExtractionProfile) -> Normalized {
    let raw = raw.trim();
    if raw.is_empty() {
        return Normalized::NotAbsolute;
    }
    let url = match unwrap_redirect(raw, profile.wraps) {
        Unwrapped::Destination(url) => url,
        Unwrapped::NotWrapped => raw.to_string(),
        Unwrapped::Undecodable => return Normalized::Drop,
    };
    if !is_absolute_http(&url) {
        return Normalized::NotAbsolute;
    }
    if !profile.own_domains.is_empty() {
        if let Ok(parsed) = url::Url::parse(&url) {
            if parsed
                .host_str()
                .is_some_and(|host| host_matches(host, profile.own_domains))
            {
                return Normalized::Drop;
            }
        }
    }
    Normalized::Url(url)
}

#[derive(Debug, PartialEq, Eq)]
enum Unwrapped {
    NotWrapped,
    Destination(String),
    Undecodable,
}

/// Reverses backend redirect wrapping. A wrapped value that decodes to
/// something other than an absolute URL is not a redirect (e.g. `?u=42` on
/// a real profile link) and leaves the href untouched.
fn unwrap_redirect(href: &str, wraps: &[WrapForm]) -> Unwrapped {
    for wrap in wraps {
        let encoded = match wrap {
            WrapForm::QueryParam(name) => query_param(href, name),
            WrapForm::PathSegment(prefix) => path_segment(href, prefix),
        };
        let Some(encoded) = encoded else { continue };
        match percent_decode_str(encoded).decode_utf8() {
            Ok(decoded) => {
                let decoded = decoded.trim();
                if is_absolute_http(decoded) {
                    return Unwrapped::Destination(decoded.to_string());
                }
            }
            Err(_) => return Unwrapped::Undecodable,
        }
    }
    Unwrapped::NotWrapped
}

fn query_param<'a>(href: &'a str, name: &str) -> Option<&'a str> {
    let (_, query) = href.split_once('?')?;
    let query = query.split('#').next().unwrap_or_default();
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

fn path_segment<'a>(href: &'a str, prefix: &str) -> Option<&'a str> {
    let path = href.split(['?', '#']).next().unwrap_or_default();
    path.split('/')
        .find_map(|segment| segment.strip_prefix(prefix))
        .filter(|value| !value.is_empty())
}

fn is_absolute_http(url: &str) -> bool {
    let lower = url.get(..8).unwrap_or(url).to_ascii_lowercase();
    (lower.starts_with("http://") && url.len() > 7) || (lower.starts_with("https://") && url.len() > 8)
}

fn anchor_scan(html: &str, profile: &ExtractionProfile) -> Vec<RawCandidate> {
    let document = Html::parse_document(html);

    let mut elements = Vec::new();
    for raw_selector in profile.selectors {
        let selector = match Selector::parse(raw_selector) {
            Ok(s) => s,
            Err(e) => {
                debug!("skipping selector {:?}: {:?}", raw_selector, e);
                continue;
            }
        };
        elements = document.select(&selector).collect::<Vec<_>>();
        if !elements.is_empty() {
            break;
        }
    }
    if elements.is_empty() {
        if let Ok(any_anchor) = Selector::parse("a") {
            elements = document.select(&any_anchor).collect();
        }
    }

    elements
        .into_iter()
        .map(|element| RawCandidate {
            values: LINK_ATTRS
                .iter()
                .filter_map(|attr| element.value().attr(attr))
                .map(str::to_string)
                .collect(),
        })
        .filter(|c| !c.values.is_empty())
        .collect()
}

fn href_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"href="(https?://[^"]+)""#).expect("valid href pattern"))
}

fn pattern_scan(html: &str) -> Vec<RawCandidate> {
    href_pattern()
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .map(|m| RawCandidate {
            values: vec![m.as_str().replace("&amp;", "&")],
        })
        .collect()
}
