use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::backend::BackendKind;
use crate::error::SearchError;
use crate::types::Platform;

/// Runtime settings, read from the environment once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    /// `None` runs without durable caching.
    pub db_path: Option<String>,
    pub engines: Vec<BackendKind>,
    pub max_attempts: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    pub request_timeout: Duration,
    pub platform_delay: Duration,
    pub result_cap: usize,
    pub candidate_limit: usize,
    pub concurrency: usize,
    pub search_timeout: Duration,
    pub cache_empty_results: bool,
    pub cache_memory_capacity: u64,
    pub platforms: Vec<Platform>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5000".to_string(),
            db_path: Some("profile_hunter.db".to_string()),
            engines: vec![BackendKind::DuckDuckGo, BackendKind::Yahoo, BackendKind::Yandex],
            max_attempts: 3,
            retry_base_delay: Duration::from_millis(1000),
            retry_max_delay: Duration::from_millis(8000),
            request_timeout: Duration::from_secs(20),
            platform_delay: Duration::from_millis(1500),
            result_cap: 10,
            candidate_limit: 100,
            concurrency: 3,
            search_timeout: Duration::from_secs(120),
            cache_empty_results: true,
            cache_memory_capacity: 10_000,
            platforms: default_platforms(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Ok(bind) = env::var("PROFILE_HUNTER_BIND") {
            config.bind_addr = bind;
        }
        if let Some(port) = parse_var::<u16>("PORT") {
            let host = config
                .bind_addr
                .rsplit_once(':')
                .map(|(host, _)| host.to_string())
                .unwrap_or_else(|| "0.0.0.0".to_string());
            config.bind_addr = format!("{}:{}", host, port);
        }
        if let Ok(path) = env::var("PROFILE_HUNTER_DB") {
            config.db_path = if path.trim().is_empty() { None } else { Some(path) };
        }
        if let Ok(list) = env::var("PROFILE_HUNTER_ENGINES") {
            let engines = parse_engines(&list);
            if engines.is_empty() {
                warn!("PROFILE_HUNTER_ENGINES={:?} names no known engine, keeping defaults", list);
            } else {
                config.engines = engines;
            }
        }
        if let Some(retries) = parse_var::<u32>("MAX_RETRIES") {
            config.max_attempts = retries.saturating_add(1);
        }
        if let Some(ms) = parse_var::<u64>("RETRY_BASE_DELAY_MS") {
            config.retry_base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>("RETRY_MAX_DELAY_MS") {
            config.retry_max_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var::<u64>("REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = parse_var::<f64>("REQUEST_DELAY") {
            if secs.is_finite() && secs >= 0.0 {
                config.platform_delay = Duration::from_secs_f64(secs);
            }
        }
        if let Some(cap) = parse_var::<usize>("RESULT_CAP") {
            config.result_cap = cap.max(1);
        }
        if let Some(n) = parse_var::<usize>("SEARCH_CONCURRENCY") {
            config.concurrency = n.max(1);
        }
        if let Some(secs) = parse_var::<u64>("SEARCH_TIMEOUT_SECS") {
            config.search_timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(flag) = parse_var::<bool>("CACHE_EMPTY_RESULTS") {
            config.cache_empty_results = flag;
        }
        if let Some(n) = parse_var::<u64>("CACHE_MEMORY_CAPACITY") {
            config.cache_memory_capacity = n;
        }

        config
    }

    pub fn platform(&self, name: &str) -> Option<&Platform> {
        self.platforms
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Resolves caller-supplied platform names; `None` selects every platform.
    pub fn select_platforms(&self, names: Option<&[String]>) -> Result<Vec<Platform>, SearchError> {
        match names {
            None => Ok(self.platforms.clone()),
            Some([]) => Ok(self.platforms.clone()),
            Some(names) => names
                .iter()
                .map(|name| {
                    self.platform(name)
                        .cloned()
                        .ok_or_else(|| SearchError::UnknownPlatform(name.clone()))
                })
                .collect(),
        }
    }
}

pub fn default_platforms() -> Vec<Platform> {
    vec![
        Platform::new("Facebook", &["facebook.com"]),
        Platform::new("Instagram", &["instagram.com"]),
        Platform::new("Youtube", &["youtube.com"]),
        Platform::new("TikTok", &["tiktok.com"]),
        Platform::new("Snapchat", &["snapchat.com"]),
        Platform::new("Reddit", &["reddit.com"]),
        Platform::new("Twitter", &["twitter.com", "x.com"]),
        Platform::new("Pinterest", &["pinterest.com"]),
        Platform::new("LinkedIn", &["linkedin.com"]),
    ]
}

fn parse_engines(list: &str) -> Vec<BackendKind> {
    let mut engines = Vec::new();
    for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match name.parse::<BackendKind>() {
            Ok(kind) if !engines.contains(&kind) => engines.push(kind),
            Ok(_) => {}
            Err(_) => warn!("ignoring unknown engine {:?}", name),
        }
    }
    engines
}

fn parse_var<T: FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("invalid value {:?} for {}, using default", raw, key);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_platform_table() {
        let config = Config::default();
        assert_eq!(config.platforms.len(), 9);
        assert_eq!(config.platform("facebook").unwrap().primary_domain(), "facebook.com");
        assert_eq!(
            config.platform("Twitter").unwrap().domains,
            vec!["twitter.com".to_string(), "x.com".to_string()]
        );
        assert_eq!(config.max_attempts, 3);
    }

    #[test]
    fn select_platforms_by_name() {
        let config = Config::default();
        let names = vec!["reddit".to_string(), "LinkedIn".to_string()];
        let selected = config.select_platforms(Some(&names)).unwrap();
        assert_eq!(selected[0].name, "Reddit");
        assert_eq!(selected[1].name, "LinkedIn");

        assert_eq!(config.select_platforms(None).unwrap().len(), 9);
        assert_eq!(config.select_platforms(Some(&[])).unwrap().len(), 9);
    }

    #[test]
    fn select_unknown_platform_fails() {
        let config = Config::default();
        let names = vec!["Myspace".to_string()];
        assert_eq!(
            config.select_platforms(Some(&names)),
            Err(SearchError::UnknownPlatform("Myspace".to_string()))
        );
    }

    #[test]
    fn engine_list_parsing_skips_unknown_and_duplicates() {
        let engines = parse_engines("yahoo, bing ,duckduckgo,yahoo");
        assert_eq!(engines, vec![BackendKind::Yahoo, BackendKind::DuckDuckGo]);
        assert!(parse_engines(" , ").is_empty());
    }
}
