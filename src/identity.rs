//! Rotating client identities for outbound search requests.

use rand::Rng;
use std::sync::{Arc, Mutex};

/// User agents for rotation
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_6) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Linux; Android 13; SM-G990B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
];

const ACCEPT_LANGUAGES: &[&str] = &["en-US,en;q=0.9", "en-GB,en;q=0.8", "en-US,en;q=0.5"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub user_agent: String,
    pub accept_language: String,
}

/// A small set of identities handed out one per request.
///
/// Checkout prefers identities nobody currently holds; when all are out it
/// hands out a random one anyway, so callers never wait on the pool.
#[derive(Debug, Clone)]
pub struct IdentityPool {
    all: Arc<Vec<ClientIdentity>>,
    free: Arc<Mutex<Vec<usize>>>,
}

impl IdentityPool {
    pub fn new(identities: Vec<ClientIdentity>) -> Self {
        let free = (0..identities.len()).collect();
        Self {
            all: Arc::new(identities),
            free: Arc::new(Mutex::new(free)),
        }
    }

    pub fn browsers() -> Self {
        let identities = USER_AGENTS
            .iter()
            .enumerate()
            .map(|(i, ua)| ClientIdentity {
                user_agent: ua.to_string(),
                accept_language: ACCEPT_LANGUAGES[i % ACCEPT_LANGUAGES.len()].to_string(),
            })
            .collect();
        Self::new(identities)
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    pub fn available(&self) -> usize {
        self.free.lock().map(|f| f.len()).unwrap_or(0)
    }

    pub fn checkout(&self) -> IdentityLease {
        let mut rng = rand::thread_rng();
        let index = match self.free.lock() {
            Ok(mut free) if !free.is_empty() => {
                let slot = rng.gen_range(0..free.len());
                Some(free.swap_remove(slot))
            }
            _ => None,
        };
        match index {
            Some(index) => IdentityLease {
                identity: self.all[index].clone(),
                slot: Some(index),
                pool: self.free.clone(),
            },
            None => IdentityLease {
                identity: self.random_identity(&mut rng),
                slot: None,
                pool: self.free.clone(),
            },
        }
    }

    fn random_identity(&self, rng: &mut impl Rng) -> ClientIdentity {
        if self.all.is_empty() {
            return ClientIdentity {
                user_agent: USER_AGENTS[0].to_string(),
                accept_language: ACCEPT_LANGUAGES[0].to_string(),
            };
        }
        self.all[rng.gen_range(0..self.all.len())].clone()
    }
}

impl Default for IdentityPool {
    fn default() -> Self {
        Self::browsers()
    }
}

/// A checked-out identity; goes back to the pool on drop.
#[derive(Debug)]
pub struct IdentityLease {
    identity: ClientIdentity,
    slot: Option<usize>,
    pool: Arc<Mutex<Vec<usize>>>,
}

impl IdentityLease {
    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }
}

impl std::ops::Deref for IdentityLease {
    type Target = ClientIdentity;

    fn deref(&self) -> &ClientIdentity {
        &self.identity
    }
}

impl Drop for IdentityLease {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            if let Ok(mut free) = self.pool.lock() {
                free.push(slot);
            }
        }
    }
}
