use thiserror::Error;

/// Errors that reach the caller of a search. Everything else is absorbed
/// inside the pipeline and shows up as an empty platform result.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SearchError {
    #[error("identifier must not be empty")]
    InvalidIdentifier,
    #[error("unknown platform: {0}")]
    UnknownPlatform(String),
}

/// A single backend request that never produced an HTTP status.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("transport error: {0}")]
    Transport(String),
}

impl FetchError {
    pub fn from_reqwest(err: reqwest::Error, timeout: std::time::Duration) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(timeout)
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

/// Why the retry controller gave up on a backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExhaustedReason {
    #[error("fatal status {0}")]
    Fatal(u16),
    #[error("still throttled with status {0}")]
    Retryable(u16),
    #[error("{0}")]
    Transport(String),
    #[error("cancelled")]
    Cancelled,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("backend exhausted after {attempts} attempt(s): {reason}")]
pub struct Exhausted {
    pub attempts: u32,
    pub reason: ExhaustedReason,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("store unavailable")]
    Unavailable,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
