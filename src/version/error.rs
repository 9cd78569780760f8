use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors from the package registry.
///
/// Cloneable so the cache can hand the same failure back on a repeated lookup.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("Network error: {0}")]
    Network(Arc<reqwest::Error>),

    #[error("Rate limited: retry after {retry_after_secs:?} seconds")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Package not found: {0}")]
    NotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid archive at {url}: {reason}")]
    InvalidArchive { url: String, reason: String },
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(Arc::new(err))
    }
}

/// Errors from the vulnerability feed
#[derive(Debug, Clone, Error)]
pub enum FeedError {
    #[error("Network error: {0}")]
    Network(Arc<reqwest::Error>),

    #[error("Vulnerability feed returned status {0}")]
    Status(u16),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(Arc::new(err))
    }
}

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("Cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: Arc<std::io::Error>,
    },

    #[error("Cache serialization error: {0}")]
    Serialization(Arc<serde_json::Error>),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error("Interrupted")]
    Interrupted,
}

impl CacheError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(Arc::new(err))
    }
}
