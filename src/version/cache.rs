//! File-backed JSON cache with a staleness window and per-process failure memo
//!
//! Each key maps to one JSON artifact under the cache root. The artifact's
//! modification time is the staleness clock.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::interrupt::Interrupt;
use crate::version::error::CacheError;

/// Location of one artifact: `<root>/<namespace>/<file>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    namespace: String,
    file: String,
}

impl CacheKey {
    /// Key stored under a literal name, for simple keys such as a package name
    pub fn named(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            file: format!("{}.json", name),
        }
    }

    /// Key stored under the SHA-256 of `text`, for composite keys
    pub fn hashed(namespace: &str, text: &str) -> Self {
        let digest = Sha256::digest(text.as_bytes());
        Self {
            namespace: namespace.to_string(),
            file: format!("{}.json", hex::encode(digest)),
        }
    }

    fn path_under(&self, root: &Path) -> PathBuf {
        root.join(&self.namespace).join(&self.file)
    }
}

pub struct Cache {
    root: PathBuf,
    enabled: bool,
    max_age: Duration,
    failures: Mutex<HashMap<CacheKey, CacheError>>,
    interrupt: Interrupt,
}

impl Cache {
    pub fn new(root: impl Into<PathBuf>, enabled: bool, max_age: Duration) -> Self {
        Self {
            root: root.into(),
            enabled,
            max_age,
            failures: Mutex::new(HashMap::new()),
            interrupt: Interrupt::new(),
        }
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Returns the stored value for `key`, computing and storing it when absent or stale.
    ///
    /// A failed computation is remembered for the lifetime of this `Cache` and returned
    /// again without calling `compute`. Interruption is never remembered.
    pub async fn apply<T, F, Fut>(&self, key: &CacheKey, compute: F) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CacheError>>,
    {
        let path = key.path_under(&self.root);

        if self.enabled
            && let Some(value) = self.read_fresh(&path).await
        {
            debug!("Cache hit: {}", path.display());
            return Ok(value);
        }

        if let Some(err) = self.remembered_failure(key) {
            debug!("Replaying cached failure for {}: {}", path.display(), err);
            return Err(err);
        }

        if self.interrupt.is_triggered() {
            return Err(CacheError::Interrupted);
        }

        let outcome = tokio::select! {
            result = compute() => result,
            _ = self.interrupt.triggered() => Err(CacheError::Interrupted),
        };

        match outcome {
            Ok(value) => {
                // an unwritable cache does not fail the lookup
                let _ = self
                    .persist(&path, &value)
                    .await
                    .inspect_err(|e| warn!("Failed to store cache artifact: {}", e));
                Ok(value)
            }
            Err(err) => {
                if !err.is_interrupted() && !self.interrupt.is_triggered() {
                    self.failures
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .insert(key.clone(), err.clone());
                }
                Err(err)
            }
        }
    }

    fn remembered_failure(&self, key: &CacheKey) -> Option<CacheError> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    async fn read_fresh<T: DeserializeOwned>(&self, path: &Path) -> Option<T> {
        let metadata = tokio::fs::metadata(path).await.ok()?;
        let modified = metadata.modified().ok()?;
        // a modification time in the future counts as fresh
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        if age >= self.max_age {
            debug!("Cache artifact is stale: {}", path.display());
            return None;
        }

        let bytes = tokio::fs::read(path)
            .await
            .inspect_err(|e| warn!("Failed to read {}: {}", path.display(), e))
            .ok()?;
        serde_json::from_slice(&bytes)
            .inspect_err(|e| warn!("Discarding unreadable cache artifact {}: {}", path.display(), e))
            .ok()
    }

    async fn persist<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), CacheError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CacheError::io(parent, e))?;
        }
        let bytes = serde_json::to_vec(value)?;
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| CacheError::io(path, e))
    }
}
