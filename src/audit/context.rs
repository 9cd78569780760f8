use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use tracing::warn;

use crate::config::Policy;
use crate::version::cache::Cache;
use crate::vuln::RateLimiter;

/// State shared by every lookup in one audit run
pub struct AuditContext {
    cache: Cache,
    rate_limiter: RateLimiter,
    policy: Policy,
    warned: Mutex<HashSet<(String, String)>>,
}

impl AuditContext {
    pub fn new(cache: Cache, rate_limiter: RateLimiter, policy: Policy) -> Self {
        Self {
            cache,
            rate_limiter,
            policy,
            warned: Mutex::new(HashSet::new()),
        }
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Logs a warning unless the same location and message were already logged.
    ///
    /// Returns whether the warning was emitted.
    pub fn warn_once(&self, location: &str, message: &str) -> bool {
        let first = self
            .warned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((location.to_string(), message.to_string()));
        if first {
            warn!(location, "{}", message);
        }
        first
    }
}
