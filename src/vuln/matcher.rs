use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::Policy;
use crate::version::cache::{Cache, CacheKey};
use crate::version::error::CacheError;
use crate::vuln::applicability::Applicability;
use crate::vuln::feed::{VulnFeed, cpe_match_string};

const CVE_NAMESPACE: &str = "cve-data";

/// A vulnerability that applies to the queried package version
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CveRecord {
    pub id: String,
    /// `None` when the configuration tree could not be evaluated
    pub vendors: Option<BTreeSet<String>>,
    pub score: Option<f64>,
}

/// Spaces out calls so that consecutive ones start at least `min_gap` apart
#[derive(Debug)]
pub struct RateLimiter {
    min_gap: Duration,
    last_query: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_gap: Duration) -> Self {
        Self {
            min_gap,
            last_query: Mutex::new(None),
        }
    }

    /// Runs `call` once the gap since the previous call has elapsed.
    ///
    /// The clock is updated when `call` finishes, whether it succeeded or not.
    pub async fn run<T, F, Fut>(&self, call: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut last_query = self.last_query.lock().await;
        if let Some(last) = *last_query {
            let elapsed = last.elapsed();
            if elapsed < self.min_gap {
                let wait = self.min_gap - elapsed;
                debug!("Waiting {:?} before next vulnerability query", wait);
                tokio::time::sleep(wait).await;
            }
        }

        let result = call().await;
        *last_query = Some(Instant::now());
        result
    }
}

/// Looks up the CVEs affecting a package version
pub struct VulnerabilityMatcher {
    feed: Arc<dyn VulnFeed>,
}

impl VulnerabilityMatcher {
    pub fn new(feed: Arc<dyn VulnFeed>) -> Self {
        Self { feed }
    }

    /// CVEs for `package` at `version` (`*` for every version), in feed order.
    ///
    /// Items whose configuration tree cannot be evaluated are always kept.
    pub async fn get_for(
        &self,
        cache: &Cache,
        rate_limiter: &RateLimiter,
        policy: &Policy,
        package: &str,
        version: &str,
    ) -> Result<Vec<CveRecord>, CacheError> {
        let match_string = cpe_match_string(package, version);
        let key = CacheKey::hashed(CVE_NAMESPACE, &match_string);

        let document: serde_json::Value = cache
            .apply(&key, || async {
                rate_limiter
                    .run(|| self.feed.query(&match_string))
                    .await
                    .map_err(CacheError::from)
            })
            .await?;

        Ok(records_from(&document, package, version, policy))
    }
}

fn records_from(
    document: &serde_json::Value,
    package: &str,
    version: &str,
    policy: &Policy,
) -> Vec<CveRecord> {
    let Some(items) = document
        .pointer("/result/CVE_Items")
        .and_then(|items| items.as_array())
    else {
        warn!("Vulnerability feed response for {} has no item list", package);
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let Some(id) = item
                .pointer("/cve/CVE_data_meta/ID")
                .and_then(|id| id.as_str())
            else {
                warn!("Skipping vulnerability item without an ID for {}", package);
                return None;
            };
            let configurations = item
                .get("configurations")
                .unwrap_or(&serde_json::Value::Null);
            let applicability = Applicability::from_configurations(package, configurations);
            if !applicability.applies_to(version, policy) {
                return None;
            }

            Some(CveRecord {
                id: id.to_string(),
                vendors: applicability.vendors(),
                score: item
                    .pointer("/impact/baseMetricV3/cvssV3/baseScore")
                    .and_then(|score| score.as_f64()),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::error::FeedError;
    use crate::vuln::feed::MockVulnFeed;
    use serde_json::json;
    use tempfile::TempDir;

    fn feed_document() -> serde_json::Value {
        json!({
            "result": {
                "CVE_Items": [
                    {
                        "cve": {"CVE_data_meta": {"ID": "CVE-2021-0001"}},
                        "impact": {"baseMetricV3": {"cvssV3": {"baseScore": 7.5}}},
                        "configurations": {
                            "CVE_data_version": "4.0",
                            "nodes": [{
                                "operator": "OR",
                                "cpe_match": [{
                                    "vulnerable": true,
                                    "cpe23Uri": "cpe:2.3:a:acme:widget:*:*:*:*:*:*:*:*",
                                    "versionStartIncluding": "1.0",
                                    "versionEndExcluding": "2.0"
                                }]
                            }]
                        }
                    },
                    {
                        "cve": {"CVE_data_meta": {"ID": "CVE-2022-0002"}},
                        "configurations": {
                            "CVE_data_version": "4.0",
                            "nodes": [{
                                "operator": "OR",
                                "cpe_match": [{
                                    "vulnerable": true,
                                    "cpe23Uri": "cpe:2.3:a:acme:widget:*:*:*:*:*:*:*:*",
                                    "versionEndExcluding": "1.0"
                                }]
                            }]
                        }
                    },
                    {
                        "cve": {"CVE_data_meta": {"ID": "CVE-2023-0003"}},
                        "configurations": {"CVE_data_version": "9.9"}
                    }
                ]
            }
        })
    }

    fn cache(dir: &TempDir) -> Cache {
        Cache::new(dir.path(), true, Duration::from_secs(86_400))
    }

    #[tokio::test]
    async fn keeps_applicable_and_opaque_items_in_feed_order() {
        let dir = TempDir::new().unwrap();
        let mut feed = MockVulnFeed::new();
        feed.expect_query()
            .withf(|m| m == "cpe:2.3:a:*:widget:1.5:*:*:*:*:*:*:*")
            .times(1)
            .returning(|_| Ok(feed_document()));

        let matcher = VulnerabilityMatcher::new(Arc::new(feed));
        let records = matcher
            .get_for(
                &cache(&dir),
                &RateLimiter::new(Duration::ZERO),
                &Policy::default(),
                "widget",
                "1.5",
            )
            .await
            .unwrap();

        assert_eq!(
            records,
            vec![
                CveRecord {
                    id: "CVE-2021-0001".to_string(),
                    vendors: Some(BTreeSet::from(["acme".to_string()])),
                    score: Some(7.5),
                },
                CveRecord {
                    id: "CVE-2023-0003".to_string(),
                    vendors: None,
                    score: None,
                },
            ]
        );
    }

    #[tokio::test]
    async fn repeated_lookup_is_served_from_cache() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        let limiter = RateLimiter::new(Duration::ZERO);
        let mut feed = MockVulnFeed::new();
        feed.expect_query()
            .times(1)
            .returning(|_| Ok(feed_document()));
        let matcher = VulnerabilityMatcher::new(Arc::new(feed));

        let first = matcher
            .get_for(&cache, &limiter, &Policy::default(), "widget", "0.5")
            .await
            .unwrap();
        let second = matcher
            .get_for(&cache, &limiter, &Policy::default(), "widget", "0.5")
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(
            first.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            vec!["CVE-2022-0002", "CVE-2023-0003"]
        );
    }

    #[tokio::test]
    async fn feed_failure_is_surfaced() {
        let dir = TempDir::new().unwrap();
        let mut feed = MockVulnFeed::new();
        feed.expect_query()
            .times(1)
            .returning(|_| Err(FeedError::Status(503)));
        let matcher = VulnerabilityMatcher::new(Arc::new(feed));

        let result = matcher
            .get_for(
                &cache(&dir),
                &RateLimiter::new(Duration::ZERO),
                &Policy::default(),
                "widget",
                "1.5",
            )
            .await;

        assert!(matches!(
            result,
            Err(CacheError::Feed(FeedError::Status(503)))
        ));
    }

    #[test]
    fn response_without_items_yields_nothing() {
        let records = records_from(
            &json!({"message": "maintenance"}),
            "widget",
            "1.0",
            &Policy::default(),
        );
        assert!(records.is_empty());
    }

    fn recording_feed(calls: Arc<std::sync::Mutex<Vec<(String, Instant)>>>) -> MockVulnFeed {
        let mut feed = MockVulnFeed::new();
        feed.expect_query().returning(move |match_string| {
            calls
                .lock()
                .unwrap()
                .push((match_string.to_string(), Instant::now()));
            Ok(feed_document())
        });
        feed
    }

    #[tokio::test(start_paused = true)]
    async fn lookups_that_reach_the_feed_are_spaced_by_min_gap() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        let limiter = RateLimiter::new(Duration::from_secs(5));
        let calls = Arc::new(std::sync::Mutex::new(Vec::new()));
        let matcher = VulnerabilityMatcher::new(Arc::new(recording_feed(calls.clone())));

        for version in ["1.0", "1.5"] {
            matcher
                .get_for(&cache, &limiter, &Policy::default(), "widget", version)
                .await
                .unwrap();
        }

        let calls = calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 2);
        assert_ne!(calls[0].0, calls[1].0);
        assert!(calls[1].1.duration_since(calls[0].1) >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn cached_lookup_does_not_wait_for_the_rate_limiter() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        let limiter = RateLimiter::new(Duration::from_secs(5));
        let calls = Arc::new(std::sync::Mutex::new(Vec::new()));
        let matcher = VulnerabilityMatcher::new(Arc::new(recording_feed(calls.clone())));

        matcher
            .get_for(&cache, &limiter, &Policy::default(), "widget", "1.5")
            .await
            .unwrap();
        let started = Instant::now();
        let cached = matcher
            .get_for(&cache, &limiter, &Policy::default(), "widget", "1.5")
            .await
            .unwrap();

        assert_eq!(cached.len(), 2);
        assert_eq!(calls.lock().unwrap().len(), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn rate_limiter_spaces_out_calls() {
        let limiter = RateLimiter::new(Duration::from_millis(200));

        let first = limiter.run(|| async { Instant::now() }).await;
        let second = limiter.run(|| async { Instant::now() }).await;

        assert!(second.duration_since(first) >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn rate_limiter_does_not_delay_first_call() {
        let limiter = RateLimiter::new(Duration::from_secs(60));
        let started = Instant::now();

        limiter.run(|| async {}).await;

        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
