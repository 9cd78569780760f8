//! Registry and feed test utilities

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use depaudit::audit::AuditContext;
use depaudit::config::Policy;
use depaudit::version::cache::Cache;
use depaudit::version::error::{FeedError, RegistryError};
use depaudit::version::registry::Registry;
use depaudit::version::types::{PackageMetadata, ReleaseInfo};
use depaudit::vuln::{RateLimiter, VulnFeed};

/// Fixed "now" so release ages are stable
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

pub fn days_ago(days: i64) -> Option<DateTime<Utc>> {
    Some(fixed_now() - chrono::Duration::days(days))
}

/// Mock registry for testing
#[derive(Default)]
pub struct MockRegistry {
    releases: HashMap<String, Vec<ReleaseInfo>>,
    metadata: HashMap<String, PackageMetadata>,
    release_licenses: HashMap<(String, String), Vec<String>>,
    archives: HashMap<String, Vec<u8>>,
    version_calls: AtomicUsize,
    downloads: AtomicUsize,
}

#[allow(dead_code)]
impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Releases given as `(version, days before fixed_now)`
    pub fn with_releases(mut self, package: &str, releases: &[(&str, i64)]) -> Self {
        self.releases.insert(
            package.to_string(),
            releases
                .iter()
                .map(|(version, days)| ReleaseInfo::new(*version, days_ago(*days)))
                .collect(),
        );
        self
    }

    pub fn with_metadata(mut self, package: &str, license: &str) -> Self {
        self.metadata.insert(
            package.to_string(),
            PackageMetadata {
                homepage: Some(format!("https://example.com/{}", package)),
                license: Some(license.to_string()),
                changelog_url: Some(format!("https://example.com/{}/changes", package)),
            },
        );
        self
    }

    pub fn with_release_licenses(mut self, package: &str, version: &str, licenses: &[&str]) -> Self {
        self.release_licenses.insert(
            (package.to_string(), version.to_string()),
            licenses.iter().map(ToString::to_string).collect(),
        );
        self
    }

    /// Serve `bytes` for a direct reference URL
    pub fn with_archive(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.archives.insert(url.to_string(), bytes);
        self
    }

    pub fn version_calls(&self) -> usize {
        self.version_calls.load(Ordering::SeqCst)
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Registry for MockRegistry {
    async fn get_versions(&self, package_name: &str) -> Result<Vec<ReleaseInfo>, RegistryError> {
        self.version_calls.fetch_add(1, Ordering::SeqCst);
        match self.releases.get(package_name) {
            Some(releases) => Ok(releases.clone()),
            None => Err(RegistryError::NotFound(package_name.to_string())),
        }
    }

    async fn get_metadata(&self, package_name: &str) -> Result<PackageMetadata, RegistryError> {
        match self.metadata.get(package_name) {
            Some(metadata) => Ok(metadata.clone()),
            None => Err(RegistryError::NotFound(package_name.to_string())),
        }
    }

    async fn get_release_licenses(
        &self,
        package_name: &str,
        version: &str,
    ) -> Result<Vec<String>, RegistryError> {
        Ok(self
            .release_licenses
            .get(&(package_name.to_string(), version.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, RegistryError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        match self.archives.get(url) {
            Some(bytes) => Ok(bytes.clone()),
            None => Err(RegistryError::NotFound(url.to_string())),
        }
    }
}

/// Zip archive holding a single `PKG-INFO` with the given content
#[allow(dead_code)]
pub fn zip_with_pkg_info(pkg_info: &str) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file("PKG-INFO", zip::write::SimpleFileOptions::default())
        .unwrap();
    writer.write_all(pkg_info.as_bytes()).unwrap();
    writer.finish().unwrap().into_inner()
}

/// Mock vulnerability feed answering every query with the same document
pub struct MockFeed {
    document: serde_json::Value,
    queries: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl MockFeed {
    pub fn new(document: serde_json::Value) -> Self {
        Self {
            document,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl VulnFeed for MockFeed {
    async fn query(&self, cpe_match: &str) -> Result<serde_json::Value, FeedError> {
        self.queries.lock().unwrap().push(cpe_match.to_string());
        Ok(self.document.clone())
    }
}

/// Context with a cache under a fresh temporary directory and no rate limiting
pub fn create_test_context(cache_dir: &TempDir) -> AuditContext {
    AuditContext::new(
        Cache::new(cache_dir.path(), true, Duration::from_secs(86_400)),
        RateLimiter::new(Duration::ZERO),
        Policy::default(),
    )
}
