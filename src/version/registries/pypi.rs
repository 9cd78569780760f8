//! PyPI registry client for fetching Python package releases

use std::collections::HashMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::version::error::RegistryError;
use crate::version::registry::Registry;
use crate::version::types::{PackageMetadata, ReleaseInfo};

pub const DEFAULT_PYPI_REGISTRY: &str = "https://pypi.org";

static CHANGELOG_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)change[-_ ]?log|changes|release[-_ ]?notes|history")
        .expect("changelog pattern is a valid regex")
});

/// PyPI registry client
pub struct PypiRegistry {
    client: Client,
    base_url: String,
}

impl Default for PypiRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_PYPI_REGISTRY.to_string())
    }
}

impl PypiRegistry {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn fetch_project(&self, package_name: &str) -> Result<PypiResponse, RegistryError> {
        let url = format!("{}/pypi/{}/json", self.base_url, package_name);
        self.fetch_json(&url, package_name).await
    }

    async fn fetch_release(
        &self,
        package_name: &str,
        version: &str,
    ) -> Result<PypiRelease, RegistryError> {
        let url = format!("{}/pypi/{}/{}/json", self.base_url, package_name, version);
        self.fetch_json(&url, package_name).await
    }

    async fn get(&self, url: &str, missing: &str) -> Result<reqwest::Response, RegistryError> {
        debug!("Fetching from PyPI: {}", url);

        let response = self.client.get(url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound(missing.to_string()));
        }

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse().ok());
            return Err(RegistryError::RateLimited { retry_after_secs });
        }

        if !response.status().is_success() {
            return Err(RegistryError::InvalidResponse(format!(
                "{} returned status {}",
                url,
                response.status()
            )));
        }

        Ok(response)
    }

    async fn fetch_json<T: DeserializeOwned>(
        &self,
        url: &str,
        package_name: &str,
    ) -> Result<T, RegistryError> {
        self.get(url, package_name)
            .await?
            .json()
            .await
            .map_err(|e| RegistryError::InvalidResponse(e.to_string()))
    }
}

/// PyPI JSON API response structure
#[derive(Debug, Deserialize)]
struct PypiResponse {
    info: PypiInfo,
    #[serde(default)]
    releases: HashMap<String, Vec<PypiFile>>,
}

/// Package information from PyPI
#[derive(Debug, Deserialize)]
struct PypiInfo {
    home_page: Option<String>,
    license: Option<String>,
    project_url: Option<String>,
    project_urls: Option<HashMap<String, String>>,
}

/// Per-release JSON API response
#[derive(Debug, Deserialize)]
struct PypiRelease {
    info: PypiReleaseInfo,
}

#[derive(Debug, Deserialize)]
struct PypiReleaseInfo {
    license: Option<String>,
    license_expression: Option<String>,
    #[serde(default)]
    classifiers: Vec<String>,
}

impl PypiReleaseInfo {
    /// SPDX expression first, then trove classifiers, then a one-line free-text license
    fn licenses(self) -> Vec<String> {
        if let Some(expression) = non_empty(self.license_expression) {
            return vec![expression.trim().to_string()];
        }

        let classified: Vec<String> = self
            .classifiers
            .iter()
            .filter(|classifier| classifier.starts_with("License ::"))
            .filter_map(|classifier| classifier.rsplit(" :: ").next())
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        if !classified.is_empty() {
            return classified;
        }

        // full license texts end up in this field too
        non_empty(self.license)
            .map(|license| license.trim().to_string())
            .filter(|license| !license.contains('\n'))
            .into_iter()
            .collect()
    }
}

/// One uploaded distribution file of a release
#[derive(Debug, Deserialize)]
struct PypiFile {
    packagetype: Option<String>,
    upload_time_iso_8601: Option<DateTime<Utc>>,
}

/// Earliest sdist upload, or the earliest upload of any kind when no sdist exists
fn release_timestamp(files: &[PypiFile]) -> Option<DateTime<Utc>> {
    let earliest = |sdist_only: bool| {
        files
            .iter()
            .filter(|f| !sdist_only || f.packagetype.as_deref() == Some("sdist"))
            .filter_map(|f| f.upload_time_iso_8601)
            .min()
    };
    earliest(true).or_else(|| earliest(false))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[async_trait]
impl Registry for PypiRegistry {
    async fn get_versions(&self, package_name: &str) -> Result<Vec<ReleaseInfo>, RegistryError> {
        let response = self.fetch_project(package_name).await?;

        let releases: Vec<ReleaseInfo> = response
            .releases
            .into_iter()
            .filter(|(_, files)| !files.is_empty())
            .map(|(version, files)| ReleaseInfo::new(version, release_timestamp(&files)))
            .collect();

        debug!(
            "Found {} releases for package {}",
            releases.len(),
            package_name
        );

        Ok(releases)
    }

    async fn get_metadata(&self, package_name: &str) -> Result<PackageMetadata, RegistryError> {
        let info = self.fetch_project(package_name).await?.info;
        let project_urls = info.project_urls.unwrap_or_default();

        let homepage = non_empty(info.home_page).or_else(|| {
            project_urls
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case("homepage"))
                .map(|(_, url)| url.clone())
        });

        let mut changelog_candidates: Vec<(&String, &String)> = project_urls
            .iter()
            .filter(|(key, _)| CHANGELOG_KEY.is_match(key))
            .collect();
        // HashMap order is arbitrary; pick deterministically
        changelog_candidates.sort();
        let changelog_url = changelog_candidates
            .first()
            .map(|(_, url)| (*url).clone())
            .or_else(|| non_empty(info.project_url));

        Ok(PackageMetadata {
            homepage,
            license: non_empty(info.license),
            changelog_url,
        })
    }

    async fn get_release_licenses(
        &self,
        package_name: &str,
        version: &str,
    ) -> Result<Vec<String>, RegistryError> {
        let info = self.fetch_release(package_name, version).await?.info;
        Ok(info.licenses())
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, RegistryError> {
        let bytes = self.get(url, url).await?.bytes().await?;
        debug!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }
}
