//! NVD CVE feed client

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::version::error::FeedError;

pub const DEFAULT_NVD_FEED: &str = "https://services.nvd.nist.gov/rest/json/cves/1.0";

/// Source of raw vulnerability records
#[cfg_attr(test, automock)]
#[async_trait]
pub trait VulnFeed: Send + Sync {
    /// Fetches the raw feed document for a CPE match string
    async fn query(&self, cpe_match: &str) -> Result<serde_json::Value, FeedError>;
}

/// Match string selecting application CPEs for `package` at `version` (`*` for any)
pub fn cpe_match_string(package: &str, version: &str) -> String {
    format!(
        "cpe:2.3:a:*:{}:{}:*:*:*:*:*:*:*",
        package.to_lowercase(),
        version
    )
}

pub struct NvdFeed {
    client: Client,
    base_url: String,
}

impl Default for NvdFeed {
    fn default() -> Self {
        Self::new(DEFAULT_NVD_FEED.to_string())
    }
}

impl NvdFeed {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl VulnFeed for NvdFeed {
    async fn query(&self, cpe_match: &str) -> Result<serde_json::Value, FeedError> {
        let url = url::Url::parse_with_params(&self.base_url, &[("cpeMatchString", cpe_match)])
            .map_err(|e| FeedError::InvalidResponse(format!("bad feed URL: {}", e)))?;
        debug!("Querying vulnerability feed: {}", url);

        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(FeedError::Status(response.status().as_u16()));
        }

        response
            .json()
            .await
            .map_err(|e| FeedError::InvalidResponse(e.to_string()))
    }
}
