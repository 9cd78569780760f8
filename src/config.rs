use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::version::registries::pypi::DEFAULT_PYPI_REGISTRY;
use crate::vuln::feed::DEFAULT_NVD_FEED;

// =============================================================================
// Time-related constants
// =============================================================================

/// Freshness window for cached registry and feed data
pub const ONE_DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// A release younger than this is never recommended
pub const MIN_RELEASED_DAYS: i64 = 90;

/// Each skipped release pushes the recommendation horizon this far before it
pub const MIN_STABLE_DAYS: i64 = 14;

/// Minimum spacing between vulnerability feed queries
pub const MIN_GAP_SECONDS: u64 = 5;

/// Name of the policy program looked up in the audited directory
pub const POLICY_FILE: &str = ".depaudit-cves";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration in {path}: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path} did not exit cleanly (code {code:?})")]
    PolicyFailed { path: PathBuf, code: Option<i32> },

    #[error("{path} did not output a JSON configuration")]
    PolicyOutput { path: PathBuf },
}

/// Audit configuration structure
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct AuditConfig {
    pub cache: CacheConfig,
    pub registry: RegistryConfig,
    pub vulnerabilities: VulnerabilityConfig,
}

/// Cache-related configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    pub enabled: bool,
    /// Cached artifacts older than this are refetched
    pub max_age_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_age_secs: ONE_DAY.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RegistryConfig {
    pub pypi_url: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            pypi_url: DEFAULT_PYPI_REGISTRY.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct VulnerabilityConfig {
    pub enabled: bool,
    pub feed_url: String,
    pub min_gap_secs: u64,
}

impl Default for VulnerabilityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            feed_url: DEFAULT_NVD_FEED.to_string(),
            min_gap_secs: MIN_GAP_SECONDS,
        }
    }
}

impl AuditConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Invalid {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn cache_max_age(&self) -> Duration {
        Duration::from_secs(self.cache.max_age_secs)
    }

    pub fn min_gap(&self) -> Duration {
        Duration::from_secs(self.vulnerabilities.min_gap_secs)
    }
}

/// Products whose CVE entries are known not to refer to the audited packages
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Policy {
    blocked_products: HashSet<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PolicyOutput {
    #[serde(default)]
    blocked_products: Vec<String>,
}

impl Policy {
    /// Policy blocking the given `vendor:product` pairs
    pub fn from_blocked<I, S>(products: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            blocked_products: products.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_blocked(&self, vendor: &str, product: &str) -> bool {
        self.blocked_products
            .contains(&format!("{}:{}", vendor, product))
    }

    /// Runs the policy program in `dir`, if there is one, and parses its output
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(POLICY_FILE);
        if !path.exists() {
            debug!("No policy program at {}", path.display());
            return Ok(Self::default());
        }

        let output = Command::new(&path)
            .current_dir(dir)
            .output()
            .map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(ConfigError::PolicyFailed {
                path,
                code: output.status.code(),
            });
        }

        Self::parse(&path, &output.stdout)
    }

    fn parse(path: &Path, stdout: &[u8]) -> Result<Self, ConfigError> {
        let value: serde_json::Value =
            serde_json::from_slice(stdout).map_err(|_| ConfigError::PolicyOutput {
                path: path.to_path_buf(),
            })?;
        if !value.is_object() {
            return Err(ConfigError::PolicyOutput {
                path: path.to_path_buf(),
            });
        }
        let output: PolicyOutput =
            serde_json::from_value(value).map_err(|source| ConfigError::Invalid {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::from_blocked(output.blocked_products))
    }

    /// Like [`Policy::load`], but any failure is warned about and yields an empty policy
    pub fn load_or_default(dir: &Path) -> Self {
        Self::load(dir)
            .inspect_err(|e| warn!("Ignoring CVE policy: {}", e))
            .unwrap_or_default()
    }
}

/// Returns the path to the data directory for depaudit.
/// Uses $XDG_DATA_HOME/depaudit if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/depaudit,
/// or ./depaudit if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the root directory of the response cache.
pub fn cache_dir() -> PathBuf {
    data_dir().join("cache")
}

/// Returns the path to the log file.
pub fn log_path() -> PathBuf {
    data_dir().join("depaudit.log")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("depaudit")
}
