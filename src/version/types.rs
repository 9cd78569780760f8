use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::version::pep440::Version;

/// A release as reported by the registry, before version parsing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    pub version: String,
    pub released: Option<DateTime<Utc>>,
}

impl ReleaseInfo {
    pub fn new(version: impl Into<String>, released: Option<DateTime<Utc>>) -> Self {
        Self {
            version: version.into(),
            released,
        }
    }
}

/// A dated, published release with its parsed version
#[derive(Debug, Clone)]
pub struct Release {
    pub version: Version,
    pub released: DateTime<Utc>,
}

/// Project-level metadata from the registry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub homepage: Option<String>,
    pub license: Option<String>,
    pub changelog_url: Option<String>,
}
