//! Vulnerability lookup against the NVD CVE feed
//!
//! ```text
//! VulnerabilityMatcher::get_for(package, version)
//!        │
//!        ├─ Cache (cve-data/<sha256 of match string>.json)
//!        │     └─ RateLimiter ── VulnFeed::query
//!        │
//!        └─ per item: Applicability ── applies_to(version)?
//! ```

pub mod applicability;
pub mod feed;
pub mod matcher;

pub use applicability::Applicability;
pub use feed::{NvdFeed, VulnFeed};
pub use matcher::{CveRecord, RateLimiter, VulnerabilityMatcher};
