//! Version model, registry access and caching
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Registry   │────▶│    Cache    │◀────│ VulnFeed    │
//! │  (PyPI)     │     │ (JSON files)│     │ (vuln crate)│
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        │
//!        ▼
//! ┌─────────────┐     ┌─────────────┐
//! │   pep440    │◀────│ constraint  │
//! │ (ordering)  │     │ (op, ver)   │
//! └─────────────┘     └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`pep440`]: Version values with a total order, never failing to parse
//! - [`constraint`]: Comparison operators and single-version tests
//! - [`cache`]: File-backed cache with staleness window and failure memo
//! - [`registry`]: Registry trait for fetching releases and metadata
//! - [`registries`]: Concrete registry implementations
//! - [`error`]: Error types for cache, registry and feed operations
//! - [`types`]: Release and metadata records

pub mod cache;
pub mod constraint;
pub mod error;
pub mod pep440;
pub mod registries;
pub mod registry;
pub mod types;
