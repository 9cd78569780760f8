//! Per-package state: accumulated constraints, resolved version, releases
//! and the recommendation derived from them

pub mod direct_ref;
pub mod distribution;
pub mod license;
pub mod recommend;
pub mod record;

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

pub use license::LicenseDescription;
pub use recommend::Obsolescence;
pub use record::{DirectReference, PackageRecord};

static NAME_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-_.]+").expect("separator pattern is a valid regex"));

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("Cannot incorporate requirements for {other} into {name}")]
    NameMismatch { name: String, other: String },
}

/// PEP 503 name normalization: lowercase, runs of `-_.` become one `-`
pub fn normalize_name(name: &str) -> String {
    NAME_SEPARATORS
        .replace_all(&name.to_ascii_lowercase(), "-")
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Django", "django")]
    #[case("zope.interface", "zope-interface")]
    #[case("typing_extensions", "typing-extensions")]
    #[case("Foo__Bar-.baz", "foo-bar-baz")]
    fn normalizes_names(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_name(input), expected);
    }
}
