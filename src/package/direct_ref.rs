//! Name and version inference for direct URL references
//!
//! The URL is a fallback: when the archive can be downloaded, its own core
//! metadata (see [`crate::package::distribution`]) declares the version.

use crate::version::pep440::Version;

/// Version assumed for a direct reference whose URL carries no version
pub const UNKNOWN_VERSION: &str = "0a0.dev0";

const SDIST_SUFFIXES: [&str; 5] = [".tar.gz", ".tgz", ".tar.bz2", ".tar.xz", ".zip"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InferredReference {
    pub name: Option<String>,
    pub version: Option<String>,
}

fn structured(text: &str) -> Option<String> {
    let version = Version::parse(text);
    (!version.is_opaque()).then(|| text.to_string())
}

/// Split `name-version` at the last dash followed by a structured version
fn split_name_version(stem: &str) -> (String, Option<String>) {
    match stem.rsplit_once('-') {
        Some((name, version)) if !name.is_empty() => match structured(version) {
            Some(version) => (name.to_string(), Some(version)),
            None => (stem.to_string(), None),
        },
        _ => (stem.to_string(), None),
    }
}

fn egg_fragment(fragment: &str) -> Option<&str> {
    fragment
        .split('&')
        .find_map(|part| part.strip_prefix("egg="))
        .filter(|egg| !egg.is_empty())
}

fn from_last_segment(segment: &str, vcs: bool) -> InferredReference {
    if vcs || segment.contains('@') {
        let (repo, committish) = match segment.split_once('@') {
            Some((repo, committish)) => (repo, Some(committish)),
            None => (segment, None),
        };
        let name = repo.strip_suffix(".git").unwrap_or(repo);
        let version = committish.and_then(|c| structured(c.strip_prefix('v').unwrap_or(c)));
        return InferredReference {
            name: (!name.is_empty()).then(|| name.to_string()),
            version,
        };
    }

    if let Some(stem) = segment.strip_suffix(".whl") {
        let mut parts = stem.split('-');
        let name = parts.next().filter(|n| !n.is_empty()).map(str::to_string);
        let version = parts.next().and_then(structured);
        return InferredReference { name, version };
    }

    if let Some(stem) = SDIST_SUFFIXES
        .iter()
        .find_map(|suffix| segment.strip_suffix(suffix))
    {
        let (name, version) = split_name_version(stem);
        return InferredReference {
            name: (!name.is_empty()).then_some(name),
            version,
        };
    }

    InferredReference::default()
}

/// Infer the package name and version a direct reference URL points at
pub fn infer(reference: &str) -> InferredReference {
    let (path, fragment, vcs) = match url::Url::parse(reference) {
        Ok(url) => (
            url.path().to_string(),
            url.fragment().map(str::to_string),
            url.scheme().starts_with("git"),
        ),
        Err(_) => match reference.split_once('#') {
            Some((path, fragment)) => (path.to_string(), Some(fragment.to_string()), false),
            None => (reference.to_string(), None, false),
        },
    };

    let segment = path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    let vcs = vcs || segment.ends_with(".git");
    let mut inferred = from_last_segment(segment, vcs);

    if let Some(egg) = fragment.as_deref().and_then(egg_fragment) {
        let (name, version) = split_name_version(egg);
        inferred.name = Some(name);
        if inferred.version.is_none() {
            inferred.version = version;
        }
    }

    inferred
}

/// The URL to download when the reference points at a fetchable archive
///
/// VCS and local file references have nothing to download.
pub fn download_url(reference: &str) -> Option<String> {
    let mut url = url::Url::parse(reference).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    Some(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("https://example.com/bar.zip", Some("bar"), None)]
    #[case("https://example.com/dist/bar-1.2.3.tar.gz", Some("bar"), Some("1.2.3"))]
    #[case("https://example.com/my-pkg-0.4.tgz", Some("my-pkg"), Some("0.4"))]
    #[case(
        "https://files.example.com/requests-2.31.0-py3-none-any.whl",
        Some("requests"),
        Some("2.31.0")
    )]
    #[case(
        "git+https://github.com/org/tool.git@v1.2#egg=tool",
        Some("tool"),
        Some("1.2")
    )]
    #[case("git+ssh://git@github.com/org/widget.git", Some("widget"), None)]
    #[case("git+https://github.com/org/widget.git@main", Some("widget"), None)]
    #[case(
        "https://example.com/archive/abc123.zip#egg=real_name",
        Some("real_name"),
        None
    )]
    #[case("./vendor/local-2.0.zip", Some("local"), Some("2.0"))]
    #[case("https://example.com/download", None, None)]
    fn infers_name_and_version(
        #[case] url: &str,
        #[case] name: Option<&str>,
        #[case] version: Option<&str>,
    ) {
        let inferred = infer(url);
        assert_eq!(inferred.name.as_deref(), name, "{}", url);
        assert_eq!(inferred.version.as_deref(), version, "{}", url);
    }

    #[rstest]
    #[case("https://example.com/bar.zip", Some("https://example.com/bar.zip"))]
    #[case(
        "https://example.com/archive/abc123.zip#egg=real_name",
        Some("https://example.com/archive/abc123.zip")
    )]
    #[case("git+https://github.com/org/tool.git@v1.2#egg=tool", None)]
    #[case("file:///srv/wheels/local-2.0.zip", None)]
    #[case("./vendor/local-2.0.zip", None)]
    fn downloads_only_http_archives(#[case] reference: &str, #[case] expected: Option<&str>) {
        assert_eq!(download_url(reference).as_deref(), expected);
    }
}
