//! PEP 440 style version values with a total order
//!
//! [`Version::parse`] never fails: text that does not follow the release grammar is
//! kept verbatim as [`Version::Opaque`], which sorts after every structured version.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

static VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^
        (?:(?P<epoch>[0-9]+)!)?
        (?P<release>[0-9]+(?:\.[0-9]+)*)
        (?:
            [._-]?
            (?P<pre_l>alpha|a|beta|b|preview|pre|c|rc)
            [._-]?
            (?P<pre_n>[0-9]*)
        )?
        (?:
            (?:[._-]?(?:post|rev|r)[._-]?(?P<post_n1>[0-9]*))
            |
            (?:-(?P<post_n2>[0-9]+))
        )?
        (?:
            [._-]?
            dev
            (?P<dev_n>[0-9]*)
        )?
        (?:\+(?P<local>[a-z0-9]+(?:[._-][a-z0-9]+)*))?
        $",
    )
    .expect("version pattern is a valid regex")
});

/// One segment of the release part
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Segment {
    Number(u64),
    /// Matches any value at this position and everything after it; only
    /// [`Version::series`] produces it
    Wildcard,
}

/// Pre-release phase, ordered `a < b < rc`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PreReleaseKind {
    Alpha,
    Beta,
    ReleaseCandidate,
}

impl PreReleaseKind {
    fn from_spelling(spelling: &str) -> Option<Self> {
        match spelling {
            "a" | "alpha" => Some(Self::Alpha),
            "b" | "beta" => Some(Self::Beta),
            "rc" | "c" | "pre" | "preview" => Some(Self::ReleaseCandidate),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alpha => "a",
            Self::Beta => "b",
            Self::ReleaseCandidate => "rc",
        }
    }
}

/// Local version label segment
///
/// Numeric segments sort before textual ones; within a kind, numbers compare
/// numerically and text lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LocalSegment {
    Number(u64),
    Text(String),
}

impl fmt::Display for LocalSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// A version that follows the release grammar
#[derive(Debug, Clone)]
pub struct StructuredVersion {
    pub epoch: u64,
    pub release: Vec<Segment>,
    pub pre: Option<(PreReleaseKind, u64)>,
    pub post: Option<u64>,
    pub dev: Option<u64>,
    pub local: Option<Vec<LocalSegment>>,
}

/// Sort key for the pre-release position.
///
/// A bare dev release (`1.0.dev1`) precedes every pre-release of the same release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum PreKey {
    DevOnly,
    Pre(PreReleaseKind, u64),
    Final,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum DevKey {
    Dev(u64),
    Final,
}

impl StructuredVersion {
    /// Release segment `index`, with absent trailing segments reading as `0`
    pub fn release_number(&self, index: usize) -> u64 {
        match self.release.get(index) {
            Some(Segment::Number(n)) => *n,
            Some(Segment::Wildcard) | None => 0,
        }
    }

    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some() || self.dev.is_some()
    }

    fn pre_key(&self) -> PreKey {
        match self.pre {
            Some((kind, n)) => PreKey::Pre(kind, n),
            None if self.post.is_none() && self.dev.is_some() => PreKey::DevOnly,
            None => PreKey::Final,
        }
    }

    fn dev_key(&self) -> DevKey {
        self.dev.map_or(DevKey::Final, DevKey::Dev)
    }

    fn series(&self) -> Self {
        let mut release = self.release.clone();
        if let Some(last) = release.last_mut() {
            *last = Segment::Wildcard;
        }
        Self {
            epoch: self.epoch,
            release,
            pre: None,
            post: None,
            dev: None,
            local: None,
        }
    }
}

/// Compare release segments pairwise, padding with zeros.
///
/// Returns `None` when a wildcard is reached, meaning the versions compare equal.
fn compare_release(left: &[Segment], right: &[Segment]) -> Option<Ordering> {
    let len = left.len().max(right.len());
    for i in 0..len {
        let l = left.get(i).copied().unwrap_or(Segment::Number(0));
        let r = right.get(i).copied().unwrap_or(Segment::Number(0));
        match (l, r) {
            (Segment::Wildcard, _) | (_, Segment::Wildcard) => return None,
            (Segment::Number(l), Segment::Number(r)) => match l.cmp(&r) {
                Ordering::Equal => continue,
                other => return Some(other),
            },
        }
    }
    Some(Ordering::Equal)
}

impl Ord for StructuredVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.epoch.cmp(&other.epoch) {
            Ordering::Equal => {}
            other => return other,
        }
        match compare_release(&self.release, &other.release) {
            None => return Ordering::Equal,
            Some(Ordering::Equal) => {}
            Some(other) => return other,
        }
        self.pre_key()
            .cmp(&other.pre_key())
            .then_with(|| self.post.cmp(&other.post))
            .then_with(|| self.dev_key().cmp(&other.dev_key()))
            .then_with(|| self.local.cmp(&other.local))
    }
}

impl PartialOrd for StructuredVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for StructuredVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for StructuredVersion {}

impl fmt::Display for StructuredVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}!", self.epoch)?;
        }
        let release: Vec<String> = self
            .release
            .iter()
            .map(|segment| match segment {
                Segment::Number(n) => n.to_string(),
                Segment::Wildcard => "*".to_string(),
            })
            .collect();
        f.write_str(&release.join("."))?;
        if let Some((kind, n)) = self.pre {
            write!(f, "{}{}", kind.as_str(), n)?;
        }
        if let Some(post) = self.post {
            write!(f, ".post{}", post)?;
        }
        if let Some(dev) = self.dev {
            write!(f, ".dev{}", dev)?;
        }
        if let Some(local) = &self.local {
            let local: Vec<String> = local.iter().map(ToString::to_string).collect();
            write!(f, "+{}", local.join("."))?;
        }
        Ok(())
    }
}

/// A parsed version string
#[derive(Debug, Clone)]
pub enum Version {
    Structured(StructuredVersion),
    /// Text outside the release grammar, kept as written
    Opaque(String),
}

impl Version {
    /// Parse `text`, falling back to [`Version::Opaque`] instead of failing
    pub fn parse(text: &str) -> Self {
        match parse_structured(text) {
            Some(version) => Self::Structured(version),
            None => Self::Opaque(text.to_string()),
        }
    }

    pub fn as_structured(&self) -> Option<&StructuredVersion> {
        match self {
            Self::Structured(v) => Some(v),
            Self::Opaque(_) => None,
        }
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self, Self::Opaque(_))
    }

    pub fn is_prerelease(&self) -> bool {
        self.as_structured()
            .is_some_and(StructuredVersion::is_prerelease)
    }

    /// The compatible-release series: qualifiers dropped and the last release
    /// segment replaced by a wildcard (`2.2.post3` becomes `2.*`)
    pub fn series(&self) -> Self {
        match self {
            Self::Structured(v) => Self::Structured(v.series()),
            Self::Opaque(_) => self.clone(),
        }
    }

    /// `(epoch, major)` of a structured version
    pub fn major(&self) -> Option<(u64, u64)> {
        self.as_structured()
            .map(|v| (v.epoch, v.release_number(0)))
    }

    /// `(epoch, major, minor)`: the release line used to reset the
    /// recommendation horizon
    pub fn release_line(&self) -> Option<(u64, u64, u64)> {
        self.as_structured()
            .map(|v| (v.epoch, v.release_number(0), v.release_number(1)))
    }
}

fn parse_structured(text: &str) -> Option<StructuredVersion> {
    let normalized = text.trim().to_ascii_lowercase();
    let caps = VERSION_PATTERN.captures(&normalized)?;

    let epoch = match caps.name("epoch") {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };

    let release = caps["release"]
        .split('.')
        .map(|digits| digits.parse().ok().map(Segment::Number))
        .collect::<Option<Vec<_>>>()?;

    let pre = match caps.name("pre_l") {
        Some(label) => {
            let kind = PreReleaseKind::from_spelling(label.as_str())?;
            let n = numeric_or_zero(caps.name("pre_n").map(|m| m.as_str()))?;
            Some((kind, n))
        }
        None => None,
    };

    // post_n1 matches the empty string for a bare `.post`
    let post = match caps.name("post_n1").or_else(|| caps.name("post_n2")) {
        Some(m) => Some(numeric_or_zero(Some(m.as_str()))?),
        None => None,
    };

    let dev = match caps.name("dev_n") {
        Some(m) => Some(numeric_or_zero(Some(m.as_str()))?),
        None => None,
    };

    let local = caps.name("local").map(|m| {
        m.as_str()
            .split(['.', '_', '-'])
            .map(|part| match part.parse() {
                Ok(n) => LocalSegment::Number(n),
                Err(_) => LocalSegment::Text(part.to_string()),
            })
            .collect()
    });

    Some(StructuredVersion {
        epoch,
        release,
        pre,
        post,
        dev,
        local,
    })
}

fn numeric_or_zero(digits: Option<&str>) -> Option<u64> {
    match digits {
        None | Some("") => Some(0),
        Some(digits) => digits.parse().ok(),
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Structured(a), Self::Structured(b)) => a.cmp(b),
            (Self::Structured(_), Self::Opaque(_)) => Ordering::Less,
            (Self::Opaque(_), Self::Structured(_)) => Ordering::Greater,
            (Self::Opaque(a), Self::Opaque(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structured(v) => v.fmt(f),
            Self::Opaque(raw) => f.write_str(raw),
        }
    }
}

impl FromStr for Version {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for Version {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl serde::Serialize for Version {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
