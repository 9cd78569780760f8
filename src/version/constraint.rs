//! Single `(operator, version)` tests

use std::fmt;
use std::str::FromStr;

use crate::version::pep440::Version;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Less,
    LessEqual,
    Equal,
    NotEqual,
    GreaterEqual,
    Greater,
    /// `~=`
    Compatible,
    /// `===`, plain string identity
    ArbitraryEqual,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Less => "<",
            Self::LessEqual => "<=",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::GreaterEqual => ">=",
            Self::Greater => ">",
            Self::Compatible => "~=",
            Self::ArbitraryEqual => "===",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownOperator(pub String);

impl fmt::Display for UnknownOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown comparison operator '{}'", self.0)
    }
}

impl std::error::Error for UnknownOperator {}

impl FromStr for Operator {
    type Err = UnknownOperator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "<" => Ok(Self::Less),
            "<=" => Ok(Self::LessEqual),
            "==" => Ok(Self::Equal),
            "!=" => Ok(Self::NotEqual),
            ">=" => Ok(Self::GreaterEqual),
            ">" => Ok(Self::Greater),
            "~=" => Ok(Self::Compatible),
            "===" => Ok(Self::ArbitraryEqual),
            other => Err(UnknownOperator(other.to_string())),
        }
    }
}

/// A version test taken from a requirement line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub operator: Operator,
    /// Version text as written, needed by `===`
    pub raw: String,
    pub version: Version,
}

impl Constraint {
    pub fn new(operator: Operator, raw: impl Into<String>) -> Self {
        let raw = raw.into();
        // `==1.1.*` matches the series of `1.1.0`
        let version = match raw.strip_suffix(".*") {
            Some(prefix) if matches!(operator, Operator::Equal | Operator::NotEqual) => {
                Version::parse(&format!("{}.0", prefix)).series()
            }
            _ => Version::parse(&raw),
        };
        Self {
            operator,
            raw,
            version,
        }
    }

    /// True when the constraint pins exactly one version; `==1.1.*` does not
    pub fn is_determinative(&self) -> bool {
        match self.operator {
            Operator::Equal => !self.raw.ends_with(".*"),
            Operator::ArbitraryEqual => true,
            _ => false,
        }
    }

    pub fn satisfied_by(&self, candidate: &Version) -> bool {
        let required = &self.version;
        match self.operator {
            Operator::Less => candidate < required,
            Operator::LessEqual => candidate <= required,
            Operator::Equal => candidate == required,
            Operator::NotEqual => candidate != required,
            Operator::GreaterEqual => candidate >= required,
            Operator::Greater => candidate > required,
            Operator::Compatible => candidate >= required && *candidate == required.series(),
            Operator::ArbitraryEqual => self.raw == candidate.to_string(),
        }
    }

    /// Like [`Constraint::satisfied_by`], except pinning constraints always pass.
    ///
    /// Used when looking for a newer version to recommend over the pinned one.
    pub fn satisfied_by_loosely(&self, candidate: &Version) -> bool {
        self.is_determinative() || self.satisfied_by(candidate)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.operator, self.raw)
    }
}
