//! Evaluation of CVE configuration trees against a package version
//!
//! Only the 4.0 configuration schema is understood. Anything else is kept as an
//! opaque JSON value and treated as applicable, since it cannot be ruled out.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::Deserialize;
use tracing::warn;

use crate::config::Policy;

const SUPPORTED_SCHEMA: &str = "4.0";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum NodeOperator {
    #[serde(rename = "AND")]
    And,
    #[default]
    #[serde(rename = "OR", other)]
    Or,
}

impl NodeOperator {
    /// An empty operand list never matches, whichever the operator
    fn combine(self, mut values: impl Iterator<Item = bool>) -> bool {
        let Some(first) = values.next() else {
            return false;
        };
        match self {
            Self::And => first && values.all(|v| v),
            Self::Or => first || values.any(|v| v),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigNode {
    #[serde(default)]
    pub operator: NodeOperator,
    #[serde(default)]
    pub children: Option<Vec<ConfigNode>>,
    #[serde(default)]
    pub cpe_match: Vec<CpeMatch>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpeMatch {
    #[serde(default)]
    pub vulnerable: bool,
    #[serde(rename = "cpe23Uri")]
    pub cpe23_uri: String,
    pub version_start_including: Option<String>,
    pub version_start_excluding: Option<String>,
    pub version_end_including: Option<String>,
    pub version_end_excluding: Option<String>,
}

/// The `vendor`, `product`, `version` and `update` fields of a CPE 2.3 URI
#[derive(Debug, PartialEq, Eq)]
struct CpeFields<'a> {
    part: &'a str,
    vendor: &'a str,
    product: &'a str,
    version: Option<&'a str>,
    update: Option<&'a str>,
}

impl CpeMatch {
    fn fields(&self) -> Option<CpeFields<'_>> {
        let mut parts = self.cpe23_uri.split(':');
        if parts.next() != Some("cpe") || parts.next() != Some("2.3") {
            return None;
        }
        Some(CpeFields {
            part: parts.next()?,
            vendor: parts.next()?,
            product: parts.next()?,
            version: parts.next(),
            update: parts.next(),
        })
    }

    fn names_package(&self, package: &str) -> bool {
        self.fields()
            .is_some_and(|f| f.part == "a" && f.product.eq_ignore_ascii_case(package))
    }

    fn range_start(&self) -> Option<(&str, bool)> {
        self.version_start_including
            .as_deref()
            .map(|v| (v, true))
            .or_else(|| self.version_start_excluding.as_deref().map(|v| (v, false)))
    }

    fn range_end(&self) -> Option<(&str, bool)> {
        self.version_end_including
            .as_deref()
            .map(|v| (v, true))
            .or_else(|| self.version_end_excluding.as_deref().map(|v| (v, false)))
    }
}

/// Leading digits of each dot-separated segment, non-numeric segments counting as 0
fn integer_segments(version: &str) -> Vec<u64> {
    version
        .split('.')
        .map(|segment| {
            let digits = segment
                .find(|c: char| !c.is_ascii_digit())
                .map_or(segment, |end| &segment[..end]);
            digits.parse().unwrap_or(0)
        })
        .collect()
}

fn compare_segments(a: &str, b: &str) -> Ordering {
    integer_segments(a).cmp(&integer_segments(b))
}

fn within(lower: &str, upper: &str, inclusive: bool) -> bool {
    match compare_segments(lower, upper) {
        Ordering::Less => true,
        Ordering::Equal => inclusive,
        Ordering::Greater => false,
    }
}

#[derive(Debug, Deserialize)]
struct RawConfigurations {
    #[serde(rename = "CVE_data_version")]
    data_version: String,
    #[serde(default)]
    nodes: Vec<ConfigNode>,
}

/// A 4.0 configuration tree bound to the package it is evaluated for
#[derive(Debug, Clone)]
pub struct Configurations {
    package: String,
    nodes: Vec<ConfigNode>,
}

impl Configurations {
    pub fn new(package: &str, nodes: Vec<ConfigNode>) -> Self {
        Self {
            package: package.to_lowercase(),
            nodes,
        }
    }

    /// Whether `version` (`*` for any) of the package is vulnerable under any
    /// node that mentions the package
    pub fn applies_to(&self, version: &str, policy: &Policy) -> bool {
        self.nodes
            .iter()
            .filter(|node| self.is_package_node(node))
            .any(|node| self.evaluate(node, version, policy))
    }

    /// Vendors of the vulnerable leaves naming the package
    pub fn vendors(&self) -> BTreeSet<String> {
        let mut vendors = BTreeSet::new();
        let mut remaining: Vec<&ConfigNode> = self.nodes.iter().collect();
        while let Some(node) = remaining.pop() {
            if let Some(children) = &node.children {
                remaining.extend(children.iter());
                continue;
            }
            for pattern in node.cpe_match.iter().filter(|p| p.vulnerable) {
                if pattern.names_package(&self.package)
                    && let Some(fields) = pattern.fields()
                {
                    vendors.insert(fields.vendor.to_string());
                }
            }
        }
        vendors
    }

    fn is_package_node(&self, node: &ConfigNode) -> bool {
        node.children.is_some()
            || node
                .cpe_match
                .iter()
                .any(|pattern| pattern.names_package(&self.package))
    }

    fn evaluate(&self, root: &ConfigNode, version: &str, policy: &Policy) -> bool {
        enum Step<'a> {
            Enter(&'a ConfigNode),
            Combine(NodeOperator, usize),
        }

        let mut work = vec![Step::Enter(root)];
        let mut results: Vec<bool> = Vec::new();

        while let Some(step) = work.pop() {
            match step {
                Step::Enter(node) => match &node.children {
                    Some(children) => {
                        work.push(Step::Combine(node.operator, children.len()));
                        work.extend(children.iter().rev().map(Step::Enter));
                    }
                    None => results.push(
                        node.operator.combine(
                            node.cpe_match
                                .iter()
                                .map(|pattern| self.leaf_matches(pattern, version, policy)),
                        ),
                    ),
                },
                Step::Combine(operator, count) => {
                    let operands = results.split_off(results.len().saturating_sub(count));
                    results.push(operator.combine(operands.into_iter()));
                }
            }
        }

        results.pop().unwrap_or(false)
    }

    fn leaf_matches(&self, pattern: &CpeMatch, version: &str, policy: &Policy) -> bool {
        if !pattern.vulnerable {
            return false;
        }
        let Some(fields) = pattern.fields() else {
            return false;
        };
        if policy.is_blocked(fields.vendor, fields.product) {
            return false;
        }
        if !fields.product.eq_ignore_ascii_case(&self.package) {
            return false;
        }
        if version == "*" {
            return true;
        }
        // prerelease-specific entries
        if !matches!(fields.update, None | Some("*") | Some("-")) {
            return false;
        }
        if let Some(cpe_version) = fields.version
            && cpe_version != "*"
            && cpe_version == version
        {
            return true;
        }

        let start = pattern.range_start();
        let end = pattern.range_end();
        if let Some((bound, inclusive)) = start
            && !within(bound, version, inclusive)
        {
            return false;
        }
        if let Some((bound, inclusive)) = end
            && !within(version, bound, inclusive)
        {
            return false;
        }

        start.is_some() || end.is_some()
    }
}

/// Which versions a CVE applies to, when that can be worked out
#[derive(Debug, Clone)]
pub enum Applicability {
    Evaluated(Configurations),
    Opaque(serde_json::Value),
}

impl Applicability {
    /// Interpret the `configurations` member of a feed item
    pub fn from_configurations(package: &str, configurations: &serde_json::Value) -> Self {
        let recognized = configurations
            .get("CVE_data_version")
            .and_then(|v| v.as_str())
            == Some(SUPPORTED_SCHEMA);
        if !recognized {
            return Self::Opaque(configurations.clone());
        }

        match RawConfigurations::deserialize(configurations) {
            Ok(raw) if raw.data_version == SUPPORTED_SCHEMA => {
                Self::Evaluated(Configurations::new(package, raw.nodes))
            }
            Ok(_) => Self::Opaque(configurations.clone()),
            Err(e) => {
                warn!("Malformed configuration tree for {}: {}", package, e);
                Self::Opaque(configurations.clone())
            }
        }
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self, Self::Opaque(_))
    }

    /// Opaque applicability always applies
    pub fn applies_to(&self, version: &str, policy: &Policy) -> bool {
        match self {
            Self::Evaluated(configurations) => configurations.applies_to(version, policy),
            Self::Opaque(_) => true,
        }
    }

    pub fn vendors(&self) -> Option<BTreeSet<String>> {
        match self {
            Self::Evaluated(configurations) => Some(configurations.vendors()),
            Self::Opaque(_) => None,
        }
    }
}
