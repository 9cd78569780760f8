//! Parsed requirement shapes

use crate::version::constraint::{Constraint, Operator};

/// One parsed requirement line
#[derive(Debug, Clone, PartialEq)]
pub enum Requirement {
    /// `name[extras] <comparators> ; marker`
    ConstraintSet {
        name: String,
        extras: Vec<String>,
        constraints: Vec<Constraint>,
        marker: Option<MarkerTree>,
    },
    /// `name @ url ; marker`, or a bare URL line when `name` is `None`
    DirectReference {
        name: Option<String>,
        extras: Vec<String>,
        url: String,
        marker: Option<MarkerTree>,
    },
}

impl Requirement {
    /// An anonymous direct reference for a bare URL line
    pub fn anonymous(url: impl Into<String>) -> Self {
        Self::DirectReference {
            name: None,
            extras: Vec::new(),
            url: url.into(),
            marker: None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::ConstraintSet { name, .. } => Some(name),
            Self::DirectReference { name, .. } => name.as_deref(),
        }
    }

    pub fn constraints(&self) -> &[Constraint] {
        match self {
            Self::ConstraintSet { constraints, .. } => constraints,
            Self::DirectReference { .. } => &[],
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            Self::ConstraintSet { .. } => None,
            Self::DirectReference { url, .. } => Some(url),
        }
    }

    pub fn marker(&self) -> Option<&MarkerTree> {
        match self {
            Self::ConstraintSet { marker, .. } | Self::DirectReference { marker, .. } => {
                marker.as_ref()
            }
        }
    }
}

/// Environment marker expression, kept as a tree and never evaluated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerTree {
    Expression {
        lhs: MarkerValue,
        op: MarkerOperator,
        rhs: MarkerValue,
    },
    And(Vec<MarkerTree>),
    Or(Vec<MarkerTree>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerValue {
    /// One of the fixed environment variable names, e.g. `python_version`
    Variable(String),
    /// Contents of a quoted string
    Literal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerOperator {
    Compare(Operator),
    In,
    NotIn,
}
