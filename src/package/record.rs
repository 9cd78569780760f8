use std::cmp::Ordering;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::package::direct_ref::{self, UNKNOWN_VERSION};
use crate::package::recommend::{self, Obsolescence};
use crate::package::{PackageError, normalize_name};
use crate::parser::{ManifestEntry, Requirement};
use crate::version::constraint::Constraint;
use crate::version::pep440::Version;
use crate::version::types::{Release, ReleaseInfo};

/// A package named by URL rather than by version constraints
#[derive(Debug, Clone, PartialEq)]
pub struct DirectReference {
    pub url: String,
    /// Version inferred from the URL, if any
    pub version: Option<String>,
    /// Version the archive's own metadata declares, once downloaded
    pub declared_version: Option<String>,
}

/// Everything known about one package across all manifest lines naming it
#[derive(Debug)]
pub struct PackageRecord {
    name: String,
    constraints: Vec<Constraint>,
    install: bool,
    direct_reference: Option<DirectReference>,
    current_version: Option<Version>,
    releases: Option<Vec<Release>>,
    recommended: OnceLock<Option<Version>>,
}

fn determinative_version(constraints: &[Constraint]) -> Option<Version> {
    constraints
        .iter()
        .find(|c| c.is_determinative())
        .map(|c| c.version.clone())
}

/// Structured versions newest first, then unstructured text
fn release_order(a: &Release, b: &Release) -> Ordering {
    match (a.version.is_opaque(), b.version.is_opaque()) {
        (false, true) => Ordering::Less,
        (true, false) => Ordering::Greater,
        _ => b.version.cmp(&a.version),
    }
}

impl PackageRecord {
    pub fn new(name: impl Into<String>, constraints: Vec<Constraint>, install: bool) -> Self {
        let current_version = determinative_version(&constraints);
        Self {
            name: name.into(),
            constraints,
            install,
            direct_reference: None,
            current_version,
            releases: None,
            recommended: OnceLock::new(),
        }
    }

    pub fn with_direct_reference(mut self, url: impl Into<String>, version: Option<String>) -> Self {
        self.direct_reference = Some(DirectReference {
            url: url.into(),
            version,
            declared_version: None,
        });
        self
    }

    /// Record the version a downloaded archive declares for itself
    pub fn set_declared_version(&mut self, version: impl Into<String>) {
        if let Some(reference) = &mut self.direct_reference {
            reference.declared_version = Some(version.into());
            self.current_version = None;
            self.recommended = OnceLock::new();
        }
    }

    /// Build a record from a manifest entry.
    ///
    /// Returns `None` for a bare URL whose package name cannot be inferred.
    pub fn from_entry(entry: &ManifestEntry) -> Option<Self> {
        match &entry.requirement {
            Requirement::ConstraintSet {
                name, constraints, ..
            } => Some(Self::new(name.clone(), constraints.clone(), entry.install)),
            Requirement::DirectReference { name, url, .. } => {
                let inferred = direct_ref::infer(url);
                let name = match (name, inferred.name) {
                    (Some(name), Some(inferred_name))
                        if normalize_name(name) != normalize_name(&inferred_name) =>
                    {
                        warn!(
                            "Requirement file entry for {} points to archive for {}",
                            name, inferred_name
                        );
                        name.clone()
                    }
                    (Some(name), _) => name.clone(),
                    (None, Some(inferred_name)) => inferred_name,
                    (None, None) => {
                        warn!(
                            "Cannot determine package name for {} ({}:{})",
                            url,
                            entry.source.display(),
                            entry.line
                        );
                        return None;
                    }
                };
                Some(
                    Self::new(name, Vec::new(), entry.install)
                        .with_direct_reference(url.clone(), inferred.version),
                )
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn install(&self) -> bool {
        self.install
    }

    pub fn direct_reference(&self) -> Option<&DirectReference> {
        self.direct_reference.as_ref()
    }

    pub fn current_version(&self) -> Option<&Version> {
        self.current_version.as_ref()
    }

    /// Releases newest first; empty until [`PackageRecord::set_releases`] is called
    pub fn releases(&self) -> &[Release] {
        self.releases.as_deref().unwrap_or_default()
    }

    /// Merge the requirements another sighting of this package carries
    pub fn incorporate(&mut self, other: PackageRecord) -> Result<(), PackageError> {
        if other.normalized_name() != self.normalized_name() {
            return Err(PackageError::NameMismatch {
                name: self.name.clone(),
                other: other.name,
            });
        }

        self.constraints.extend(other.constraints);
        self.install |= other.install;
        if self.direct_reference.is_none() {
            self.direct_reference = other.direct_reference;
        }
        if self.current_version.is_none() {
            self.current_version = determinative_version(&self.constraints);
        }
        self.recommended = OnceLock::new();
        Ok(())
    }

    /// Store the registry's release history, dropping prereleases and undated releases
    pub fn set_releases(&mut self, infos: Vec<ReleaseInfo>) {
        let mut releases: Vec<Release> = infos
            .into_iter()
            .filter_map(|info| {
                let version = Version::parse(&info.version);
                if version.is_prerelease() {
                    return None;
                }
                Some(Release {
                    version,
                    released: info.released?,
                })
            })
            .collect();
        releases.sort_by(release_order);
        self.releases = Some(releases);
        self.recommended = OnceLock::new();
    }

    pub fn satisfied_by(&self, version: &Version) -> bool {
        self.constraints.iter().all(|c| c.satisfied_by(version))
    }

    /// Determine the version that would be installed.
    ///
    /// Direct references use the version their archive declares, falling back to
    /// the version in their URL. Pinned packages use their pin, and everything
    /// else the newest known release satisfying all constraints.
    pub fn resolve_version(&mut self) -> Option<&Version> {
        if self.current_version.is_none() {
            self.current_version = if let Some(reference) = &self.direct_reference {
                let version = reference
                    .declared_version
                    .as_deref()
                    .or(reference.version.as_deref())
                    .unwrap_or(UNKNOWN_VERSION);
                Some(Version::parse(version))
            } else if let Some(pinned) = determinative_version(&self.constraints) {
                Some(pinned)
            } else {
                info!("Resolving current version of {}", self.name);
                let resolved = self
                    .releases()
                    .iter()
                    .find(|r| self.satisfied_by(&r.version))
                    .map(|r| r.version.clone());
                match &resolved {
                    Some(version) => info!("    -> {}", version),
                    None => info!("    (unknown)"),
                }
                resolved
            };
            self.recommended = OnceLock::new();
        }
        self.current_version.as_ref()
    }

    pub fn latest(&self) -> Option<&Release> {
        self.releases().first()
    }

    pub fn release_of(&self, version: &Version) -> Option<&Release> {
        self.releases().iter().find(|r| r.version == *version)
    }

    /// Days since the current version was released
    pub fn age(&self, now: DateTime<Utc>) -> Option<i64> {
        let current = self.current_version.as_ref()?;
        let release = self.release_of(current)?;
        Some((now - release.released).num_days())
    }

    /// Computed on first use and kept until the record changes
    pub fn recommended_version(&self, now: DateTime<Utc>) -> Option<&Version> {
        self.recommended
            .get_or_init(|| {
                recommend::recommended_version(
                    self.releases(),
                    self.current_version.as_ref(),
                    &self.constraints,
                    now,
                )
            })
            .as_ref()
    }

    pub fn days_between_current_and_recommended(&self, now: DateTime<Utc>) -> Option<i64> {
        let current = self.current_version.as_ref()?;
        let recommended = self.recommended_version(now)?;
        recommend::days_between(self.releases(), current, recommended)
    }

    pub fn obsolescence(&self, now: DateTime<Utc>) -> Obsolescence {
        recommend::obsolescence(
            self.releases(),
            self.current_version.as_ref(),
            self.recommended_version(now),
        )
    }
}
