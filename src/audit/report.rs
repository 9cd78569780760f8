//! Per-package report rows
//!
//! Every attribute is computed in its own failure scope: a registry or feed failure
//! turns the affected cells into error markers and the run carries on. Interruption
//! is the exception and ends the run.

use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::audit::collect::collect_packages;
use crate::audit::context::AuditContext;
use crate::package::direct_ref;
use crate::package::distribution::{CoreMetadata, read_core_metadata};
use crate::package::license::describe_change;
use crate::package::{LicenseDescription, Obsolescence, PackageRecord, normalize_name};
use crate::parser::{ManifestEntry, ParseError, read_manifest};
use crate::version::cache::CacheKey;
use crate::version::error::{CacheError, RegistryError};
use crate::version::pep440::Version;
use crate::version::registry::Registry;
use crate::version::types::{PackageMetadata, ReleaseInfo};
use crate::vuln::{CveRecord, VulnFeed, VulnerabilityMatcher};

const VERSIONS_NAMESPACE: &str = "py-versions";
const METADATA_NAMESPACE: &str = "py-metadata";
const RELEASE_NAMESPACE: &str = "py-release";
const ARCHIVE_NAMESPACE: &str = "py-archive";

#[derive(Debug, Error)]
pub enum AuditError {
    #[error(transparent)]
    Manifest(#[from] ParseError),

    #[error("Audit interrupted")]
    Interrupted,
}

/// A report value, or the message of the failure that prevented computing it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell<T> {
    Value(T),
    Error { error: String },
}

impl<T> Cell<T> {
    pub fn error(message: impl Display) -> Self {
        Self::Error {
            error: message.to_string(),
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Value(value) => Some(value),
            Self::Error { .. } => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

impl<T, E: Display> From<Result<T, E>> for Cell<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Value(value),
            Err(e) => Self::error(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub name: String,
    pub homepage: Cell<Option<String>>,
    pub current_version: Cell<Option<String>>,
    pub age_days: Cell<Option<i64>>,
    pub latest_version: Cell<Option<String>>,
    pub latest_released: Cell<Option<DateTime<Utc>>>,
    pub recommended_version: Cell<Option<String>>,
    pub license: Cell<LicenseDescription>,
    pub changelog: Cell<Option<String>>,
    pub obsolescence: Cell<Obsolescence>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cves: Option<Cell<Vec<CveRecord>>>,
}

/// Audits the packages a manifest installs
pub struct Auditor {
    registry: Arc<dyn Registry>,
    matcher: Option<VulnerabilityMatcher>,
    context: AuditContext,
}

impl Auditor {
    pub fn new(registry: Arc<dyn Registry>, context: AuditContext) -> Self {
        Self {
            registry,
            matcher: None,
            context,
        }
    }

    /// Also report the CVEs affecting each package's current version
    pub fn with_vulnerabilities(mut self, feed: Arc<dyn VulnFeed>) -> Self {
        self.matcher = Some(VulnerabilityMatcher::new(feed));
        self
    }

    pub async fn audit(
        &self,
        manifest: &Path,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReportRow>, AuditError> {
        info!("Auditing {}", manifest.display());
        let entries = read_manifest(manifest)?;
        self.audit_entries(&entries, now).await
    }

    /// Rows for every installed package, ordered by lowercase name
    pub async fn audit_entries(
        &self,
        entries: &[ManifestEntry],
        now: DateTime<Utc>,
    ) -> Result<Vec<ReportRow>, AuditError> {
        let packages = collect_packages(entries);
        let mut rows = Vec::new();

        for (_, mut record) in packages.into_iter().filter(|(_, r)| r.install()) {
            rows.push(self.audit_package(&mut record, now).await?);
        }

        rows.sort_by_key(|row| row.name.to_lowercase());
        Ok(rows)
    }

    async fn releases(&self, record: &PackageRecord) -> Result<Vec<ReleaseInfo>, CacheError> {
        let key = CacheKey::named(VERSIONS_NAMESPACE, &record.normalized_name());
        self.context
            .cache()
            .apply(&key, || async {
                self.registry
                    .get_versions(record.name())
                    .await
                    .map_err(CacheError::from)
            })
            .await
    }

    async fn metadata(&self, record: &PackageRecord) -> Result<PackageMetadata, CacheError> {
        let key = CacheKey::named(METADATA_NAMESPACE, &record.normalized_name());
        self.context
            .cache()
            .apply(&key, || async {
                self.registry
                    .get_metadata(record.name())
                    .await
                    .map_err(CacheError::from)
            })
            .await
    }

    async fn release_licenses(
        &self,
        record: &PackageRecord,
        version: &Version,
    ) -> Result<Vec<String>, CacheError> {
        let version = version.to_string();
        let key = CacheKey::hashed(
            RELEASE_NAMESPACE,
            &format!("{}=={}", record.normalized_name(), version),
        );
        self.context
            .cache()
            .apply(&key, || async {
                self.registry
                    .get_release_licenses(record.name(), &version)
                    .await
                    .map_err(CacheError::from)
            })
            .await
    }

    async fn archive_metadata(&self, url: &str) -> Result<CoreMetadata, CacheError> {
        let key = CacheKey::hashed(ARCHIVE_NAMESPACE, url);
        self.context
            .cache()
            .apply(&key, || async {
                let bytes = self.registry.download(url).await.map_err(CacheError::from)?;
                read_core_metadata(&bytes).map_err(|e| {
                    CacheError::from(RegistryError::InvalidArchive {
                        url: url.to_string(),
                        reason: e.to_string(),
                    })
                })
            })
            .await
    }

    /// Turns a lookup failure into a message, passing interruption through
    fn scoped<T>(
        &self,
        record: &PackageRecord,
        result: Result<T, CacheError>,
    ) -> Result<Result<T, String>, AuditError> {
        match result {
            Ok(value) => Ok(Ok(value)),
            Err(e) if e.is_interrupted() => Err(AuditError::Interrupted),
            Err(e) => {
                let message = e.to_string();
                self.context.warn_once(record.name(), &message);
                Ok(Err(message))
            }
        }
    }

    /// Take a direct reference's version from its archive's core metadata.
    ///
    /// Failure leaves the URL-inferred version in place.
    async fn declare_archive_version(&self, record: &mut PackageRecord) -> Result<(), AuditError> {
        if record.current_version().is_some() {
            return Ok(());
        }
        let Some(url) = record
            .direct_reference()
            .and_then(|reference| direct_ref::download_url(&reference.url))
        else {
            return Ok(());
        };

        let metadata = self.archive_metadata(&url).await;
        let Ok(metadata) = self.scoped(record, metadata)? else {
            return Ok(());
        };
        if let Some(name) = &metadata.name
            && normalize_name(name) != record.normalized_name()
        {
            warn!(
                "Archive at {} declares package {}, not {}",
                url,
                name,
                record.name()
            );
        }
        if let Some(version) = metadata.version {
            record.set_declared_version(version);
        }
        Ok(())
    }

    /// Licenses a published release declares; `None` when it declares none
    async fn declared_licenses(
        &self,
        record: &PackageRecord,
        version: Option<&Version>,
    ) -> Result<Option<Vec<String>>, AuditError> {
        let Some(version) = version.filter(|v| record.release_of(v).is_some()) else {
            return Ok(None);
        };
        let licenses = self.release_licenses(record, version).await;
        Ok(self
            .scoped(record, licenses)?
            .ok()
            .filter(|licenses| !licenses.is_empty()))
    }

    /// Per-release license lists when the registry has them, else the project license
    async fn license_cell(
        &self,
        record: &PackageRecord,
        metadata: &Result<PackageMetadata, String>,
        now: DateTime<Utc>,
    ) -> Result<Cell<LicenseDescription>, AuditError> {
        let current = record.current_version();
        let recommended = record.recommended_version(now);
        let current_licenses = self.declared_licenses(record, current).await?;
        let recommended_licenses = if recommended == current {
            current_licenses.clone()
        } else {
            self.declared_licenses(record, recommended).await?
        };

        if current_licenses.is_some() || recommended_licenses.is_some() {
            return Ok(Cell::Value(describe_change(
                current_licenses.as_deref().unwrap_or_default(),
                recommended_licenses.as_deref(),
            )));
        }

        Ok(match metadata {
            Ok(metadata) => Cell::Value(LicenseDescription::new(
                metadata.license.clone().unwrap_or_default(),
            )),
            Err(e) => Cell::error(e),
        })
    }

    async fn audit_package(
        &self,
        record: &mut PackageRecord,
        now: DateTime<Utc>,
    ) -> Result<ReportRow, AuditError> {
        let releases = self.releases(record).await;
        let releases = self.scoped(record, releases)?.map(|infos| {
            record.set_releases(infos);
        });
        let metadata = self.metadata(record).await;
        let metadata = self.scoped(record, metadata)?;
        self.declare_archive_version(record).await?;

        let current_version = record.resolve_version().map(ToString::to_string);
        // a pinned or direct reference version does not depend on the release list
        let current_version = match (&releases, current_version) {
            (_, Some(version)) => Cell::Value(Some(version)),
            (Err(e), None) => Cell::error(e),
            (Ok(()), None) => Cell::Value(None),
        };

        let cves = match &self.matcher {
            Some(matcher) => {
                let version = current_version
                    .value()
                    .cloned()
                    .flatten()
                    .unwrap_or_else(|| "*".to_string());
                let result = matcher
                    .get_for(
                        self.context.cache(),
                        self.context.rate_limiter(),
                        self.context.policy(),
                        record.name(),
                        &version,
                    )
                    .await;
                Some(Cell::from(self.scoped(record, result)?))
            }
            None => None,
        };
        let license = self.license_cell(record, &metadata, now).await?;

        Ok(ReportRow {
            name: record.name().to_string(),
            homepage: Cell::from(metadata.as_ref().map(|m| m.homepage.clone())),
            current_version,
            age_days: release_cell(&releases, || record.age(now)),
            latest_version: release_cell(&releases, || {
                record.latest().map(|r| r.version.to_string())
            }),
            latest_released: release_cell(&releases, || record.latest().map(|r| r.released)),
            recommended_version: release_cell(&releases, || {
                record.recommended_version(now).map(ToString::to_string)
            }),
            license,
            changelog: Cell::from(metadata.as_ref().map(|m| m.changelog_url.clone())),
            obsolescence: release_cell(&releases, || record.obsolescence(now)),
            cves,
        })
    }
}

fn release_cell<T>(releases: &Result<(), String>, compute: impl FnOnce() -> T) -> Cell<T> {
    match releases {
        Ok(()) => Cell::Value(compute()),
        Err(e) => Cell::error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Policy;
    use crate::interrupt::Interrupt;
    use crate::parser::parse_requirement;
    use crate::version::cache::Cache;
    use crate::version::registry::MockRegistry;
    use crate::vuln::RateLimiter;
    use crate::vuln::feed::MockVulnFeed;
    use chrono::{Duration, TimeZone};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn days_ago(days: i64) -> Option<DateTime<Utc>> {
        Some(now() - Duration::days(days))
    }

    fn context(dir: &TempDir) -> AuditContext {
        AuditContext::new(
            Cache::new(dir.path(), true, std::time::Duration::from_secs(86_400)),
            RateLimiter::new(std::time::Duration::ZERO),
            Policy::default(),
        )
    }

    fn entries(lines: &[&str]) -> Vec<ManifestEntry> {
        lines
            .iter()
            .enumerate()
            .map(|(i, line)| ManifestEntry {
                requirement: parse_requirement(line).unwrap(),
                install: true,
                source: PathBuf::from("requirements.txt"),
                line: i + 1,
            })
            .collect()
    }

    fn metadata(license: &str) -> PackageMetadata {
        PackageMetadata {
            homepage: Some("https://example.com".to_string()),
            license: Some(license.to_string()),
            changelog_url: Some("https://example.com/changes".to_string()),
        }
    }

    #[tokio::test]
    async fn reports_versions_and_recommendation() {
        let dir = TempDir::new().unwrap();
        let mut registry = MockRegistry::new();
        registry.expect_get_versions().times(1).returning(|_| {
            Ok(vec![
                ReleaseInfo::new("1.0", days_ago(1000)),
                ReleaseInfo::new("1.1", days_ago(600)),
                ReleaseInfo::new("1.2", days_ago(30)),
            ])
        });
        registry
            .expect_get_metadata()
            .times(1)
            .returning(|_| Ok(metadata("MIT")));
        registry
            .expect_get_release_licenses()
            .times(2)
            .returning(|_, _| Ok(Vec::new()));

        let auditor = Auditor::new(Arc::new(registry), context(&dir));
        let rows = auditor
            .audit_entries(&entries(&["demo==1.0"]), now())
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.name, "demo");
        assert_eq!(row.current_version, Cell::Value(Some("1.0".to_string())));
        assert_eq!(row.age_days, Cell::Value(Some(1000)));
        assert_eq!(row.latest_version, Cell::Value(Some("1.2".to_string())));
        assert_eq!(row.recommended_version, Cell::Value(Some("1.1".to_string())));
        assert_eq!(row.license, Cell::Value(LicenseDescription::new("MIT")));
        assert_eq!(row.obsolescence, Cell::Value(Obsolescence::Mild));
        assert_eq!(row.cves, None);
    }

    #[tokio::test]
    async fn registry_failure_becomes_error_cells() {
        let dir = TempDir::new().unwrap();
        let mut registry = MockRegistry::new();
        registry
            .expect_get_versions()
            .returning(|name| Err(RegistryError::NotFound(name.to_string())));
        registry
            .expect_get_metadata()
            .returning(|_| Ok(metadata("BSD")));

        let auditor = Auditor::new(Arc::new(registry), context(&dir));
        let rows = auditor
            .audit_entries(&entries(&["ghost>=1", "pinned==2.0"]), now())
            .await
            .unwrap();

        let ghost = &rows[0];
        assert_eq!(ghost.name, "ghost");
        assert!(ghost.current_version.is_error());
        assert!(ghost.latest_version.is_error());
        assert!(ghost.obsolescence.is_error());
        assert_eq!(ghost.homepage, Cell::Value(Some("https://example.com".to_string())));

        let pinned = &rows[1];
        assert_eq!(pinned.current_version, Cell::Value(Some("2.0".to_string())));
        assert!(pinned.age_days.is_error());
    }

    #[tokio::test]
    async fn rows_are_sorted_and_skip_constraint_only_packages() {
        let dir = TempDir::new().unwrap();
        let mut registry = MockRegistry::new();
        registry
            .expect_get_versions()
            .returning(|_| Ok(vec![ReleaseInfo::new("1.0", days_ago(400))]));
        registry
            .expect_get_metadata()
            .returning(|_| Ok(PackageMetadata::default()));
        registry
            .expect_get_release_licenses()
            .returning(|_, _| Ok(Vec::new()));

        let mut manifest = entries(&["zope.interface", "Babel", "attrs", "urllib3<2"]);
        manifest[3].install = false;

        let auditor = Auditor::new(Arc::new(registry), context(&dir));
        let rows = auditor.audit_entries(&manifest, now()).await.unwrap();

        assert_eq!(
            rows.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            vec!["attrs", "Babel", "zope.interface"]
        );
    }

    #[tokio::test]
    async fn reports_cves_for_current_version() {
        let dir = TempDir::new().unwrap();
        let mut registry = MockRegistry::new();
        registry
            .expect_get_versions()
            .returning(|_| Ok(vec![ReleaseInfo::new("1.5", days_ago(400))]));
        registry
            .expect_get_metadata()
            .returning(|_| Ok(PackageMetadata::default()));
        registry
            .expect_get_release_licenses()
            .returning(|_, _| Ok(Vec::new()));
        let mut feed = MockVulnFeed::new();
        feed.expect_query()
            .withf(|m| m == "cpe:2.3:a:*:widget:1.5:*:*:*:*:*:*:*")
            .times(1)
            .returning(|_| {
                Ok(serde_json::json!({
                    "result": {"CVE_Items": [{
                        "cve": {"CVE_data_meta": {"ID": "CVE-2024-1234"}},
                        "configurations": {"CVE_data_version": "2.0"}
                    }]}
                }))
            });

        let auditor =
            Auditor::new(Arc::new(registry), context(&dir)).with_vulnerabilities(Arc::new(feed));
        let rows = auditor
            .audit_entries(&entries(&["widget"]), now())
            .await
            .unwrap();

        let cves = rows[0].cves.as_ref().and_then(Cell::value).unwrap();
        assert_eq!(cves.len(), 1);
        assert_eq!(cves[0].id, "CVE-2024-1234");
    }

    #[tokio::test]
    async fn interruption_ends_the_run() {
        let dir = TempDir::new().unwrap();
        let interrupt = Interrupt::new();
        interrupt.trigger();
        let context = AuditContext::new(
            Cache::new(dir.path(), true, std::time::Duration::from_secs(86_400))
                .with_interrupt(interrupt),
            RateLimiter::new(std::time::Duration::ZERO),
            Policy::default(),
        );
        let mut registry = MockRegistry::new();
        registry.expect_get_versions().never();
        registry.expect_get_metadata().never();
        registry.expect_get_release_licenses().never();
        registry.expect_download().never();

        let auditor = Auditor::new(Arc::new(registry), context);
        let result = auditor.audit_entries(&entries(&["demo"]), now()).await;

        assert!(matches!(result, Err(AuditError::Interrupted)));
    }

    #[test]
    fn cells_serialize_as_value_or_error_object() {
        let value: Cell<Option<i64>> = Cell::Value(Some(3));
        let error: Cell<Option<i64>> = Cell::error("Package not found: x");

        assert_eq!(serde_json::to_value(&value).unwrap(), serde_json::json!(3));
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            serde_json::json!({"error": "Package not found: x"})
        );
    }

    #[tokio::test]
    async fn per_release_licenses_take_precedence() {
        let dir = TempDir::new().unwrap();
        let mut registry = MockRegistry::new();
        registry.expect_get_versions().returning(|_| {
            Ok(vec![
                ReleaseInfo::new("1.0", days_ago(800)),
                ReleaseInfo::new("2.0", days_ago(300)),
            ])
        });
        registry
            .expect_get_metadata()
            .returning(|_| Ok(metadata("ignored")));
        registry
            .expect_get_release_licenses()
            .withf(|name, version| name == "demo" && version == "1.0")
            .times(1)
            .returning(|_, _| Ok(vec!["GPL-2.0".to_string()]));
        registry
            .expect_get_release_licenses()
            .withf(|name, version| name == "demo" && version == "2.0")
            .times(1)
            .returning(|_, _| Ok(vec!["GPL-2.0".to_string(), "MIT".to_string()]));

        let auditor = Auditor::new(Arc::new(registry), context(&dir));
        let rows = auditor
            .audit_entries(&entries(&["demo==1.0"]), now())
            .await
            .unwrap();

        let license = rows[0].license.value().unwrap();
        assert_eq!(license.text, "GPL-2.0");
        assert_eq!(
            license.update_note.as_deref(),
            Some("or MIT on upgrade to rec'd ver.")
        );
    }

    #[tokio::test]
    async fn release_license_failure_falls_back_to_project_license() {
        let dir = TempDir::new().unwrap();
        let mut registry = MockRegistry::new();
        registry
            .expect_get_versions()
            .returning(|_| Ok(vec![ReleaseInfo::new("1.0", days_ago(400))]));
        registry
            .expect_get_metadata()
            .returning(|_| Ok(metadata("BSD")));
        registry
            .expect_get_release_licenses()
            .returning(|name, _| Err(RegistryError::NotFound(name.to_string())));

        let auditor = Auditor::new(Arc::new(registry), context(&dir));
        let rows = auditor
            .audit_entries(&entries(&["demo==1.0"]), now())
            .await
            .unwrap();

        assert_eq!(rows[0].license, Cell::Value(LicenseDescription::new("BSD")));
    }

    fn zipped_pkg_info(pkg_info: &str) -> Vec<u8> {
        use std::io::Write;

        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        writer
            .start_file("bar-src/PKG-INFO", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(pkg_info.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[tokio::test]
    async fn direct_reference_reports_version_declared_by_archive() {
        let dir = TempDir::new().unwrap();
        let mut registry = MockRegistry::new();
        registry.expect_get_versions().returning(|_| {
            Ok(vec![
                ReleaseInfo::new("1.2", days_ago(500)),
                ReleaseInfo::new("1.3", days_ago(200)),
            ])
        });
        registry
            .expect_get_metadata()
            .returning(|_| Ok(PackageMetadata::default()));
        registry
            .expect_get_release_licenses()
            .returning(|_, _| Ok(Vec::new()));
        registry
            .expect_download()
            .withf(|url| url == "https://example.com/bar.zip")
            .times(1)
            .returning(|_| Ok(zipped_pkg_info("Name: bar\nVersion: 1.3\n")));

        let auditor = Auditor::new(Arc::new(registry), context(&dir));
        let rows = auditor
            .audit_entries(&entries(&["bar @ https://example.com/bar.zip"]), now())
            .await
            .unwrap();

        assert_eq!(rows[0].current_version, Cell::Value(Some("1.3".to_string())));
        assert_eq!(rows[0].age_days, Cell::Value(Some(200)));
    }

    #[tokio::test]
    async fn unreadable_archive_falls_back_to_url_version() {
        let dir = TempDir::new().unwrap();
        let mut registry = MockRegistry::new();
        registry
            .expect_get_versions()
            .returning(|_| Ok(vec![ReleaseInfo::new("1.4", days_ago(100))]));
        registry
            .expect_get_metadata()
            .returning(|_| Ok(PackageMetadata::default()));
        registry
            .expect_get_release_licenses()
            .returning(|_, _| Ok(Vec::new()));
        registry
            .expect_download()
            .times(1)
            .returning(|_| Ok(b"<html>moved</html>".to_vec()));

        let auditor = Auditor::new(Arc::new(registry), context(&dir));
        let rows = auditor
            .audit_entries(
                &entries(&["tool @ https://example.com/dist/tool-1.4.tar.gz"]),
                now(),
            )
            .await
            .unwrap();

        assert_eq!(rows[0].name, "tool");
        assert_eq!(rows[0].current_version, Cell::Value(Some("1.4".to_string())));
    }
}
