use indexmap::IndexMap;
use tracing::warn;

use crate::package::PackageRecord;
use crate::parser::ManifestEntry;

/// Merge manifest entries into one record per normalized package name.
///
/// Records keep the spelling and position of the first entry naming them.
pub fn collect_packages(entries: &[ManifestEntry]) -> IndexMap<String, PackageRecord> {
    let mut packages: IndexMap<String, PackageRecord> = IndexMap::new();

    for entry in entries {
        let Some(record) = PackageRecord::from_entry(entry) else {
            continue;
        };

        match packages.get_mut(&record.normalized_name()) {
            Some(existing) => {
                let _ = existing
                    .incorporate(record)
                    .inspect_err(|e| warn!("{}", e));
            }
            None => {
                packages.insert(record.normalized_name(), record);
            }
        }
    }

    packages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{Requirement, parse_requirement};
    use std::path::PathBuf;

    fn entry(requirement: Requirement, install: bool, line: usize) -> ManifestEntry {
        ManifestEntry {
            requirement,
            install,
            source: PathBuf::from("requirements.txt"),
            line,
        }
    }

    fn entries(lines: &[(&str, bool)]) -> Vec<ManifestEntry> {
        lines
            .iter()
            .enumerate()
            .map(|(i, (line, install))| entry(parse_requirement(line).unwrap(), *install, i + 1))
            .collect()
    }

    #[test]
    fn groups_by_normalized_name() {
        let packages = collect_packages(&entries(&[
            ("Django>=3.2", true),
            ("requests", true),
            ("django==4.1.0", false),
        ]));

        assert_eq!(
            packages.keys().collect::<Vec<_>>(),
            vec!["django", "requests"]
        );
        let django = &packages["django"];
        assert_eq!(django.name(), "Django");
        assert_eq!(django.constraints().len(), 2);
        assert!(django.install());
        assert_eq!(
            django.current_version().map(ToString::to_string).as_deref(),
            Some("4.1.0")
        );
    }

    #[test]
    fn constraint_only_packages_are_kept_but_not_installed() {
        let packages = collect_packages(&entries(&[("urllib3<2", false)]));

        assert!(!packages["urllib3"].install());
    }

    #[test]
    fn unnamed_references_are_skipped() {
        let packages = collect_packages(&[
            entry(Requirement::anonymous("https://example.com/download"), true, 1),
            entry(
                Requirement::anonymous("https://example.com/tool-1.0.tar.gz"),
                true,
                2,
            ),
        ]);

        assert_eq!(packages.keys().collect::<Vec<_>>(), vec!["tool"]);
    }
}
