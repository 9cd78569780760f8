//! Core metadata (`PKG-INFO`, `*.dist-info/METADATA`) read from a downloaded
//! source archive or wheel
//!
//! Nothing in the archive is executed; only the metadata headers are parsed.

use std::io::{Cursor, Read};

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZIP_MAGIC: [u8; 4] = *b"PK\x03\x04";

/// Name and version an archive declares for itself
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreMetadata {
    pub name: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Unsupported archive format")]
    Unsupported,

    #[error("Archive contains no PKG-INFO or METADATA file")]
    MissingMetadata,

    #[error("Failed to read archive: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// How well an archive member serves as the metadata source; lower wins
fn metadata_rank(path: &str) -> Option<usize> {
    let parts: Vec<&str> = path
        .trim_start_matches("./")
        .split('/')
        .filter(|part| !part.is_empty())
        .collect();
    match parts.as_slice() {
        [dir, "METADATA"] if dir.ends_with(".dist-info") => Some(0),
        ["PKG-INFO"] | [_, "PKG-INFO"] => Some(1),
        // e.g. src/pkg.egg-info/PKG-INFO
        [.., "PKG-INFO"] => Some(2),
        _ => None,
    }
}

/// Read the core metadata of a gzipped tarball or zip (wheel) archive
pub fn read_core_metadata(bytes: &[u8]) -> Result<CoreMetadata, ArchiveError> {
    let text = if bytes.starts_with(&GZIP_MAGIC) {
        metadata_from_tar(GzDecoder::new(bytes))?
    } else if bytes.starts_with(&ZIP_MAGIC) {
        metadata_from_zip(bytes)?
    } else {
        return Err(ArchiveError::Unsupported);
    };

    text.map(|text| parse_headers(&text))
        .ok_or(ArchiveError::MissingMetadata)
}

fn metadata_from_tar<R: Read>(reader: R) -> Result<Option<String>, ArchiveError> {
    let mut archive = tar::Archive::new(reader);
    let mut best: Option<(usize, String)> = None;

    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let path = entry.path()?.to_string_lossy().into_owned();
        let Some(rank) = metadata_rank(&path) else {
            continue;
        };
        if best.as_ref().is_some_and(|(best_rank, _)| *best_rank <= rank) {
            continue;
        }
        let mut text = String::new();
        entry.read_to_string(&mut text)?;
        best = Some((rank, text));
    }

    Ok(best.map(|(_, text)| text))
}

fn metadata_from_zip(bytes: &[u8]) -> Result<Option<String>, ArchiveError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut best: Option<(usize, usize)> = None;

    for index in 0..archive.len() {
        let file = archive.by_index(index)?;
        if let Some(rank) = metadata_rank(file.name())
            && best.is_none_or(|(best_rank, _)| rank < best_rank)
        {
            best = Some((rank, index));
        }
    }

    let Some((_, index)) = best else {
        return Ok(None);
    };
    let mut text = String::new();
    archive.by_index(index)?.read_to_string(&mut text)?;
    Ok(Some(text))
}

/// Parse the RFC 822 style header block, stopping at the first blank line
fn parse_headers(text: &str) -> CoreMetadata {
    let mut metadata = CoreMetadata::default();

    for line in text.lines() {
        if line.trim().is_empty() {
            break;
        }
        // folded continuation of the previous header
        if line.starts_with([' ', '\t']) {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        if key.eq_ignore_ascii_case("name") && metadata.name.is_none() {
            metadata.name = Some(value.to_string());
        } else if key.eq_ignore_ascii_case("version") && metadata.version.is_none() {
            metadata.version = Some(value.to_string());
        }
    }

    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use rstest::rstest;
    use std::io::Write;

    fn sdist(files: &[(&str, &str)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (path, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            builder
                .append_data(&mut header, path, content.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn wheel(files: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (path, content) in files {
            writer
                .start_file(*path, zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    const PKG_INFO: &str = "Metadata-Version: 2.1\nName: bar\nVersion: 1.3\nSummary: Bar\nDescription: first\n        Version: 9.9\n\nVersion: 8.8\n";

    #[test]
    fn reads_pkg_info_from_sdist() {
        let archive = sdist(&[
            ("bar-1.3/setup.py", "raise SystemExit"),
            ("bar-1.3/src/bar.egg-info/PKG-INFO", "Name: bar\nVersion: 0.0\n"),
            ("bar-1.3/PKG-INFO", PKG_INFO),
        ]);

        let metadata = read_core_metadata(&archive).unwrap();

        assert_eq!(
            metadata,
            CoreMetadata {
                name: Some("bar".to_string()),
                version: Some("1.3".to_string()),
            }
        );
    }

    #[test]
    fn reads_metadata_from_wheel() {
        let archive = wheel(&[
            ("bar/__init__.py", ""),
            ("bar-2.0.dist-info/METADATA", "Name: bar\nVersion: 2.0\n"),
        ]);

        let metadata = read_core_metadata(&archive).unwrap();

        assert_eq!(metadata.version.as_deref(), Some("2.0"));
    }

    #[test]
    fn archive_without_metadata_is_an_error() {
        let archive = sdist(&[("bar/setup.py", "")]);
        assert!(matches!(
            read_core_metadata(&archive),
            Err(ArchiveError::MissingMetadata)
        ));
    }

    #[test]
    fn unknown_format_is_unsupported() {
        assert!(matches!(
            read_core_metadata(b"<html>not found</html>"),
            Err(ArchiveError::Unsupported)
        ));
    }

    #[rstest]
    #[case("pkg-1.0/PKG-INFO", Some(1))]
    #[case("./PKG-INFO", Some(1))]
    #[case("pkg-1.0.dist-info/METADATA", Some(0))]
    #[case("pkg-1.0/src/pkg.egg-info/PKG-INFO", Some(2))]
    #[case("pkg-1.0/METADATA", None)]
    #[case("pkg-1.0/setup.py", None)]
    fn ranks_metadata_members(#[case] path: &str, #[case] expected: Option<usize>) {
        assert_eq!(metadata_rank(path), expected);
    }
}
