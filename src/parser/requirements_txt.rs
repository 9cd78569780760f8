//! Line-oriented requirements manifest reader
//!
//! Handles comments, backslash continuations and the `-r`/`-c`/`-e` directives.
//! Unparseable lines are warned about and skipped; only an unreadable top-level
//! manifest is an error.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::parser::error::ParseError;
use crate::parser::requirement::parse_requirement;
use crate::parser::types::Requirement;

/// Manifest file names looked up, in order, when only a directory is given
pub const COMMON_MANIFEST_NAMES: [&str; 2] = ["requirements.txt", "Packages"];

/// URL schemes accepted for a bare URL line
pub const ACCEPTED_URI_SCHEMES: [&str; 7] = [
    "http", "https", "git", "git+git", "git+http", "git+https", "git+ssh",
];

/// One requirement taken from a manifest
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestEntry {
    pub requirement: Requirement,
    /// False for entries that only come from constraints files
    pub install: bool,
    pub source: PathBuf,
    /// 1-based line where the logical line starts
    pub line: usize,
}

/// Find the manifest in `dir` by trying [`COMMON_MANIFEST_NAMES`]
pub fn guess_manifest(dir: &Path) -> Option<PathBuf> {
    COMMON_MANIFEST_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Read every entry of the manifest at `path`, following includes
pub fn read_manifest(path: &Path) -> Result<Vec<ManifestEntry>, ParseError> {
    let content = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = ManifestReader::default();
    reader.read_content(path, &content, false);
    Ok(reader.entries)
}

#[derive(Debug, PartialEq)]
enum Directive<'a> {
    Include(&'a str),
    Constrain(&'a str),
    Editable,
    UnknownOption,
    Requirement,
}

/// Split off a short or long option and its argument (`-r x`, `--requirement=x`)
fn option_argument<'a>(line: &'a str, short: &str, long: &str) -> Option<&'a str> {
    if let Some(rest) = line.strip_prefix(long) {
        return match rest.strip_prefix('=') {
            Some(argument) => Some(argument.trim()),
            None if rest.is_empty() || rest.starts_with([' ', '\t']) => Some(rest.trim()),
            None => None,
        };
    }
    // `-r file` or `-rfile`
    let rest = line.strip_prefix(short)?;
    if rest.starts_with('-') {
        None
    } else {
        Some(rest.trim())
    }
}

fn classify(line: &str) -> Directive<'_> {
    if !line.starts_with('-') {
        return Directive::Requirement;
    }
    if let Some(path) = option_argument(line, "-r", "--requirement") {
        return Directive::Include(path);
    }
    if let Some(path) = option_argument(line, "-c", "--constraint") {
        return Directive::Constrain(path);
    }
    if line.starts_with("-e") || line.starts_with("--editable") {
        return Directive::Editable;
    }
    Directive::UnknownOption
}

/// Strip a `#` comment that follows whitespace
fn strip_trailing_comment(line: &str) -> &str {
    let mut previous: Option<char> = None;
    for (index, c) in line.char_indices() {
        if c == '#' && previous.is_some_and(char::is_whitespace) {
            return &line[..index];
        }
        previous = Some(c);
    }
    line
}

/// Join physical lines into logical lines, yielding the starting line number of each.
///
/// Whole-line comments are dropped and trailing comments stripped before the
/// backslash continuation is looked for.
fn logical_lines(content: &str) -> Vec<(usize, String)> {
    let mut lines = Vec::new();
    let mut continued = String::new();
    let mut start = None;

    for (index, raw) in content.lines().enumerate() {
        if raw.starts_with('#') {
            continue;
        }
        let line = strip_trailing_comment(raw);
        let line_no = *start.get_or_insert(index + 1);

        if let Some(head) = line.strip_suffix('\\') {
            continued.push_str(head);
            continue;
        }

        continued.push_str(line);
        let logical = std::mem::take(&mut continued).trim().to_string();
        start = None;
        if !logical.is_empty() {
            lines.push((line_no, logical));
        }
    }

    let trailing = continued.trim();
    if let Some(line_no) = start
        && !trailing.is_empty()
    {
        lines.push((line_no, trailing.to_string()));
    }
    lines
}

fn accepted_url(line: &str) -> Option<url::Url> {
    url::Url::parse(line)
        .ok()
        .filter(|url| ACCEPTED_URI_SCHEMES.contains(&url.scheme()))
}

#[derive(Default)]
struct ManifestReader {
    /// Files currently being read, innermost last
    stack: Vec<PathBuf>,
    entries: Vec<ManifestEntry>,
}

impl ManifestReader {
    fn read_file(&mut self, path: &Path, only_constrain: bool) {
        match std::fs::read_to_string(path) {
            Ok(content) => self.read_content(path, &content, only_constrain),
            Err(e) => warn!("Failed to read included manifest {}: {}", path.display(), e),
        }
    }

    fn read_content(&mut self, path: &Path, content: &str, only_constrain: bool) {
        let identity = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        if self.stack.contains(&identity) {
            warn!("Skipping circular include of {}", path.display());
            return;
        }
        debug!("Reading manifest {}", path.display());
        self.stack.push(identity);

        for (line_no, line) in logical_lines(content) {
            self.process_line(path, line_no, &line, only_constrain);
        }

        self.stack.pop();
    }

    fn process_line(&mut self, path: &Path, line_no: usize, line: &str, only_constrain: bool) {
        let relative_to = |target: &str| {
            path.parent()
                .map(|dir| dir.join(target))
                .unwrap_or_else(|| PathBuf::from(target))
        };

        match classify(line) {
            Directive::Include(target) => {
                if only_constrain {
                    warn!(
                        "-r directive appears in constraints file {}:{}",
                        path.display(),
                        line_no
                    );
                }
                self.read_file(&relative_to(target), only_constrain);
            }
            Directive::Constrain(target) => {
                self.read_file(&relative_to(target), true);
            }
            Directive::Editable => {
                warn!(
                    "{}:{} lists \"editable\" package: {}",
                    path.display(),
                    line_no,
                    line
                );
            }
            Directive::UnknownOption => {
                warn!(
                    "Ignoring unsupported option in {}:{}: {}",
                    path.display(),
                    line_no,
                    line
                );
            }
            Directive::Requirement => {
                self.insert_requirement(path, line_no, line, only_constrain);
            }
        }
    }

    fn insert_requirement(&mut self, path: &Path, line_no: usize, line: &str, only_constrain: bool) {
        let requirement = match parse_requirement(line) {
            Ok(requirement) => requirement,
            Err(_) => match accepted_url(line) {
                Some(url) if only_constrain => {
                    warn!(
                        "{} is a constraints file but specifies URL {}",
                        path.display(),
                        url
                    );
                    return;
                }
                Some(_) => Requirement::anonymous(line),
                None => {
                    warn!(
                        "Unreportable line in {}:{}: {}",
                        path.display(),
                        line_no,
                        line
                    );
                    return;
                }
            },
        };

        self.entries.push(ManifestEntry {
            requirement,
            install: !only_constrain,
            source: path.to_path_buf(),
            line: line_no,
        });
    }
}
