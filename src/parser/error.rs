use std::path::PathBuf;

/// Error type for manifest and requirement parsing
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The manifest file could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The line does not match the requirement grammar
    #[error("Invalid syntax: {0}")]
    InvalidSyntax(String),
}
