//! Parser layer
//! - error.rs: ParseError
//! - types.rs: Requirement and marker tree types
//! - uri.rs: URI-reference grammar used by direct references
//! - marker.rs: environment marker grammar
//! - requirement.rs: single requirement line grammar
//! - requirements_txt.rs: manifest reader (comments, continuations, includes)

pub mod error;
pub mod marker;
pub mod requirement;
pub mod requirements_txt;
pub mod types;
pub mod uri;

pub use error::ParseError;
pub use requirement::parse_requirement;
pub use requirements_txt::{ManifestEntry, guess_manifest, read_manifest};
pub use types::{MarkerOperator, MarkerTree, MarkerValue, Requirement};
