//! Parsers for the DFIR-ORC sidecar tables found inside collection archives

pub mod getthis;
pub mod table;
pub mod volstats;

pub use getthis::{
    volume_folder_name, Manifest, ManifestEntry, ResolvedTarget, NO_SNAPSHOT_ID,
};
pub use volstats::VolumeLabels;

/// Errors raised while reading `GetThis.csv` or `volstats.csv`
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("{file} is not valid UTF-8")]
    Encoding { file: &'static str },

    #[error("{file}: malformed record at line {line}")]
    Syntax { file: &'static str, line: usize },

    #[error("{file}: required column '{column}' is missing from the header")]
    MissingColumn {
        file: &'static str,
        column: &'static str,
    },

    #[error("{file}: line {line} has {found} fields, header has {expected}")]
    FieldCount {
        file: &'static str,
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("{file}: line {line}: cannot parse {column} '{value}'")]
    Timestamp {
        file: &'static str,
        line: usize,
        column: &'static str,
        value: String,
    },

    #[error("{file}: line {line}: {source}")]
    PathTraversal {
        file: &'static str,
        line: usize,
        #[source]
        source: crate::paths::PathEscape,
    },

    #[error("{file}: line {line}: empty {column}")]
    EmptyField {
        file: &'static str,
        line: usize,
        column: &'static str,
    },
}
