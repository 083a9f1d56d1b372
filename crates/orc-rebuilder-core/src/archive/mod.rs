//! Archive access
//!
//! The walker only needs to list an archive and read each entry's bytes, so
//! container formats sit behind [`ArchiveBackend`]. DFIR-ORC produces 7z
//! archives, handled by [`sevenzip::SevenZipBackend`].

use std::path::PathBuf;

pub mod sevenzip;

pub use sevenzip::SevenZipBackend;

/// Where an archive's bytes come from
#[derive(Debug, Clone)]
pub enum ArchiveSource {
    /// The top-level archive on disk
    Path(PathBuf),
    /// A nested archive already read out of its parent
    Memory(Vec<u8>),
}

/// A file stored in an archive, fully read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Forward-slash separated path inside the archive
    pub name: String,
    pub data: Vec<u8>,
}

impl ArchiveEntry {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("not a valid archive: {0}")]
    Invalid(String),

    #[error("archive is encrypted and the password is missing or wrong")]
    PasswordRequired,

    #[error("I/O error reading archive: {0}")]
    Io(#[from] std::io::Error),
}

/// Opens an archive and returns every file entry it contains.
///
/// Implementations close whatever handle they open before returning, on
/// success and on failure alike. Directory entries are not returned.
pub trait ArchiveBackend: Sync {
    fn read_entries(
        &self,
        source: &ArchiveSource,
        password: Option<&str>,
    ) -> Result<Vec<ArchiveEntry>, ArchiveError>;
}
