/// Write-once materialization of extracted files
use filetime::FileTime;
use std::fs::{create_dir_all, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Original access and modification times, Unix seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileTimes {
    pub accessed: i64,
    pub modified: i64,
}

impl FileTimes {
    /// Both times, or nothing when either is missing or zero
    pub fn from_pair(accessed: Option<i64>, modified: Option<i64>) -> Option<Self> {
        match (accessed, modified) {
            (Some(accessed), Some(modified)) if accessed != 0 && modified != 0 => {
                Some(Self { accessed, modified })
            }
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("{} already exists", path.display())]
    AlreadyExists { path: PathBuf },

    #[error("cannot write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The content is on disk, only its times could not be restored
    #[error("wrote {} but cannot restore its times: {source}", path.display())]
    Times {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl WriteError {
    pub fn path(&self) -> &Path {
        match self {
            WriteError::AlreadyExists { path }
            | WriteError::Io { path, .. }
            | WriteError::Times { path, .. } => path,
        }
    }

    fn io(path: &Path, source: io::Error) -> Self {
        WriteError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Write `content` to `path` and restore `times` if given.
///
/// Missing parent directories are created. An existing file is never
/// overwritten: recovered evidence from an earlier run stays untouched.
/// [`WriteError::Times`] means the file was written all the same.
pub fn write_artifact(
    path: &Path,
    content: &[u8],
    times: Option<FileTimes>,
) -> Result<(), WriteError> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent).map_err(|e| WriteError::io(path, e))?;
    }

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(WriteError::AlreadyExists {
                path: path.to_path_buf(),
            })
        }
        Err(e) => return Err(WriteError::io(path, e)),
    };

    file.write_all(content)
        .and_then(|_| file.flush())
        .map_err(|e| WriteError::io(path, e))?;
    drop(file);

    match times {
        Some(times) => restore_times(path, times),
        None => Ok(()),
    }
}

/// Set the access and modification times of an existing file
pub fn restore_times(path: &Path, times: FileTimes) -> Result<(), WriteError> {
    filetime::set_file_times(
        path,
        FileTime::from_unix_time(times.accessed, 0),
        FileTime::from_unix_time(times.modified, 0),
    )
    .map_err(|source| WriteError::Times {
        path: path.to_path_buf(),
        source,
    })
}
