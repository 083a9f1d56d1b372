/// `GetThis.csv`: the per-archive list of collected artifacts
///
/// Each row ties a flattened sample name inside the archive to the file it
/// was collected from: volume, optional shadow copy, original path and
/// timestamps.
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::table::Table;
use super::ManifestError;
use crate::paths::{confined_components, PathEscape};
use crate::MANIFEST_FILENAME;

/// Snapshot ID used by DFIR-ORC for samples collected from the live volume
pub const NO_SNAPSHOT_ID: &str = "{00000000-0000-0000-0000-000000000000}";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Name of the folder under the destination root that holds a volume's files.
///
/// The renamer relies on these two shapes when swapping the volume ID for a
/// drive letter.
pub fn volume_folder_name(volume_id: &str, snapshot_id: &str) -> String {
    if snapshot_id == NO_SNAPSHOT_ID {
        volume_id.to_string()
    } else {
        format!("{} (vsc {})", volume_id, snapshot_id)
    }
}

/// One artifact row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub sample_name: String,
    pub volume_id: String,
    pub snapshot_id: String,
    pub full_name: String,
    /// Unix seconds, UTC
    pub last_modified: Option<i64>,
    /// Unix seconds, UTC
    pub last_accessed: Option<i64>,
}

impl ManifestEntry {
    pub fn volume_folder(&self) -> String {
        volume_folder_name(&self.volume_id, &self.snapshot_id)
    }

    /// Where this artifact lands under `root`
    pub fn resolve(&self, root: &Path) -> Result<ResolvedTarget, PathEscape> {
        let mut path = root.join(self.volume_folder());
        path.extend(confined_components(&self.full_name)?);
        Ok(ResolvedTarget {
            path,
            modified: self.last_modified,
            accessed: self.last_accessed,
        })
    }
}

/// Destination of a single artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub path: PathBuf,
    pub modified: Option<i64>,
    pub accessed: Option<i64>,
}

/// Parsed `GetThis.csv`, keyed by slash-normalized sample name
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    entries: HashMap<String, ManifestEntry>,
}

impl Manifest {
    /// Parse a whole manifest.
    ///
    /// Any malformed row fails the manifest: a partially trusted manifest
    /// would silently drop evidence.
    pub fn parse(bytes: &[u8]) -> Result<Self, ManifestError> {
        let file = MANIFEST_FILENAME;
        let table = Table::parse(file, bytes)?;

        let sample = table.require(file, "SampleName")?;
        let volume = table.require(file, "VolumeID")?;
        let snapshot = table.require(file, "SnapshotID")?;
        let full_name = table.require(file, "FullName")?;
        let modified = table.require(file, "LastModificationDate")?;
        let accessed = table.require(file, "LastAccessDate")?;

        let mut entries = HashMap::with_capacity(table.len());
        for (line, row) in table.rows() {
            let sample_name = row[sample].replace('\\', "/");
            if sample_name.is_empty() {
                return Err(ManifestError::EmptyField {
                    file,
                    line,
                    column: "SampleName",
                });
            }

            let full = row[full_name].clone();
            if confined_components(&full)
                .map_err(|source| ManifestError::PathTraversal { file, line, source })?
                .is_empty()
            {
                return Err(ManifestError::EmptyField {
                    file,
                    line,
                    column: "FullName",
                });
            }

            let volume_id = row[volume].clone();
            if volume_id.is_empty() {
                return Err(ManifestError::EmptyField {
                    file,
                    line,
                    column: "VolumeID",
                });
            }
            let snapshot_id = row[snapshot].clone();
            // The volume folder must stay a single directory under the root.
            let folder = volume_folder_name(&volume_id, &snapshot_id);
            let folder_parts = confined_components(&folder)
                .map_err(|source| ManifestError::PathTraversal { file, line, source })?;
            if folder_parts.len() != 1 {
                return Err(ManifestError::PathTraversal {
                    file,
                    line,
                    source: PathEscape { path: folder.clone() },
                });
            }

            let entry = ManifestEntry {
                sample_name: sample_name.clone(),
                volume_id,
                snapshot_id,
                full_name: full,
                last_modified: parse_timestamp(&row[modified], line, "LastModificationDate")?,
                last_accessed: parse_timestamp(&row[accessed], line, "LastAccessDate")?,
            };
            entries.insert(sample_name, entry);
        }

        Ok(Self { entries })
    }

    pub fn get(&self, sample_name: &str) -> Option<&ManifestEntry> {
        self.entries.get(sample_name)
    }

    /// Resolve the archive entry `name` against `root`, if the manifest lists it
    pub fn resolve(&self, name: &str, root: &Path) -> Option<ResolvedTarget> {
        // Rows were validated at parse time, so confinement cannot fail here.
        self.get(name).and_then(|entry| entry.resolve(root).ok())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse a DFIR-ORC date, dropping sub-second precision
fn parse_timestamp(
    value: &str,
    line: usize,
    column: &'static str,
) -> Result<Option<i64>, ManifestError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .map(|dt| Some(dt.and_utc().timestamp()))
        .map_err(|_| ManifestError::Timestamp {
            file: MANIFEST_FILENAME,
            line,
            column,
            value: value.to_string(),
        })
}
