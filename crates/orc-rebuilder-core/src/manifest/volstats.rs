//! `volstats.csv`: volume metadata, used to map volume IDs to drive letters

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::table::Table;
use super::ManifestError;
use crate::VOLUME_LABEL_FILENAME;

/// Volume ID to drive letter, aggregated across nested archives
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VolumeLabels(BTreeMap<String, char>);

impl VolumeLabels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `volstats.csv` table.
    ///
    /// Only mounted volumes are kept, and only the first character of
    /// `MountPoint` (`C:\` becomes `C`). Labels that are not ASCII
    /// alphanumeric are ignored.
    pub fn parse(bytes: &[u8]) -> Result<Self, ManifestError> {
        let file = VOLUME_LABEL_FILENAME;
        let table = Table::parse(file, bytes)?;
        let volume = table.require(file, "VolumeID")?;

        let mut labels = Self::new();
        let Some(mount) = table.column("MountPoint") else {
            return Ok(labels);
        };

        for (line, row) in table.rows() {
            let Some(letter) = row[mount].trim().chars().next() else {
                continue;
            };
            if !letter.is_ascii_alphanumeric() {
                tracing::debug!(
                    "{}: ignoring mount point '{}' at line {}",
                    file,
                    row[mount],
                    line
                );
                continue;
            }
            labels.insert(row[volume].clone(), letter);
        }

        Ok(labels)
    }

    pub fn insert(&mut self, volume_id: impl Into<String>, letter: char) -> Option<char> {
        self.0.insert(volume_id.into(), letter)
    }

    pub fn get(&self, volume_id: &str) -> Option<char> {
        self.0.get(volume_id).copied()
    }

    /// Fold a nested archive's labels into this one.
    ///
    /// The child wins when both map the same volume ID.
    pub fn merge_child(&mut self, child: VolumeLabels) {
        self.0.extend(child.0);
    }

    /// Entries in volume ID order
    pub fn iter(&self) -> impl Iterator<Item = (&str, char)> {
        self.0.iter().map(|(id, letter)| (id.as_str(), *letter))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, char)> for VolumeLabels {
    fn from_iter<T: IntoIterator<Item = (String, char)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
