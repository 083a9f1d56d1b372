//! Volume folder renaming
//!
//! Artifacts are written under folders named after raw volume IDs because
//! the matching `volstats.csv` may sit in an archive that is only reached
//! later in the walk. Once the walk is over and every label is known, those
//! folders are renamed to their drive letters, keeping any `(vsc ...)`
//! suffix: `0x5A3C (vsc {...})` becomes `C (vsc {...})`.
//!
//! When the drive letter folder already exists (a previous run, or two volume
//! IDs sharing a letter) the raw folder is merged into it file by file. An
//! existing file is never replaced; each collision is handed to the caller,
//! which decides whether the raw copy is a duplicate to discard.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::manifest::VolumeLabels;

/// A folder that was renamed or merged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenamedVolume {
    pub from: PathBuf,
    pub to: PathBuf,
}

/// A folder that could not be renamed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// A file found at both ends of a merge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeConflict {
    /// File under the raw volume folder
    pub source: PathBuf,
    /// File already present under the drive letter folder
    pub target: PathBuf,
    /// Whether `source` was deleted
    pub discarded: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameSummary {
    pub renamed: Vec<RenamedVolume>,
    /// Folders emptied into an existing drive letter folder
    pub merged: Vec<RenamedVolume>,
    /// Folders left in place, fully or partly, because of kept conflicts
    pub skipped: Vec<PathBuf>,
    pub conflicts: Vec<MergeConflict>,
    pub failed: Vec<RenameFailure>,
}

/// New name for a volume folder, or `None` when `name` does not belong to
/// `volume_id`
pub fn relabel_folder(name: &str, volume_id: &str, letter: char) -> Option<String> {
    let rest = name.strip_prefix(volume_id)?;
    if rest.is_empty() || rest.starts_with(" (vsc ") {
        Some(format!("{}{}", letter, rest))
    } else {
        None
    }
}

/// Rename every volume folder directly under `root` that has a label.
///
/// `root` should be absolute so renames never depend on the working
/// directory. `on_conflict(source, target)` is called for every file present
/// on both sides of a merge and returns `true` to delete `source`; otherwise
/// it stays where it is along with its folder. Individual failures are
/// collected, only an unreadable `root` is an error. Running it twice with
/// the same labels changes nothing the second time.
pub fn rename_volumes(
    root: &Path,
    labels: &VolumeLabels,
    mut on_conflict: impl FnMut(&Path, &Path) -> bool,
) -> io::Result<RenameSummary> {
    let mut summary = RenameSummary::default();

    for (volume_id, letter) in labels.iter() {
        for name in child_directories(root)? {
            let Some(new_name) = relabel_folder(&name, volume_id, letter) else {
                continue;
            };
            let from = root.join(&name);
            let to = root.join(&new_name);

            if to.is_dir() {
                match merge_into(&from, &to, &mut on_conflict, &mut summary.conflicts) {
                    Ok(()) if !from.exists() => {
                        tracing::info!("Merged volume folder {} into {}", name, new_name);
                        summary.merged.push(RenamedVolume { from, to });
                    }
                    Ok(()) => {
                        tracing::warn!(
                            "{} kept files that already exist in {}",
                            from.display(),
                            to.display()
                        );
                        summary.skipped.push(from);
                    }
                    Err(e) => {
                        tracing::warn!("Cannot merge {} into {}: {}", from.display(), to.display(), e);
                        summary.failed.push(RenameFailure {
                            path: from,
                            reason: e.to_string(),
                        });
                    }
                }
                continue;
            }

            if to.exists() {
                tracing::warn!(
                    "Not renaming {}: {} exists and is not a folder",
                    from.display(),
                    to.display()
                );
                summary.skipped.push(from);
                continue;
            }

            match fs::rename(&from, &to) {
                Ok(()) => {
                    tracing::info!("Renamed volume folder {} -> {}", name, new_name);
                    summary.renamed.push(RenamedVolume { from, to });
                }
                Err(e) => {
                    tracing::warn!("Cannot rename {}: {}", from.display(), e);
                    summary.failed.push(RenameFailure {
                        path: from,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    Ok(summary)
}

/// Move everything under `from` into `to`, never replacing a file.
///
/// `from` is removed once empty.
fn merge_into(
    from: &Path,
    to: &Path,
    on_conflict: &mut dyn FnMut(&Path, &Path) -> bool,
    conflicts: &mut Vec<MergeConflict>,
) -> io::Result<()> {
    fs::create_dir_all(to)?;

    let mut entries = fs::read_dir(from)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let source = entry.path();
        let target = to.join(entry.file_name());

        if entry.file_type()?.is_dir() && !target.exists() {
            fs::rename(&source, &target)?;
        } else if entry.file_type()?.is_dir() && target.is_dir() {
            merge_into(&source, &target, on_conflict, conflicts)?;
        } else if target.symlink_metadata().is_ok() {
            let discarded = on_conflict(&source, &target);
            if discarded {
                fs::remove_file(&source)?;
            }
            conflicts.push(MergeConflict {
                source,
                target,
                discarded,
            });
        } else {
            fs::rename(&source, &target)?;
        }
    }

    if fs::read_dir(from)?.next().is_none() {
        fs::remove_dir(from)?;
    }
    Ok(())
}

fn child_directories(root: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}
