//! Recursive walk over nested DFIR-ORC archives
//!
//! Each archive level is read in full, its `GetThis.csv` and `volstats.csv`
//! parsed first, then every entry dispatched: artifacts listed in the
//! manifest are written under the destination, configured report files are
//! copied into the report directory and nested `.7z` entries are walked in
//! turn. Volume labels flow back up as the return value.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::archive::{ArchiveBackend, ArchiveEntry, ArchiveError, ArchiveSource};
use crate::extract::log::NonExtractedLog;
use crate::extract::writer::{write_artifact, FileTimes, WriteError};
use crate::manifest::{Manifest, ManifestError, VolumeLabels};
use crate::paths::confined_join;
use crate::{MANIFEST_FILENAME, NESTED_ARCHIVE_SUFFIX, VOLUME_LABEL_FILENAME};

/// Everything a walk needs besides the archive itself
#[derive(Debug, Clone, Default)]
pub struct WalkContext {
    /// Root of the rebuilt tree
    pub destination: PathBuf,
    /// Nested archive name to password
    pub passwords: HashMap<String, String>,
    /// `"{archive name}/{entry name}"` keys of files to copy as reports
    pub report_files: HashSet<String>,
    /// Where report files go; reports are ignored without it
    pub report_directory: Option<PathBuf>,
    /// Walk sibling nested archives concurrently
    pub parallel: bool,
}

/// Counters accumulated over a subtree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkStats {
    pub archives_opened: usize,
    pub archives_failed: usize,
    pub artifacts_written: usize,
    pub reports_written: usize,
    /// Writes refused because the target already existed
    pub write_conflicts: usize,
    /// Writes that failed for any other reason
    pub write_failures: usize,
    /// Entries that were neither artifacts, reports nor archives
    pub entries_skipped: usize,
    /// Files written without their original times
    pub times_not_restored: usize,
}

impl WalkStats {
    pub fn absorb(&mut self, other: &WalkStats) {
        self.archives_opened += other.archives_opened;
        self.archives_failed += other.archives_failed;
        self.artifacts_written += other.artifacts_written;
        self.reports_written += other.reports_written;
        self.write_conflicts += other.write_conflicts;
        self.write_failures += other.write_failures;
        self.entries_skipped += other.entries_skipped;
        self.times_not_restored += other.times_not_restored;
    }

    pub fn failed_writes(&self) -> usize {
        self.write_conflicts + self.write_failures
    }

    fn count_write(&mut self, result: &Result<(), WriteError>, on_success: fn(&mut Self)) {
        match result {
            Ok(()) => on_success(self),
            Err(WriteError::AlreadyExists { .. }) => self.write_conflicts += 1,
            Err(WriteError::Io { .. }) => self.write_failures += 1,
            Err(WriteError::Times { .. }) => {
                on_success(self);
                self.times_not_restored += 1;
            }
        }
    }
}

/// An artifact written under the destination during this walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenArtifact {
    pub archive_name: String,
    pub artefact_name: String,
    pub path: PathBuf,
}

/// Result of walking one archive and everything below it
#[derive(Debug, Clone, Default)]
pub struct WalkOutcome {
    pub volume_labels: VolumeLabels,
    pub stats: WalkStats,
    /// In walk order
    pub written: Vec<WrittenArtifact>,
}

/// Emitted every time an archive is opened
#[derive(Debug, Clone)]
pub struct WalkProgress {
    pub archive_name: String,
    pub depth: usize,
    pub entries: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum WalkError {
    #[error("{archive} is not a readable archive: {source}")]
    Open {
        archive: String,
        #[source]
        source: ArchiveError,
    },

    #[error("{archive} skipped: {source}")]
    Manifest {
        archive: String,
        #[source]
        source: ManifestError,
    },
}

pub type ProgressCallback<'a> = &'a (dyn Fn(WalkProgress) + Send + Sync);

pub struct ArchiveWalker<'a, B: ArchiveBackend> {
    backend: &'a B,
    context: &'a WalkContext,
    log: &'a NonExtractedLog,
    progress: Option<ProgressCallback<'a>>,
}

impl<'a, B: ArchiveBackend> ArchiveWalker<'a, B> {
    pub fn new(backend: &'a B, context: &'a WalkContext, log: &'a NonExtractedLog) -> Self {
        Self {
            backend,
            context,
            log,
            progress: None,
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallback<'a>) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Walk `source`, known as `archive_name`, and everything nested in it.
    ///
    /// Fails only for this archive itself; unreadable nested archives are
    /// logged, counted and skipped.
    pub fn walk(&self, source: ArchiveSource, archive_name: &str) -> Result<WalkOutcome, WalkError> {
        self.walk_at(source, archive_name, 0)
    }

    fn walk_at(
        &self,
        source: ArchiveSource,
        archive_name: &str,
        depth: usize,
    ) -> Result<WalkOutcome, WalkError> {
        let password = self.context.passwords.get(archive_name).map(String::as_str);
        let entries = self
            .backend
            .read_entries(&source, password)
            .map_err(|source| WalkError::Open {
                archive: archive_name.to_string(),
                source,
            })?;
        drop(source);

        tracing::info!(
            "Opened {} ({} entries, depth {})",
            archive_name,
            entries.len(),
            depth
        );
        if let Some(progress) = self.progress {
            progress(WalkProgress {
                archive_name: archive_name.to_string(),
                depth,
                entries: entries.len(),
            });
        }

        let sidecar_error = |source: ManifestError| WalkError::Manifest {
            archive: archive_name.to_string(),
            source,
        };
        let manifest = find(&entries, MANIFEST_FILENAME)
            .map(|entry| Manifest::parse(&entry.data))
            .transpose()
            .map_err(sidecar_error)?;
        let mut volume_labels = find(&entries, VOLUME_LABEL_FILENAME)
            .map(|entry| VolumeLabels::parse(&entry.data))
            .transpose()
            .map_err(sidecar_error)?
            .unwrap_or_default();

        if let Some(manifest) = &manifest {
            tracing::debug!("{} lists {} artifacts", archive_name, manifest.len());
        }

        let mut stats = WalkStats {
            archives_opened: 1,
            ..Default::default()
        };
        let mut nested = Vec::new();
        let mut written = Vec::new();

        for entry in entries {
            let target = manifest
                .as_ref()
                .and_then(|m| m.resolve(&entry.name, &self.context.destination));

            if let Some(target) = target {
                let times = FileTimes::from_pair(target.accessed, target.modified);
                let result =
                    self.materialize(archive_name, &entry.name, &target.path, &entry.data, times);
                stats.count_write(&result, |s| s.artifacts_written += 1);
                if matches!(result, Ok(()) | Err(WriteError::Times { .. })) {
                    written.push(WrittenArtifact {
                        archive_name: archive_name.to_string(),
                        artefact_name: entry.name.clone(),
                        path: target.path,
                    });
                }
            } else if let Some(report_dir) = self.report_directory_for(archive_name, &entry.name) {
                match confined_join(report_dir, &entry.name) {
                    Ok(path) => {
                        let result =
                            self.materialize(archive_name, &entry.name, &path, &entry.data, None);
                        stats.count_write(&result, |s| s.reports_written += 1);
                    }
                    Err(escape) => {
                        tracing::error!("Report {} from {}: {}", entry.name, archive_name, escape);
                        self.record_failure(archive_name, &entry.name, report_dir);
                        stats.write_failures += 1;
                    }
                }
            } else if entry.name.ends_with(NESTED_ARCHIVE_SUFFIX) {
                nested.push(entry);
            } else if entry.name == MANIFEST_FILENAME || entry.name == VOLUME_LABEL_FILENAME {
                continue;
            } else {
                tracing::debug!("Skipping {} in {}", entry.name, archive_name);
                stats.entries_skipped += 1;
            }
        }

        let descend = |entry: ArchiveEntry| {
            let result = self.walk_at(ArchiveSource::Memory(entry.data), &entry.name, depth + 1);
            (entry.name, result)
        };
        // Collected in listing order either way, so the merge below is deterministic.
        let children: Vec<_> = if self.context.parallel && nested.len() > 1 {
            nested.into_par_iter().map(&descend).collect()
        } else {
            nested.into_iter().map(&descend).collect()
        };

        for (name, result) in children {
            match result {
                Ok(child) => {
                    volume_labels.merge_child(child.volume_labels);
                    stats.absorb(&child.stats);
                    written.extend(child.written);
                }
                Err(err) => {
                    tracing::warn!("{} (nested in {}): {}", name, archive_name, err);
                    stats.archives_failed += 1;
                }
            }
        }

        Ok(WalkOutcome {
            volume_labels,
            stats,
            written,
        })
    }

    fn report_directory_for(&self, archive_name: &str, entry_name: &str) -> Option<&'a Path> {
        let report_dir = self.context.report_directory.as_deref()?;
        let key = format!("{}/{}", archive_name, entry_name);
        self.context.report_files.contains(&key).then_some(report_dir)
    }

    /// Write one file, logging any failure to the non-extracted log
    fn materialize(
        &self,
        archive_name: &str,
        entry_name: &str,
        path: &Path,
        data: &[u8],
        times: Option<FileTimes>,
    ) -> Result<(), WriteError> {
        let result = write_artifact(path, data, times);
        match &result {
            Ok(()) => tracing::debug!("Wrote {}", path.display()),
            Err(err @ WriteError::Times { .. }) => {
                tracing::warn!("{} from {}: {}", entry_name, archive_name, err);
            }
            Err(err @ WriteError::AlreadyExists { .. }) => {
                tracing::warn!("{} from {}: {}", entry_name, archive_name, err);
                self.record_failure(archive_name, entry_name, path);
            }
            Err(err @ WriteError::Io { .. }) => {
                tracing::error!("{} from {}: {}", entry_name, archive_name, err);
                self.record_failure(archive_name, entry_name, path);
            }
        }
        result
    }

    fn record_failure(&self, archive_name: &str, entry_name: &str, path: &Path) {
        if let Err(e) = self.log.record(archive_name, entry_name, path) {
            tracing::error!("Cannot append to the non-extracted log: {}", e);
        }
    }
}

fn find<'e>(entries: &'e [ArchiveEntry], name: &str) -> Option<&'e ArchiveEntry> {
    entries.iter().find(|entry| entry.name == name)
}
