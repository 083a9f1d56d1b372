use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub mod archive;
pub mod config;
pub mod extract;
pub mod manifest;
pub mod paths;
pub mod volumes;

pub use archive::{ArchiveBackend, ArchiveEntry, ArchiveError, ArchiveSource, SevenZipBackend};
pub use config::{ConfigError, RebuildConfig};
pub use extract::{
    ArchiveWalker, NonExtractedEntry, NonExtractedLog, ProgressCallback, WalkContext, WalkError, WalkOutcome,
    WalkProgress, WalkStats, WriteError, WrittenArtifact,
};
pub use manifest::{Manifest, ManifestEntry, ManifestError, ResolvedTarget, VolumeLabels};
pub use volumes::{rename_volumes, RenameSummary};

/// Artifact list written by DFIR-ORC next to the collected samples
pub const MANIFEST_FILENAME: &str = "GetThis.csv";

/// Volume metadata written by DFIR-ORC
pub const VOLUME_LABEL_FILENAME: &str = "volstats.csv";

/// Entries with this suffix are walked as nested archives
pub const NESTED_ARCHIVE_SUFFIX: &str = ".7z";

/// Log of artifacts that could not be written, at the destination root
pub const NON_EXTRACTED_LOG_FILENAME: &str = "artefacts_non_extracted.csv";

/// Name given to the top-level archive when matching report files
pub const ROOT_ARCHIVE_NAME: &str = ".";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildOptions {
    /// Rename volume folders to drive letters once the walk is over
    pub rename_volumes: bool,
    /// Walk sibling nested archives concurrently
    pub parallel: bool,
}

impl Default for RebuildOptions {
    fn default() -> Self {
        Self {
            rename_volumes: true,
            parallel: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RebuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot prepare destination {}: {source}", path.display())]
    Destination {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot write {}: {source}", path.display())]
    NonExtractedLog {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    RootArchive(#[from] WalkError),
}

/// Summary of a rebuild run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebuildReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub archive: PathBuf,
    pub destination: PathBuf,
    pub stats: WalkStats,
    pub volume_labels: VolumeLabels,
    pub renames: RenameSummary,
    pub non_extracted_log: PathBuf,
    pub non_extracted: Vec<NonExtractedEntry>,
}

impl RebuildReport {
    /// Export to JSON
    pub fn export_json(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }
}

/// Rebuild the original layout of a DFIR-ORC archive under `destination`
pub fn rebuild(
    archive_path: &Path,
    destination: &Path,
    config_path: Option<&Path>,
    options: RebuildOptions,
) -> Result<RebuildReport, RebuildError> {
    let config = match config_path {
        Some(path) => RebuildConfig::load(path)?,
        None => RebuildConfig::default(),
    };
    rebuild_with_backend(
        &SevenZipBackend::new(),
        archive_path,
        destination,
        &config,
        options,
        None,
    )
}

/// Rebuild with an explicit backend, configuration and progress callback
pub fn rebuild_with_backend<B: ArchiveBackend>(
    backend: &B,
    archive_path: &Path,
    destination: &Path,
    config: &RebuildConfig,
    options: RebuildOptions,
    progress: Option<ProgressCallback<'_>>,
) -> Result<RebuildReport, RebuildError> {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    let span = tracing::info_span!("rebuild", run_id = %run_id);
    let _guard = span.enter();

    let destination_error = |source: io::Error| RebuildError::Destination {
        path: destination.to_path_buf(),
        source,
    };
    std::fs::create_dir_all(destination).map_err(destination_error)?;
    // Renames must not depend on the working directory.
    let destination = destination.canonicalize().map_err(destination_error)?;

    let report_directory = config.report_directory(&destination);
    if let Some(dir) = &report_directory {
        std::fs::create_dir_all(dir).map_err(|source| RebuildError::Destination {
            path: dir.clone(),
            source,
        })?;
    }

    let log_path = destination.join(NON_EXTRACTED_LOG_FILENAME);
    let log = NonExtractedLog::create(&log_path).map_err(|source| RebuildError::NonExtractedLog {
        path: log_path.clone(),
        source,
    })?;

    let context = WalkContext {
        destination: destination.clone(),
        passwords: config.passwords(),
        report_files: config.report_files(),
        report_directory,
        parallel: options.parallel,
    };

    tracing::info!(
        "Rebuilding {} into {}",
        archive_path.display(),
        destination.display()
    );

    let mut walker = ArchiveWalker::new(backend, &context, &log);
    if let Some(progress) = progress {
        walker = walker.with_progress(progress);
    }
    let mut outcome = walker.walk(
        ArchiveSource::Path(archive_path.to_path_buf()),
        ROOT_ARCHIVE_NAME,
    )?;

    let renames = if options.rename_volumes {
        let written: HashMap<&Path, &WrittenArtifact> = outcome
            .written
            .iter()
            .map(|artifact| (artifact.path.as_path(), artifact))
            .collect();
        let mut duplicates = 0;
        // A copy written by this run that collides with an earlier file is a
        // write conflict, reported against its final location.
        let summary = rename_volumes(&destination, &outcome.volume_labels, |source, target| {
            let Some(artifact) = written.get(source) else {
                return false;
            };
            tracing::warn!(
                "{} from {}: {} already exists",
                artifact.artefact_name,
                artifact.archive_name,
                target.display()
            );
            if let Err(e) = log.record(&artifact.archive_name, &artifact.artefact_name, target) {
                tracing::error!("Cannot append to the non-extracted log: {}", e);
            }
            duplicates += 1;
            true
        })
        .map_err(destination_error)?;
        outcome.stats.artifacts_written -= duplicates;
        outcome.stats.write_conflicts += duplicates;
        summary
    } else {
        RenameSummary::default()
    };

    log.flush().map_err(|source| RebuildError::NonExtractedLog {
        path: log_path.clone(),
        source,
    })?;

    tracing::info!(
        "Rebuild complete: {} artifacts, {} reports, {} not extracted, {} archives ({} unreadable)",
        outcome.stats.artifacts_written,
        outcome.stats.reports_written,
        outcome.stats.failed_writes(),
        outcome.stats.archives_opened,
        outcome.stats.archives_failed
    );

    Ok(RebuildReport {
        run_id,
        started_at,
        archive: archive_path.to_path_buf(),
        destination,
        stats: outcome.stats,
        volume_labels: outcome.volume_labels,
        renames,
        non_extracted_log: log_path,
        non_extracted: log.entries(),
    })
}
