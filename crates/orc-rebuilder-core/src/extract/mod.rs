/// Extraction of collected artifacts from nested archives
pub mod log;
pub mod walker;
pub mod writer;

pub use log::{NonExtractedEntry, NonExtractedLog, NON_EXTRACTED_HEADER};
pub use walker::{
    ArchiveWalker, ProgressCallback, WalkContext, WalkError, WalkOutcome, WalkProgress, WalkStats,
    WrittenArtifact,
};
pub use writer::{restore_times, write_artifact, FileTimes, WriteError};
