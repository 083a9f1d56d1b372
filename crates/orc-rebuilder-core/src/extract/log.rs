/// CSV log of artifacts that could not be written
///
/// One line per failed artifact or report file, so an analyst can tell
/// exactly which pieces of evidence are missing from the rebuilt tree.
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

pub const NON_EXTRACTED_HEADER: &str = "Archive Name,Artefact Name,Expected Target Path";

/// A single line of the log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonExtractedEntry {
    pub archive_name: String,
    pub artefact_name: String,
    pub expected_path: PathBuf,
}

/// Append-only sink shared by every level of the walk
pub struct NonExtractedLog {
    writer: Mutex<Box<dyn Write + Send>>,
    entries: Mutex<Vec<NonExtractedEntry>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl NonExtractedLog {
    /// Create (or truncate) the log file and write its header
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path.as_ref())?;
        Self::from_writer(BufWriter::new(file))
    }

    /// Log into any writer; the header is written immediately
    pub fn from_writer(writer: impl Write + Send + 'static) -> io::Result<Self> {
        let mut writer: Box<dyn Write + Send> = Box::new(writer);
        writeln!(writer, "{}", NON_EXTRACTED_HEADER)?;
        Ok(Self {
            writer: Mutex::new(writer),
            entries: Mutex::new(Vec::new()),
        })
    }

    /// Record a failed artifact
    pub fn record(
        &self,
        archive_name: &str,
        artefact_name: &str,
        expected_path: &Path,
    ) -> io::Result<()> {
        let entry = NonExtractedEntry {
            archive_name: archive_name.to_string(),
            artefact_name: artefact_name.to_string(),
            expected_path: expected_path.to_path_buf(),
        };

        {
            let mut writer = lock(&self.writer);
            writeln!(
                writer,
                "{},{},{}",
                csv_field(&entry.archive_name),
                csv_field(&entry.artefact_name),
                csv_field(&entry.expected_path.display().to_string())
            )?;
        }

        lock(&self.entries).push(entry);
        Ok(())
    }

    pub fn flush(&self) -> io::Result<()> {
        lock(&self.writer).flush()
    }

    /// Everything recorded so far
    pub fn entries(&self) -> Vec<NonExtractedEntry> {
        lock(&self.entries).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for NonExtractedLog {
    fn drop(&mut self) {
        let _ = lock(&self.writer).flush();
    }
}

/// Quote a field when it would otherwise break the row
fn csv_field(value: &str) -> String {
    if value.contains(&[',', '"', '\n', '\r'][..]) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
