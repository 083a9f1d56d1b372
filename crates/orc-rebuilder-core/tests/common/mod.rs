//! Shared fixtures: an in-memory archive format and DFIR-ORC table builders

#![allow(dead_code)]

use orc_rebuilder_core::{
    ArchiveBackend, ArchiveEntry, ArchiveError, ArchiveSource, NonExtractedLog,
};
use serde::{Deserialize, Serialize};
use sevenz_rust::{SevenZArchiveEntry, SevenZWriter};
use std::fs::File;
use std::io::Cursor;

pub const GUID_VOLUME: &str = "{0b1c2d3e-4f50-6172-8394-a5b6c7d8e9f0}";
pub const NO_SNAPSHOT: &str = "{00000000-0000-0000-0000-000000000000}";
pub const SNAPSHOT: &str = "{11111111-2222-3333-4444-555555555555}";

/// Archive stand-in: JSON list of entries, optionally "encrypted"
#[derive(Serialize, Deserialize)]
struct FakeArchive {
    password: Option<String>,
    entries: Vec<(String, Vec<u8>)>,
}

pub fn fake_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    encode(None, entries)
}

pub fn fake_protected_archive(password: &str, entries: &[(&str, &[u8])]) -> Vec<u8> {
    encode(Some(password.to_string()), entries)
}

fn encode(password: Option<String>, entries: &[(&str, &[u8])]) -> Vec<u8> {
    serde_json::to_vec(&FakeArchive {
        password,
        entries: entries
            .iter()
            .map(|(name, data)| (name.to_string(), data.to_vec()))
            .collect(),
    })
    .unwrap()
}

/// Backend reading [`fake_archive`] payloads
pub struct JsonBackend;

impl ArchiveBackend for JsonBackend {
    fn read_entries(
        &self,
        source: &ArchiveSource,
        password: Option<&str>,
    ) -> Result<Vec<ArchiveEntry>, ArchiveError> {
        let bytes = match source {
            ArchiveSource::Path(path) => std::fs::read(path)?,
            ArchiveSource::Memory(bytes) => bytes.clone(),
        };
        let archive: FakeArchive =
            serde_json::from_slice(&bytes).map_err(|e| ArchiveError::Invalid(e.to_string()))?;
        if archive.password.is_some() && archive.password.as_deref() != password {
            return Err(ArchiveError::PasswordRequired);
        }
        Ok(archive
            .entries
            .into_iter()
            .map(|(name, data)| ArchiveEntry::new(name, data))
            .collect())
    }
}

/// A real 7z archive holding `files`
pub fn sevenz_archive(files: &[(&str, &[u8])]) -> Vec<u8> {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let mut writer = SevenZWriter::new(Cursor::new(Vec::new())).unwrap();
    for (i, (name, content)) in files.iter().enumerate() {
        let src = temp_dir.path().join(format!("src{}", i));
        std::fs::write(&src, content).unwrap();
        writer
            .push_archive_entry(
                SevenZArchiveEntry::from_path(&src, name.to_string()),
                Some(File::open(&src).unwrap()),
            )
            .unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// One `GetThis.csv` row
pub struct Sample<'a> {
    pub sample_name: &'a str,
    pub volume_id: &'a str,
    pub snapshot_id: &'a str,
    pub full_name: &'a str,
    pub modified: &'a str,
    pub accessed: &'a str,
}

impl<'a> Sample<'a> {
    pub fn new(sample_name: &'a str, volume_id: &'a str, full_name: &'a str) -> Self {
        Self {
            sample_name,
            volume_id,
            snapshot_id: NO_SNAPSHOT,
            full_name,
            modified: "2023-01-02 03:04:05.123456",
            accessed: "2023-01-05 06:07:08.000000",
        }
    }

    pub fn snapshot(mut self, snapshot_id: &'a str) -> Self {
        self.snapshot_id = snapshot_id;
        self
    }
}

/// `GetThis.csv` as DFIR-ORC writes it: BOM, CRLF, extra columns
pub fn getthis(samples: &[Sample]) -> Vec<u8> {
    let mut csv = String::from(
        "\u{feff}ComputerName,VolumeID,FullName,SampleName,SizeInBytes,LastModificationDate,LastAccessDate,SnapshotID\r\n",
    );
    for s in samples {
        csv.push_str(&format!(
            "WKS01,{},{},{},1,{},{},{}\r\n",
            s.volume_id, s.full_name, s.sample_name, s.modified, s.accessed, s.snapshot_id
        ));
    }
    csv.into_bytes()
}

/// `volstats.csv` mapping volume IDs to mount points (empty = not mounted)
pub fn volstats(volumes: &[(&str, &str)]) -> Vec<u8> {
    let mut csv = String::from("\u{feff}ComputerName,VolumeID,MountPoint,FileSystem\r\n");
    for (volume_id, mount_point) in volumes {
        csv.push_str(&format!("WKS01,{},{},NTFS\r\n", volume_id, mount_point));
    }
    csv.into_bytes()
}

pub fn discard_log() -> NonExtractedLog {
    NonExtractedLog::from_writer(std::io::sink()).unwrap()
}
