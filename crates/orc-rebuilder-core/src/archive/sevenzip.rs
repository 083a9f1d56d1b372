/// 7z backend built on `sevenz-rust`
use memmap2::MmapOptions;
use sevenz_rust::{Password, SevenZReader};
use std::fs::File;
use std::io::{Cursor, Read, Seek};

use super::{ArchiveBackend, ArchiveEntry, ArchiveError, ArchiveSource};

/// Reads DFIR-ORC 7z archives, optionally AES-encrypted
#[derive(Debug, Clone, Copy, Default)]
pub struct SevenZipBackend;

impl SevenZipBackend {
    pub fn new() -> Self {
        Self
    }
}

impl ArchiveBackend for SevenZipBackend {
    fn read_entries(
        &self,
        source: &ArchiveSource,
        password: Option<&str>,
    ) -> Result<Vec<ArchiveEntry>, ArchiveError> {
        match source {
            ArchiveSource::Path(path) => {
                let file = File::open(path)?;
                let len = file.metadata()?.len();
                if len == 0 {
                    return Err(ArchiveError::Invalid("empty file".to_string()));
                }
                // The mapping is dropped, and the file closed, when this arm returns.
                let mmap = unsafe { MmapOptions::new().map(&file)? };
                read_from(Cursor::new(&mmap[..]), len, password)
            }
            ArchiveSource::Memory(bytes) => {
                read_from(Cursor::new(bytes.as_slice()), bytes.len() as u64, password)
            }
        }
    }
}

fn read_from<R: Read + Seek>(
    reader: R,
    len: u64,
    password: Option<&str>,
) -> Result<Vec<ArchiveEntry>, ArchiveError> {
    let mut archive = SevenZReader::new(reader, len, Password::from(password.unwrap_or("")))
        .map_err(|e| classify(e.to_string()))?;

    let mut entries = Vec::new();
    let mut read_error = None;
    archive
        .for_each_entries(|entry, data_reader| {
            if entry.is_directory {
                return Ok(true);
            }
            let mut data = Vec::with_capacity(initial_capacity(entry.size()));
            match data_reader.read_to_end(&mut data) {
                Ok(_) => {
                    entries.push(ArchiveEntry {
                        name: entry.name().replace('\\', "/"),
                        data,
                    });
                    Ok(true)
                }
                Err(e) => {
                    read_error = Some(e);
                    Ok(false)
                }
            }
        })
        .map_err(|e| classify(e.to_string()))?;

    match read_error {
        Some(e) => Err(classify(e.to_string())),
        None => Ok(entries),
    }
}

/// Upper bound on the buffer reserved from an entry's declared size
const MAX_PREALLOCATION: u64 = 1 << 20;

/// Sizes come from the archive header and are not trusted; the buffer grows
/// past this as data is actually read.
fn initial_capacity(declared_size: u64) -> usize {
    declared_size.min(MAX_PREALLOCATION) as usize
}

/// sevenz-rust reports bad or missing passwords through several error
/// variants; the message is the only stable signal.
fn classify(message: String) -> ArchiveError {
    let lower = message.to_lowercase();
    if lower.contains("password") || lower.contains("decrypt") {
        ArchiveError::PasswordRequired
    } else {
        ArchiveError::Invalid(message)
    }
}
