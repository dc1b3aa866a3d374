//! Filesystem access for a single partition
//!
//! `VolumeReader` is the only thing the scanner and extractor see. The real
//! implementation wraps the `ntfs` crate over a `PartitionReader`; tests use
//! an in-memory tree.

use std::io::{BufReader, Read, Seek, Write};
use ntfs::indexes::NtfsFileNameIndex;
use ntfs::structured_values::NtfsFileNamespace;
use ntfs::{Ntfs, NtfsFile, NtfsReadSeek};
use tracing::{debug, trace};

/// NT FILETIME of 1970-01-01T00:00:00Z (100ns ticks since 1601)
const NT_UNIX_EPOCH: u64 = 116_444_736_000_000_000;
const NT_TICKS_PER_SECOND: u64 = 10_000_000;
const COPY_BUFFER_SIZE: usize = 1024 * 1024;
/// MFT record number of the root directory (`.`)
const ROOT_DIRECTORY_RECORD: u64 = 5;

// =============================================================================
// Types
// =============================================================================

/// Opaque handle to a file or directory on the owning volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileRef(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    pub kind: EntryKind,
    /// Logical size for regular files, 0 otherwise
    pub size: u64,
    pub file_ref: FileRef,
}

impl DirectoryEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

// =============================================================================
// Read capability
// =============================================================================

pub trait VolumeReader {
    /// Short filesystem name for logs ("NTFS")
    fn fs_type(&self) -> &'static str;

    fn root(&self) -> FileRef;

    /// Entries of a directory, without `.`/`..` or DOS short-name aliases
    fn list_dir(&mut self, dir: FileRef) -> Result<Vec<DirectoryEntry>, String>;

    /// Stream a regular file's unnamed data into `sink`; returns bytes copied
    fn read_file(&mut self, file: FileRef, sink: &mut dyn Write) -> Result<u64, String>;

    /// Last modification time as Unix seconds, if the filesystem records one
    fn modified_time(&mut self, file: FileRef) -> Result<Option<i64>, String>;

    /// Case-insensitive lookup of one child by name
    fn find_child(&mut self, dir: FileRef, name: &str) -> Result<Option<DirectoryEntry>, String> {
        let lowered = name.to_lowercase();
        Ok(self.list_dir(dir)?
            .into_iter()
            .find(|entry| entry.name.to_lowercase() == lowered))
    }

    /// Resolve a `/`-separated path below `dir`, every component a directory
    fn find_dir_path(&mut self, dir: FileRef, path: &str) -> Result<Option<FileRef>, String> {
        let mut current = dir;
        for component in path.split('/').filter(|c| !c.is_empty()) {
            match self.find_child(current, component)? {
                Some(entry) if entry.is_dir() => current = entry.file_ref,
                _ => return Ok(None),
            }
        }
        Ok(Some(current))
    }
}

// =============================================================================
// NTFS implementation
// =============================================================================

pub struct NtfsVolume<R: Read + Seek> {
    ntfs: Ntfs,
    fs: BufReader<R>,
}

impl<R: Read + Seek> NtfsVolume<R> {
    /// Check `reader` for an NTFS boot sector and load the upcase table
    pub fn open(reader: R) -> Result<Self, String> {
        let mut fs = BufReader::new(reader);
        let mut ntfs = Ntfs::new(&mut fs).map_err(|e| format!("Not an NTFS volume: {}", e))?;
        ntfs.read_upcase_table(&mut fs)
            .map_err(|e| format!("Failed to read NTFS upcase table: {}", e))?;
        debug!(
            cluster_size = ntfs.cluster_size(),
            volume_size = ntfs.size(),
            "NTFS volume opened"
        );
        Ok(Self { ntfs, fs })
    }

    fn file(&mut self, file: FileRef) -> Result<NtfsFile<'_>, String> {
        self.ntfs.file(&mut self.fs, file.0)
            .map_err(|e| format!("Failed to read MFT record {}: {}", file.0, e))
    }
}

impl<R: Read + Seek> VolumeReader for NtfsVolume<R> {
    fn fs_type(&self) -> &'static str {
        "NTFS"
    }

    fn root(&self) -> FileRef {
        FileRef(ROOT_DIRECTORY_RECORD)
    }

    fn list_dir(&mut self, dir: FileRef) -> Result<Vec<DirectoryEntry>, String> {
        let directory = self.ntfs.file(&mut self.fs, dir.0)
            .map_err(|e| format!("Failed to read MFT record {}: {}", dir.0, e))?;
        let index = directory.directory_index(&mut self.fs)
            .map_err(|e| format!("MFT record {} has no directory index: {}", dir.0, e))?;

        let mut entries = Vec::new();
        let mut iter = index.entries();
        while let Some(entry) = iter.next(&mut self.fs) {
            let entry = entry.map_err(|e| format!("Bad index entry in record {}: {}", dir.0, e))?;
            let file_name = match entry.key() {
                Some(key) => key.map_err(|e| format!("Bad file name in record {}: {}", dir.0, e))?,
                None => continue,
            };
            if file_name.namespace() == NtfsFileNamespace::Dos {
                continue;
            }

            let name = file_name.name().to_string_lossy();
            if name == "." || name == ".." {
                continue;
            }
            let kind = if file_name.is_directory() { EntryKind::Directory } else { EntryKind::File };
            let size = if kind == EntryKind::File { file_name.data_size() } else { 0 };
            entries.push(DirectoryEntry {
                name,
                kind,
                size,
                file_ref: FileRef(entry.file_reference().file_record_number()),
            });
        }

        trace!(record = dir.0, entries = entries.len(), "Listed directory");
        Ok(entries)
    }

    fn find_child(&mut self, dir: FileRef, name: &str) -> Result<Option<DirectoryEntry>, String> {
        let directory = self.ntfs.file(&mut self.fs, dir.0)
            .map_err(|e| format!("Failed to read MFT record {}: {}", dir.0, e))?;
        let index = directory.directory_index(&mut self.fs)
            .map_err(|e| format!("MFT record {} has no directory index: {}", dir.0, e))?;
        let mut finder = index.finder();

        // NTFS index lookups are case-insensitive via the upcase table
        let entry = match NtfsFileNameIndex::find(&mut finder, &self.ntfs, &mut self.fs, name) {
            Some(entry) => entry.map_err(|e| format!("Lookup of {:?} failed: {}", name, e))?,
            None => return Ok(None),
        };
        let file_name = match entry.key() {
            Some(key) => key.map_err(|e| format!("Bad file name for {:?}: {}", name, e))?,
            None => return Ok(None),
        };
        let kind = if file_name.is_directory() { EntryKind::Directory } else { EntryKind::File };

        Ok(Some(DirectoryEntry {
            name: file_name.name().to_string_lossy(),
            kind,
            size: if kind == EntryKind::File { file_name.data_size() } else { 0 },
            file_ref: FileRef(entry.file_reference().file_record_number()),
        }))
    }

    fn read_file(&mut self, file: FileRef, sink: &mut dyn Write) -> Result<u64, String> {
        let ntfs_file = self.ntfs.file(&mut self.fs, file.0)
            .map_err(|e| format!("Failed to read MFT record {}: {}", file.0, e))?;
        let data_item = match ntfs_file.data(&mut self.fs, "") {
            Some(item) => item.map_err(|e| format!("Bad $DATA attribute in record {}: {}", file.0, e))?,
            None => return Err(format!("MFT record {} has no unnamed $DATA stream", file.0)),
        };
        let data_attribute = data_item.to_attribute()
            .map_err(|e| format!("Bad $DATA attribute in record {}: {}", file.0, e))?;
        let mut data_value = data_attribute.value(&mut self.fs)
            .map_err(|e| format!("Unreadable $DATA in record {}: {}", file.0, e))?;

        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        let mut copied = 0u64;
        loop {
            let n = data_value.read(&mut self.fs, &mut buf)
                .map_err(|e| format!("Read of record {} failed at {}: {}", file.0, copied, e))?;
            if n == 0 {
                break;
            }
            sink.write_all(&buf[..n])
                .map_err(|e| format!("Write failed after {} bytes: {}", copied, e))?;
            copied += n as u64;
        }
        Ok(copied)
    }

    fn modified_time(&mut self, file: FileRef) -> Result<Option<i64>, String> {
        let ntfs_file = self.file(file)?;
        let info = ntfs_file.info()
            .map_err(|e| format!("No $STANDARD_INFORMATION in record {}: {}", file.0, e))?;
        Ok(nt_time_to_unix(info.modification_time().nt_timestamp()))
    }
}

/// NT FILETIME ticks to Unix seconds; None for zero/pre-1970 stamps
pub fn nt_time_to_unix(nt_timestamp: u64) -> Option<i64> {
    if nt_timestamp < NT_UNIX_EPOCH {
        return None;
    }
    Some(((nt_timestamp - NT_UNIX_EPOCH) / NT_TICKS_PER_SECOND) as i64)
}
