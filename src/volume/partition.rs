//! Partition table discovery (MBR, extended EBR chains, GPT)
//!
//! Offsets are always in 512-byte sectors regardless of what the container
//! reports as its own sector size.

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::common::binary::{le_u32, le_u64, utf16le_to_string};
use crate::image::ImageRead;

pub const SECTOR_SIZE: u64 = 512;

const MBR_TABLE_OFFSET: usize = 446;
const MBR_ENTRY_SIZE: usize = 16;
const BOOT_SIGNATURE: [u8; 2] = [0x55, 0xAA];
const GPT_SIGNATURE: &[u8; 8] = b"EFI PART";
const NTFS_OEM_ID: &[u8; 8] = b"NTFS    ";
const GPT_PROTECTIVE: u8 = 0xEE;
/// Upper bound on EBR links followed, against looping chains
const MAX_LOGICAL_PARTITIONS: usize = 128;
const MAX_GPT_ENTRIES: u32 = 1024;
/// Largest entry size accepted from a GPT header
const MAX_GPT_ENTRY_SIZE: usize = 4096;
/// Largest entry array read in one go
const MAX_GPT_TABLE_BYTES: usize = 1024 * 1024;

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Mbr,
    Gpt,
    /// No table: the image is one filesystem starting at sector 0
    WholeVolume,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Partition {
    pub start_sector: u64,
    pub sector_count: u64,
    pub description: String,
    pub table: TableKind,
}

impl Partition {
    pub fn byte_offset(&self) -> u64 {
        self.start_sector.saturating_mul(SECTOR_SIZE)
    }

    pub fn byte_len(&self) -> u64 {
        self.sector_count.saturating_mul(SECTOR_SIZE)
    }
}

// =============================================================================
// Discovery
// =============================================================================

/// Enumerate the partitions of an image
///
/// Errors only when no table (and no bare filesystem) is recognisable.
pub fn read_partitions<I: ImageRead + ?Sized>(image: &mut I) -> Result<Vec<Partition>, String> {
    let mut sector0 = [0u8; SECTOR_SIZE as usize];
    image.read_exact_at(0, &mut sector0)
        .map_err(|e| format!("Unable to read sector 0: {}", e))?;

    // A volume image without a partition table starts with its boot sector
    if &sector0[3..11] == NTFS_OEM_ID {
        debug!("Sector 0 is an NTFS boot sector, treating image as one volume");
        return Ok(vec![Partition {
            start_sector: 0,
            sector_count: image.size() / SECTOR_SIZE,
            description: "NTFS volume (no partition table)".to_string(),
            table: TableKind::WholeVolume,
        }]);
    }

    if sector0[510..512] != BOOT_SIGNATURE {
        return Err("No partition table signature in sector 0".to_string());
    }

    let primary = mbr_entries(&sector0)?;
    if primary.iter().any(|e| e.type_code == GPT_PROTECTIVE) {
        return read_gpt(image);
    }

    let mut partitions = Vec::new();
    for entry in primary {
        if is_extended(entry.type_code) {
            partitions.extend(read_ebr_chain(image, entry.start_lba as u64));
        } else {
            partitions.push(entry.into_partition(0));
        }
    }

    debug!(count = partitions.len(), "MBR partitions");
    Ok(partitions)
}

// =============================================================================
// MBR / EBR
// =============================================================================

struct MbrEntry {
    type_code: u8,
    start_lba: u32,
    sector_count: u32,
}

impl MbrEntry {
    fn into_partition(self, base: u64) -> Partition {
        Partition {
            start_sector: base.saturating_add(self.start_lba as u64),
            sector_count: self.sector_count as u64,
            description: mbr_type_description(self.type_code),
            table: TableKind::Mbr,
        }
    }
}

/// Non-empty entries of the four-slot table in an MBR or EBR sector
fn mbr_entries(sector: &[u8]) -> Result<Vec<MbrEntry>, String> {
    let mut entries = Vec::new();
    for slot in 0..4 {
        let at = MBR_TABLE_OFFSET + slot * MBR_ENTRY_SIZE;
        let type_code = sector[at + 4];
        let start_lba = le_u32(sector, at + 8)?;
        let sector_count = le_u32(sector, at + 12)?;
        if type_code == 0 || sector_count == 0 {
            continue;
        }
        trace!(slot, type_code, start_lba, sector_count, "Partition entry");
        entries.push(MbrEntry { type_code, start_lba, sector_count });
    }
    Ok(entries)
}

fn is_extended(type_code: u8) -> bool {
    matches!(type_code, 0x05 | 0x0F | 0x85)
}

/// Follow the logical-partition chain inside an extended partition
///
/// Logical entries are relative to their own EBR; link entries are relative
/// to the start of the extended partition. A broken link ends the chain.
fn read_ebr_chain<I: ImageRead + ?Sized>(image: &mut I, extended_start: u64) -> Vec<Partition> {
    let mut partitions = Vec::new();
    let mut ebr_sector = extended_start;
    let mut sector = [0u8; SECTOR_SIZE as usize];

    for _ in 0..MAX_LOGICAL_PARTITIONS {
        let Some(offset) = ebr_sector.checked_mul(SECTOR_SIZE) else {
            warn!(ebr_sector, "Extended boot record beyond addressable range");
            break;
        };
        if let Err(e) = image.read_exact_at(offset, &mut sector) {
            warn!(ebr_sector, error = %e, "Unable to read extended boot record");
            break;
        }
        if sector[510..512] != BOOT_SIGNATURE {
            warn!(ebr_sector, "Extended boot record without signature");
            break;
        }
        let entries = match mbr_entries(&sector) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(ebr_sector, error = %e, "Malformed extended boot record");
                break;
            }
        };

        let mut next = None;
        for entry in entries {
            if is_extended(entry.type_code) {
                next = extended_start.checked_add(entry.start_lba as u64);
            } else {
                partitions.push(entry.into_partition(ebr_sector));
            }
        }

        match next {
            Some(n) if n > ebr_sector => ebr_sector = n,
            _ => break,
        }
    }
    partitions
}

/// Type names the way forensic volume tools print them
fn mbr_type_description(type_code: u8) -> String {
    let name = match type_code {
        0x01 => "DOS FAT12",
        0x04 | 0x06 => "DOS FAT16",
        0x07 => "NTFS / exFAT",
        0x0B | 0x0C => "Win95 FAT32",
        0x0E => "Win95 FAT16",
        0x12 => "Hibernation",
        0x17 => "Hidden NTFS",
        0x27 => "Windows RE",
        0x42 => "Windows Dynamic Disk",
        0x82 => "Linux Swap / Solaris x86",
        0x83 => "Linux",
        0x8E => "Linux Logical Volume Manager",
        0xA5 => "FreeBSD",
        0xAF => "HFS+",
        0xEF => "EFI System",
        _ => "Unknown Type",
    };
    format!("{} (0x{:02x})", name, type_code)
}

// =============================================================================
// GPT
// =============================================================================

fn read_gpt<I: ImageRead + ?Sized>(image: &mut I) -> Result<Vec<Partition>, String> {
    let mut header = [0u8; SECTOR_SIZE as usize];
    image.read_exact_at(SECTOR_SIZE, &mut header)
        .map_err(|e| format!("Unable to read GPT header: {}", e))?;
    if &header[0..8] != GPT_SIGNATURE {
        return Err("Protective MBR without GPT header".to_string());
    }

    let entries_lba = le_u64(&header, 72)?;
    let entry_count = le_u32(&header, 80)?.min(MAX_GPT_ENTRIES) as usize;
    let entry_size = le_u32(&header, 84)? as usize;
    if !(128..=MAX_GPT_ENTRY_SIZE).contains(&entry_size) {
        return Err(format!("Invalid GPT entry size {}", entry_size));
    }
    let table_len = entry_count
        .checked_mul(entry_size)
        .filter(|&len| len <= MAX_GPT_TABLE_BYTES)
        .ok_or_else(|| format!("GPT entry array too large ({} x {})", entry_count, entry_size))?;
    let table_offset = entries_lba
        .checked_mul(SECTOR_SIZE)
        .ok_or_else(|| format!("GPT entry array LBA {} out of range", entries_lba))?;

    let mut table = vec![0u8; table_len];
    image.read_exact_at(table_offset, &mut table)
        .map_err(|e| format!("Unable to read GPT entries: {}", e))?;

    let total_sectors = image.size() / SECTOR_SIZE;
    let mut partitions = Vec::new();
    for entry in table.chunks_exact(entry_size) {
        if entry[0..16].iter().all(|&b| b == 0) {
            continue;
        }
        let first_lba = le_u64(entry, 32)?;
        let last_lba = le_u64(entry, 40)?;
        if last_lba < first_lba || first_lba >= total_sectors {
            trace!(first_lba, last_lba, total_sectors, "Skipping GPT entry outside the image");
            continue;
        }
        let name = utf16le_to_string(&entry[56..128]);
        partitions.push(Partition {
            start_sector: first_lba,
            sector_count: last_lba.min(total_sectors - 1) - first_lba + 1,
            description: if name.is_empty() { "GPT partition".to_string() } else { name },
            table: TableKind::Gpt,
        });
    }

    debug!(count = partitions.len(), "GPT partitions");
    Ok(partitions)
}
