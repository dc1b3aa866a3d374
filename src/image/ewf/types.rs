//! Type definitions for EWF (E01) container decoding

// =============================================================================
// Core Constants
// =============================================================================

pub(crate) const EWF_SIGNATURE: &[u8; 8] = b"EVF\x09\x0d\x0a\xff\x00";
pub(crate) const EWF2_SIGNATURE: &[u8; 8] = b"EVF2\x0d\x0a\x81\x00";
pub(crate) const LVF_SIGNATURE: &[u8; 8] = b"LVF\x09\x0d\x0a\xff\x00";

/// Size of the per-segment file header (signature, fields start, segment number, fields end)
pub(crate) const FILE_HEADER_SIZE: u64 = 13;
/// Size of a section descriptor (type, next offset, size, padding, checksum)
pub(crate) const SECTION_DESCRIPTOR_SIZE: u64 = 76;
/// Size of the table section header preceding the offset entries
pub(crate) const TABLE_HEADER_SIZE: u64 = 24;

pub(crate) const MAX_OPEN_FILES: usize = 16; // Like libewf's rlimit handling
pub(crate) const CHUNK_CACHE_ENTRIES: usize = 256;
pub(crate) const MAX_SECTIONS_PER_SEGMENT: u32 = 10_000;
/// Largest chunk accepted from a volume section (EnCase tops out at 32768 sectors)
pub(crate) const MAX_CHUNK_SIZE: u64 = 32 * 1024 * 1024;

/// High bit of a table entry marks a zlib-compressed chunk
pub(crate) const COMPRESSED_FLAG: u32 = 0x8000_0000;

// =============================================================================
// Section Descriptors - EWF Format Structures
// =============================================================================

#[derive(Clone, Debug)]
pub(crate) struct SectionDescriptor {
    pub section_type: String,
    /// Segment-local offset of the following section
    pub next_offset: u64,
    pub size: u64,
}

/// Media geometry from the `volume`/`disk` section
#[derive(Clone, Debug)]
pub struct VolumeSection {
    pub chunk_count: u32,
    pub sectors_per_chunk: u32,
    pub bytes_per_sector: u32,
    pub sector_count: u64,
}

/// Byte sizes derived from a `VolumeSection` that passed validation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MediaGeometry {
    pub chunk_size: u64,
    pub media_size: u64,
}

impl VolumeSection {
    pub fn geometry(&self) -> Result<MediaGeometry, String> {
        let chunk_size = (self.sectors_per_chunk as u64)
            .checked_mul(self.bytes_per_sector as u64)
            .unwrap_or(u64::MAX);
        if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
            return Err(format!(
                "Unusable chunk geometry: {} sectors of {} bytes",
                self.sectors_per_chunk, self.bytes_per_sector
            ));
        }
        let media_size = self.sector_count
            .checked_mul(self.bytes_per_sector as u64)
            .ok_or_else(|| format!("Media size overflows: {} sectors of {} bytes", self.sector_count, self.bytes_per_sector))?;
        Ok(MediaGeometry { chunk_size, media_size })
    }
}

// =============================================================================
// Chunk Location - Maps chunks to their storage location
// =============================================================================

#[derive(Clone, Debug)]
pub(crate) struct ChunkLocation {
    /// Index of the segment file holding the chunk
    pub segment_index: usize,
    /// Segment-local byte offset of the chunk data
    pub offset: u64,
    pub compressed: bool,
}

/// Digest recorded by the acquisition tool inside the container
#[derive(Clone, Debug)]
pub struct StoredImageHash {
    pub algorithm: &'static str,
    pub hash: String,
}
