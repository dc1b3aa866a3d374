//! EwfHandle - random access over an E01 segment set (like libewf_handle)

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use flate2::read::ZlibDecoder;
use tracing::{debug, trace, warn};

use crate::common::{
    FileIoPool,
    binary::{bytes_to_string, read_u32_le, read_u64_le},
    segments::discover_e01_segments,
};
use crate::image::ImageError;

use super::cache::ChunkCache;
use super::types::*;

// =============================================================================
// EWF Handle - Main Interface
// =============================================================================

pub struct EwfHandle {
    /// File I/O pool managing all segment files
    file_pool: FileIoPool,
    /// Validated sizes from the first volume section
    geometry: MediaGeometry,
    /// Global chunk table: chunk_index -> storage location
    chunk_table: Vec<ChunkLocation>,
    chunk_cache: ChunkCache,
    /// Digests recorded by the acquisition tool
    stored_hashes: Vec<StoredImageHash>,
}

impl EwfHandle {
    /// Open an E01 set from its first segment (like libewf_glob + libewf_handle_open)
    pub fn open(path: &Path) -> Result<Self, ImageError> {
        let segment_paths = discover_e01_segments(path).map_err(ImageError::NotFound)?;
        check_signature(&segment_paths[0])?;

        let mut file_pool = FileIoPool::new(segment_paths, MAX_OPEN_FILES);
        let (volume, chunk_table, stored_hashes) =
            Self::walk_segments(&mut file_pool).map_err(ImageError::Corrupt)?;

        let volume = volume.ok_or_else(|| {
            ImageError::Corrupt(format!("No volume section in {}", path.display()))
        })?;
        let geometry = volume.geometry()
            .map_err(|e| ImageError::Corrupt(format!("{}: {}", path.display(), e)))?;

        debug!(
            segments = file_pool.file_count(),
            chunks = chunk_table.len(),
            media_size = geometry.media_size,
            "Opened EWF image"
        );
        for stored in &stored_hashes {
            debug!(algorithm = stored.algorithm, hash = %stored.hash, "Container reports stored digest");
        }

        Ok(Self {
            file_pool,
            geometry,
            chunk_table,
            chunk_cache: ChunkCache::new(CHUNK_CACHE_ENTRIES),
            stored_hashes,
        })
    }

    /// Follow each segment's section chain, collecting geometry and chunk offsets
    ///
    /// A `next` section hands over to the following segment file; a `done`
    /// section ends the set. A `next` with no following file means a segment
    /// is missing, which fails the open.
    #[allow(clippy::type_complexity)]
    fn walk_segments(
        file_pool: &mut FileIoPool,
    ) -> Result<(Option<VolumeSection>, Vec<ChunkLocation>, Vec<StoredImageHash>), String> {
        let mut volume: Option<VolumeSection> = None;
        let mut chunk_table = Vec::new();
        let mut stored_hashes = Vec::new();

        let segment_count = file_pool.file_count();
        let mut segment_index = 0usize;

        'segments: loop {
            let file = file_pool.get_file(segment_index)?;
            let segment_size = file.metadata()
                .map_err(|e| format!("Failed to get metadata: {}", e))?
                .len();

            let mut offset = FILE_HEADER_SIZE;
            let mut sections_seen = 0u32;

            loop {
                if sections_seen >= MAX_SECTIONS_PER_SEGMENT {
                    return Err(format!("Segment {} has a runaway section chain", segment_index + 1));
                }
                sections_seen += 1;

                if offset + SECTION_DESCRIPTOR_SIZE > segment_size {
                    trace!(segment_index, offset, "Section chain runs past end of segment");
                    break 'segments;
                }

                let file = file_pool.get_file(segment_index)?;
                let descriptor = read_section_descriptor(file, offset)?;
                let data_offset = offset + SECTION_DESCRIPTOR_SIZE;
                trace!(segment_index, offset, section = %descriptor.section_type, "Section");

                match descriptor.section_type.as_str() {
                    "volume" | "disk" => {
                        if volume.is_none() {
                            volume = Some(read_volume_section(file, data_offset)?);
                        }
                    }
                    "table" => {
                        let entries = read_table_section(file, data_offset, descriptor.size, segment_size)?;
                        trace!(segment_index, entries = entries.len(), "Table section");
                        chunk_table.extend(entries.into_iter().map(|(chunk_offset, compressed)| {
                            ChunkLocation { segment_index, offset: chunk_offset, compressed }
                        }));
                    }
                    "hash" => {
                        stored_hashes.extend(read_digests(file, data_offset, false));
                    }
                    "digest" => {
                        stored_hashes.extend(read_digests(file, data_offset, true));
                    }
                    "next" => {
                        if segment_index + 1 >= segment_count {
                            return Err(format!(
                                "Segment {} is missing (set ends after {} segment file(s))",
                                segment_index + 2,
                                segment_count
                            ));
                        }
                        segment_index += 1;
                        continue 'segments;
                    }
                    "done" => break 'segments,
                    // table2 mirrors table; header/sectors/error2/session carry nothing we need
                    _ => {}
                }

                if descriptor.next_offset <= offset {
                    trace!(segment_index, offset, "Section chain ended without done marker");
                    break 'segments;
                }
                offset = descriptor.next_offset;
            }
        }

        Ok((volume, chunk_table, stored_hashes))
    }

    /// Read a decompressed chunk by global index
    fn read_chunk(&mut self, chunk_index: usize) -> Result<Arc<Vec<u8>>, String> {
        if let Some(cached) = self.chunk_cache.get(chunk_index) {
            return Ok(cached);
        }

        let chunk_size = self.geometry.chunk_size;
        let expected_len = self.chunk_len(chunk_index);

        let location = match self.chunk_table.get(chunk_index) {
            Some(loc) => loc.clone(),
            None => {
                // Acquisition was interrupted before this chunk's table was written
                warn!(chunk_index, "Chunk missing from table, substituting zeros");
                return Ok(Arc::new(vec![0u8; expected_len]));
            }
        };

        let file = self.file_pool.get_file(location.segment_index)?;
        file.seek(SeekFrom::Start(location.offset))
            .map_err(|e| format!("Seek to chunk {} at offset {} failed: {}", chunk_index, location.offset, e))?;

        let mut chunk_data = if location.compressed {
            let limited = std::io::BufReader::with_capacity(65536, file.take(chunk_size * 2));
            let mut decoder = ZlibDecoder::new(limited);
            let mut decompressed = Vec::with_capacity(expected_len);
            decoder.read_to_end(&mut decompressed)
                .map_err(|e| format!("Chunk {} decompression failed at offset {}: {}", chunk_index, location.offset, e))?;
            decompressed
        } else {
            let mut raw = Vec::with_capacity(expected_len);
            file.take(chunk_size).read_to_end(&mut raw)
                .map_err(|e| format!("Read of chunk {} failed: {}", chunk_index, e))?;
            raw
        };

        if chunk_data.len() < expected_len {
            return Err(format!(
                "Chunk {} is short: {} of {} bytes",
                chunk_index,
                chunk_data.len(),
                expected_len
            ));
        }
        chunk_data.truncate(expected_len);

        let chunk = Arc::new(chunk_data);
        self.chunk_cache.insert(chunk_index, Arc::clone(&chunk));
        Ok(chunk)
    }

    /// Logical length of a chunk (the last one may be partial)
    fn chunk_len(&self, chunk_index: usize) -> usize {
        let chunk_size = self.geometry.chunk_size;
        let start = (chunk_index as u64).saturating_mul(chunk_size);
        self.geometry.media_size.saturating_sub(start).min(chunk_size) as usize
    }

    /// Read bytes at `offset` into `buf`; short only at end of media
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, String> {
        let MediaGeometry { chunk_size, media_size } = self.geometry;
        let mut total = 0usize;
        let mut position = offset;

        while total < buf.len() && position < media_size {
            let chunk_index = (position / chunk_size) as usize;
            let within = (position % chunk_size) as usize;
            let chunk = self.read_chunk(chunk_index)?;

            if within >= chunk.len() {
                break;
            }
            let n = (buf.len() - total).min(chunk.len() - within);
            buf[total..total + n].copy_from_slice(&chunk[within..within + n]);
            total += n;
            position += n as u64;
        }

        Ok(total)
    }

    /// Total decoded media size in bytes
    pub fn media_size(&self) -> u64 {
        self.geometry.media_size
    }

    pub fn stored_hashes(&self) -> &[StoredImageHash] {
        &self.stored_hashes
    }

    pub fn segment_paths(&self) -> &[PathBuf] {
        self.file_pool.paths()
    }

    /// Release every segment handle and cached chunk
    pub fn close(&mut self) {
        self.chunk_cache.clear();
        self.file_pool.close_all();
    }
}

// =============================================================================
// Section Reading Helpers
// =============================================================================

fn check_signature(first_segment: &Path) -> Result<(), ImageError> {
    let mut file = File::open(first_segment)
        .map_err(|e| ImageError::NotFound(format!("{}: {}", first_segment.display(), e)))?;
    let mut signature = [0u8; 8];
    file.read_exact(&mut signature)
        .map_err(|_| ImageError::Corrupt(format!("{} is too short for an EWF header", first_segment.display())))?;

    if &signature == EWF_SIGNATURE {
        Ok(())
    } else if &signature == EWF2_SIGNATURE {
        Err(ImageError::UnsupportedFormat(format!("{} is EWF2 (Ex01)", first_segment.display())))
    } else if &signature == LVF_SIGNATURE {
        Err(ImageError::UnsupportedFormat(format!("{} is logical evidence (L01)", first_segment.display())))
    } else {
        Err(ImageError::UnsupportedFormat(format!("{} has no EWF signature", first_segment.display())))
    }
}

fn read_section_descriptor(file: &mut File, offset: u64) -> Result<SectionDescriptor, String> {
    file.seek(SeekFrom::Start(offset))
        .map_err(|e| format!("Seek failed: {}", e))?;

    let mut section_type = [0u8; 16];
    file.read_exact(&mut section_type)
        .map_err(|e| format!("Read section type failed: {}", e))?;

    let next_offset = read_u64_le(file)?;
    let size = read_u64_le(file)?;

    Ok(SectionDescriptor {
        section_type: bytes_to_string(&section_type),
        next_offset,
        size,
    })
}

fn read_volume_section(file: &mut File, offset: u64) -> Result<VolumeSection, String> {
    file.seek(SeekFrom::Start(offset))
        .map_err(|e| format!("Seek failed: {}", e))?;

    let _media_type_and_padding = read_u32_le(file)?;
    let chunk_count = read_u32_le(file)?;
    let sectors_per_chunk = read_u32_le(file)?;
    let bytes_per_sector = read_u32_le(file)?;
    let sector_count = read_u64_le(file)?;

    trace!(chunk_count, sectors_per_chunk, bytes_per_sector, sector_count, "Volume section");

    Ok(VolumeSection {
        chunk_count,
        sectors_per_chunk,
        bytes_per_sector,
        sector_count,
    })
}

/// Returns (segment-local chunk offset, compressed) per table entry
///
/// The entry count must fit both in the declared section and in what is left
/// of the segment file.
fn read_table_section(
    file: &mut File,
    offset: u64,
    section_size: u64,
    segment_size: u64,
) -> Result<Vec<(u64, bool)>, String> {
    file.seek(SeekFrom::Start(offset))
        .map_err(|e| format!("Seek failed: {}", e))?;

    let mut header = [0u8; TABLE_HEADER_SIZE as usize];
    file.read_exact(&mut header)
        .map_err(|e| format!("Read table header failed: {}", e))?;

    let entry_count = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let mut base = [0u8; 8];
    base.copy_from_slice(&header[8..16]);
    let base_offset = u64::from_le_bytes(base);

    let in_section = section_size.saturating_sub(SECTION_DESCRIPTOR_SIZE + TABLE_HEADER_SIZE) / 4;
    let in_segment = segment_size.saturating_sub(offset.saturating_add(TABLE_HEADER_SIZE)) / 4;

    // Older writers leave the count zero; derive it from the section size
    let entry_count = if entry_count > 0 {
        entry_count as u64
    } else {
        in_section.saturating_sub(1)
    };
    // A section size too small to hold the header is not a usable bound
    let capacity = if in_section > 0 { in_section.min(in_segment) } else { in_segment };
    if entry_count > capacity {
        return Err(format!(
            "Table section at offset {} declares {} entries but only {} fit",
            offset, entry_count, capacity
        ));
    }

    let mut entries = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        let raw = read_u32_le(file)?;
        let compressed = raw & COMPRESSED_FLAG != 0;
        let chunk_offset = base_offset
            .checked_add((raw & !COMPRESSED_FLAG) as u64)
            .ok_or_else(|| format!("Table section at offset {} has an out-of-range base", offset))?;
        entries.push((chunk_offset, compressed));
    }
    Ok(entries)
}

/// MD5 (hash and digest sections) and SHA-1 (digest section only)
fn read_digests(file: &mut File, offset: u64, with_sha1: bool) -> Vec<StoredImageHash> {
    let mut hashes = Vec::new();
    if file.seek(SeekFrom::Start(offset)).is_err() {
        return hashes;
    }

    let mut md5 = [0u8; 16];
    if file.read_exact(&mut md5).is_ok() && md5.iter().any(|&b| b != 0) {
        hashes.push(StoredImageHash { algorithm: "MD5", hash: hex::encode(md5) });
    }
    if with_sha1 {
        let mut sha1 = [0u8; 20];
        if file.read_exact(&mut sha1).is_ok() && sha1.iter().any(|&b| b != 0) {
            hashes.push(StoredImageHash { algorithm: "SHA1", hash: hex::encode(sha1) });
        }
    }
    hashes
}
