// RAW disk image reader (.dd, .raw, .img, .001, .002, etc.)
// Single and multi-segment flat images share one positional read path.

use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::common::{
    FileIoPool,
    io_pool::DEFAULT_MAX_OPEN_FILES,
    segments::{discover_raw_segments, segment_sizes},
};
use crate::image::ImageError;

// =============================================================================
// Raw Image Handle
// =============================================================================

pub struct RawHandle {
    file_pool: FileIoPool,
    segment_sizes: Vec<u64>,
    total_size: u64,
}

impl RawHandle {
    /// Open a raw image (single or multi-segment)
    pub fn open(path: &Path) -> Result<Self, ImageError> {
        let segments = discover_raw_segments(path).map_err(ImageError::NotFound)?;
        let segment_sizes = segment_sizes(&segments).map_err(ImageError::NotFound)?;
        let total_size: u64 = segment_sizes.iter().sum();

        debug!(segments = segments.len(), total_size, "Opened raw image");

        Ok(RawHandle {
            file_pool: FileIoPool::new(segments, DEFAULT_MAX_OPEN_FILES),
            segment_sizes,
            total_size,
        })
    }

    /// Get total size of all segments
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn segment_paths(&self) -> &[PathBuf] {
        self.file_pool.paths()
    }

    /// Read bytes at `offset`, crossing segment boundaries as needed
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, String> {
        let mut total_read = 0;
        let mut position = offset;

        while total_read < buf.len() && position < self.total_size {
            let (seg_idx, seg_offset) = self.position_to_segment(position);
            let seg_remaining = self.segment_sizes[seg_idx] - seg_offset;
            let to_read = (buf.len() - total_read).min(seg_remaining as usize);

            let file = self.file_pool.get_file(seg_idx)?;
            file.seek(SeekFrom::Start(seg_offset))
                .map_err(|e| format!("Seek failed: {}", e))?;
            let bytes_read = file.read(&mut buf[total_read..total_read + to_read])
                .map_err(|e| format!("Read failed: {}", e))?;

            if bytes_read == 0 {
                break;
            }
            total_read += bytes_read;
            position += bytes_read as u64;
        }

        Ok(total_read)
    }

    /// Convert absolute position to (segment_index, offset_within_segment)
    fn position_to_segment(&self, pos: u64) -> (usize, u64) {
        let mut offset = pos;
        for (idx, &size) in self.segment_sizes.iter().enumerate() {
            if offset < size {
                return (idx, offset);
            }
            offset -= size;
        }
        let last = self.segment_sizes.len().saturating_sub(1);
        (last, self.segment_sizes.get(last).copied().unwrap_or(0))
    }

    pub fn close(&mut self) {
        self.file_pool.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_across_numbered_segments() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("disk.001"), [1u8; 10]).unwrap();
        std::fs::write(dir.path().join("disk.002"), [2u8; 10]).unwrap();
        std::fs::write(dir.path().join("disk.003"), [3u8; 5]).unwrap();

        let mut handle = RawHandle::open(&dir.path().join("disk.001")).unwrap();
        assert_eq!(handle.total_size(), 25);
        assert_eq!(handle.segment_paths().len(), 3);

        let mut buf = [0u8; 12];
        assert_eq!(handle.read_at(8, &mut buf).unwrap(), 12);
        assert_eq!(buf, [1, 1, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2]);

        let mut tail = [0u8; 8];
        assert_eq!(handle.read_at(22, &mut tail).unwrap(), 3);
        assert_eq!(&tail[..3], &[3, 3, 3]);
    }

    #[test]
    fn test_missing_image() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            RawHandle::open(&dir.path().join("nothing.dd")),
            Err(ImageError::NotFound(_))
        ));
    }
}
