//! Image Access Layer
//!
//! One uniform positional-read interface over the two container kinds the
//! tool accepts: segmented EWF (`.E01` sets) and flat raw images. Which one
//! is used is decided purely by the file extension.

pub mod ewf;
pub mod raw;

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

use crate::common::audit;

pub use ewf::EwfHandle;
pub use raw::RawHandle;

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    NotFound(String),
    UnsupportedFormat(String),
    Corrupt(String),
}

impl fmt::Display for ImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageError::NotFound(msg) => write!(f, "Image not found: {}", msg),
            ImageError::UnsupportedFormat(msg) => write!(f, "Unsupported image format: {}", msg),
            ImageError::Corrupt(msg) => write!(f, "Corrupt image: {}", msg),
        }
    }
}

impl std::error::Error for ImageError {}

// =============================================================================
// Positional read capability
// =============================================================================

/// Byte-addressable media: what partition parsing and the filesystem adapter need
pub trait ImageRead {
    /// Read up to `buf.len()` bytes at `offset`; short only at end of media
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, String>;

    fn size(&self) -> u64;

    /// Fill `buf` completely or fail
    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), String> {
        let n = self.read_at(offset, buf)?;
        if n < buf.len() {
            return Err(format!(
                "Unexpected end of image at offset {} ({} of {} bytes)",
                offset, n, buf.len()
            ));
        }
        Ok(())
    }
}

/// In-memory media, used by tests and small fixtures
impl ImageRead for Vec<u8> {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, String> {
        if offset >= self.len() as u64 {
            return Ok(0);
        }
        let start = offset as usize;
        let n = buf.len().min(self.len() - start);
        buf[..n].copy_from_slice(&self[start..start + n]);
        Ok(n)
    }

    fn size(&self) -> u64 {
        self.len() as u64
    }
}

// =============================================================================
// Image Handle
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    /// EWF segment set (.E01, .E02, ...)
    Segmented,
    /// Flat or numbered-split raw image
    Raw,
}

impl ImageKind {
    /// Choose the container kind from the extension alone (case-insensitive `.e01`)
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("e01") => ImageKind::Segmented,
            _ => ImageKind::Raw,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ImageKind::Segmented => "E01",
            ImageKind::Raw => "raw",
        }
    }
}

/// One open evidence image
///
/// `close` consumes the handle; dropping it without closing also releases
/// every segment file.
pub enum ImageHandle {
    Ewf(EwfHandle),
    Raw(RawHandle),
}

impl ImageHandle {
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self, ImageError> {
        if !path.is_file() {
            return Err(ImageError::NotFound(path.display().to_string()));
        }

        let kind = ImageKind::from_path(path);
        let handle = match kind {
            ImageKind::Segmented => ImageHandle::Ewf(EwfHandle::open(path)?),
            ImageKind::Raw => ImageHandle::Raw(RawHandle::open(path)?),
        };

        audit::log_image_opened(path, kind.name(), handle.segment_paths().len(), handle.size());
        Ok(handle)
    }

    pub fn kind(&self) -> ImageKind {
        match self {
            ImageHandle::Ewf(_) => ImageKind::Segmented,
            ImageHandle::Raw(_) => ImageKind::Raw,
        }
    }

    /// Files backing this image, in stream order
    pub fn segment_paths(&self) -> &[PathBuf] {
        match self {
            ImageHandle::Ewf(h) => h.segment_paths(),
            ImageHandle::Raw(h) => h.segment_paths(),
        }
    }

    pub fn close(self) {
        debug!(kind = self.kind().name(), "Closing image");
        match self {
            ImageHandle::Ewf(mut h) => h.close(),
            ImageHandle::Raw(mut h) => h.close(),
        }
    }
}

impl ImageRead for ImageHandle {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, String> {
        match self {
            ImageHandle::Ewf(h) => h.read_at(offset, buf),
            ImageHandle::Raw(h) => h.read_at(offset, buf),
        }
    }

    fn size(&self) -> u64 {
        match self {
            ImageHandle::Ewf(h) => h.media_size(),
            ImageHandle::Raw(h) => h.total_size(),
        }
    }
}

// =============================================================================
// Partition window as Read + Seek
// =============================================================================

/// Exposes `[base, base + len)` of an image as a seekable stream
pub struct PartitionReader<'a, I: ImageRead + ?Sized> {
    image: &'a mut I,
    base: u64,
    len: u64,
    position: u64,
}

impl<'a, I: ImageRead + ?Sized> PartitionReader<'a, I> {
    /// Window from `base` to the end of the image, or `len` bytes if given
    pub fn new(image: &'a mut I, base: u64, len: Option<u64>) -> Self {
        let available = image.size().saturating_sub(base);
        let len = len.map_or(available, |l| l.min(available));
        Self { image, base, len, position: 0 }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<I: ImageRead + ?Sized> Read for PartitionReader<'_, I> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.position >= self.len {
            return Ok(0);
        }
        let remaining = (self.len - self.position).min(buf.len() as u64) as usize;
        let n = self.image
            .read_at(self.base + self.position, &mut buf[..remaining])
            .map_err(io::Error::other)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl<I: ImageRead + ?Sized> Seek for PartitionReader<'_, I> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };
        match target {
            Some(offset) => {
                self.position = offset;
                Ok(offset)
            }
            None => Err(io::Error::new(io::ErrorKind::InvalidInput, "seek before start of partition")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_kind_by_extension() {
        assert_eq!(ImageKind::from_path(Path::new("case/disk.E01")), ImageKind::Segmented);
        assert_eq!(ImageKind::from_path(Path::new("disk.e01")), ImageKind::Segmented);
        assert_eq!(ImageKind::from_path(Path::new("disk.E02")), ImageKind::Raw);
        assert_eq!(ImageKind::from_path(Path::new("disk.dd")), ImageKind::Raw);
        assert_eq!(ImageKind::from_path(Path::new("disk")), ImageKind::Raw);
    }

    #[test]
    fn test_open_missing_and_garbage() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            ImageHandle::open(&dir.path().join("none.E01")),
            Err(ImageError::NotFound(_))
        ));

        let fake = dir.path().join("fake.e01");
        std::fs::write(&fake, vec![0u8; 4096]).unwrap();
        assert!(matches!(ImageHandle::open(&fake), Err(ImageError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_segmented_and_raw_read_the_same_bytes() {
        let dir = TempDir::new().unwrap();
        let (e01, raw_bytes) = ewf::write_e01_set(dir.path(), "disk", 6, true);
        let raw_path = dir.path().join("disk.dd");
        std::fs::write(&raw_path, &raw_bytes).unwrap();

        let mut segmented = ImageHandle::open(&e01).unwrap();
        let mut flat = ImageHandle::open(&raw_path).unwrap();
        assert_eq!(segmented.kind(), ImageKind::Segmented);
        assert_eq!(segmented.size(), flat.size());

        let mut a = vec![0u8; 1500];
        let mut b = vec![0u8; 1500];
        segmented.read_exact_at(333, &mut a).unwrap();
        flat.read_exact_at(333, &mut b).unwrap();
        assert_eq!(a, b);

        let mut past = [0u8; 4];
        assert_eq!(segmented.read_at(segmented.size(), &mut past).unwrap(), 0);
        segmented.close();
        flat.close();
    }

    #[test]
    fn test_partition_reader_window() {
        let mut media: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let mut reader = PartitionReader::new(&mut media, 1024, Some(512));
        assert_eq!(reader.len(), 512);

        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [0, 1, 2, 3]);

        reader.seek(SeekFrom::End(-2)).unwrap();
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, vec![254, 255]);

        assert!(reader.seek(SeekFrom::Current(-1000)).is_err());
    }
}
