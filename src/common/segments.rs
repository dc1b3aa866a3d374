// Shared segment discovery for split forensic images
//
// Handles the two split layouts the image layer accepts:
// - E01 segments: .E01 ... .E99, then .EAA, .EAB, ... (libewf naming)
// - Numbered raw segments: .001, .002, .003, etc.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Upper bound on segment numbers tried for either layout
const MAX_SEGMENTS: u32 = 999;

// =============================================================================
// E01 Segment Discovery
// =============================================================================

/// Extension for EWF segment `number` (1-based), in the case of `template`
///
/// 1..=99 map to E01..E99; from 100 the last two characters become letters
/// (EAA, EAB, ..., EZZ, FAA, ...).
pub fn e01_segment_extension(number: u32, template: &str) -> String {
    let ext = if number <= 99 {
        format!("E{:02}", number)
    } else {
        let index = number - 100;
        let first = (b'E' + (index / 676) as u8) as char;
        let second = (b'A' + ((index / 26) % 26) as u8) as char;
        let third = (b'A' + (index % 26) as u8) as char;
        format!("{}{}{}", first, second, third)
    };

    if template.chars().next().map(|c| c.is_ascii_lowercase()).unwrap_or(false) {
        ext.to_lowercase()
    } else {
        ext
    }
}

/// Discover every segment of an E01 set given the first segment's path
///
/// Stops at the first missing number; whether that was the real end of the
/// set is decided later by the section chain of the container itself.
pub fn discover_e01_segments(first_segment: &Path) -> Result<Vec<PathBuf>, String> {
    debug!(path = %first_segment.display(), "Discovering E01 segments");
    if !first_segment.is_file() {
        return Err(format!("File not found: {}", first_segment.display()));
    }

    let parent = first_segment.parent().unwrap_or(Path::new("."));
    let stem = first_segment.file_stem()
        .ok_or("No filename")?
        .to_string_lossy()
        .to_string();
    let template = first_segment.extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut paths = vec![first_segment.to_path_buf()];

    for number in 2..=MAX_SEGMENTS {
        let ext = e01_segment_extension(number, &template);
        let candidate = parent.join(format!("{}.{}", stem, ext));
        if candidate.is_file() {
            trace!(segment = number, path = %candidate.display(), "Found E01 segment");
            paths.push(candidate);
            continue;
        }

        // Sets copied between filesystems sometimes flip extension case
        let flipped = if ext.chars().any(|c| c.is_ascii_lowercase()) {
            ext.to_uppercase()
        } else {
            ext.to_lowercase()
        };
        let candidate = parent.join(format!("{}.{}", stem, flipped));
        if candidate.is_file() {
            trace!(segment = number, path = %candidate.display(), "Found E01 segment (case flipped)");
            paths.push(candidate);
            continue;
        }
        break;
    }

    debug!(segment_count = paths.len(), "E01 segments discovered");
    Ok(paths)
}

// =============================================================================
// Numbered Segment Discovery (.001, .002, etc.)
// =============================================================================

/// Check if filename is a numbered segment (.001, .002, etc.)
pub fn is_numbered_segment(filename: &str) -> bool {
    match filename.rfind('.') {
        Some(dot) => {
            let ext = &filename[dot + 1..];
            ext.len() == 3 && ext.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

/// Discover the files backing a raw image
///
/// A `.NNN` path opens the whole numbered set starting at `.001`; any other
/// path is a single flat file.
pub fn discover_raw_segments(path: &Path) -> Result<Vec<PathBuf>, String> {
    if !path.is_file() {
        return Err(format!("File not found: {}", path.display()));
    }

    let filename = path.file_name()
        .ok_or("Invalid filename")?
        .to_string_lossy()
        .to_string();

    if !is_numbered_segment(&filename) {
        debug!(path = %path.display(), "Single file (non-segmented)");
        return Ok(vec![path.to_path_buf()]);
    }

    let parent = path.parent().unwrap_or(Path::new("."));
    let base = &filename[..filename.len() - 4];
    let mut segments = Vec::new();

    for number in 1..=MAX_SEGMENTS {
        let candidate = parent.join(format!("{}.{:03}", base, number));
        if !candidate.is_file() {
            break;
        }
        segments.push(candidate);
    }

    if segments.is_empty() {
        // Started from e.g. .002 with no .001 beside it
        return Err(format!("First segment missing for {}", path.display()));
    }

    debug!(segment_count = segments.len(), "Numbered segments discovered");
    Ok(segments)
}

/// Sizes of each segment file, in order
pub fn segment_sizes(paths: &[PathBuf]) -> Result<Vec<u64>, String> {
    paths.iter()
        .map(|p| {
            fs::metadata(p)
                .map(|m| m.len())
                .map_err(|e| format!("Failed to get size of {}: {}", p.display(), e))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    #[test]
    fn test_e01_extension_sequence() {
        assert_eq!(e01_segment_extension(1, "E01"), "E01");
        assert_eq!(e01_segment_extension(2, "E01"), "E02");
        assert_eq!(e01_segment_extension(99, "E01"), "E99");
        assert_eq!(e01_segment_extension(100, "E01"), "EAA");
        assert_eq!(e01_segment_extension(101, "E01"), "EAB");
        assert_eq!(e01_segment_extension(126, "E01"), "EBA");
        assert_eq!(e01_segment_extension(776, "E01"), "FAA");
        assert_eq!(e01_segment_extension(5, "e01"), "e05");
    }

    #[test]
    fn test_discover_e01_segments() {
        let dir = TempDir::new().unwrap();
        for ext in ["E01", "E02", "E03"] {
            File::create(dir.path().join(format!("disk.{}", ext))).unwrap();
        }
        // Gap: E05 without E04 is not part of the set
        File::create(dir.path().join("disk.E05")).unwrap();

        let segments = discover_e01_segments(&dir.path().join("disk.E01")).unwrap();
        assert_eq!(segments.len(), 3);
        assert!(segments[2].ends_with("disk.E03"));
    }

    #[test]
    fn test_discover_e01_missing_first() {
        let dir = TempDir::new().unwrap();
        assert!(discover_e01_segments(&dir.path().join("none.E01")).is_err());
    }

    #[test]
    fn test_is_numbered_segment() {
        assert!(is_numbered_segment("image.001"));
        assert!(is_numbered_segment("IMAGE.002"));
        assert!(!is_numbered_segment("image.dd"));
        assert!(!is_numbered_segment("image.e01"));
        assert!(!is_numbered_segment("image.01"));
    }

    #[test]
    fn test_discover_raw_segments() {
        let dir = TempDir::new().unwrap();
        for n in 1..=3 {
            File::create(dir.path().join(format!("disk.{:03}", n))).unwrap();
        }
        File::create(dir.path().join("flat.dd")).unwrap();

        let split = discover_raw_segments(&dir.path().join("disk.002")).unwrap();
        assert_eq!(split.len(), 3);
        assert!(split[0].ends_with("disk.001"));

        let flat = discover_raw_segments(&dir.path().join("flat.dd")).unwrap();
        assert_eq!(flat.len(), 1);

        assert!(discover_raw_segments(&dir.path().join("absent.dd")).is_err());
    }
}
