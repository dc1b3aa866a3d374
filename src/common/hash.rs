// Shared hash utilities for content-addressed output bundles
//
// A bundle directory is named after the digest of every byte of the source
// image file set, so only collision-resistant algorithms are offered:
// SHA-1, SHA-256, SHA-512, BLAKE2b, BLAKE3

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::str::FromStr;
use sha1::{Sha1, Digest};
use sha2::{Sha256, Sha512};
use blake2::Blake2b512;
use blake3::Hasher as Blake3Hasher;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};

use super::BUFFER_SIZE;

// =============================================================================
// Hash Algorithm Enum
// =============================================================================

/// Digest algorithms accepted for bundle naming
/// - SHA256: default, matches the digest examiners usually record for evidence
/// - SHA1/SHA512: kept for labs that standardise on them
/// - BLAKE3: fastest on large images (parallel over all cores)
/// - BLAKE2b: fast software hash
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
    Sha512,
    Blake2,
    Blake3,
}

impl Default for HashAlgorithm {
    fn default() -> Self {
        HashAlgorithm::Sha256
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    /// Parse algorithm name (case-insensitive, dashes optional)
    fn from_str(algorithm: &str) -> Result<Self, Self::Err> {
        match algorithm.trim().to_lowercase().as_str() {
            "sha1" | "sha-1" => Ok(HashAlgorithm::Sha1),
            "sha256" | "sha-256" => Ok(HashAlgorithm::Sha256),
            "sha512" | "sha-512" => Ok(HashAlgorithm::Sha512),
            "blake2" | "blake2b" => Ok(HashAlgorithm::Blake2),
            "blake3" => Ok(HashAlgorithm::Blake3),
            _ => Err(format!(
                "Unsupported bundle digest: '{}'. Supported: sha1, sha256, sha512, blake2, blake3",
                algorithm
            )),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl HashAlgorithm {
    /// Get the canonical algorithm name
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha1 => "SHA-1",
            HashAlgorithm::Sha256 => "SHA-256",
            HashAlgorithm::Sha512 => "SHA-512",
            HashAlgorithm::Blake2 => "BLAKE2b",
            HashAlgorithm::Blake3 => "BLAKE3",
        }
    }

}

// =============================================================================
// Streaming Hasher - Unified interface for incremental hashing
// =============================================================================

/// A unified streaming hasher over all bundle digest algorithms
/// Note: Blake3Hasher is boxed because it's ~1920 bytes
pub enum StreamingHasher {
    Sha1(Sha1),
    Sha256(Sha256),
    Sha512(Sha512),
    Blake2(Blake2b512),
    Blake3(Box<Blake3Hasher>),
}

impl StreamingHasher {
    /// Create a new streaming hasher for the specified algorithm
    pub fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha1 => StreamingHasher::Sha1(Sha1::new()),
            HashAlgorithm::Sha256 => StreamingHasher::Sha256(Sha256::new()),
            HashAlgorithm::Sha512 => StreamingHasher::Sha512(Sha512::new()),
            HashAlgorithm::Blake2 => StreamingHasher::Blake2(Blake2b512::new()),
            HashAlgorithm::Blake3 => StreamingHasher::Blake3(Box::new(Blake3Hasher::new())),
        }
    }

    /// Update the hash with more data
    pub fn update(&mut self, data: &[u8]) {
        match self {
            StreamingHasher::Sha1(h) => Digest::update(h, data),
            StreamingHasher::Sha256(h) => Digest::update(h, data),
            StreamingHasher::Sha512(h) => Digest::update(h, data),
            StreamingHasher::Blake2(h) => Digest::update(h, data),
            // BLAKE3 update_rayon uses all cores for large buffers
            StreamingHasher::Blake3(h) => { h.update_rayon(data); }
        }
    }

    /// Finalize and return the hash as a lowercase hex string
    pub fn finalize(self) -> String {
        match self {
            StreamingHasher::Sha1(h) => hex::encode(h.finalize()),
            StreamingHasher::Sha256(h) => hex::encode(h.finalize()),
            StreamingHasher::Sha512(h) => hex::encode(h.finalize()),
            StreamingHasher::Blake2(h) => hex::encode(h.finalize()),
            StreamingHasher::Blake3(h) => h.finalize().to_hex().to_string(),
        }
    }
}

// =============================================================================
// File Set Hashing with Progress
// =============================================================================

/// Hash the concatenated content of `paths`, in order
///
/// # Arguments
/// * `paths` - Files backing one image (a single raw file, or every segment)
/// * `algorithm` - Digest algorithm
/// * `progress_callback` - Called with (bytes_processed, total_bytes)
#[instrument(skip(paths, progress_callback), fields(files = paths.len()))]
pub fn hash_files_with_progress<F>(
    paths: &[PathBuf],
    algorithm: HashAlgorithm,
    mut progress_callback: F,
) -> Result<String, String>
where
    F: FnMut(u64, u64),
{
    let mut total_size = 0u64;
    for path in paths {
        let metadata = std::fs::metadata(path)
            .map_err(|e| format!("Unable to open file {}: {}", path.display(), e))?;
        total_size += metadata.len();
    }

    debug!(algorithm = algorithm.name(), total_size, "Starting image hash");

    let mut hasher = StreamingHasher::new(algorithm);
    let mut bytes_read_total = 0u64;
    let report_interval = (total_size / 20).max(BUFFER_SIZE as u64);
    let mut last_report = 0u64;

    for path in paths {
        trace!(path = %path.display(), "Hashing segment");
        let file = File::open(path)
            .map_err(|e| format!("Unable to open file {}: {}", path.display(), e))?;
        let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);

        loop {
            let buf = reader.fill_buf()
                .map_err(|e| format!("Read error in {}: {}", path.display(), e))?;
            let len = buf.len();
            if len == 0 {
                break;
            }

            hasher.update(buf);
            reader.consume(len);

            bytes_read_total += len as u64;
            if bytes_read_total - last_report >= report_interval {
                progress_callback(bytes_read_total, total_size);
                last_report = bytes_read_total;
            }
        }
    }

    progress_callback(total_size, total_size);
    let hash = hasher.finalize();
    debug!(hash = %hash, "Image hash complete");
    Ok(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn compute_hash(data: &[u8], algorithm: HashAlgorithm) -> String {
        let mut hasher = StreamingHasher::new(algorithm);
        hasher.update(data);
        hasher.finalize()
    }

    #[test]
    fn test_algorithm_parsing() {
        assert_eq!("sha256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert_eq!("SHA-256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert_eq!("sha1".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha1);
        assert_eq!("BLAKE3".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Blake3);
        assert_eq!("blake2b".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Blake2);
        assert!("md5".parse::<HashAlgorithm>().is_err());
        assert!("crc32".parse::<HashAlgorithm>().is_err());
    }

    #[test]
    fn test_streaming_digests() {
        let data = b"hello world";
        assert_eq!(
            compute_hash(data, HashAlgorithm::Sha256),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(
            compute_hash(data, HashAlgorithm::Sha1),
            "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed"
        );
    }

    #[test]
    fn test_hash_file_set_equals_concatenation() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("image.001");
        let second = dir.path().join("image.002");
        File::create(&first).unwrap().write_all(b"hello ").unwrap();
        File::create(&second).unwrap().write_all(b"world").unwrap();

        let hash = hash_files_with_progress(&[first, second], HashAlgorithm::Sha256, |_, _| {}).unwrap();
        assert_eq!(hash, compute_hash(b"hello world", HashAlgorithm::Sha256));
    }

    #[test]
    fn test_hash_missing_file() {
        let dir = TempDir::new().unwrap();
        let missing = vec![dir.path().join("missing.E01")];
        let err = hash_files_with_progress(&missing, HashAlgorithm::Sha256, |_, _| {}).unwrap_err();
        assert!(err.contains("Unable to open file"));
    }
}
