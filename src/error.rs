//! Error types for the extraction and normalization pipeline

use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::image::ImageError;

/// Result type alias for pipeline operations
pub type FfxResult<T> = Result<T, FfxMailError>;

/// Errors that can occur while processing images, stores and CSVs
#[derive(Debug)]
pub enum FfxMailError {
    /// Image could not be opened or fingerprinted (fatal to the run)
    ImageOpen { path: PathBuf, source: ImageError },
    /// Partition table unreadable
    PartitionRead(String),
    /// Directory listing or lookup failed
    DirectoryTraversal(String),
    /// Artifact copy failed
    FileExtract { name: String, reason: String },
    /// Mail store could not be opened or exported (fatal to that store only)
    StoreOpen { path: PathBuf, reason: String },
    /// A per-store CSV does not carry the canonical header
    AggregationSchema { path: PathBuf, found: Vec<String> },
    /// I/O error (file read/write)
    Io(io::Error),
    /// CSV encode/decode error
    Csv(csv::Error),
    /// Configuration file unreadable or invalid
    Config(String),
}

impl fmt::Display for FfxMailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FfxMailError::ImageOpen { path, source } =>
                write!(f, "Unable to open file {}: {}", path.display(), source),
            FfxMailError::PartitionRead(e) => write!(f, "Failed to read partition info: {}", e),
            FfxMailError::DirectoryTraversal(e) => write!(f, "Directory traversal error: {}", e),
            FfxMailError::FileExtract { name, reason } =>
                write!(f, "Failed to extract {}: {}", name, reason),
            FfxMailError::StoreOpen { path, reason } =>
                write!(f, "Unable to open mail store {}: {}", path.display(), reason),
            FfxMailError::AggregationSchema { path, found } => write!(
                f,
                "Unexpected CSV header in {}: [{}]",
                path.display(),
                found.join(", ")
            ),
            FfxMailError::Io(e) => write!(f, "I/O error: {}", e),
            FfxMailError::Csv(e) => write!(f, "CSV error: {}", e),
            FfxMailError::Config(e) => write!(f, "Configuration error: {}", e),
        }
    }
}

impl std::error::Error for FfxMailError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FfxMailError::ImageOpen { source, .. } => Some(source),
            FfxMailError::Io(e) => Some(e),
            FfxMailError::Csv(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for FfxMailError {
    fn from(err: io::Error) -> Self {
        FfxMailError::Io(err)
    }
}

impl From<csv::Error> for FfxMailError {
    fn from(err: csv::Error) -> Self {
        FfxMailError::Csv(err)
    }
}

impl From<serde_json::Error> for FfxMailError {
    fn from(err: serde_json::Error) -> Self {
        FfxMailError::Config(err.to_string())
    }
}

impl FfxMailError {
    /// Errors that end the whole invocation rather than one node
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FfxMailError::ImageOpen { .. } | FfxMailError::AggregationSchema { .. } | FfxMailError::Config(_)
        )
    }
}
