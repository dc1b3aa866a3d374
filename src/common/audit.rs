//! Forensic Audit Logging
//!
//! Chain-of-custody events go to the `forensic_audit` tracing target so
//! they can be filtered into their own log independently of progress output.

use std::path::Path;
use tracing::{info, span, Level};

/// Log evidence file access for audit trail
pub fn log_evidence_access(operation: &str, path: &Path, file_size: Option<u64>) {
    let _span = span!(
        Level::INFO,
        "evidence_access",
        operation = operation,
        path = %path.display(),
    ).entered();

    info!(
        target: "forensic_audit",
        operation = operation,
        path = %path.display(),
        file_size = file_size.unwrap_or(0),
        timestamp = %chrono::Utc::now().to_rfc3339(),
        "Evidence file accessed"
    );
}

/// Log the fingerprint that names an extraction bundle
pub fn log_hash_computed(path: &Path, algorithm: &str, computed_hash: &str, segments: usize) {
    info!(
        target: "forensic_audit",
        operation = "hash_computed",
        path = %path.display(),
        algorithm = algorithm,
        computed_hash = computed_hash,
        segments = segments,
        timestamp = %chrono::Utc::now().to_rfc3339(),
        "Image fingerprint computed"
    );
}

/// Log evidence image opened
pub fn log_image_opened(path: &Path, image_kind: &str, segments: usize, media_size: u64) {
    info!(
        target: "forensic_audit",
        operation = "image_open",
        path = %path.display(),
        image_kind = image_kind,
        segments = segments,
        media_size = media_size,
        timestamp = %chrono::Utc::now().to_rfc3339(),
        "Evidence image opened"
    );
}

/// Log a file copied out of the evidence onto the host
pub fn log_data_export(source: &str, destination: &Path, bytes_exported: u64) {
    info!(
        target: "forensic_audit",
        operation = "data_export",
        source = source,
        destination = %destination.display(),
        bytes_exported = bytes_exported,
        timestamp = %chrono::Utc::now().to_rfc3339(),
        "Evidence data exported"
    );
}
