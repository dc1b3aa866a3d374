//! Artifact Extractor
//!
//! Copies mail stores out of a scanned volume into the image's output
//! bundle, one subdirectory per profile:
//!
//! ```text
//! <output_root>/<image basename>-<digest>/<profile>/<store file>
//! ```

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use filetime::FileTime;
use tracing::{debug, instrument, trace, warn};

use crate::common::{audit, hash_files_with_progress, path_security::safe_component, HashAlgorithm};
use crate::config::ArtifactClass;
use crate::error::{FfxMailError, FfxResult};
use crate::scanner::ProfileScan;
use crate::volume::{DirectoryEntry, VolumeReader};

const PARTIAL_SUFFIX: &str = ".partial";

// =============================================================================
// Output bundle
// =============================================================================

/// One output directory per source image (or directly supplied store)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputBundle {
    pub name: String,
    pub path: PathBuf,
    pub digest: String,
}

/// `<basename>-<hex digest>`
pub fn bundle_name(basename: &str, digest: &str) -> String {
    format!("{}-{}", basename, digest)
}

/// Fingerprint the files backing `source` and create (or reuse) its bundle
///
/// Byte-identical media always maps to the same directory.
#[instrument(skip_all, fields(source = %source.display()))]
pub fn prepare_bundle(
    output_root: &Path,
    source: &Path,
    segment_paths: &[PathBuf],
    algorithm: HashAlgorithm,
) -> FfxResult<OutputBundle> {
    let basename = source
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| FfxMailError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} has no file name", source.display()),
        )))?;

    let digest = hash_files_with_progress(segment_paths, algorithm, |done, total| {
        trace!(done, total, "Hashing");
    })
    .map_err(|e| FfxMailError::ImageOpen {
        path: source.to_path_buf(),
        source: crate::image::ImageError::NotFound(e),
    })?;
    audit::log_hash_computed(source, algorithm.name(), &digest, segment_paths.len());

    let name = bundle_name(&basename, &digest);
    let path = output_root.join(&name);
    fs::create_dir_all(&path)?;
    debug!(bundle = %path.display(), "Output bundle ready");

    Ok(OutputBundle { name, path, digest })
}

// =============================================================================
// Extraction results
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedArtifact {
    /// Name as found on the volume
    pub name: String,
    pub class: ArtifactClass,
    pub profile: String,
    pub size: u64,
    pub destination: PathBuf,
}

/// What one profile yielded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileReport {
    pub profile: String,
    pub artifacts: Vec<ExtractedArtifact>,
    /// Matching files that could not be copied
    pub failures: usize,
}

impl ProfileReport {
    pub fn count(&self, class: ArtifactClass) -> usize {
        self.artifacts.iter().filter(|a| a.class == class).count()
    }

    pub fn names(&self, class: ArtifactClass) -> Vec<&str> {
        self.artifacts
            .iter()
            .filter(|a| a.class == class)
            .map(|a| a.name.as_str())
            .collect()
    }
}

// =============================================================================
// Extraction
// =============================================================================

fn has_extension(name: &str, extension: &str) -> bool {
    name.to_lowercase().ends_with(extension)
}

/// Copy every matching store from the profile's artifact directories
///
/// Files that cannot be read are logged and counted, never fatal.
#[instrument(skip_all, fields(profile = %scan.name))]
pub fn extract_profile<V: VolumeReader + ?Sized>(
    volume: &mut V,
    scan: &ProfileScan,
    bundle_dir: &Path,
) -> ProfileReport {
    let mut report = ProfileReport { profile: scan.name.clone(), ..Default::default() };

    let profile_dir = match safe_component(&scan.name) {
        Ok(component) => bundle_dir.join(component),
        Err(e) => {
            warn!(error = %e, "Profile name unusable as a directory, skipping");
            return report;
        }
    };

    let mut used_names = HashSet::new();
    for location in &scan.locations {
        let entries = match volume.list_dir(location.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(location = %location.relative_path, error = %e, "Artifact directory unreadable");
                continue;
            }
        };

        for entry in entries
            .iter()
            .filter(|e| e.is_file() && has_extension(&e.name, location.class.extension()))
        {
            match copy_artifact(volume, entry, &profile_dir, &mut used_names) {
                Ok((destination, size)) => report.artifacts.push(ExtractedArtifact {
                    name: entry.name.clone(),
                    class: location.class,
                    profile: scan.name.clone(),
                    size,
                    destination,
                }),
                Err(e) => {
                    warn!(file = %entry.name, error = %e, "Skipping unreadable artifact");
                    report.failures += 1;
                }
            }
        }
    }

    debug!(
        extracted = report.artifacts.len(),
        failures = report.failures,
        "Profile extraction complete"
    );
    report
}

/// First free `name`, `name (2).ext`, ... among names already written this run
fn unique_file_name(name: &str, used: &mut HashSet<String>) -> String {
    if used.insert(name.to_lowercase()) {
        return name.to_string();
    }
    let (stem, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 => (&name[..dot], &name[dot..]),
        _ => (name, ""),
    };
    let mut n = 2;
    loop {
        let candidate = format!("{} ({}){}", stem, n, ext);
        if used.insert(candidate.to_lowercase()) {
            return candidate;
        }
        n += 1;
    }
}

/// Stream one file to `<profile_dir>/<name>` via a `.partial` staging file
fn copy_artifact<V: VolumeReader + ?Sized>(
    volume: &mut V,
    entry: &DirectoryEntry,
    profile_dir: &Path,
    used_names: &mut HashSet<String>,
) -> FfxResult<(PathBuf, u64)> {
    let extract_error = |reason: String| FfxMailError::FileExtract { name: entry.name.clone(), reason };

    let file_name = safe_component(&entry.name).map_err(|e| extract_error(e.to_string()))?;
    let file_name = unique_file_name(&file_name, used_names);
    fs::create_dir_all(profile_dir)?;

    let destination = profile_dir.join(&file_name);
    let partial = profile_dir.join(format!("{}{}", file_name, PARTIAL_SUFFIX));

    let copied = {
        let file = File::create(&partial)?;
        let mut writer = BufWriter::new(file);
        let result = volume
            .read_file(entry.file_ref, &mut writer)
            .and_then(|n| writer.flush().map(|_| n).map_err(|e| e.to_string()));
        match result {
            Ok(n) => n,
            Err(e) => {
                drop(writer);
                let _ = fs::remove_file(&partial);
                return Err(extract_error(e));
            }
        }
    };

    if copied != entry.size {
        warn!(file = %entry.name, expected = entry.size, copied, "Copied size differs from directory entry");
    }
    fs::rename(&partial, &destination)?;

    match volume.modified_time(entry.file_ref) {
        Ok(Some(secs)) => {
            let mtime = FileTime::from_unix_time(secs, 0);
            let atime = FileTime::from_system_time(SystemTime::now());
            if let Err(e) = filetime::set_file_times(&destination, atime, mtime) {
                debug!(file = %file_name, error = %e, "Could not apply source modification time");
            }
        }
        Ok(None) => {}
        Err(e) => debug!(file = %file_name, error = %e, "Source modification time unavailable"),
    }

    audit::log_data_export(&entry.name, &destination, copied);
    Ok((destination, copied))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_artifact_table;
    use crate::scanner::scan_profiles;
    use crate::volume::fs::tests::MemoryVolume;
    use tempfile::TempDir;

    fn scanned(volume: &mut MemoryVolume, profile: &str) -> ProfileScan {
        scan_profiles(volume, &default_artifact_table())
            .unwrap()
            .into_iter()
            .find(|s| s.name == profile)
            .unwrap()
    }

    #[test]
    fn test_bundle_name_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let image = dir.path().join("disk.dd");
        fs::write(&image, b"hello world").unwrap();
        let out = dir.path().join("out");

        let first = prepare_bundle(&out, &image, &[image.clone()], HashAlgorithm::Sha256).unwrap();
        assert_eq!(
            first.name,
            "disk.dd-b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert!(first.path.is_dir());

        let again = prepare_bundle(&out, &image, &[image.clone()], HashAlgorithm::Sha256).unwrap();
        assert_eq!(first, again);
        assert_eq!(bundle_name("a.E01", "ff"), "a.E01-ff");
    }

    #[test]
    fn test_bundle_for_missing_image_fails() {
        let dir = TempDir::new().unwrap();
        let image = dir.path().join("gone.E01");
        let err = prepare_bundle(dir.path(), &image, &[image.clone()], HashAlgorithm::Sha256).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("Unable to open file"));
    }

    #[test]
    fn test_extracts_matching_files_with_mtime() {
        let dir = TempDir::new().unwrap();
        let mut volume = MemoryVolume::new();
        volume.mkdir("Users/alice/AppData");
        volume.add_file("Users/alice/AppData/Local/Microsoft/Outlook", "alice@corp.ost", b"OST DATA", Some(1_600_000_000));
        volume.add_file("Users/alice/AppData/Local/Microsoft/Outlook", "Backup.OST", b"OLD", None);
        volume.add_file("Users/alice/AppData/Local/Microsoft/Outlook", "notes.txt", b"skip", None);
        volume.add_file("Users/alice/Documents/Outlook Files", "archive.pst", b"PST", None);

        let scan = scanned(&mut volume, "alice");
        let report = extract_profile(&mut volume, &scan, dir.path());

        assert_eq!(report.count(ArtifactClass::Ost), 2);
        assert_eq!(report.count(ArtifactClass::Pst), 1);
        assert_eq!(report.names(ArtifactClass::Ost), vec!["alice@corp.ost", "Backup.OST"]);
        assert_eq!(report.failures, 0);

        let copied = dir.path().join("alice").join("alice@corp.ost");
        assert_eq!(fs::read(&copied).unwrap(), b"OST DATA");
        let mtime = FileTime::from_last_modification_time(&fs::metadata(&copied).unwrap());
        assert_eq!(mtime.unix_seconds(), 1_600_000_000);
        assert!(!dir.path().join("alice").join("alice@corp.ost.partial").exists());
    }

    #[test]
    fn test_unreadable_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        let mut volume = MemoryVolume::new();
        volume.mkdir("Users/bob/AppData");
        volume.add_unreadable_file("Users/bob/AppData/Local/Microsoft/Outlook", "broken.ost");
        volume.add_file("Users/bob/AppData/Local/Microsoft/Outlook", "good.ost", b"ok", None);

        let scan = scanned(&mut volume, "bob");
        let report = extract_profile(&mut volume, &scan, dir.path());
        assert_eq!(report.names(ArtifactClass::Ost), vec!["good.ost"]);
        assert_eq!(report.failures, 1);
        assert!(!dir.path().join("bob").join("broken.ost").exists());
        assert!(!dir.path().join("bob").join("broken.ost.partial").exists());
    }

    #[test]
    fn test_same_name_in_two_locations() {
        let dir = TempDir::new().unwrap();
        let mut volume = MemoryVolume::new();
        volume.mkdir("Users/kim/AppData");
        volume.add_file("Users/kim/OneDrive/Documents/Outlook Files", "mail.pst", b"one", None);
        volume.add_file("Users/kim/Documents/Outlook Files", "mail.pst", b"two", None);

        let scan = scanned(&mut volume, "kim");
        let report = extract_profile(&mut volume, &scan, dir.path());
        assert_eq!(report.count(ArtifactClass::Pst), 2);
        assert_eq!(fs::read(dir.path().join("kim/mail.pst")).unwrap(), b"one");
        assert_eq!(fs::read(dir.path().join("kim/mail (2).pst")).unwrap(), b"two");
    }
}
