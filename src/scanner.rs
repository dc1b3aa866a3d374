//! Volume & Directory Scanner
//!
//! Walks an accepted Windows volume down to the per-profile directories that
//! hold mail stores. Every lookup distinguishes "not there" (`Ok(None)`,
//! `Ok(false)`) from "could not look" (`Err`), so callers can log a damaged
//! directory differently from an absent one. Neither stops the walk.

use std::fmt;
use tracing::{debug, instrument, warn};

use crate::config::{ArtifactClass, ArtifactLocation};
use crate::error::FfxMailError;
use crate::volume::{DirectoryEntry, FileRef, VolumeReader};

const WINDOWS_DIR: &str = "windows";
const USERS_DIR: &str = "Users";
const APPDATA_DIR: &str = "appdata";

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// Listing or lookup failed in the named directory
    Directory { path: String, reason: String },
}

impl ScanError {
    fn directory(path: impl Into<String>, reason: String) -> Self {
        ScanError::Directory { path: path.into(), reason }
    }
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanError::Directory { path, reason } => write!(f, "{}: {}", path, reason),
        }
    }
}

impl std::error::Error for ScanError {}

impl From<ScanError> for FfxMailError {
    fn from(err: ScanError) -> Self {
        FfxMailError::DirectoryTraversal(err.to_string())
    }
}

// =============================================================================
// Results
// =============================================================================

/// An artifact directory that exists under a profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedDirectory {
    pub class: ArtifactClass,
    pub relative_path: String,
    pub dir: FileRef,
}

/// A user profile that passed the AppData gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileScan {
    pub name: String,
    pub dir: FileRef,
    pub locations: Vec<LocatedDirectory>,
}

// =============================================================================
// Lookups
// =============================================================================

/// True when `dir` has a subdirectory named `lowercase_name`, ignoring case
fn has_child_dir<V: VolumeReader + ?Sized>(
    volume: &mut V,
    dir: FileRef,
    lowercase_name: &str,
    path: &str,
) -> Result<bool, ScanError> {
    let entries = volume.list_dir(dir).map_err(|e| ScanError::directory(path, e))?;
    Ok(entries
        .iter()
        .any(|entry| entry.is_dir() && entry.name.to_lowercase() == lowercase_name))
}

/// True when the volume root holds a `Windows` directory (any case)
pub fn has_windows_directory<V: VolumeReader + ?Sized>(volume: &mut V) -> Result<bool, ScanError> {
    let root = volume.root();
    has_child_dir(volume, root, WINDOWS_DIR, "/")
}

/// True when a profile root holds an `AppData` directory (any case)
pub fn has_appdata_directory<V: VolumeReader + ?Sized>(
    volume: &mut V,
    profile: &DirectoryEntry,
) -> Result<bool, ScanError> {
    has_child_dir(volume, profile.file_ref, APPDATA_DIR, &format!("/{}/{}", USERS_DIR, profile.name))
}

/// Directories under `/Users`, or `Ok(None)` when the volume has no `Users`
pub fn list_profiles<V: VolumeReader + ?Sized>(
    volume: &mut V,
) -> Result<Option<Vec<DirectoryEntry>>, ScanError> {
    let root = volume.root();
    let users = match volume.find_child(root, USERS_DIR).map_err(|e| ScanError::directory("/", e))? {
        Some(entry) if entry.is_dir() => entry,
        _ => return Ok(None),
    };

    let entries = volume
        .list_dir(users.file_ref)
        .map_err(|e| ScanError::directory(format!("/{}", USERS_DIR), e))?;
    Ok(Some(
        entries
            .into_iter()
            .filter(|entry| entry.is_dir() && entry.name != "." && entry.name != "..")
            .collect(),
    ))
}

/// Resolve one artifact location below a profile
pub fn locate<V: VolumeReader + ?Sized>(
    volume: &mut V,
    profile: &DirectoryEntry,
    location: &ArtifactLocation,
) -> Result<Option<FileRef>, ScanError> {
    volume
        .find_dir_path(profile.file_ref, &location.relative_path)
        .map_err(|e| {
            ScanError::directory(format!("/{}/{}/{}", USERS_DIR, profile.name, location.relative_path), e)
        })
}

// =============================================================================
// Volume walk
// =============================================================================

/// Every profile with an `AppData` directory, and the artifact directories it has
///
/// Only a failure to list `/Users` itself is returned; per-profile and
/// per-location failures are logged and that node contributes nothing.
#[instrument(skip_all, fields(fs = volume.fs_type()))]
pub fn scan_profiles<V: VolumeReader + ?Sized>(
    volume: &mut V,
    table: &[ArtifactLocation],
) -> Result<Vec<ProfileScan>, ScanError> {
    let profiles = match list_profiles(volume)? {
        Some(profiles) => profiles,
        None => {
            debug!("Volume has no Users directory");
            return Ok(Vec::new());
        }
    };

    let mut scans = Vec::new();
    for profile in profiles {
        match has_appdata_directory(volume, &profile) {
            Ok(true) => {}
            Ok(false) => {
                debug!(profile = %profile.name, "No AppData, not a user profile");
                continue;
            }
            Err(e) => {
                warn!(profile = %profile.name, error = %e, "Error checking for 'AppData' directory");
                continue;
            }
        }

        let mut locations = Vec::new();
        for location in table {
            match locate(volume, &profile, location) {
                Ok(Some(dir)) => locations.push(LocatedDirectory {
                    class: location.class,
                    relative_path: location.relative_path.clone(),
                    dir,
                }),
                Ok(None) => {}
                Err(e) => warn!(profile = %profile.name, error = %e, "Artifact directory unreadable"),
            }
        }

        debug!(profile = %profile.name, locations = locations.len(), "Profile scanned");
        scans.push(ProfileScan { name: profile.name, dir: profile.file_ref, locations });
    }

    Ok(scans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_artifact_table;
    use crate::volume::fs::tests::MemoryVolume;

    fn windows_volume() -> MemoryVolume {
        let mut volume = MemoryVolume::new();
        volume.mkdir("Windows/System32");
        volume
    }

    #[test]
    fn test_windows_gate_is_case_insensitive() {
        let mut volume = MemoryVolume::new();
        assert!(!has_windows_directory(&mut volume).unwrap());
        volume.mkdir("WINDOWS");
        assert!(has_windows_directory(&mut volume).unwrap());

        // A file named Windows does not count
        let mut other = MemoryVolume::new();
        other.add_file("", "windows", b"", None);
        assert!(!has_windows_directory(&mut other).unwrap());
    }

    #[test]
    fn test_appdata_gate_and_locations() {
        let mut volume = windows_volume();
        volume.mkdir("Users/alice/appdata/Local/Microsoft/Outlook");
        volume.mkdir("Users/alice/Documents/Outlook Files");
        volume.mkdir("Users/Public/Documents");
        volume.mkdir("Users/bob/AppData/Roaming");

        let scans = scan_profiles(&mut volume, &default_artifact_table()).unwrap();
        let names: Vec<&str> = scans.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob"]);

        let alice = &scans[0];
        assert_eq!(alice.locations.len(), 2);
        assert_eq!(alice.locations[0].class, ArtifactClass::Ost);
        assert_eq!(alice.locations[1].relative_path, "Documents/Outlook Files");
        assert!(scans[1].locations.is_empty());
    }

    #[test]
    fn test_no_users_directory() {
        let mut volume = windows_volume();
        assert_eq!(list_profiles(&mut volume).unwrap(), None);
        assert!(scan_profiles(&mut volume, &default_artifact_table()).unwrap().is_empty());
    }

    #[test]
    fn test_broken_profile_is_skipped() {
        let mut volume = windows_volume();
        let broken = volume.mkdir("Users/carol");
        volume.mkdir("Users/dave/AppData/Local/Microsoft/Outlook");
        volume.broken.push(broken);

        let scans = scan_profiles(&mut volume, &default_artifact_table()).unwrap();
        assert_eq!(scans.len(), 1);
        assert_eq!(scans[0].name, "dave");
        assert_eq!(scans[0].locations.len(), 1);
    }

    #[test]
    fn test_broken_users_directory_is_an_error() {
        let mut volume = windows_volume();
        let users = volume.mkdir("Users");
        volume.broken.push(users);
        assert!(matches!(list_profiles(&mut volume), Err(ScanError::Directory { .. })));
    }
}
