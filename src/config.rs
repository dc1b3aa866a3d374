//! Run configuration
//!
//! Loaded from a JSON file, first match wins:
//! - an explicit `--config <FILE>`
//! - `./ffx-mail.json`
//! - `<user config dir>/ffx-mail/config.json`
//! - built-in defaults
//!
//! Every field is optional in the file; missing fields take their default.
//! Command-line flags are applied on top by the caller.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::common::{path_security::is_safe_path, HashAlgorithm};
use crate::error::{FfxMailError, FfxResult};

/// Name of the per-directory configuration file
pub const LOCAL_CONFIG_FILE: &str = "ffx-mail.json";
/// Application directory under the user's config dir
pub const APP_CONFIG_DIR: &str = "ffx-mail";

pub const DEFAULT_OUTPUT_ROOT: &str = "./extracted_files";
pub const DEFAULT_MERGED_FILE: &str = "extract.csv";
pub const DEFAULT_BODY_CHAR_LIMIT: usize = 2000;
pub const DEFAULT_PFFEXPORT: &str = "pffexport";

/// Class of mail artifact a table row locates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactClass {
    /// Offline store (cached Exchange mailbox)
    Ost,
    /// Personal store (archive / POP account)
    Pst,
}

impl ArtifactClass {
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactClass::Ost => ".ost",
            ArtifactClass::Pst => ".pst",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ArtifactClass::Ost => "ost",
            ArtifactClass::Pst => "pst",
        }
    }
}

/// One place, relative to a profile directory, where stores are kept
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactLocation {
    pub class: ArtifactClass,
    /// `/`-separated, resolved case-insensitively
    pub relative_path: String,
}

pub fn default_artifact_table() -> Vec<ArtifactLocation> {
    [
        (ArtifactClass::Ost, "AppData/Local/Microsoft/Outlook"),
        (ArtifactClass::Pst, "OneDrive/문서/Outlook Files"),
        (ArtifactClass::Pst, "OneDrive/Documents/Outlook Files"),
        (ArtifactClass::Pst, "Documents/Outlook Files"),
    ]
    .into_iter()
    .map(|(class, relative_path)| ArtifactLocation { class, relative_path: relative_path.to_string() })
    .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Directory holding every bundle and the merged CSV
    pub output_root: PathBuf,
    pub merged_file_name: String,
    /// Bodies are cut to this many characters before other cleanup
    pub body_char_limit: usize,
    /// Emit delivery times shifted to UTC+9 wall-clock seconds
    pub utc_plus_nine: bool,
    /// Fingerprint used in bundle directory names
    pub digest: HashAlgorithm,
    pub artifacts: Vec<ArtifactLocation>,
    /// Remove spaces from sender display names
    pub compact_sender_names: bool,
    /// libpff export tool used to read OST/PST stores
    pub pffexport: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from(DEFAULT_OUTPUT_ROOT),
            merged_file_name: DEFAULT_MERGED_FILE.to_string(),
            body_char_limit: DEFAULT_BODY_CHAR_LIMIT,
            utc_plus_nine: false,
            digest: HashAlgorithm::default(),
            artifacts: default_artifact_table(),
            compact_sender_names: true,
            pffexport: PathBuf::from(DEFAULT_PFFEXPORT),
        }
    }
}

impl RunConfig {
    /// Merged CSV location under the output root
    pub fn merged_path(&self) -> PathBuf {
        self.output_root.join(&self.merged_file_name)
    }
}

/// Load from a specific file
pub fn load_config_file(path: &Path) -> FfxResult<RunConfig> {
    let json = fs::read_to_string(path)
        .map_err(|e| FfxMailError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    let config: RunConfig = serde_json::from_str(&json)
        .map_err(|e| FfxMailError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
    validate(&config)?;
    info!(path = %path.display(), "Loaded configuration");
    Ok(config)
}

/// Resolve the configuration for this run
///
/// An explicit path must exist; the implicit locations are optional.
pub fn load_config(explicit: Option<&Path>) -> FfxResult<RunConfig> {
    if let Some(path) = explicit {
        return load_config_file(path);
    }

    for candidate in candidate_paths() {
        if candidate.is_file() {
            return load_config_file(&candidate);
        }
    }

    debug!("No configuration file found, using defaults");
    Ok(RunConfig::default())
}

fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join(APP_CONFIG_DIR).join("config.json"));
    }
    paths
}

fn validate(config: &RunConfig) -> FfxResult<()> {
    if config.merged_file_name.is_empty()
        || config.merged_file_name.contains(['/', '\\'])
        || !config.merged_file_name.to_lowercase().ends_with(".csv")
    {
        return Err(FfxMailError::Config(format!(
            "merged_file_name must be a plain *.csv file name, got {:?}",
            config.merged_file_name
        )));
    }
    if let Some(bad) = config
        .artifacts
        .iter()
        .find(|a| a.relative_path.is_empty() || !is_safe_path(Path::new(&a.relative_path)))
    {
        return Err(FfxMailError::Config(format!(
            "artifact path must be relative to the profile, got {:?}",
            bad.relative_path
        )));
    }
    if config.body_char_limit == 0 {
        return Err(FfxMailError::Config("body_char_limit must be positive".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.output_root, PathBuf::from("./extracted_files"));
        assert_eq!(config.merged_path(), PathBuf::from("./extracted_files/extract.csv"));
        assert_eq!(config.body_char_limit, 2000);
        assert_eq!(config.digest, HashAlgorithm::Sha256);
        assert!(!config.utc_plus_nine);
        assert_eq!(config.artifacts[0].class, ArtifactClass::Ost);
        assert_eq!(config.artifacts[1].relative_path, "OneDrive/문서/Outlook Files");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ffx-mail.json");
        fs::write(&path, r#"{ "utc_plus_nine": true, "digest": "blake3",
            "artifacts": [ { "class": "pst", "relative_path": "Desktop/mail" } ] }"#).unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert!(config.utc_plus_nine);
        assert_eq!(config.digest, HashAlgorithm::Blake3);
        assert_eq!(config.artifacts.len(), 1);
        assert_eq!(config.artifacts[0].class, ArtifactClass::Pst);
        assert_eq!(config.body_char_limit, 2000);
    }

    #[test]
    fn test_round_trip_and_validation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, serde_json::to_string_pretty(&RunConfig::default()).unwrap()).unwrap();
        assert_eq!(load_config_file(&path).unwrap(), RunConfig::default());

        fs::write(&path, r#"{ "merged_file_name": "../out.csv" }"#).unwrap();
        assert!(matches!(load_config_file(&path), Err(FfxMailError::Config(_))));

        fs::write(&path, r#"{ "artifacts": [ { "class": "ost", "relative_path": "../../Windows" } ] }"#).unwrap();
        assert!(matches!(load_config_file(&path), Err(FfxMailError::Config(_))));

        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_config_file(&path), Err(FfxMailError::Config(_))));
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(load_config(Some(&dir.path().join("absent.json"))).is_err());
    }
}
