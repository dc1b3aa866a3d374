//! Run orchestration
//!
//! A `Session` carries the configuration and the store backend for one
//! invocation and drives the three stages:
//! - extract: image -> partitions -> profiles -> bundle
//! - normalize: store file -> per-store CSV
//! - merge: per-store CSVs -> one sorted timeline
//!
//! Progress lines go to stdout; diagnostics go through `tracing`.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::aggregate::{merge_csv_files, MergeSummary};
use crate::common::audit;
use crate::config::RunConfig;
use crate::csv_io::MailCsvWriter;
use crate::error::{FfxMailError, FfxResult};
use crate::extractor::{extract_profile, prepare_bundle, ExtractedArtifact, OutputBundle};
use crate::image::ImageHandle;
use crate::normalize::{normalize_message, NormalizeOptions};
use crate::scanner::{has_windows_directory, scan_profiles};
use crate::store::{is_export_tree, read_store, PffExportOpener, StoreOpener};
use crate::volume::{open_ntfs, read_partitions};

const TITLE_WIDTH: usize = 50;
const STORE_EXTENSIONS: [&str; 2] = ["ost", "pst"];

/// ` ===== title ===== ` padded to a fixed width
pub fn format_title(title: &str) -> String {
    let len = title.chars().count();
    let left = TITLE_WIDTH.saturating_sub(len) / 2;
    let right = TITLE_WIDTH.saturating_sub(left + len);
    format!(" {} {} {} ", "=".repeat(left), title, "=".repeat(right))
}

// =============================================================================
// Summaries
// =============================================================================

#[derive(Debug, Clone)]
pub struct ImageSummary {
    pub bundle: OutputBundle,
    /// NTFS partitions that carried a Windows directory
    pub windows_partitions: usize,
    pub artifacts: Vec<ExtractedArtifact>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreSummary {
    pub messages: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeSummary {
    pub stores: usize,
    pub failed: usize,
    pub messages: usize,
}

// =============================================================================
// Session
// =============================================================================

pub struct Session {
    config: RunConfig,
    opener: Box<dyn StoreOpener>,
}

impl Session {
    /// Session backed by the configured `pffexport` executable
    pub fn new(config: RunConfig) -> Self {
        let opener = PffExportOpener::new(config.pffexport.clone());
        Self::with_opener(config, Box::new(opener))
    }

    pub fn with_opener(config: RunConfig, opener: Box<dyn StoreOpener>) -> Self {
        Self { config, opener }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn output_root(&self) -> &Path {
        &self.config.output_root
    }

    // -------------------------------------------------------------------------
    // Extract
    // -------------------------------------------------------------------------

    /// Extract every image in order; the first image that cannot be opened
    /// or fingerprinted ends the run
    pub fn extract_images(&self, images: &[PathBuf]) -> FfxResult<Vec<ImageSummary>> {
        let mut summaries = Vec::with_capacity(images.len());
        for image in images {
            summaries.push(self.extract_image(image)?);
        }
        Ok(summaries)
    }

    #[instrument(skip_all, fields(image = %path.display()))]
    pub fn extract_image(&self, path: &Path) -> FfxResult<ImageSummary> {
        let title = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        println!("{}", format_title(&title));

        let mut image = ImageHandle::open(path).map_err(|source| {
            let err = FfxMailError::ImageOpen { path: path.to_path_buf(), source };
            println!(" {}", err);
            err
        })?;

        let bundle = match prepare_bundle(self.output_root(), path, image.segment_paths(), self.config.digest) {
            Ok(bundle) => bundle,
            Err(e) => {
                println!(" {}", e);
                image.close();
                return Err(e);
            }
        };

        if let ImageHandle::Ewf(ewf) = &image {
            for stored in ewf.stored_hashes() {
                info!(
                    target: "forensic_audit",
                    image = %path.display(),
                    algorithm = stored.algorithm,
                    hash = %stored.hash,
                    "Acquisition digest recorded in container"
                );
            }
        }

        let mut summary = ImageSummary { bundle, windows_partitions: 0, artifacts: Vec::new() };

        let partitions = match read_partitions(&mut image) {
            Ok(partitions) => partitions,
            Err(e) => {
                let err = FfxMailError::PartitionRead(e);
                println!(" {}", err);
                warn!(error = %err, "No partitions to scan");
                image.close();
                return Ok(summary);
            }
        };

        for partition in &partitions {
            let mut volume = match open_ntfs(&mut image, partition) {
                Ok(volume) => volume,
                Err(e) => {
                    debug!(partition = %partition.description, error = %e, "Not an NTFS volume, skipping");
                    continue;
                }
            };

            match has_windows_directory(&mut volume) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    println!(" Error checking for 'Windows' directory: {}", e);
                    continue;
                }
            }

            summary.windows_partitions += 1;
            println!(" Partition Name : {}", partition.description);

            let scans = match scan_profiles(&mut volume, &self.config.artifacts) {
                Ok(scans) => scans,
                Err(e) => {
                    println!(" Failed to list Users subdirectories: {}", e);
                    continue;
                }
            };

            let mut extracted = 0;
            for scan in &scans {
                let report = extract_profile(&mut volume, scan, &summary.bundle.path);
                let mark = if scan.locations.is_empty() { "X" } else { "O" };
                println!("    User Name : {} (Outlook {})", scan.name, mark);
                for artifact in &report.artifacts {
                    println!("        -> {}", artifact.name);
                }
                extracted += report.artifacts.len();
                summary.artifacts.extend(report.artifacts);
            }
            println!(" Extracted : {}", extracted);
        }

        image.close();
        info!(
            bundle = %summary.bundle.name,
            partitions = summary.windows_partitions,
            artifacts = summary.artifacts.len(),
            "Image extracted"
        );
        Ok(summary)
    }

    // -------------------------------------------------------------------------
    // Normalize
    // -------------------------------------------------------------------------

    /// Read one store and write `<work_dir>/<store file name>.csv`
    #[instrument(skip_all, fields(store = %store.display()))]
    pub fn normalize_store(&self, store: &Path, work_dir: &Path) -> FfxResult<StoreSummary> {
        let store_open_error = |reason: String| FfxMailError::StoreOpen { path: store.to_path_buf(), reason };

        let file_name = store
            .file_name()
            .ok_or_else(|| store_open_error("Invalid store path".to_string()))?;
        audit::log_evidence_access("normalize_store", store, fs::metadata(store).ok().map(|m| m.len()));
        let mut mail_store = self.opener.open(store, work_dir).map_err(store_open_error)?;
        let contents = read_store(mail_store.as_mut()).map_err(store_open_error)?;
        debug!(
            account = %contents.source_account,
            folders = contents.folders.len(),
            messages = contents.message_count(),
            "Store read"
        );

        let options = NormalizeOptions::from(&self.config);
        let csv_path = work_dir.join(format!("{}.csv", file_name.to_string_lossy()));
        let mut writer = MailCsvWriter::create(&csv_path)?;
        let mut skipped = 0;
        for folder in &contents.folders {
            skipped += folder.skipped;
            for message in &folder.messages {
                writer.write(&normalize_message(message, &contents.source_account, folder.kind, &options))?;
            }
        }
        let messages = writer.finish()?;

        let csv_size = fs::metadata(&csv_path).map(|m| m.len()).unwrap_or(0);
        audit::log_data_export(&store.display().to_string(), &csv_path, csv_size);
        println!("{} -> {} (export {} E-mails)", store.display(), csv_path.display(), messages);

        Ok(StoreSummary { messages, skipped })
    }

    /// Normalize every store under the output root plus `direct_stores`
    ///
    /// Each directly supplied store gets its own bundle. A store that fails
    /// is reported and counted; the rest still run.
    pub fn normalize_all(&self, direct_stores: &[PathBuf]) -> FfxResult<NormalizeSummary> {
        let mut summary = NormalizeSummary::default();
        let mut done = HashSet::new();

        for store in direct_stores {
            let bundle = if store.is_file() {
                prepare_bundle(self.output_root(), store, std::slice::from_ref(store), self.config.digest)
            } else {
                Err(FfxMailError::StoreOpen { path: store.clone(), reason: "File not found".to_string() })
            };
            let outcome = bundle.and_then(|bundle| self.normalize_store(store, &bundle.path));
            self.tally(&mut summary, store, outcome);
            done.insert(canonical(store));
        }

        for store in discover_stores(self.output_root()) {
            if !done.insert(canonical(&store)) {
                continue;
            }
            let work_dir = store.parent().map(Path::to_path_buf).unwrap_or_default();
            let outcome = self.normalize_store(&store, &work_dir);
            self.tally(&mut summary, &store, outcome);
        }

        info!(stores = summary.stores, failed = summary.failed, messages = summary.messages, "Normalization complete");
        Ok(summary)
    }

    fn tally(&self, summary: &mut NormalizeSummary, store: &Path, outcome: FfxResult<StoreSummary>) {
        match outcome {
            Ok(result) => {
                summary.stores += 1;
                summary.messages += result.messages;
            }
            Err(e) => {
                warn!(store = %store.display(), error = %e, "Store skipped");
                println!(" {}", e);
                summary.failed += 1;
            }
        }
    }

    // -------------------------------------------------------------------------
    // Merge
    // -------------------------------------------------------------------------

    pub fn merge(&self) -> FfxResult<MergeSummary> {
        let output = self.config.merged_path();
        let summary = merge_csv_files(self.output_root(), &output)?;
        println!(
            "\n{} CSV files merged and sorted into '{}' ({} E-mails)\n",
            summary.files,
            output.display(),
            summary.rows
        );
        Ok(summary)
    }

    /// extract, normalize and merge in one pass
    pub fn run(&self, images: &[PathBuf]) -> FfxResult<MergeSummary> {
        self.extract_images(images)?;
        self.normalize_all(&[])?;
        self.merge()
    }
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Every `.ost`/`.pst` file under `root`, sorted, skipping export trees
pub fn discover_stores(root: &Path) -> Vec<PathBuf> {
    if !root.is_dir() {
        return Vec::new();
    }
    let mut stores: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| !is_export_tree(entry))
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| STORE_EXTENSIONS.iter().any(|s| e.eq_ignore_ascii_case(s)))
        })
        .collect();
    stores.sort();
    stores
}
