//! Aggregator: merges every per-store CSV under the output root into one
//! timeline sorted by delivery time.

use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::csv_io::{read_records, write_records};
use crate::error::FfxResult;
use crate::store::is_export_tree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeSummary {
    /// Per-store CSV files merged
    pub files: usize,
    /// Data rows written
    pub rows: usize,
}

/// Every `*.csv` below `root` except `exclude` and export trees, sorted by path
pub fn discover_csv_files(root: &Path, exclude: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !is_export_tree(entry))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable path during CSV discovery");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
        })
        .filter(|path| !same_file(path, exclude))
        .collect();
    files.sort();
    files
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Concatenate, stable-sort by `delivery_time_unixtime` and write `output`
///
/// Rows with equal timestamps keep their discovery order. Any CSV with a
/// foreign header aborts the merge before `output` is touched.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn merge_csv_files(root: &Path, output: &Path) -> FfxResult<MergeSummary> {
    let files = if root.is_dir() {
        discover_csv_files(root, output)
    } else {
        Vec::new()
    };

    let mut rows = Vec::new();
    for file in &files {
        let records = read_records(file)?;
        debug!(file = %file.display(), rows = records.len(), "Merging");
        rows.extend(records);
    }

    rows.sort_by_key(|record| record.sort_key());
    let written = write_records(output, &rows)?;

    info!(files = files.len(), rows = written, output = %output.display(), "CSV files merged");
    Ok(MergeSummary { files: files.len(), rows: written })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csv_io::read_records;
    use crate::error::FfxMailError;
    use crate::normalize::MailRecord;
    use std::fs;
    use tempfile::TempDir;

    fn rows(times: &[&str], tag: &str) -> Vec<MailRecord> {
        times
            .iter()
            .map(|t| MailRecord {
                delivery_time_unixtime: t.to_string(),
                subject: format!("{}-{}", tag, t),
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn test_merge_sorts_across_files() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write_records(&root.join("a-1/p/x.ost.csv"), &rows(&["30", "10", "20"], "a")).unwrap();
        write_records(&root.join("b-2/p/y.pst.csv"), &rows(&["5"], "b")).unwrap();
        write_records(&root.join("c-3/z.pst.csv"), &[]).unwrap();
        fs::write(root.join("notes.txt"), "ignored").unwrap();

        let output = root.join("extract.csv");
        let summary = merge_csv_files(root, &output).unwrap();
        assert_eq!(summary, MergeSummary { files: 3, rows: 4 });

        let merged = read_records(&output).unwrap();
        let times: Vec<&str> = merged.iter().map(|r| r.delivery_time_unixtime.as_str()).collect();
        assert_eq!(times, vec!["5", "10", "20", "30"]);

        // Re-running excludes the previous output
        assert_eq!(merge_csv_files(root, &output).unwrap(), summary);
    }

    #[test]
    fn test_ties_and_missing_times_keep_encounter_order() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write_records(&root.join("a.csv"), &rows(&["7", "", "x"], "a")).unwrap();
        write_records(&root.join("b.csv"), &rows(&["7", "0"], "b")).unwrap();

        let output = root.join("extract.csv");
        merge_csv_files(root, &output).unwrap();
        let subjects: Vec<String> = read_records(&output).unwrap().into_iter().map(|r| r.subject).collect();
        assert_eq!(subjects, vec!["a-", "a-x", "b-0", "a-7", "b-7"]);
    }

    #[test]
    fn test_no_csv_files_gives_header_only_output() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("missing-root");
        let output = dir.path().join("extract.csv");

        let summary = merge_csv_files(&root, &output).unwrap();
        assert_eq!(summary, MergeSummary { files: 0, rows: 0 });
        assert!(read_records(&output).unwrap().is_empty());
    }

    #[test]
    fn test_foreign_csv_aborts_merge() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write_records(&root.join("good.csv"), &rows(&["1"], "g")).unwrap();
        fs::write(root.join("bad.csv"), "a,b\r\n1,2\r\n").unwrap();

        let output = root.join("extract.csv");
        assert!(matches!(
            merge_csv_files(root, &output),
            Err(FfxMailError::AggregationSchema { .. })
        ));
        assert!(!output.exists());
    }

    #[test]
    fn test_csv_attachments_in_export_trees_are_ignored() {
        let dir = TempDir::new().unwrap();
        let profile = dir.path().join("disk.E01-0123abcd").join("kim");
        fs::create_dir_all(&profile).unwrap();
        write_records(&profile.join("mail.ost.csv"), &rows(&["5", "3"], "m")).unwrap();

        for export in ["mail.ost.export", "mail.ost.partial.export"] {
            let attachments = profile
                .join(export)
                .join("Top of Personal Folders")
                .join("Inbox")
                .join("Message00001")
                .join("Attachments");
            fs::create_dir_all(&attachments).unwrap();
            fs::write(attachments.join("1_sales.csv"), "region,total\r\nSeoul,10\r\n").unwrap();
        }

        let output = dir.path().join("extract.csv");
        assert_eq!(discover_csv_files(dir.path(), &output), vec![profile.join("mail.ost.csv")]);

        let summary = merge_csv_files(dir.path(), &output).unwrap();
        assert_eq!(summary, MergeSummary { files: 1, rows: 2 });
        let times: Vec<String> = read_records(&output)
            .unwrap()
            .into_iter()
            .map(|r| r.delivery_time_unixtime)
            .collect();
        assert_eq!(times, vec!["3", "5"]);
    }
}
