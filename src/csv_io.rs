//! Canonical mail CSV: UTF-8 with BOM, fixed header, CRLF records
//!
//! The BOM lets spreadsheet tools pick up the Korean folder labels without
//! an import dialog.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

use crate::error::{FfxMailError, FfxResult};
use crate::normalize::MailRecord;

pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Column order of every CSV this tool writes or accepts
pub const CSV_HEADER: [&str; 11] = [
    "source_account",
    "folder_name",
    "sender_email",
    "sender_name",
    "receiver_emails",
    "cc_emails",
    "bcc_emails",
    "delivery_time_unixtime",
    "subject",
    "attachments",
    "body",
];

/// Writer that has already emitted the BOM and header row
pub struct MailCsvWriter {
    writer: csv::Writer<BufWriter<File>>,
    rows: usize,
}

impl MailCsvWriter {
    pub fn create(path: &Path) -> FfxResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = BufWriter::new(File::create(path)?);
        file.write_all(UTF8_BOM)?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::CRLF)
            .from_writer(file);
        writer.write_record(CSV_HEADER)?;
        Ok(Self { writer, rows: 0 })
    }

    pub fn write(&mut self, record: &MailRecord) -> FfxResult<()> {
        self.writer.serialize(record)?;
        self.rows += 1;
        Ok(())
    }

    /// Flush everything to disk; returns the number of data rows
    pub fn finish(mut self) -> FfxResult<usize> {
        self.writer.flush()?;
        Ok(self.rows)
    }
}

/// Write a whole CSV in one go
pub fn write_records(path: &Path, records: &[MailRecord]) -> FfxResult<usize> {
    let mut writer = MailCsvWriter::create(path)?;
    for record in records {
        writer.write(record)?;
    }
    writer.finish()
}

/// Read a CSV written by this tool (BOM optional)
///
/// A header that is not exactly the canonical one is a schema error; a row
/// that does not fit the header is a CSV error.
pub fn read_records(path: &Path) -> FfxResult<Vec<MailRecord>> {
    let bytes = fs::read(path)?;
    let content = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(content);

    let headers = reader.headers()?.clone();
    if headers.iter().ne(CSV_HEADER.iter().copied()) {
        return Err(FfxMailError::AggregationSchema {
            path: path.to_path_buf(),
            found: headers.iter().map(String::from).collect(),
        });
    }

    let records = reader
        .deserialize::<MailRecord>()
        .collect::<Result<Vec<_>, _>>()?;
    debug!(path = %path.display(), rows = records.len(), "Read CSV");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(time: &str, body: &str) -> MailRecord {
        MailRecord {
            folder_name: "받은 편지함".into(),
            delivery_time_unixtime: time.into(),
            body: body.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_file_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("out.csv");
        assert_eq!(write_records(&path, &[record("5", "hi")]).unwrap(), 1);

        let bytes = fs::read(&path).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
        let text = String::from_utf8(bytes[3..].to_vec()).unwrap();
        assert!(text.starts_with("source_account,folder_name,sender_email,"));
        assert!(text.contains(",body\r\n"));
        assert!(text.ends_with(",5,,,hi\r\n"));
    }

    #[test]
    fn test_multiline_body_survives() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let rows = vec![record("1", "line one\nline \"two\", end"), record("", "")];
        write_records(&path, &rows).unwrap();
        assert_eq!(read_records(&path).unwrap(), rows);
    }

    #[test]
    fn test_header_only_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.csv");
        assert_eq!(write_records(&path, &[]).unwrap(), 0);
        assert!(read_records(&path).unwrap().is_empty());
    }

    #[test]
    fn test_foreign_header_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("other.csv");
        fs::write(&path, "name,value\r\nx,1\r\n").unwrap();
        match read_records(&path) {
            Err(FfxMailError::AggregationSchema { found, .. }) => assert_eq!(found, vec!["name", "value"]),
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_short_row_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.csv");
        fs::write(&path, format!("{}\r\na,b\r\n", CSV_HEADER.join(","))).unwrap();
        assert!(matches!(read_records(&path), Err(FfxMailError::Csv(_))));
    }
}
