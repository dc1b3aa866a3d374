//! `MailStore` backed by libpff's `pffexport` tool
//!
//! The store is exported once to a text tree and read back from disk:
//!
//! ```text
//! <target>.export/
//!   Top of Personal Folders/            (PST; OSTs use Root - Mailbox/IPM_SUBTREE)
//!     Inbox/
//!       Message00001/
//!         OutlookHeaders.txt
//!         Recipients.txt
//!         Message.txt | Message.html
//!         Attachments/1_report.pdf
//! ```
//!
//! The tool writes into `<target>.partial.export`, which is renamed to
//! `<target>.export` only after a clean exit. An existing `<target>.export`
//! is therefore always complete and is reused on later runs.

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;
use tracing::{debug, info, instrument, trace, warn};
use walkdir::DirEntry;

use super::{FolderRef, MailStore, MessageRef, StoreMessage, StoreOpener};

/// Suffix pffexport appends to its target
const EXPORT_DIR_SUFFIX: &str = ".export";
const STAGING_SUFFIX: &str = ".partial";
const HEADERS_FILE: &str = "OutlookHeaders.txt";
const RECIPIENTS_FILE: &str = "Recipients.txt";
const TEXT_BODY_FILE: &str = "Message.txt";
const HTML_BODY_FILE: &str = "Message.html";
const ATTACHMENTS_DIR: &str = "Attachments";

/// Mailbox roots in the order they are tried; the export root is the fallback
const MAILBOX_ROOTS: [&str; 4] = [
    "Top of Personal Folders",
    "Top of Outlook data file",
    "Root - Mailbox/IPM_SUBTREE",
    "Top of Information Store",
];

/// Directory written by pffexport (finished or staged); walks over the output
/// root prune these so attachments are never taken for stores or CSVs
pub fn is_export_tree(entry: &DirEntry) -> bool {
    entry.file_type().is_dir() && entry.file_name().to_string_lossy().ends_with(EXPORT_DIR_SUFFIX)
}

// =============================================================================
// Opener
// =============================================================================

pub struct PffExportOpener {
    executable: PathBuf,
}

impl PffExportOpener {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self { executable: executable.into() }
    }

    /// Run the export unless a completed `<target>.export` is already there
    fn export(&self, store: &Path, target: &Path) -> Result<PathBuf, String> {
        let export_dir = PathBuf::from(format!("{}{}", target.display(), EXPORT_DIR_SUFFIX));
        if export_dir.is_dir() {
            debug!(export = %export_dir.display(), "Reusing existing export");
            return Ok(export_dir);
        }

        let staging_target = PathBuf::from(format!("{}{}", target.display(), STAGING_SUFFIX));
        let staging_dir = PathBuf::from(format!("{}{}", staging_target.display(), EXPORT_DIR_SUFFIX));
        if staging_dir.exists() {
            debug!(staging = %staging_dir.display(), "Removing interrupted export");
            remove_staging(&staging_dir)?;
        }

        info!(store = %store.display(), tool = %self.executable.display(), "Exporting mail store");
        let output = Command::new(&self.executable)
            .args(["-q", "-m", "items", "-f", "text", "-t"])
            .arg(&staging_target)
            .arg(store)
            .output()
            .map_err(|e| format!("Unable to run {}: {}", self.executable.display(), e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if let Err(e) = remove_staging(&staging_dir) {
                warn!(error = %e, "Failed export left behind");
            }
            return Err(format!(
                "{} exited with {}: {}",
                self.executable.display(),
                output.status,
                stderr.trim()
            ));
        }
        if !staging_dir.is_dir() {
            return Err(format!("Export produced no {} directory", staging_dir.display()));
        }
        fs::rename(&staging_dir, &export_dir).map_err(|e| {
            format!("Unable to move {} into place: {}", staging_dir.display(), e)
        })?;
        Ok(export_dir)
    }
}

fn remove_staging(staging_dir: &Path) -> Result<(), String> {
    match fs::remove_dir_all(staging_dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(format!("Unable to remove {}: {}", staging_dir.display(), e)),
    }
}

impl StoreOpener for PffExportOpener {
    #[instrument(skip_all, fields(store = %store.display()))]
    fn open(&self, store: &Path, work_dir: &Path) -> Result<Box<dyn MailStore>, String> {
        if !store.is_file() {
            return Err("File not found".to_string());
        }
        let file_name = store.file_name().ok_or("Invalid store path")?;
        fs::create_dir_all(work_dir)
            .map_err(|e| format!("Unable to create {}: {}", work_dir.display(), e))?;

        let export_dir = self.export(store, &work_dir.join(file_name))?;
        Ok(Box::new(ExportedStore::open(&export_dir)?))
    }
}

// =============================================================================
// Exported tree
// =============================================================================

pub struct ExportedStore {
    mailbox_root: PathBuf,
    folders: Vec<PathBuf>,
    messages: Vec<PathBuf>,
}

impl ExportedStore {
    /// Read an export tree that already exists on disk
    pub fn open(export_dir: &Path) -> Result<Self, String> {
        if !export_dir.is_dir() {
            return Err(format!("Export directory {} not found", export_dir.display()));
        }
        let mailbox_root = MAILBOX_ROOTS
            .iter()
            .map(|root| export_dir.join(root))
            .find(|candidate| candidate.is_dir())
            .unwrap_or_else(|| export_dir.to_path_buf());
        debug!(root = %mailbox_root.display(), "Mailbox root");

        Ok(Self { mailbox_root, folders: Vec::new(), messages: Vec::new() })
    }
}

impl MailStore for ExportedStore {
    fn find_folder(&mut self, name: &str) -> Result<Option<FolderRef>, String> {
        let path = self.mailbox_root.join(name);
        if !path.is_dir() {
            return Ok(None);
        }
        self.folders.push(path);
        Ok(Some(FolderRef(self.folders.len() - 1)))
    }

    fn messages(&mut self, folder: FolderRef) -> Result<Vec<MessageRef>, String> {
        let path = self.folders.get(folder.0).ok_or("Unknown folder handle")?.clone();
        let entries = fs::read_dir(&path)
            .map_err(|e| format!("Unable to list {}: {}", path.display(), e))?;

        let mut items: Vec<(u64, String, PathBuf)> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| format!("Unable to list {}: {}", path.display(), e))?;
            let item = entry.path();
            if !item.join(HEADERS_FILE).is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            items.push((item_number(&name), name, item));
        }
        // Items are numbered in store order; the prefix (Message, Meeting, ...) varies
        items.sort();

        trace!(folder = %path.display(), items = items.len(), "Listed folder");
        Ok(items
            .into_iter()
            .map(|(_, _, item)| {
                self.messages.push(item);
                MessageRef(self.messages.len() - 1)
            })
            .collect())
    }

    fn read_message(&mut self, message: MessageRef) -> Result<StoreMessage, String> {
        let dir = self.messages.get(message.0).ok_or("Unknown message handle")?;
        read_message_dir(dir)
    }
}

/// Trailing decimal number of an item directory name (`Message00042` -> 42)
fn item_number(name: &str) -> u64 {
    let digits: String = name
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse().unwrap_or(u64::MAX)
}

// =============================================================================
// Item parsing
// =============================================================================

fn read_text(path: &Path) -> Result<Option<String>, String> {
    if !path.is_file() {
        return Ok(None);
    }
    let bytes = fs::read(path).map_err(|e| format!("Unable to read {}: {}", path.display(), e))?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(Some(text.trim_start_matches('\u{feff}').to_string()))
}

/// `Key:<tabs>Value` lines
fn header_fields(text: &str) -> impl Iterator<Item = (&str, &str)> {
    text.lines().filter_map(|line| {
        let (key, value) = line.split_once(':')?;
        Some((key.trim(), value.trim()))
    })
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// `Jan 05, 2011 10:03:24.000000000 UTC`, or RFC 3339
pub(crate) fn parse_export_time(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    let naive = value.strip_suffix(" UTC").unwrap_or(value);
    if let Ok(parsed) = NaiveDateTime::parse_from_str(naive, "%b %d, %Y %H:%M:%S%.f") {
        return Some(parsed.and_utc());
    }
    DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.with_timezone(&Utc))
}

#[derive(Default)]
struct Recipients {
    to: Vec<String>,
    cc: Vec<String>,
    bcc: Vec<String>,
}

/// Blank-line separated blocks, one per recipient
fn parse_recipients(text: &str) -> Recipients {
    let mut recipients = Recipients::default();
    for block in text.replace("\r\n", "\n").split("\n\n") {
        let mut display_name = None;
        let mut email = None;
        let mut kind = None;
        for (key, value) in header_fields(block) {
            match key {
                "Display name" => display_name = non_empty(value),
                "Email address" => email = non_empty(value),
                "Recipient type" => kind = Some(value.to_ascii_uppercase()),
                _ => {}
            }
        }
        let Some(address) = email.or(display_name) else {
            continue;
        };
        match kind.as_deref() {
            Some("CC") => recipients.cc.push(address),
            Some("BCC") => recipients.bcc.push(address),
            _ => recipients.to.push(address),
        }
    }
    recipients
}

/// Compiled once on first use via OnceLock
fn html_patterns() -> &'static (Regex, Regex, Regex) {
    static PATTERNS: OnceLock<(Regex, Regex, Regex)> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        (
            Regex::new(r"(?is)<(style|script|head)[^>]*>.*?</(style|script|head)>").expect("Invalid hidden-block regex"),
            Regex::new(r"(?i)<br\s*/?>|</p\s*>|</div\s*>|</tr\s*>").expect("Invalid line-break regex"),
            Regex::new(r"<[^>]*>").expect("Invalid tag regex"),
        )
    })
}

fn html_to_text(html: &str) -> String {
    let (hidden, block, tag) = html_patterns();

    let text = hidden.replace_all(html, "");
    let text = block.replace_all(&text, "\n");
    let text = tag.replace_all(&text, "");
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// `1_report.pdf` -> `report.pdf`
fn attachment_display_name(file_name: &str) -> String {
    match file_name.split_once('_') {
        Some((index, rest)) if !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()) => rest.to_string(),
        _ => file_name.to_string(),
    }
}

fn read_attachments(dir: &Path) -> Result<Vec<String>, String> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names: Vec<String> = fs::read_dir(dir)
        .map_err(|e| format!("Unable to list {}: {}", dir.display(), e))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .collect();
    names.sort_by_key(|name| (item_number_prefix(name), name.clone()));
    Ok(names.iter().map(|name| attachment_display_name(name)).collect())
}

fn item_number_prefix(name: &str) -> u64 {
    name.split('_').next().and_then(|n| n.parse().ok()).unwrap_or(u64::MAX)
}

/// Parse one exported item directory
pub(crate) fn read_message_dir(dir: &Path) -> Result<StoreMessage, String> {
    let headers = read_text(&dir.join(HEADERS_FILE))?
        .ok_or_else(|| format!("{} has no {}", dir.display(), HEADERS_FILE))?;

    let mut message = StoreMessage::default();
    for (key, value) in header_fields(&headers) {
        match key {
            "Delivery time" => message.delivery_time = parse_export_time(value),
            "Subject" => message.subject = non_empty(value),
            "Sender name" => message.sender_name = non_empty(value),
            "Sender email address" => message.sender_email = non_empty(value),
            _ => {}
        }
    }

    if let Some(text) = read_text(&dir.join(RECIPIENTS_FILE))? {
        let recipients = parse_recipients(&text);
        message.to = recipients.to;
        message.cc = recipients.cc;
        message.bcc = recipients.bcc;
    }

    message.body = match read_text(&dir.join(TEXT_BODY_FILE))? {
        Some(text) => Some(text),
        None => read_text(&dir.join(HTML_BODY_FILE))?.map(|html| html_to_text(&html)),
    };
    message.attachments = read_attachments(&dir.join(ATTACHMENTS_DIR))?;

    Ok(message)
}
