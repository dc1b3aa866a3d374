//! Store Record Reader
//!
//! Outlook OST/PST parsing sits behind two traits so the rest of the tool
//! never depends on how a store is decoded:
//! - `StoreOpener` turns a store file into a `MailStore`
//! - `MailStore` resolves folders and yields messages in store order
//!
//! `reader` holds the folder-resolution and source-account logic;
//! `pffexport` is the shipped backend (libpff's export tool).

pub mod pffexport;
pub mod reader;

use chrono::{DateTime, Utc};
use std::path::Path;

pub use pffexport::{is_export_tree, PffExportOpener};
pub use reader::{read_store, resolve_folder, source_account, FolderMessages, StoreContents};

// =============================================================================
// Store model
// =============================================================================

/// Opaque folder handle issued by a `MailStore`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FolderRef(pub usize);

/// Opaque message handle issued by a `MailStore`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef(pub usize);

/// One message as stored; nothing here is cleaned up yet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreMessage {
    pub sender_email: Option<String>,
    pub sender_name: Option<String>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    /// Delivery time as recorded by the store (UTC)
    pub delivery_time: Option<DateTime<Utc>>,
    pub attachments: Vec<String>,
}

pub trait MailStore {
    /// Top-level mail folder by exact name; `Ok(None)` when absent
    fn find_folder(&mut self, name: &str) -> Result<Option<FolderRef>, String>;

    /// Messages of a folder in store order
    fn messages(&mut self, folder: FolderRef) -> Result<Vec<MessageRef>, String>;

    fn read_message(&mut self, message: MessageRef) -> Result<StoreMessage, String>;
}

pub trait StoreOpener {
    /// Open `store`; backends may keep working files under `work_dir`
    fn open(&self, store: &Path, work_dir: &Path) -> Result<Box<dyn MailStore>, String>;
}

// =============================================================================
// Logical folders
// =============================================================================

/// A mail folder as Outlook names it in English and Korean installs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FolderKind {
    pub canonical: &'static str,
    pub alternate: &'static str,
    /// Value written to the `folder_name` column
    pub label: &'static str,
}

pub const INBOX: FolderKind = FolderKind { canonical: "Inbox", alternate: "받은 편지함", label: "받은 편지함" };
pub const OUTBOX: FolderKind = FolderKind { canonical: "Outbox", alternate: "보낼 편지함", label: "보낼 편지함" };
pub const SENT_ITEMS: FolderKind = FolderKind { canonical: "Sent Items", alternate: "보낸 편지함", label: "보낸 편지함" };
pub const DELETED_ITEMS: FolderKind = FolderKind { canonical: "Deleted Items", alternate: "삭제된 항목", label: "삭제된 항목" };
pub const DRAFTS: FolderKind = FolderKind { canonical: "Drafts", alternate: "임시 보관함", label: "임시 보관함" };
pub const JUNK_EMAIL: FolderKind = FolderKind { canonical: "Junk Email", alternate: "정크 메일", label: "정크 메일" };

/// Folders read from every store, in output order
pub const MAIL_FOLDERS: [FolderKind; 6] = [INBOX, OUTBOX, SENT_ITEMS, DELETED_ITEMS, DRAFTS, JUNK_EMAIL];
