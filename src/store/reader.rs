//! Folder resolution and message enumeration over any `MailStore`

use tracing::{debug, instrument, warn};

use super::{FolderKind, FolderRef, MailStore, StoreMessage, MAIL_FOLDERS, SENT_ITEMS};

/// Messages read from one logical folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderMessages {
    pub kind: FolderKind,
    pub messages: Vec<StoreMessage>,
    /// Messages listed by the store that could not be read
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreContents {
    /// Sender of the first sent message; empty when unknown
    pub source_account: String,
    /// Only folders that exist in the store
    pub folders: Vec<FolderMessages>,
}

impl StoreContents {
    pub fn message_count(&self) -> usize {
        self.folders.iter().map(|f| f.messages.len()).sum()
    }
}

/// Canonical name first, then the localized alternate
pub fn resolve_folder(store: &mut dyn MailStore, kind: FolderKind) -> Result<Option<FolderRef>, String> {
    if let Some(folder) = store.find_folder(kind.canonical)? {
        return Ok(Some(folder));
    }
    store.find_folder(kind.alternate)
}

/// Read every message of a logical folder; `Ok(None)` when the store lacks it
pub fn read_folder(store: &mut dyn MailStore, kind: FolderKind) -> Result<Option<FolderMessages>, String> {
    let folder = match resolve_folder(store, kind)? {
        Some(folder) => folder,
        None => {
            debug!(folder = kind.canonical, "Folder not present");
            return Ok(None);
        }
    };

    let mut messages = Vec::new();
    let mut skipped = 0;
    for message in store.messages(folder)? {
        match store.read_message(message) {
            Ok(m) => messages.push(m),
            Err(e) => {
                warn!(folder = kind.canonical, error = %e, "Skipping unreadable message");
                skipped += 1;
            }
        }
    }

    debug!(folder = kind.canonical, messages = messages.len(), skipped, "Folder read");
    Ok(Some(FolderMessages { kind, messages, skipped }))
}

/// Sender address of the first message in the sent folder (either name)
///
/// Each name is tried in turn until one yields a message.
pub fn source_account(store: &mut dyn MailStore) -> Result<String, String> {
    for name in [SENT_ITEMS.canonical, SENT_ITEMS.alternate] {
        let Some(folder) = store.find_folder(name)? else {
            continue;
        };
        let Some(first) = store.messages(folder)?.into_iter().next() else {
            continue;
        };
        let message = store.read_message(first)?;
        return Ok(message.sender_email.unwrap_or_default());
    }
    Ok(String::new())
}

/// Source account plus all six mail folders
#[instrument(skip_all)]
pub fn read_store(store: &mut dyn MailStore) -> Result<StoreContents, String> {
    let source_account = source_account(store).unwrap_or_else(|e| {
        warn!(error = %e, "Unable to determine source account");
        String::new()
    });

    let mut folders = Vec::new();
    for kind in MAIL_FOLDERS {
        if let Some(folder) = read_folder(store, kind)? {
            folders.push(folder);
        }
    }

    Ok(StoreContents { source_account, folders })
}
