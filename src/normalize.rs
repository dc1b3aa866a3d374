//! Record Normalizer
//!
//! Turns a raw `StoreMessage` into the flat `MailRecord` written to CSV.
//! Each cleanup rule is its own pure function so it can be tested and
//! reasoned about alone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::config::RunConfig;
use crate::store::{FolderKind, StoreMessage};

/// Offset applied to emitted timestamps when UTC+9 output is requested
pub const UTC_PLUS_NINE_SECONDS: i64 = 9 * 3600;

const REPLY_HEADER_START: &str = "From:";
const REPLY_HEADER_FOLLOWERS: [&str; 3] = ["Sent:", "To:", "Subject:"];
const REPLY_LOOKAHEAD_LINES: usize = 3;

// =============================================================================
// Output record
// =============================================================================

/// One CSV row; field order is the column order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailRecord {
    pub source_account: String,
    pub folder_name: String,
    pub sender_email: String,
    pub sender_name: String,
    pub receiver_emails: String,
    pub cc_emails: String,
    pub bcc_emails: String,
    pub delivery_time_unixtime: String,
    pub subject: String,
    pub attachments: String,
    pub body: String,
}

impl MailRecord {
    /// Sort key; missing or unparseable timestamps sort as 0
    pub fn sort_key(&self) -> i64 {
        self.delivery_time_unixtime.trim().parse().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeOptions {
    pub utc_plus_nine: bool,
    pub body_char_limit: usize,
    pub compact_sender_names: bool,
}

impl From<&RunConfig> for NormalizeOptions {
    fn from(config: &RunConfig) -> Self {
        Self {
            utc_plus_nine: config.utc_plus_nine,
            body_char_limit: config.body_char_limit,
            compact_sender_names: config.compact_sender_names,
        }
    }
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        NormalizeOptions::from(&RunConfig::default())
    }
}

// =============================================================================
// Transforms
// =============================================================================

/// Fixed display label for a folder, whichever name the store used
pub fn canonical_folder_label(kind: FolderKind) -> &'static str {
    kind.label
}

/// Swap a two-token name whose parts are two and one characters long
///
/// `"철수 김"` becomes `"김 철수"`; any other shape is returned unchanged.
pub fn swap_two_token_name(name: &str) -> String {
    let tokens: Vec<&str> = name.split_whitespace().collect();
    match tokens.as_slice() {
        [first, second] if first.chars().count() == 2 && second.chars().count() == 1 => {
            format!("{} {}", second, first)
        }
        _ => name.to_string(),
    }
}

pub fn remove_spaces(name: &str) -> String {
    name.replace(' ', "")
}

/// `\r\n` and lone `\r` become `\n`
pub fn normalize_line_breaks(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Where a reply header was found, and whether the following lines confirm it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyCut {
    pub line: usize,
    /// A `Sent:`/`To:`/`Subject:` line follows within three lines
    pub confirmed: bool,
}

/// First line starting with `From:`
pub fn find_reply_header(lines: &[&str]) -> Option<ReplyCut> {
    let line = lines.iter().position(|l| l.starts_with(REPLY_HEADER_START))?;
    let confirmed = lines
        .iter()
        .skip(line + 1)
        .take(REPLY_LOOKAHEAD_LINES)
        .any(|l| REPLY_HEADER_FOLLOWERS.iter().any(|prefix| l.starts_with(prefix)));
    Some(ReplyCut { line, confirmed })
}

/// Keep only the newest part of a body: everything before the first `From:` line
pub fn trim_quoted_reply(body: &str) -> String {
    let normalized = normalize_line_breaks(body);
    let lines: Vec<&str> = normalized.lines().collect();
    match find_reply_header(&lines) {
        Some(cut) => {
            trace!(line = cut.line, confirmed = cut.confirmed, "Quoted reply trimmed");
            lines[..cut.line].join("\n")
        }
        None => lines.join("\n"),
    }
}

/// Runs of spaces become a single space
pub fn collapse_spaces(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous_space = false;
    for c in text.chars() {
        if c == ' ' {
            if !previous_space {
                out.push(c);
            }
            previous_space = true;
        } else {
            out.push(c);
            previous_space = false;
        }
    }
    out
}

/// Unix seconds, optionally shifted to UTC+9 wall-clock
pub fn adjust_timestamp(time: DateTime<Utc>, utc_plus_nine: bool) -> i64 {
    let seconds = time.timestamp();
    if utc_plus_nine {
        seconds + UTC_PLUS_NINE_SECONDS
    } else {
        seconds
    }
}

/// First `limit` characters (not bytes)
pub fn cap_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

pub fn strip_quotes(text: &str) -> &str {
    text.trim_matches('\'')
}

/// `;`-joined list with quotes stripped from each address and from the whole
pub fn join_addresses(addresses: &[String]) -> String {
    let joined = addresses
        .iter()
        .map(|a| strip_quotes(a.trim()))
        .collect::<Vec<_>>()
        .join(";");
    strip_quotes(joined.trim()).to_string()
}

/// `, `-joined attachment names, dropping empty ones
pub fn join_attachments(names: &[String]) -> String {
    names
        .iter()
        .filter(|n| !n.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Cap, trim the quoted reply, then collapse spaces
pub fn clean_body(body: &str, char_limit: usize) -> String {
    collapse_spaces(&trim_quoted_reply(cap_chars(body, char_limit)))
}

pub fn clean_sender_name(name: &str, compact: bool) -> String {
    let swapped = swap_two_token_name(name);
    if compact {
        remove_spaces(&swapped)
    } else {
        swapped
    }
}

// =============================================================================
// Record assembly
// =============================================================================

pub fn normalize_message(
    message: &StoreMessage,
    source_account: &str,
    folder: FolderKind,
    options: &NormalizeOptions,
) -> MailRecord {
    MailRecord {
        source_account: source_account.to_string(),
        folder_name: canonical_folder_label(folder).to_string(),
        sender_email: message
            .sender_email
            .as_deref()
            .map(|e| strip_quotes(e).to_string())
            .unwrap_or_default(),
        sender_name: message
            .sender_name
            .as_deref()
            .map(|n| clean_sender_name(n, options.compact_sender_names))
            .unwrap_or_default(),
        receiver_emails: join_addresses(&message.to),
        cc_emails: join_addresses(&message.cc),
        bcc_emails: join_addresses(&message.bcc),
        delivery_time_unixtime: message
            .delivery_time
            .map(|t| adjust_timestamp(t, options.utc_plus_nine).to_string())
            .unwrap_or_default(),
        subject: message.subject.clone().unwrap_or_default(),
        attachments: join_attachments(&message.attachments),
        body: message
            .body
            .as_deref()
            .map(|b| clean_body(b, options.body_char_limit))
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{INBOX, SENT_ITEMS};
    use chrono::TimeZone;

    #[test]
    fn test_folder_labels() {
        assert_eq!(canonical_folder_label(SENT_ITEMS), "보낸 편지함");
        assert_eq!(canonical_folder_label(INBOX), "받은 편지함");
    }

    #[test]
    fn test_name_swap() {
        assert_eq!(swap_two_token_name("철수 김"), "김 철수");
        assert_eq!(swap_two_token_name("김 철수"), "김 철수");
        assert_eq!(swap_two_token_name("Kim Cheolsu"), "Kim Cheolsu");
        assert_eq!(swap_two_token_name("김철수"), "김철수");
        assert_eq!(swap_two_token_name("a b c"), "a b c");
        assert_eq!(clean_sender_name("철수 김", true), "김철수");
        assert_eq!(clean_sender_name("Kim Cheolsu", false), "Kim Cheolsu");
    }

    #[test]
    fn test_reply_trim_confirmed_and_unconfirmed() {
        let confirmed = "Thanks!\r\n\r\nFrom: Lee\r\nSent: Monday\r\nTo: Kim\r\nSubject: Re: x\r\nold text";
        assert_eq!(trim_quoted_reply(confirmed), "Thanks!\n");

        let lines = ["a", "From: someone", "b", "c", "d", "Sent: late"];
        assert_eq!(find_reply_header(&lines), Some(ReplyCut { line: 1, confirmed: false }));
        assert_eq!(trim_quoted_reply(&lines.join("\n")), "a");

        assert_eq!(trim_quoted_reply("no header\nhere"), "no header\nhere");
        assert_eq!(trim_quoted_reply("From: first line"), "");
        // Indented "From:" is not a header
        assert_eq!(trim_quoted_reply("x\n From: y"), "x\n From: y");
    }

    #[test]
    fn test_collapse_spaces_is_idempotent() {
        assert_eq!(collapse_spaces("a  b     c"), "a b c");
        assert_eq!(collapse_spaces("  lead"), " lead");
        assert_eq!(collapse_spaces("tab\t\tkept"), "tab\t\tkept");
        for s in ["a  b", "   ", "x y", "한  글   "] {
            let once = collapse_spaces(s);
            assert_eq!(collapse_spaces(&once), once);
            assert!(!once.contains("  "));
        }
    }

    #[test]
    fn test_timestamp_shift() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(adjust_timestamp(t, false), 1709251200);
        assert_eq!(adjust_timestamp(t, true), 1709251200 + 32400);
    }

    #[test]
    fn test_cap_counts_characters() {
        assert_eq!(cap_chars("hello", 3), "hel");
        assert_eq!(cap_chars("한글입니다", 2), "한글");
        assert_eq!(cap_chars("short", 2000), "short");
        let long: String = "가".repeat(2500);
        assert_eq!(cap_chars(&long, 2000).chars().count(), 2000);
    }

    #[test]
    fn test_cap_happens_before_reply_trim() {
        // The reply header sits past the cap, so only the cap applies
        let body = format!("{}\nFrom: x\nSent: y", "a".repeat(10));
        assert_eq!(clean_body(&body, 5), "aaaaa");
        assert_eq!(clean_body(&body, 2000), "a".repeat(10));
    }

    #[test]
    fn test_quote_stripping_and_joins() {
        assert_eq!(strip_quotes("'kim@corp.kr'"), "kim@corp.kr");
        assert_eq!(strip_quotes("o'brien@x.ie"), "o'brien@x.ie");
        let to = vec!["'a@x'".to_string(), "b@x".to_string()];
        assert_eq!(join_addresses(&to), "a@x;b@x");
        assert_eq!(join_addresses(&[]), "");
        let files = vec!["a.pdf".to_string(), String::new(), "b.xlsx".to_string()];
        assert_eq!(join_attachments(&files), "a.pdf, b.xlsx");
    }

    #[test]
    fn test_normalize_message() {
        let message = StoreMessage {
            sender_email: Some("'kim@corp.kr'".into()),
            sender_name: Some("철수 김".into()),
            to: vec!["lee@corp.kr".into(), "park@corp.kr".into()],
            cc: vec![],
            bcc: vec!["'audit@corp.kr'".into()],
            subject: Some("회의  일정".into()),
            body: Some("See  you\r\nFrom: lee\r\nTo: kim".into()),
            delivery_time: Some(Utc.with_ymd_and_hms(2011, 1, 5, 10, 3, 24).unwrap()),
            attachments: vec!["agenda.docx".into()],
        };
        let options = NormalizeOptions { utc_plus_nine: true, ..Default::default() };
        let record = normalize_message(&message, "me@corp.kr", INBOX, &options);

        assert_eq!(record.source_account, "me@corp.kr");
        assert_eq!(record.folder_name, "받은 편지함");
        assert_eq!(record.sender_email, "kim@corp.kr");
        assert_eq!(record.sender_name, "김철수");
        assert_eq!(record.receiver_emails, "lee@corp.kr;park@corp.kr");
        assert_eq!(record.cc_emails, "");
        assert_eq!(record.bcc_emails, "audit@corp.kr");
        assert_eq!(record.delivery_time_unixtime, (1294221804 + 32400).to_string());
        assert_eq!(record.subject, "회의  일정");
        assert_eq!(record.attachments, "agenda.docx");
        assert_eq!(record.body, "See you");
    }

    #[test]
    fn test_absent_fields_are_empty() {
        let record = normalize_message(&StoreMessage::default(), "", INBOX, &NormalizeOptions::default());
        assert_eq!(record.delivery_time_unixtime, "");
        assert_eq!(record.body, "");
        assert_eq!(record.sort_key(), 0);
    }
}
