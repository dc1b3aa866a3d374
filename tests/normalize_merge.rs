//! End-to-end normalize + merge over a pffexport tree that already exists,
//! so the export tool itself is never launched.

use std::fs;
use std::path::Path;

use ffx_mail_lib::config::RunConfig;
use ffx_mail_lib::csv_io::{read_records, CSV_HEADER, UTF8_BOM};
use ffx_mail_lib::Session;
use tempfile::TempDir;

fn write_item(folder: &Path, item: &str, headers: &str, recipients: &str, body: &str) {
    let dir = folder.join(item);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("OutlookHeaders.txt"), headers).unwrap();
    fs::write(dir.join("Recipients.txt"), recipients).unwrap();
    fs::write(dir.join("Message.txt"), body).unwrap();
}

fn headers(delivery: &str, subject: &str, name: &str, email: &str) -> String {
    format!(
        "Delivery time:\t\t\t{}\nSubject:\t\t\t\t{}\nSender name:\t\t\t{}\nSender email address:\t\t{}\n",
        delivery, subject, name, email
    )
}

const TO_LEE: &str = "Display name:\t\tLee\nEmail address:\t\t'lee@corp.kr'\nRecipient type:\t\tTo\n";

#[test]
fn normalize_then_merge_builds_sorted_timeline() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("extracted_files");
    let profile = root.join("disk.E01-0123abcd").join("kim");
    fs::create_dir_all(&profile).unwrap();
    fs::write(profile.join("kim@corp.kr.ost"), b"!BDN").unwrap();

    let mailbox = profile.join("kim@corp.kr.ost.export").join("Root - Mailbox").join("IPM_SUBTREE");
    write_item(
        &mailbox.join("보낸 편지함"),
        "Message00001",
        &headers("Mar 01, 2024 00:00:00.000000000 UTC", "Status", "철수 김", "'kim@corp.kr'"),
        TO_LEE,
        "Done.\r\n\r\nFrom: Lee\r\nSent: Friday\r\nTo: Kim\r\nSubject: Status?\r\nHow is it going?",
    );
    write_item(
        &mailbox.join("Inbox"),
        "Message00002",
        &headers("Feb 01, 2024 00:00:00.000000000 UTC", "Status?", "Lee", "lee@corp.kr"),
        "Display name:\t\tKim\nEmail address:\t\tkim@corp.kr\nRecipient type:\t\tTo\n",
        "How   is it going?",
    );

    let config = RunConfig { output_root: root.clone(), utc_plus_nine: true, ..Default::default() };
    let session = Session::new(config);

    let normalized = session.normalize_all(&[]).unwrap();
    assert_eq!(normalized.stores, 1);
    assert_eq!(normalized.messages, 2);

    let per_store = read_records(&profile.join("kim@corp.kr.ost.csv")).unwrap();
    assert_eq!(per_store.len(), 2);
    let sent = per_store.iter().find(|r| r.folder_name == "보낸 편지함").unwrap();
    assert_eq!(sent.sender_name, "김철수");
    assert_eq!(sent.sender_email, "kim@corp.kr");
    assert_eq!(sent.receiver_emails, "lee@corp.kr");
    assert_eq!(sent.body, "Done.\n");
    assert_eq!(sent.delivery_time_unixtime, (1709251200 + 32400).to_string());

    let merged = session.merge().unwrap();
    assert_eq!(merged.files, 1);
    assert_eq!(merged.rows, 2);

    let merged_path = root.join("extract.csv");
    let bytes = fs::read(&merged_path).unwrap();
    assert!(bytes.starts_with(UTF8_BOM));
    assert!(String::from_utf8_lossy(&bytes).contains(&CSV_HEADER.join(",")));

    let rows = read_records(&merged_path).unwrap();
    let subjects: Vec<&str> = rows.iter().map(|r| r.subject.as_str()).collect();
    assert_eq!(subjects, vec!["Status?", "Status"]);
    assert_eq!(rows[0].folder_name, "받은 편지함");
    assert_eq!(rows[0].body, "How is it going?");
    assert!(rows.iter().all(|r| r.source_account == "'kim@corp.kr'"));

    // A second pass reuses the export and replaces the merged file
    session.normalize_all(&[]).unwrap();
    assert_eq!(session.merge().unwrap(), merged);
}
