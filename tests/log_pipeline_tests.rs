//! History bounds, forwarding, file mirroring and rotation.

use std::fs;
use std::path::Path;

use flux_sweeper::logging::{LogSettings, Logger};
use serde_json::json;
use tempfile::TempDir;

const ROTATION_MARKER: &str = "[SYSTEM] Log file reached maximum size and was rotated";

fn file_logger(dir: &TempDir, capacity: usize, rotate_bytes: u64, debug: bool) -> Logger {
    Logger::new(&LogSettings {
        debug,
        capacity,
        file: Some(dir.path().join("session.log")),
        rotate_bytes,
        clear_on_start: false,
    })
}

fn lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn history_is_bounded_oldest_first() {
    let logger = Logger::in_memory(3, false);
    for i in 0..5 {
        logger.record("TEST", &[format!("entry-{i}").into()]);
    }

    let messages: Vec<_> = logger.history().into_iter().map(|l| l.message).collect();
    assert_eq!(messages, vec!["entry-2", "entry-3", "entry-4"]);
}

#[test]
fn every_entry_reaches_history_file_and_subscribers_in_order() {
    let dir = TempDir::new().unwrap();
    let logger = file_logger(&dir, 100, u64::MAX, false);
    let mut rx = logger.subscribe();

    for i in 0..10 {
        logger.record(&format!("NODE-{}", i % 3), &[format!("entry-{i}").into()]);
    }
    logger.close();

    let history = logger.history();
    let file = lines(&dir.path().join("session.log"));
    assert_eq!(history.len(), 10);
    assert_eq!(file.len(), 10);

    for (i, (entry, written)) in history.iter().zip(&file).enumerate() {
        assert_eq!(entry.message, format!("entry-{i}"));
        assert!(written.starts_with('['));
        assert!(written.ends_with(&entry.line), "{written} vs {}", entry.line);
        assert_eq!(rx.try_recv().unwrap().line, entry.line);
    }
    assert!(rx.try_recv().is_err());
}

#[test]
fn debug_entries_are_dropped_entirely_when_disabled() {
    let dir = TempDir::new().unwrap();
    let logger = file_logger(&dir, 100, u64::MAX, false);
    let mut rx = logger.subscribe();

    logger.record_debug("API-n1", &["Running Apps:".into(), json!({ "status": "success" }).into()]);
    logger.close();

    assert!(logger.history().is_empty());
    assert!(rx.try_recv().is_err());
    assert!(lines(&dir.path().join("session.log")).is_empty());
}

#[test]
fn debug_entries_are_kept_when_enabled() {
    let logger = Logger::in_memory(10, true);
    logger.record_debug("API-n1", &["detail".into()]);
    assert_eq!(logger.history().len(), 1);
}

#[test]
fn secrets_never_reach_the_file() {
    let dir = TempDir::new().unwrap();
    let logger = file_logger(&dir, 100, u64::MAX, false);

    logger.record(
        "MAIN-n1",
        &["auth:".into(), json!({ "loggedIn": true, "zelidauth": "s3cr3t-value" }).into()],
    );
    logger.close();

    let content = fs::read_to_string(dir.path().join("session.log")).unwrap();
    assert!(!content.contains("s3cr3t-value"));
    assert!(content.contains("[REDACTED]"));
    assert!(!logger.history()[0].line.contains("s3cr3t-value"));
}

#[test]
fn rotation_moves_full_file_aside_and_replaces_stale_backup() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session.log");
    let backup = dir.path().join("session.log.old");
    let logger = file_logger(&dir, 1000, 400, false);

    // Fill until the first rotation happens.
    let mut i = 0;
    while !backup.exists() {
        logger.record("TEST", &[format!("first-wave-{i:04}").into()]);
        logger.close();
        i += 1;
        assert!(i < 500, "rotation never happened");
    }

    let current = lines(&path);
    assert_eq!(current.len(), 2);
    assert!(current[0].contains(ROTATION_MARKER));
    assert!(current[0].contains("session.log.old"));
    assert!(current[1].ends_with(&format!("first-wave-{:04}", i - 1)));

    let old = fs::read_to_string(&backup).unwrap();
    assert!(old.contains("first-wave-0000"));
    assert!(!old.contains(ROTATION_MARKER));
    assert!(old.len() as u64 >= 400);

    // Keep writing until the backup is replaced by the second rotation.
    let mut j = 0;
    while !fs::read_to_string(&backup).unwrap().contains(ROTATION_MARKER) {
        logger.record("TEST", &[format!("second-wave-{j:04}").into()]);
        logger.close();
        j += 1;
        assert!(j < 500, "second rotation never happened");
    }

    let old = fs::read_to_string(&backup).unwrap();
    assert!(!old.contains("first-wave-0000"), "prior backup must be deleted");
    assert!(lines(&backup)[0].contains(ROTATION_MARKER));
    assert!(lines(&path)[0].contains(ROTATION_MARKER));
    assert_eq!(logger.history().len(), i + j);
}

#[test]
fn failed_rotation_keeps_logging_in_place() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session.log");
    // A non-empty directory where the backup should go cannot be removed.
    let blocker = dir.path().join("session.log.old");
    fs::create_dir(&blocker).unwrap();
    fs::write(blocker.join("keep"), "x").unwrap();

    let logger = file_logger(&dir, 1000, 200, false);
    for i in 0..20 {
        logger.record("TEST", &[format!("entry-{i:02}").into()]);
    }
    logger.close();

    let content = fs::read_to_string(&path).unwrap();
    assert!(content.contains("Log rotation FAILED"));
    assert!(content.contains("entry-00"));
    assert!(content.contains("entry-19"));
    assert!(logger.file_logging_enabled());
    assert_eq!(logger.history().len(), 20);
    assert!(blocker.is_dir());
}

#[test]
fn unopenable_file_leaves_memory_pipeline_working() {
    let dir = TempDir::new().unwrap();
    // The log "file" is a directory.
    let logger = Logger::new(&LogSettings {
        debug: false,
        capacity: 10,
        file: Some(dir.path().to_path_buf()),
        rotate_bytes: 1024,
        clear_on_start: false,
    });

    logger.record("TEST", &["still here".into()]);
    assert!(!logger.file_logging_enabled());
    assert_eq!(logger.history()[0].message, "still here");
}
