//! Integration tests for the migration run.
//!
//! The buffer and durable store are in-memory mocks so these tests need
//! neither Redis nor a durable store service. File backups go to a
//! temporary directory.

use async_trait::async_trait;
use memflush_common::{MemflushError, Result, Turn, TurnPair};
use memflush_memory::{BufferStore, DurableSink, DurableStore, FileBackup, parse_entries};
use memflush_migrator::{BackupMedium, MigrationError, MigrationOutcome, Migrator};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ============================================================================
// Mocks
// ============================================================================

/// Buffer holding raw list entries, counting fetches and clears.
struct MockBuffer {
    entries: Vec<String>,
    unreachable: bool,
    fail_clear: bool,
    clears: AtomicUsize,
}

impl MockBuffer {
    fn with_turns(turns: &[Turn]) -> Self {
        let entries = turns
            .iter()
            .map(|t| serde_json::to_string(t).unwrap())
            .collect();
        Self::with_raw(entries)
    }

    fn with_raw(entries: Vec<String>) -> Self {
        Self {
            entries,
            unreachable: false,
            fail_clear: false,
            clears: AtomicUsize::new(0),
        }
    }

    fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BufferStore for MockBuffer {
    async fn fetch_turns(&self, _subject_id: &str) -> Result<Vec<Turn>> {
        if self.unreachable {
            return Err(MemflushError::Buffer("connection refused".into()));
        }
        Ok(parse_entries(&self.entries))
    }

    async fn clear(&self, _subject_id: &str) -> Result<()> {
        if self.fail_clear {
            return Err(MemflushError::Buffer("connection reset".into()));
        }
        self.clears.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Durable store recording every submission; fails the listed call indexes.
struct MockDurable {
    submitted: Mutex<Vec<TurnPair>>,
    fail_calls: Vec<usize>,
    fail_all: bool,
}

impl MockDurable {
    fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            submitted: Mutex::new(Vec::new()),
            fail_calls: vec![],
            fail_all: false,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            submitted: Mutex::new(Vec::new()),
            fail_calls: vec![],
            fail_all: true,
        })
    }

    fn failing_calls(calls: Vec<usize>) -> Arc<Self> {
        Arc::new(Self {
            submitted: Mutex::new(Vec::new()),
            fail_calls: calls,
            fail_all: false,
        })
    }

    fn submitted(&self) -> Vec<TurnPair> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl DurableStore for MockDurable {
    async fn store_pair(&self, pair: &TurnPair) -> Result<()> {
        let mut submitted = self.submitted.lock().unwrap();
        let call = submitted.len();
        submitted.push(pair.clone());
        if self.fail_all || self.fail_calls.contains(&call) {
            return Err(MemflushError::Durable("503 Service Unavailable".into()));
        }
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn conversation() -> Vec<Turn> {
    vec![
        Turn::user("A")
            .with_turn(1)
            .with_timestamp("2026-10-18T21:14:02Z"),
        Turn::assistant("B")
            .with_turn(2)
            .with_timestamp("2026-10-18T21:14:09Z"),
        Turn::user("C")
            .with_turn(3)
            .with_timestamp("2026-10-18T22:01:45Z"),
    ]
}

fn migrator(buffer: &Arc<MockBuffer>, durable: DurableSink, dir: &Path) -> Migrator {
    Migrator::new(buffer.clone(), durable, FileBackup::new(dir))
}

fn backup_files(dir: &Path) -> Vec<std::path::PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => vec![],
    }
}

fn read_backup(path: &Path) -> Vec<Turn> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

// ============================================================================
// Empty buffer and fetch failures
// ============================================================================

#[tokio::test]
async fn test_empty_buffer_is_nothing_to_do() {
    let dir = TempDir::new().unwrap();
    let buffer = Arc::new(MockBuffer::with_raw(vec![]));
    let durable = MockDurable::succeeding();
    let migrator = migrator(&buffer, DurableSink::Available(durable.clone()), dir.path());

    let report = migrator.run("rob", false).await.unwrap();

    assert_eq!(report.outcome, MigrationOutcome::NothingToDo);
    assert_eq!(report.turns, 0);
    assert_eq!(buffer.clears(), 0);
    assert!(durable.submitted().is_empty());
    assert!(backup_files(dir.path()).is_empty());
}

#[tokio::test]
async fn test_unreachable_buffer_is_source_unavailable() {
    let dir = TempDir::new().unwrap();
    let mut mock = MockBuffer::with_turns(&conversation());
    mock.unreachable = true;
    let buffer = Arc::new(mock);
    let durable = MockDurable::succeeding();
    let migrator = migrator(&buffer, DurableSink::Available(durable.clone()), dir.path());

    let err = migrator.run("rob", false).await.unwrap_err();

    assert!(matches!(err, MigrationError::SourceUnavailable { .. }));
    assert_eq!(buffer.clears(), 0);
    assert!(durable.submitted().is_empty());
    assert!(backup_files(dir.path()).is_empty());
}

#[tokio::test]
async fn test_non_json_entries_are_skipped() {
    let dir = TempDir::new().unwrap();
    let mut raw: Vec<String> = conversation()
        .iter()
        .map(|t| serde_json::to_string(t).unwrap())
        .collect();
    raw.insert(1, "{not json".to_string());
    raw.push(r#"{"role":"narrator","content":"??"}"#.to_string());
    let buffer = Arc::new(MockBuffer::with_raw(raw));
    let durable = MockDurable::succeeding();
    let migrator = migrator(&buffer, DurableSink::Available(durable.clone()), dir.path());

    let report = migrator.run("rob", false).await.unwrap();

    assert_eq!(report.turns, 4);
    assert_eq!(durable.submitted().len(), 2);
}

#[tokio::test]
async fn test_only_non_json_entries_is_nothing_to_do() {
    let dir = TempDir::new().unwrap();
    let buffer = Arc::new(MockBuffer::with_raw(vec![
        "garbage".into(),
        r#"{"role":"#.into(),
    ]));
    let migrator = migrator(&buffer, DurableSink::Unavailable, dir.path());

    let report = migrator.run("rob", false).await.unwrap();

    assert_eq!(report.outcome, MigrationOutcome::NothingToDo);
    assert_eq!(buffer.clears(), 0);
}

// ============================================================================
// Durable storage
// ============================================================================

#[tokio::test]
async fn test_durable_success_clears_once_without_files() {
    let dir = TempDir::new().unwrap();
    let buffer = Arc::new(MockBuffer::with_turns(&conversation()));
    let durable = MockDurable::succeeding();
    let migrator = migrator(&buffer, DurableSink::Available(durable.clone()), dir.path());

    let report = migrator.run("rob", false).await.unwrap();

    assert_eq!(
        report.outcome,
        MigrationOutcome::Durable {
            stored_pairs: 2,
            failed_pairs: 0
        }
    );
    assert_eq!(report.turns, 3);
    assert_eq!(buffer.clears(), 1);
    assert!(backup_files(dir.path()).is_empty());
}

#[tokio::test]
async fn test_pairs_submitted_to_durable_store() {
    let dir = TempDir::new().unwrap();
    let buffer = Arc::new(MockBuffer::with_turns(&conversation()));
    let durable = MockDurable::succeeding();
    let migrator = migrator(&buffer, DurableSink::Available(durable.clone()), dir.path());

    migrator.run("rob", false).await.unwrap();

    let submitted = durable.submitted();
    assert_eq!(submitted.len(), 2);
    assert_eq!(
        (submitted[0].user_message.as_str(), submitted[0].ai_response.as_str()),
        ("A", "B")
    );
    assert_eq!(
        (submitted[1].user_message.as_str(), submitted[1].ai_response.as_str()),
        ("C", "")
    );
    assert_eq!(submitted[0].turn_number, json!(1));
    assert_eq!(submitted[1].turn_number, json!(3));
    assert!(submitted.iter().all(|p| p.user_id == "rob"));
    assert!(
        submitted
            .iter()
            .all(|p| p.conversation_id == "mem-buffer-2026-10-18")
    );
}

#[tokio::test]
async fn test_partial_durable_failure_still_clears() {
    let dir = TempDir::new().unwrap();
    let buffer = Arc::new(MockBuffer::with_turns(&conversation()));
    let durable = MockDurable::failing_calls(vec![0]);
    let migrator = migrator(&buffer, DurableSink::Available(durable.clone()), dir.path());

    let report = migrator.run("rob", false).await.unwrap();

    assert_eq!(
        report.outcome,
        MigrationOutcome::Durable {
            stored_pairs: 1,
            failed_pairs: 1
        }
    );
    assert_eq!(buffer.clears(), 1);
    assert!(backup_files(dir.path()).is_empty());
}

// ============================================================================
// File fallback
// ============================================================================

#[tokio::test]
async fn test_durable_failure_falls_back_to_file() {
    let dir = TempDir::new().unwrap();
    let mut turns = conversation();
    turns.push(Turn::assistant("trailing reply").with_turn(4));
    let buffer = Arc::new(MockBuffer::with_turns(&turns));
    let durable = MockDurable::failing();
    let migrator = migrator(&buffer, DurableSink::Available(durable.clone()), dir.path());

    let report = migrator.run("rob", false).await.unwrap();

    let files = backup_files(dir.path());
    assert_eq!(files.len(), 1);
    let name = files[0].file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("mem-backup-rob-"));
    assert!(name.ends_with(".jsonl"));

    assert_eq!(read_backup(&files[0]), turns);
    assert_eq!(
        report.outcome,
        MigrationOutcome::File {
            path: files[0].clone(),
            cleared: true
        }
    );
    assert_eq!(buffer.clears(), 1);
}

#[tokio::test]
async fn test_file_fallback_keeps_irregular_entries_verbatim() {
    let dir = TempDir::new().unwrap();
    let raw = vec![
        r#"{"role":"user","content":"hello","turn":1,"timestamp":"2026-10-18T21:14:02Z"}"#
            .to_string(),
        r#"{"role":"assistant","content":"hi","turn":"2"}"#.to_string(),
        r#"{"role":"user","content":"later","turn":3,"timestamp":1729000000}"#.to_string(),
        r#"{"role":"system","content":"context reset","turn":4}"#.to_string(),
    ];
    let buffer = Arc::new(MockBuffer::with_raw(raw.clone()));
    let durable = MockDurable::failing();
    let migrator = migrator(&buffer, DurableSink::Available(durable.clone()), dir.path());

    let report = migrator.run("rob", false).await.unwrap();

    assert_eq!(report.turns, 4);
    assert_eq!(durable.submitted().len(), 2);
    assert_eq!(durable.submitted()[1].conversation_id, "mem-buffer-unknown");

    let files = backup_files(dir.path());
    assert_eq!(files.len(), 1);
    let written: Vec<Value> = std::fs::read_to_string(&files[0])
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    let expected: Vec<Value> = raw.iter().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert_eq!(written, expected);
    assert_eq!(buffer.clears(), 1);
}

#[tokio::test]
async fn test_unavailable_durable_falls_back_to_file() {
    let dir = TempDir::new().unwrap();
    let buffer = Arc::new(MockBuffer::with_turns(&conversation()));
    let migrator = migrator(&buffer, DurableSink::Unavailable, dir.path());

    let report = migrator.run("rob", false).await.unwrap();

    assert!(matches!(
        report.outcome,
        MigrationOutcome::File { cleared: true, .. }
    ));
    assert_eq!(backup_files(dir.path()).len(), 1);
    assert_eq!(buffer.clears(), 1);
}

#[tokio::test]
async fn test_no_user_turns_falls_back_to_file() {
    let dir = TempDir::new().unwrap();
    let turns = vec![Turn::assistant("hello?"), Turn::assistant("anyone?")];
    let buffer = Arc::new(MockBuffer::with_turns(&turns));
    let durable = MockDurable::succeeding();
    let migrator = migrator(&buffer, DurableSink::Available(durable.clone()), dir.path());

    migrator.run("rob", false).await.unwrap();

    assert!(durable.submitted().is_empty());
    let files = backup_files(dir.path());
    assert_eq!(files.len(), 1);
    assert_eq!(read_backup(&files[0]), turns);
}

#[tokio::test]
async fn test_file_backup_can_retain_buffer() {
    let dir = TempDir::new().unwrap();
    let buffer = Arc::new(MockBuffer::with_turns(&conversation()));
    let migrator = migrator(&buffer, DurableSink::Unavailable, dir.path())
        .with_clear_after_file_backup(false);

    let report = migrator.run("rob", false).await.unwrap();

    assert!(matches!(
        report.outcome,
        MigrationOutcome::File { cleared: false, .. }
    ));
    assert_eq!(backup_files(dir.path()).len(), 1);
    assert_eq!(buffer.clears(), 0);
}

#[tokio::test]
async fn test_total_backup_failure_keeps_buffer() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "occupied").unwrap();
    let buffer = Arc::new(MockBuffer::with_turns(&conversation()));
    let durable = MockDurable::failing();
    let migrator = migrator(
        &buffer,
        DurableSink::Available(durable.clone()),
        &blocker.join("backups"),
    );

    let err = migrator.run("rob", false).await.unwrap_err();

    assert!(matches!(err, MigrationError::BackupFailed { .. }));
    assert_eq!(buffer.clears(), 0);
}

// ============================================================================
// Clearing
// ============================================================================

#[tokio::test]
async fn test_clear_failure_after_durable_success() {
    let dir = TempDir::new().unwrap();
    let mut mock = MockBuffer::with_turns(&conversation());
    mock.fail_clear = true;
    let buffer = Arc::new(mock);
    let durable = MockDurable::succeeding();
    let migrator = migrator(&buffer, DurableSink::Available(durable.clone()), dir.path());

    let err = migrator.run("rob", false).await.unwrap_err();

    match err {
        MigrationError::ClearFailed { medium, .. } => assert_eq!(medium, BackupMedium::Durable),
        other => panic!("expected ClearFailed, got {other:?}"),
    }
    assert_eq!(durable.submitted().len(), 2);
}

#[tokio::test]
async fn test_clear_failure_after_file_backup_keeps_file() {
    let dir = TempDir::new().unwrap();
    let mut mock = MockBuffer::with_turns(&conversation());
    mock.fail_clear = true;
    let buffer = Arc::new(mock);
    let migrator = migrator(&buffer, DurableSink::Unavailable, dir.path());

    let err = migrator.run("rob", false).await.unwrap_err();

    assert!(matches!(
        err,
        MigrationError::ClearFailed {
            medium: BackupMedium::File(_),
            ..
        }
    ));
    assert_eq!(backup_files(dir.path()).len(), 1);
}

// ============================================================================
// Dry run
// ============================================================================

#[tokio::test]
async fn test_dry_run_touches_nothing() {
    let dir = TempDir::new().unwrap();
    let buffer = Arc::new(MockBuffer::with_turns(&conversation()));
    let durable = MockDurable::failing();
    let migrator = migrator(&buffer, DurableSink::Available(durable.clone()), dir.path());

    let report = migrator.run("rob", true).await.unwrap();

    assert_eq!(
        report.outcome,
        MigrationOutcome::DryRun {
            durable_available: true
        }
    );
    assert!(durable.submitted().is_empty());
    assert_eq!(buffer.clears(), 0);
    assert!(backup_files(dir.path()).is_empty());
}

#[tokio::test]
async fn test_dry_run_without_durable_store() {
    let dir = TempDir::new().unwrap();
    let buffer = Arc::new(MockBuffer::with_turns(&conversation()));
    let migrator = migrator(&buffer, DurableSink::Unavailable, dir.path());

    let report = migrator.run("rob", true).await.unwrap();

    assert_eq!(
        report.outcome,
        MigrationOutcome::DryRun {
            durable_available: false
        }
    );
    assert_eq!(report.turns, 3);
    assert_eq!(buffer.clears(), 0);
    assert!(backup_files(dir.path()).is_empty());
}
