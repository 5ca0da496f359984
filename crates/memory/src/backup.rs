//! Local JSONL fallback for when durable storage is unavailable or failing.

use chrono::{DateTime, Local};
use memflush_common::{MemflushError, Result, Turn};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// File name for a backup of `subject_id` taken at `taken_at`.
pub fn backup_file_name(subject_id: &str, taken_at: &DateTime<Local>) -> String {
    format!(
        "mem-backup-{subject_id}-{}.jsonl",
        taken_at.format("%Y%m%d_%H%M%S")
    )
}

/// Writes buffered turns, one JSON object per line, into a backup directory.
#[derive(Debug, Clone)]
pub struct FileBackup {
    dir: PathBuf,
}

impl FileBackup {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `turns` to a new timestamped file and return its path.
    ///
    /// The file is created exclusively: an earlier backup with the same name
    /// is never overwritten.
    pub async fn write(&self, subject_id: &str, turns: &[Turn]) -> Result<PathBuf> {
        self.write_at(subject_id, turns, &Local::now()).await
    }

    pub async fn write_at(
        &self,
        subject_id: &str,
        turns: &[Turn],
        taken_at: &DateTime<Local>,
    ) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            MemflushError::Backup(format!(
                "Cannot create backup directory {}: {e}",
                self.dir.display()
            ))
        })?;

        let mut body = String::new();
        for turn in turns {
            body.push_str(&serde_json::to_string(turn)?);
            body.push('\n');
        }

        let path = self.dir.join(backup_file_name(subject_id, taken_at));
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| {
                MemflushError::Backup(format!("Cannot create {}: {e}", path.display()))
            })?;

        if let Err(e) = file.write_all(body.as_bytes()).await {
            return Err(discard_partial(&path, e).await);
        }
        if let Err(e) = file.sync_all().await {
            return Err(discard_partial(&path, e).await);
        }

        info!(path = %path.display(), turns = turns.len(), "Wrote file backup");
        Ok(path)
    }
}

/// Remove a backup file whose write failed part-way, so no truncated file
/// is mistaken for a complete backup.
async fn discard_partial(path: &Path, cause: std::io::Error) -> MemflushError {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "Failed to remove partial backup");
    }
    MemflushError::Backup(format!("Cannot write {}: {cause}", path.display()))
}
