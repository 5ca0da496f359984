//! The migration run: buffer → durable store → file → clear.

use crate::config::MigratorConfig;
use memflush_common::{MemflushError, Turn, pair_turns};
use memflush_memory::{BufferStore, DurableSink, FileBackup, RedisBufferStore, buffer_key};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Number of turns listed individually in a preview.
const PREVIEW_TURNS: usize = 3;

/// Where a run's turns ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupMedium {
    Durable,
    File(PathBuf),
}

impl std::fmt::Display for BackupMedium {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackupMedium::Durable => f.write_str("durable store"),
            BackupMedium::File(path) => write!(f, "file {}", path.display()),
        }
    }
}

/// Run-level failures. Each one maps to a non-zero exit.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Failed to read turn buffer for '{subject_id}': {source}")]
    SourceUnavailable {
        subject_id: String,
        source: MemflushError,
    },

    #[error("Durable storage and file backup both failed for '{subject_id}', buffer preserved: {source}")]
    BackupFailed {
        subject_id: String,
        source: MemflushError,
    },

    #[error("Backup to {medium} succeeded but buffer not cleared, may duplicate next run: {source}")]
    ClearFailed {
        subject_id: String,
        medium: BackupMedium,
        source: MemflushError,
    },
}

/// Terminal state of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The buffer was empty.
    NothingToDo,

    /// Dry run: nothing was stored, written or cleared.
    DryRun { durable_available: bool },

    /// At least one pair reached the durable store and the buffer was cleared.
    Durable {
        stored_pairs: usize,
        failed_pairs: usize,
    },

    /// Turns were written to a fallback file.
    File { path: PathBuf, cleared: bool },
}

/// Summary of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub subject_id: String,
    pub turns: usize,
    pub outcome: MigrationOutcome,
}

impl std::fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let key = buffer_key(&self.subject_id);
        match &self.outcome {
            MigrationOutcome::NothingToDo => write!(f, "No items in turn buffer ({key})"),
            MigrationOutcome::DryRun { .. } => write!(
                f,
                "[dry run] Found {} turns in {key}; nothing stored or cleared",
                self.turns
            ),
            MigrationOutcome::Durable {
                stored_pairs,
                failed_pairs,
            } => write!(
                f,
                "Backed up {} turns to durable store ({stored_pairs} pairs stored, {failed_pairs} failed)",
                self.turns
            ),
            MigrationOutcome::File { path, cleared: true } => {
                write!(f, "Backed up {} turns to file {}", self.turns, path.display())
            }
            MigrationOutcome::File {
                path,
                cleared: false,
            } => write!(
                f,
                "Backed up {} turns to file {}; {key} retained for reconciliation",
                self.turns,
                path.display()
            ),
        }
    }
}

/// Per-pair results of a durable storage attempt.
#[derive(Debug, Default, Clone, Copy)]
struct PairTally {
    stored: usize,
    failed: usize,
}

/// Summarize a turn list: the first few turns, then a count of the rest.
pub fn preview_lines(turns: &[Turn]) -> Vec<String> {
    let mut lines: Vec<String> = turns
        .iter()
        .take(PREVIEW_TURNS)
        .map(|t| format!("  - {}", t.label()))
        .collect();

    if turns.len() > PREVIEW_TURNS {
        lines.push(format!("  ... and {} more", turns.len() - PREVIEW_TURNS));
    }
    lines
}

/// Moves one subject's buffered turns into longer-lived storage.
pub struct Migrator {
    buffer: Arc<dyn BufferStore>,
    durable: DurableSink,
    backup: FileBackup,
    clear_after_file_backup: bool,
}

impl Migrator {
    pub fn new(buffer: Arc<dyn BufferStore>, durable: DurableSink, backup: FileBackup) -> Self {
        Self {
            buffer,
            durable,
            backup,
            clear_after_file_backup: true,
        }
    }

    /// Build a migrator wired to Redis, the configured durable store and
    /// the configured backup directory.
    pub fn from_config(config: &MigratorConfig) -> memflush_common::Result<Self> {
        let buffer = RedisBufferStore::new(&config.buffer)?;
        let durable = DurableSink::from_config(&config.durable)?;
        let backup = FileBackup::new(config.backup.dir.clone());

        Ok(Self::new(Arc::new(buffer), durable, backup)
            .with_clear_after_file_backup(config.backup.clear_after_file_backup))
    }

    /// Whether a file-only backup may clear the buffer.
    pub fn with_clear_after_file_backup(mut self, clear: bool) -> Self {
        self.clear_after_file_backup = clear;
        self
    }

    /// Migrate every buffered turn of `subject_id`.
    pub async fn run(
        &self,
        subject_id: &str,
        dry_run: bool,
    ) -> Result<MigrationReport, MigrationError> {
        let turns = self.buffer.fetch_turns(subject_id).await.map_err(|source| {
            MigrationError::SourceUnavailable {
                subject_id: subject_id.to_string(),
                source,
            }
        })?;

        let report = |outcome| MigrationReport {
            subject_id: subject_id.to_string(),
            turns: turns.len(),
            outcome,
        };

        if turns.is_empty() {
            info!(subject = %subject_id, "No items in turn buffer");
            return Ok(report(MigrationOutcome::NothingToDo));
        }

        info!(subject = %subject_id, turns = turns.len(), "Found buffered turns");

        if dry_run {
            info!(
                durable_available = self.durable.is_available(),
                "[dry run] Would attempt durable storage"
            );
            log_preview(&turns);
            info!(key = %buffer_key(subject_id), "[dry run] Would clear turn buffer");
            return Ok(report(MigrationOutcome::DryRun {
                durable_available: self.durable.is_available(),
            }));
        }

        let tally = self.store_durable(subject_id, &turns).await;

        let medium = match tally {
            Some(t) if t.stored > 0 => BackupMedium::Durable,
            _ => {
                warn!(subject = %subject_id, "Durable storage failed, trying file backup");
                let path = self.backup.write(subject_id, &turns).await.map_err(|source| {
                    MigrationError::BackupFailed {
                        subject_id: subject_id.to_string(),
                        source,
                    }
                })?;
                BackupMedium::File(path)
            }
        };

        if let BackupMedium::File(path) = &medium {
            if !self.clear_after_file_backup {
                info!(
                    key = %buffer_key(subject_id),
                    "File backup only; leaving turn buffer in place"
                );
                return Ok(report(MigrationOutcome::File {
                    path: path.clone(),
                    cleared: false,
                }));
            }
        }

        if let Err(source) = self.buffer.clear(subject_id).await {
            return Err(MigrationError::ClearFailed {
                subject_id: subject_id.to_string(),
                medium,
                source,
            });
        }
        info!(key = %buffer_key(subject_id), "Cleared turn buffer");

        let outcome = match medium {
            BackupMedium::Durable => {
                let tally = tally.unwrap_or_default();
                MigrationOutcome::Durable {
                    stored_pairs: tally.stored,
                    failed_pairs: tally.failed,
                }
            }
            BackupMedium::File(path) => MigrationOutcome::File {
                path,
                cleared: true,
            },
        };

        Ok(report(outcome))
    }

    /// Submit every user/assistant pair. `None` when no durable store is
    /// configured.
    async fn store_durable(&self, subject_id: &str, turns: &[Turn]) -> Option<PairTally> {
        let store = match &self.durable {
            DurableSink::Available(store) => store,
            DurableSink::Unavailable => {
                warn!("Durable store not available, simulating");
                log_preview(turns);
                return None;
            }
        };

        let mut tally = PairTally::default();
        for pair in pair_turns(turns, subject_id) {
            match store.store_pair(&pair).await {
                Ok(()) => {
                    debug!(turn_number = %pair.turn_number, "Stored turn pair");
                    tally.stored += 1;
                }
                Err(e) => {
                    warn!(
                        turn_number = %pair.turn_number,
                        error = %e,
                        "Failed to store turn pair, skipping"
                    );
                    tally.failed += 1;
                }
            }
        }

        info!(
            stored = tally.stored,
            failed = tally.failed,
            "Durable storage attempt finished"
        );
        Some(tally)
    }
}

fn log_preview(turns: &[Turn]) {
    info!("Would store {} turns:", turns.len());
    for line in preview_lines(turns) {
        info!("{line}");
    }
}
