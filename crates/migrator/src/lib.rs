//! Scheduled migration of buffered conversation turns.
//!
//! A run reads every turn buffered in Redis for one subject, stores the
//! user/assistant pairs in the durable store, falls back to a local JSONL
//! file when that fails, and deletes the Redis buffer only once one of
//! those copies exists.
//!
//! ```text
//!  fetch ──► empty? ──► done
//!    │
//!    ▼
//!  durable store ──ok──────────────┐
//!    │ failed / unavailable        │
//!    ▼                             ▼
//!  JSONL file ──ok──► clear buffer ──► report
//!    │ failed
//!    ▼
//!  abort (buffer kept)
//! ```
//!
//! Runs against the same subject are expected to be serialized by the
//! scheduler; nothing here prevents two overlapping runs.

pub mod config;
pub mod runner;

pub use config::MigratorConfig;
pub use runner::{
    BackupMedium, MigrationError, MigrationOutcome, MigrationReport, Migrator, preview_lines,
};
