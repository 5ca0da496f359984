//! Storage collaborators for memflush.
//!
//! Buffered turns move through three layers:
//!
//! ```text
//! ┌──────────────────────┐   fetch / clear
//! │  Redis buffer        │ ◄──────────────── BufferStore
//! │  (mem:<subject>)     │
//! └──────────┬───────────┘
//!            │ turn pairs
//!            ▼
//! ┌──────────────────────┐
//! │  Durable store       │ ◄──────────────── DurableSink
//! │  (optional)          │
//! └──────────┬───────────┘
//!            │ on failure
//!            ▼
//! ┌──────────────────────┐
//! │  JSONL file backup   │ ◄──────────────── FileBackup
//! └──────────────────────┘
//! ```

pub mod backup;
pub mod buffer;
pub mod durable;
pub mod types;

pub use backup::{FileBackup, backup_file_name};
pub use buffer::{BufferStore, RedisBufferStore, buffer_key, parse_entries};
pub use durable::{DurableSink, DurableStore, HttpDurableStore};
pub use types::{BackupConfig, BufferConfig, DurableConfig};
