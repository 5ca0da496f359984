//! Storage configuration types.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Connection settings for the Redis turn buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Redis host
    #[serde(default = "default_host")]
    pub host: String,

    /// Redis port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Connect timeout in milliseconds
    #[serde(default = "default_buffer_timeout")]
    pub timeout_ms: u64,
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    6379
}

fn default_buffer_timeout() -> u64 {
    5000
}

impl BufferConfig {
    pub fn url(&self) -> String {
        format!("redis://{}:{}/", self.host, self.port)
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_ms: default_buffer_timeout(),
        }
    }
}

/// Settings for the durable (vector-indexed) store integration.
///
/// Leaving `endpoint` unset means the integration is not present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DurableConfig {
    /// HTTP endpoint that accepts one turn pair per POST
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Bearer token sent with each request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Request timeout in milliseconds
    #[serde(default = "default_durable_timeout")]
    pub timeout_ms: u64,
}

fn default_durable_timeout() -> u64 {
    30000
}

impl Default for DurableConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            timeout_ms: default_durable_timeout(),
        }
    }
}

/// Settings for the local JSONL fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Directory receiving `mem-backup-*.jsonl` files
    #[serde(default = "default_backup_dir")]
    pub dir: PathBuf,

    /// Whether a file-only backup is enough to clear the Redis buffer
    #[serde(default = "default_clear_after_file_backup")]
    pub clear_after_file_backup: bool,
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("./memory/redis-backups")
}

fn default_clear_after_file_backup() -> bool {
    true
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: default_backup_dir(),
            clear_after_file_backup: default_clear_after_file_backup(),
        }
    }
}
