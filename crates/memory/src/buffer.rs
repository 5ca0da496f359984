//! Redis-backed turn buffer.
//!
//! Producers append JSON-encoded turns to a Redis list per subject. The
//! migrator reads the whole list and, once a downstream copy exists, deletes
//! the key.

use crate::types::BufferConfig;
use async_trait::async_trait;
use memflush_common::{MemflushError, Result, Turn};
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use std::time::Duration;
use tracing::{debug, info};

/// Redis key holding the buffered turns of a subject.
pub fn buffer_key(subject_id: &str) -> String {
    format!("mem:{subject_id}")
}

/// Short-term list store holding unconfirmed turns.
#[async_trait]
pub trait BufferStore: Send + Sync {
    /// Read every buffered turn for `subject_id`, oldest first.
    ///
    /// Entries that are not JSON are skipped; every JSON entry is kept as
    /// written. An error means the store itself could not be read.
    async fn fetch_turns(&self, subject_id: &str) -> Result<Vec<Turn>>;

    /// Delete the subject's buffer.
    async fn clear(&self, subject_id: &str) -> Result<()>;
}

/// Decode raw list entries, dropping only those that are not JSON.
pub fn parse_entries<T: AsRef<[u8]>>(raw: &[T]) -> Vec<Turn> {
    raw.iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_slice(entry.as_ref()) {
            Ok(turn) => Some(turn),
            Err(e) => {
                debug!(index = index, error = %e, "Skipping non-JSON buffer entry");
                None
            }
        })
        .collect()
}

/// [`BufferStore`] over a Redis list.
///
/// Every call opens its own connection; a run only talks to Redis twice.
pub struct RedisBufferStore {
    client: redis::Client,
    url: String,
    connect_timeout: Duration,
}

impl RedisBufferStore {
    pub fn new(config: &BufferConfig) -> Result<Self> {
        let url = config.url();
        let client = redis::Client::open(url.as_str())
            .map_err(|e| MemflushError::Config(format!("Invalid Redis address {url}: {e}")))?;

        Ok(Self {
            client,
            url,
            connect_timeout: Duration::from_millis(config.timeout_ms),
        })
    }

    async fn connect(&self) -> Result<MultiplexedConnection> {
        debug!(url = %self.url, "Connecting to Redis");

        tokio::time::timeout(
            self.connect_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| {
            MemflushError::Buffer(format!(
                "Timed out after {}ms connecting to {}",
                self.connect_timeout.as_millis(),
                self.url
            ))
        })?
        .map_err(|e| MemflushError::Buffer(format!("Failed to connect to {}: {e}", self.url)))
    }
}

#[async_trait]
impl BufferStore for RedisBufferStore {
    async fn fetch_turns(&self, subject_id: &str) -> Result<Vec<Turn>> {
        let key = buffer_key(subject_id);
        let mut conn = self.connect().await?;

        let raw: Vec<Vec<u8>> = conn
            .lrange(&key, 0, -1)
            .await
            .map_err(|e| MemflushError::Buffer(format!("LRANGE {key} failed: {e}")))?;

        let turns = parse_entries(&raw);
        info!(
            key = %key,
            entries = raw.len(),
            turns = turns.len(),
            "Read turn buffer"
        );

        Ok(turns)
    }

    async fn clear(&self, subject_id: &str) -> Result<()> {
        let key = buffer_key(subject_id);
        let mut conn = self.connect().await?;

        let removed: i64 = conn
            .del(&key)
            .await
            .map_err(|e| MemflushError::Buffer(format!("DEL {key} failed: {e}")))?;

        debug!(key = %key, removed = removed, "Cleared turn buffer");
        Ok(())
    }
}
