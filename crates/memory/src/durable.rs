//! Durable (long-term) storage of turn pairs.
//!
//! The durable store is an optional integration. Whether it is present is
//! decided once, when the [`DurableSink`] is built from configuration.

use crate::types::DurableConfig;
use async_trait::async_trait;
use memflush_common::{MemflushError, Result, TurnPair};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Long-term, queryable storage for confirmed conversation data.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Store one user/assistant exchange.
    async fn store_pair(&self, pair: &TurnPair) -> Result<()>;
}

/// The durable store as seen by the migrator: either an integration to
/// write through, or a marker that none is configured.
#[derive(Clone)]
pub enum DurableSink {
    Available(Arc<dyn DurableStore>),
    Unavailable,
}

impl DurableSink {
    /// Resolve the sink from configuration.
    pub fn from_config(config: &DurableConfig) -> Result<Self> {
        match config.endpoint.as_deref() {
            Some(endpoint) if !endpoint.trim().is_empty() => {
                info!(endpoint = %endpoint, "Durable store integration enabled");
                let store = HttpDurableStore::new(config)?;
                Ok(Self::Available(Arc::new(store)))
            }
            _ => {
                info!("No durable store endpoint configured");
                Ok(Self::Unavailable)
            }
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }
}

impl std::fmt::Debug for DurableSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Available(_) => f.write_str("DurableSink::Available"),
            Self::Unavailable => f.write_str("DurableSink::Unavailable"),
        }
    }
}

/// [`DurableStore`] that POSTs each pair as JSON to a memory service.
///
/// Any non-2xx status counts as a failed store.
pub struct HttpDurableStore {
    endpoint: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl HttpDurableStore {
    pub fn new(config: &DurableConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| MemflushError::Config("Durable store endpoint not set".to_string()))?;

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| MemflushError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            endpoint,
            api_key: config.api_key.clone(),
            http_client,
        })
    }
}

#[async_trait]
impl DurableStore for HttpDurableStore {
    async fn store_pair(&self, pair: &TurnPair) -> Result<()> {
        debug!(
            conversation_id = %pair.conversation_id,
            turn_number = %pair.turn_number,
            "Storing turn pair"
        );

        let mut request = self.http_client.post(&self.endpoint).json(pair);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MemflushError::Durable(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(MemflushError::Durable(format!(
                "Durable store returned {status}: {body_text}"
            )));
        }

        Ok(())
    }
}
