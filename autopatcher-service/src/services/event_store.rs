//! Append-only webhook event history.

use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client};
use std::collections::VecDeque;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::config::StoreConfig;
use crate::models::WebhookEvent;

pub const DEFAULT_LIST_LIMIT: usize = 50;
pub const MAX_LIST_LIMIT: usize = 200;

/// Per-event keys outlive their list entries by at most this long.
const EVENT_KEY_TTL_SECS: u64 = 30 * 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Event store unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to encode event: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Clamp a caller-supplied page size into `[1, MAX_LIST_LIMIT]`.
pub fn clamp_limit(limit: Option<usize>) -> usize {
    limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT)
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(&self, event: &WebhookEvent) -> Result<(), StoreError>;

    /// Newest first.
    async fn list(&self, limit: usize) -> Result<Vec<WebhookEvent>, StoreError>;

    /// Newest first, one repository (`owner/name`).
    async fn list_by_repository(
        &self,
        repository: &str,
        limit: usize,
    ) -> Result<Vec<WebhookEvent>, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<WebhookEvent>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

/// In-process store. The oldest events fall off once `capacity` is reached.
pub struct MemoryEventStore {
    events: RwLock<VecDeque<WebhookEvent>>,
    capacity: usize,
}

impl MemoryEventStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(&self, event: &WebhookEvent) -> Result<(), StoreError> {
        let mut events = self.events.write().await;
        events.push_front(event.clone());
        events.truncate(self.capacity);
        Ok(())
    }

    async fn list(&self, limit: usize) -> Result<Vec<WebhookEvent>, StoreError> {
        let events = self.events.read().await;
        Ok(events.iter().take(limit).cloned().collect())
    }

    async fn list_by_repository(
        &self,
        repository: &str,
        limit: usize,
    ) -> Result<Vec<WebhookEvent>, StoreError> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|e| e.repository == repository)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get(&self, id: &str) -> Result<Option<WebhookEvent>, StoreError> {
        let events = self.events.read().await;
        Ok(events.iter().find(|e| e.id == id).cloned())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Redis-backed store.
///
/// Layout under `prefix`:
/// - `{prefix}:events` list of event JSON, newest first
/// - `{prefix}:repo:{owner/name}` same, per repository
/// - `{prefix}:event:{id}` single event JSON
#[derive(Clone)]
pub struct RedisEventStore {
    manager: ConnectionManager,
    prefix: String,
    capacity: usize,
}

impl RedisEventStore {
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        tracing::info!(prefix = %config.key_prefix, "Connecting to Redis event store");
        let client = Client::open(config.redis_url.clone())?;

        // ConnectionManager reconnects on its own
        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            StoreError::Unavailable(format!("Failed to connect to Redis: {}", e))
        })?;

        tracing::info!("Successfully connected to Redis");

        Ok(Self {
            manager,
            prefix: config.key_prefix.clone(),
            capacity: config.capacity.max(1),
        })
    }

    fn events_key(&self) -> String {
        format!("{}:events", self.prefix)
    }

    fn repo_key(&self, repository: &str) -> String {
        format!("{}:repo:{}", self.prefix, repository)
    }

    fn event_key(&self, id: &str) -> String {
        format!("{}:event:{}", self.prefix, id)
    }

    async fn range(&self, key: &str, limit: usize) -> Result<Vec<WebhookEvent>, StoreError> {
        // LRANGE 0 -1 would return the whole list
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.manager.clone();
        let raw: Vec<String> = redis::cmd("LRANGE")
            .arg(key)
            .arg(0)
            .arg(limit as isize - 1)
            .query_async(&mut conn)
            .await?;

        Ok(raw.iter().filter_map(|json| decode(json)).collect())
    }
}

fn decode(json: &str) -> Option<WebhookEvent> {
    match serde_json::from_str(json) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!(error = %e, "Skipping undecodable event record");
            None
        }
    }
}

#[async_trait]
impl EventStore for RedisEventStore {
    async fn append(&self, event: &WebhookEvent) -> Result<(), StoreError> {
        let json = serde_json::to_string(event)?;
        let events_key = self.events_key();
        let repo_key = self.repo_key(&event.repository);
        let last = self.capacity as isize - 1;

        let mut conn = self.manager.clone();
        redis::pipe()
            .atomic()
            .cmd("LPUSH")
            .arg(&events_key)
            .arg(&json)
            .ignore()
            .cmd("LPUSH")
            .arg(&repo_key)
            .arg(&json)
            .ignore()
            .cmd("SET")
            .arg(self.event_key(&event.id))
            .arg(&json)
            .arg("EX")
            .arg(EVENT_KEY_TTL_SECS)
            .ignore()
            .cmd("LTRIM")
            .arg(&events_key)
            .arg(0)
            .arg(last)
            .ignore()
            .cmd("LTRIM")
            .arg(&repo_key)
            .arg(0)
            .arg(last)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;

        Ok(())
    }

    async fn list(&self, limit: usize) -> Result<Vec<WebhookEvent>, StoreError> {
        self.range(&self.events_key(), limit).await
    }

    async fn list_by_repository(
        &self,
        repository: &str,
        limit: usize,
    ) -> Result<Vec<WebhookEvent>, StoreError> {
        self.range(&self.repo_key(repository), limit).await
    }

    async fn get(&self, id: &str) -> Result<Option<WebhookEvent>, StoreError> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(self.event_key(id))
            .query_async(&mut conn)
            .await?;

        Ok(raw.as_deref().and_then(decode))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Redis health check failed: {}", e)))
    }
}
