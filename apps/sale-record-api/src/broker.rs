//! Message broker seam.
//!
//! Production publishes through Redis `PUBLISH`. Without a Redis URL,
//! messages are dropped. Tests record them in memory.

#[cfg(test)]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(test)]
use std::sync::Arc;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
#[cfg(test)]
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Broker unavailable: {0}")]
    Unavailable(String),
}

pub type BrokerResult<T> = Result<T, BrokerError>;

#[async_trait]
pub trait EventBroker: Send + Sync {
    async fn publish(&self, channel: &str, payload: &str) -> BrokerResult<()>;
}

// =============================================================================
// Redis
// =============================================================================

/// Publishes over a multiplexed, auto-reconnecting Redis connection.
#[derive(Clone)]
pub struct RedisBroker {
    manager: ConnectionManager,
}

impl RedisBroker {
    pub async fn connect(client: &redis::Client) -> BrokerResult<Self> {
        let manager = client.get_connection_manager().await?;
        info!("Connected to Redis");
        Ok(RedisBroker { manager })
    }
}

#[async_trait]
impl EventBroker for RedisBroker {
    async fn publish(&self, channel: &str, payload: &str) -> BrokerResult<()> {
        let mut conn = self.manager.clone();
        let receivers: i64 = conn.publish(channel, payload).await?;
        debug!(channel, receivers, "Published");
        Ok(())
    }
}

// =============================================================================
// Discard
// =============================================================================

/// Drops every message. Used when no Redis URL is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardBroker;

#[async_trait]
impl EventBroker for DiscardBroker {
    async fn publish(&self, channel: &str, payload: &str) -> BrokerResult<()> {
        debug!(channel, bytes = payload.len(), "No broker configured, message dropped");
        Ok(())
    }
}

// =============================================================================
// In-Memory
// =============================================================================

/// Keeps published messages in memory for assertions.
#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub struct MemoryBroker {
    messages: Arc<Mutex<Vec<(String, String)>>>,
    failing: Arc<AtomicBool>,
}

#[cfg(test)]
impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every published (channel, payload) pair, oldest first.
    pub async fn published(&self) -> Vec<(String, String)> {
        self.messages.lock().await.clone()
    }

    /// Makes subsequent publishes fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[cfg(test)]
#[async_trait]
impl EventBroker for MemoryBroker {
    async fn publish(&self, channel: &str, payload: &str) -> BrokerResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BrokerError::Unavailable("memory broker set to fail".into()));
        }
        self.messages
            .lock()
            .await
            .push((channel.to_string(), payload.to_string()));
        Ok(())
    }
}
