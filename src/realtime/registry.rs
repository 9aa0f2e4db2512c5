//! Registry of open duplex channels.
//!
//! Channels are registered on connect and deregistered on disconnect or on
//! the first failed write; nothing else keeps them alive.

use super::channel::{ChannelId, ChannelKey, EventChannel};
use crate::handoff::ports::Audience;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// One registry entry.
#[derive(Clone)]
pub struct RegisteredChannel {
    /// Registry handle.
    pub id: ChannelId,
    /// Key the channel was registered under.
    pub key: ChannelKey,
    /// Write half.
    pub channel: Arc<dyn EventChannel>,
}

impl std::fmt::Debug for RegisteredChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredChannel")
            .field("id", &self.id)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Channel registry contract.
#[async_trait]
pub trait ChannelRegistry: Send + Sync {
    /// Adds a channel and returns its handle.
    async fn register(&self, key: ChannelKey, channel: Arc<dyn EventChannel>) -> ChannelId;

    /// Removes a channel. Returns `false` when it was already gone.
    async fn deregister(&self, id: ChannelId) -> bool;

    /// Returns every open channel matching `audience`.
    async fn matching(&self, audience: &Audience) -> Vec<RegisteredChannel>;

    /// Returns the number of open channels.
    async fn len(&self) -> usize;

    /// Returns `true` when no channel is open.
    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// In-process channel registry.
#[derive(Debug, Default)]
pub struct InMemoryChannelRegistry {
    next_id: AtomicU64,
    channels: RwLock<HashMap<ChannelId, RegisteredChannel>>,
}

impl InMemoryChannelRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChannelRegistry for InMemoryChannelRegistry {
    async fn register(&self, key: ChannelKey, channel: Arc<dyn EventChannel>) -> ChannelId {
        let id = ChannelId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let entry = RegisteredChannel { id, key, channel };
        self.channels.write().await.insert(id, entry);
        id
    }

    async fn deregister(&self, id: ChannelId) -> bool {
        self.channels.write().await.remove(&id).is_some()
    }

    async fn matching(&self, audience: &Audience) -> Vec<RegisteredChannel> {
        let channels = self.channels.read().await;
        let mut matched: Vec<RegisteredChannel> = channels
            .values()
            .filter(|entry| entry.key.matches(audience))
            .cloned()
            .collect();
        matched.sort_by_key(|entry| entry.id);
        matched
    }

    async fn len(&self) -> usize {
        self.channels.read().await.len()
    }
}
