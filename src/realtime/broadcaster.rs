//! Best-effort fan-out of handoff events to registered channels.

use super::channel::{ChannelId, ChannelKey, EventChannel};
use super::registry::ChannelRegistry;
use crate::handoff::{
    domain::HandoffEvent,
    ports::{Audience, DeliveryReport, HandoffNotifier, NotifyResult},
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Pushes events over open duplex channels.
///
/// A channel whose write fails is treated as disconnected and removed
/// from the registry; it is never retried.
pub struct Broadcaster<R>
where
    R: ChannelRegistry,
{
    registry: Arc<R>,
}

impl<R> Broadcaster<R>
where
    R: ChannelRegistry,
{
    /// Creates a broadcaster over `registry`.
    #[must_use]
    pub const fn new(registry: Arc<R>) -> Self {
        Self { registry }
    }

    /// Registers a newly connected channel.
    pub async fn register(&self, key: ChannelKey, channel: Arc<dyn EventChannel>) -> ChannelId {
        let id = self.registry.register(key.clone(), channel).await;
        debug!(channel_id = %id, key = %key, role = %key.role(), "channel registered");
        id
    }

    /// Removes a channel on disconnect.
    pub async fn deregister(&self, id: ChannelId) -> bool {
        let removed = self.registry.deregister(id).await;
        if removed {
            debug!(channel_id = %id, "channel deregistered");
        }
        removed
    }

    /// Returns the registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<R> {
        &self.registry
    }
}

#[async_trait]
impl<R> HandoffNotifier for Broadcaster<R>
where
    R: ChannelRegistry,
{
    async fn publish(
        &self,
        event: &HandoffEvent,
        audience: &Audience,
    ) -> NotifyResult<DeliveryReport> {
        let payload = serde_json::to_string(event)?;
        let mut report = DeliveryReport::default();

        for target in self.registry.matching(audience).await {
            if target.channel.send(&payload).await.is_ok() {
                report.delivered += 1;
                continue;
            }
            self.registry.deregister(target.id).await;
            report.dropped += 1;
            warn!(
                channel_id = %target.id,
                key = %target.key,
                event = event.name(),
                "channel write failed; dropped from registry"
            );
        }
        Ok(report)
    }
}
