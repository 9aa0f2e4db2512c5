//! Port for best-effort push delivery of handoff events.
//!
//! Delivery through this port never decides correctness: the dispatcher
//! persists first, then publishes, and only logs a failed publish.

use crate::handoff::domain::{AgentId, HandoffEvent, SessionId, TenantId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for publish operations.
pub type NotifyResult<T> = Result<T, NotifyError>;

/// Set of connected parties an event is addressed to.
///
/// Every audience is scoped to exactly one tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// Every agent console of the tenant.
    TenantAgents(TenantId),
    /// The widget channels of one session.
    Session {
        /// Owning tenant.
        tenant_id: TenantId,
        /// Originating session.
        session_id: SessionId,
    },
    /// The console channels of one agent.
    Agent {
        /// Owning tenant.
        tenant_id: TenantId,
        /// Target agent.
        agent_id: AgentId,
    },
    /// The session and, when assigned, its agent.
    Participants {
        /// Owning tenant.
        tenant_id: TenantId,
        /// Originating session.
        session_id: SessionId,
        /// Assigned agent, if any.
        agent_id: Option<AgentId>,
    },
    /// Every agent console of the tenant plus the session.
    AgentsAndSession {
        /// Owning tenant.
        tenant_id: TenantId,
        /// Originating session.
        session_id: SessionId,
    },
}

impl Audience {
    /// Returns the tenant the audience is scoped to.
    #[must_use]
    pub const fn tenant_id(&self) -> TenantId {
        match self {
            Self::TenantAgents(tenant_id)
            | Self::Session { tenant_id, .. }
            | Self::Agent { tenant_id, .. }
            | Self::Participants { tenant_id, .. }
            | Self::AgentsAndSession { tenant_id, .. } => *tenant_id,
        }
    }
}

/// Result of one publish call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Channels the event was written to.
    pub delivered: usize,
    /// Channels that failed and were dropped from the registry.
    pub dropped: usize,
}

/// Push delivery contract.
#[async_trait]
pub trait HandoffNotifier: Send + Sync {
    /// Writes `event` to every open channel matching `audience`.
    async fn publish(&self, event: &HandoffEvent, audience: &Audience)
    -> NotifyResult<DeliveryReport>;
}

/// Errors raised while publishing.
#[derive(Debug, Clone, Error)]
pub enum NotifyError {
    /// The event could not be encoded.
    #[error("failed to encode event: {0}")]
    Encode(Arc<serde_json::Error>),
}

impl From<serde_json::Error> for NotifyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encode(Arc::new(err))
    }
}
