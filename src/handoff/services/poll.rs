//! Stateless read endpoints used to reconcile after missed pushes.

use super::error::{DispatchError, DispatchResult};
use crate::handoff::{
    domain::{
        AgentId, ExpiryReason, Handoff, HandoffId, HandoffMessage, HandoffStatus, SessionId,
        TenantId,
    },
    ports::{HandoffStore, MessageCursor},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Status snapshot returned to polling widgets and consoles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffStatusView {
    /// Handoff identifier.
    pub handoff_id: HandoffId,
    /// Current lifecycle state.
    pub status: HandoffStatus,
    /// Assigned agent, once picked up.
    pub assigned_agent_id: Option<AgentId>,
    /// Creation timestamp.
    pub requested_at: DateTime<Utc>,
    /// Pickup timestamp.
    pub picked_up_at: Option<DateTime<Utc>>,
    /// Resolution timestamp.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Expiry timestamp.
    pub expired_at: Option<DateTime<Utc>>,
    /// Why the handoff expired.
    pub expiry_reason: Option<ExpiryReason>,
    /// Last lifecycle or message activity.
    pub last_activity_at: DateTime<Utc>,
}

impl From<&Handoff> for HandoffStatusView {
    fn from(handoff: &Handoff) -> Self {
        Self {
            handoff_id: handoff.id(),
            status: handoff.status(),
            assigned_agent_id: handoff.assigned_agent_id(),
            requested_at: handoff.requested_at(),
            picked_up_at: handoff.picked_up_at(),
            resolved_at: handoff.resolved_at(),
            expired_at: handoff.expired_at(),
            expiry_reason: handoff.expiry_reason(),
            last_activity_at: handoff.last_activity_at(),
        }
    }
}

/// Read-only gateway over the handoff store.
///
/// Every call is scoped to the caller's tenant; handoffs of other tenants
/// are reported as not found.
#[derive(Clone)]
pub struct PollGateway<S>
where
    S: HandoffStore,
{
    store: Arc<S>,
}

impl<S> PollGateway<S>
where
    S: HandoffStore,
{
    /// Creates a gateway over `store`.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Returns the handoff's current status.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NotFound`] for unknown or foreign handoffs.
    pub async fn get_handoff_status(
        &self,
        tenant_id: TenantId,
        handoff_id: HandoffId,
    ) -> DispatchResult<HandoffStatusView> {
        let handoff = self.scoped(tenant_id, handoff_id).await?;
        Ok(HandoffStatusView::from(&handoff))
    }

    /// Returns the full handoff record, including the snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NotFound`] for unknown or foreign handoffs.
    pub async fn get_handoff(
        &self,
        tenant_id: TenantId,
        handoff_id: HandoffId,
    ) -> DispatchResult<Handoff> {
        self.scoped(tenant_id, handoff_id).await
    }

    /// Returns messages after `cursor` in authoritative order.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NotFound`] for unknown or foreign handoffs,
    /// and a store error when the cursor message is not in the transcript.
    pub async fn get_messages_since(
        &self,
        tenant_id: TenantId,
        handoff_id: HandoffId,
        cursor: MessageCursor,
    ) -> DispatchResult<Vec<HandoffMessage>> {
        self.scoped(tenant_id, handoff_id).await?;
        Ok(self.store.messages_since(handoff_id, cursor).await?)
    }

    /// Returns the open handoff of a widget session, so a widget that
    /// reconnects without its handoff id can resume.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Domain`] for a blank session id, and
    /// transient store failures.
    pub async fn find_open_handoff(
        &self,
        tenant_id: TenantId,
        session_id: &str,
    ) -> DispatchResult<Option<Handoff>> {
        let session = SessionId::new(session_id)?;
        Ok(self.store.find_open_for_session(tenant_id, &session).await?)
    }

    /// Lists the tenant's pending handoffs, oldest first.
    ///
    /// # Errors
    ///
    /// Returns transient store failures.
    pub async fn list_pending(&self, tenant_id: TenantId) -> DispatchResult<Vec<Handoff>> {
        Ok(self.store.list_pending(tenant_id).await?)
    }

    async fn scoped(&self, tenant_id: TenantId, handoff_id: HandoffId) -> DispatchResult<Handoff> {
        self.store
            .find_by_id(handoff_id)
            .await?
            .filter(|handoff| handoff.tenant_id() == tenant_id)
            .ok_or(DispatchError::NotFound(handoff_id))
    }
}
