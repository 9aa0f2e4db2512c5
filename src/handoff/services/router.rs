//! Inbox routing: chooses between queueing and after-hours capture.

use super::dispatcher::{CaptureRequest, ContactDetails, CreateHandoffRequest, HandoffDispatcher};
use super::error::DispatchResult;
use crate::handoff::{
    domain::{Handoff, TenantId},
    ports::{AgentDirectory, HandoffNotifier, HandoffStore, TenantIdentity},
};
use mockable::Clock;
use std::sync::Arc;
use tracing::debug;

/// Where a new escalation should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingDecision {
    /// At least one agent can take the conversation now.
    Queue,
    /// Nobody can; collect contact details instead.
    AfterHours,
}

/// Result of [`InboxRouter::escalate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscalationOutcome {
    /// A `pending` handoff was created (or the session's open one returned).
    Queued(Handoff),
    /// Contact details were stored as a `captured` handoff.
    Captured(Handoff),
    /// No agent is available and no contact details were supplied; the
    /// widget should show its offline form.
    ContactRequired,
}

/// Availability gate that sits in front of the dispatcher.
#[derive(Clone)]
pub struct InboxRouter<D>
where
    D: AgentDirectory,
{
    directory: Arc<D>,
}

impl<D> InboxRouter<D>
where
    D: AgentDirectory,
{
    /// Creates a router over the agent directory.
    #[must_use]
    pub const fn new(directory: Arc<D>) -> Self {
        Self { directory }
    }

    /// Returns `true` when any of the tenant's agents is available with a
    /// free slot.
    ///
    /// # Errors
    ///
    /// Returns transient directory failures.
    pub async fn has_available_capacity(&self, tenant_id: TenantId) -> DispatchResult<bool> {
        let agents = self.directory.list_available_agents(tenant_id).await?;
        Ok(agents.iter().any(|load| load.has_headroom()))
    }

    /// Returns the routing decision for a new escalation.
    ///
    /// # Errors
    ///
    /// Returns transient directory failures.
    pub async fn route(&self, tenant_id: TenantId) -> DispatchResult<RoutingDecision> {
        let decision = if self.has_available_capacity(tenant_id).await? {
            RoutingDecision::Queue
        } else {
            RoutingDecision::AfterHours
        };
        debug!(%tenant_id, ?decision, "escalation routed");
        Ok(decision)
    }

    /// Routes an escalation and invokes the matching dispatcher operation.
    ///
    /// # Errors
    ///
    /// Propagates routing and dispatcher failures.
    pub async fn escalate<S, T, N, C>(
        &self,
        dispatcher: &HandoffDispatcher<S, D, T, N, C>,
        request: CreateHandoffRequest,
        contact: Option<ContactDetails>,
    ) -> DispatchResult<EscalationOutcome>
    where
        S: HandoffStore,
        T: TenantIdentity,
        N: HandoffNotifier,
        C: Clock + Send + Sync,
    {
        match (self.route(request.tenant_id()).await?, contact) {
            (RoutingDecision::Queue, _) => dispatcher
                .create(request)
                .await
                .map(EscalationOutcome::Queued),
            (RoutingDecision::AfterHours, Some(details)) => dispatcher
                .capture_after_hours(CaptureRequest::new(request, details))
                .await
                .map(EscalationOutcome::Captured),
            (RoutingDecision::AfterHours, None) => Ok(EscalationOutcome::ContactRequired),
        }
    }
}
