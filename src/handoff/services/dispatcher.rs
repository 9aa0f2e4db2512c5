//! Handoff dispatcher: lifecycle state machine and agent assignment.
//!
//! Every operation persists through the [`HandoffStore`] first and only
//! then publishes through the [`HandoffNotifier`]. A failed publish is
//! logged and swallowed; callers converge through the poll gateway.

use super::error::{DispatchError, DispatchResult};
use crate::config::DispatchConfig;
use crate::handoff::{
    domain::{
        AgentId, ContactFallback, ConversationTurn, ExpiryReason, Handoff, HandoffDomainError,
        HandoffEvent, HandoffId, HandoffMessage, HandoffStatus, NewHandoff, SenderRole,
        SessionId, TenantId,
    },
    ports::{
        AgentDirectory, AppendOutcome, Audience, ClaimRequest, HandoffNotifier, HandoffStore,
        InsertOutcome, TenantIdentity,
    },
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Narration appended when an agent joins a conversation.
pub const PICKUP_ANNOUNCEMENT: &str = "An agent has joined the conversation";

/// Request payload for escalating a session to a human agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateHandoffRequest {
    tenant_id: TenantId,
    session_id: String,
    conversation_snapshot: Vec<ConversationTurn>,
    last_user_message: Option<String>,
}

impl CreateHandoffRequest {
    /// Creates a request with an empty snapshot.
    #[must_use]
    pub fn new(tenant_id: TenantId, session_id: impl Into<String>) -> Self {
        Self {
            tenant_id,
            session_id: session_id.into(),
            conversation_snapshot: Vec::new(),
            last_user_message: None,
        }
    }

    /// Sets the automated turns preceding the escalation.
    #[must_use]
    pub fn with_snapshot(mut self, turns: impl IntoIterator<Item = ConversationTurn>) -> Self {
        self.conversation_snapshot = turns.into_iter().collect();
        self
    }

    /// Sets the most recent user turn.
    #[must_use]
    pub fn with_last_user_message(mut self, message: impl Into<String>) -> Self {
        self.last_user_message = Some(message.into());
        self
    }

    /// Returns the tenant the request targets.
    #[must_use]
    pub const fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn into_new_handoff(self) -> Result<NewHandoff, HandoffDomainError> {
        let session_id = SessionId::new(self.session_id)?;
        let mut params = NewHandoff::new(self.tenant_id, session_id)
            .with_snapshot(self.conversation_snapshot);
        if let Some(message) = self.last_user_message {
            params = params.with_last_user_message(message);
        }
        Ok(params)
    }
}

/// Contact details collected by the widget's offline form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactDetails {
    /// Address the team should reply to.
    pub email: String,
    /// Message left for the team.
    pub message: String,
}

impl ContactDetails {
    /// Creates contact details.
    #[must_use]
    pub fn new(email: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            message: message.into(),
        }
    }
}

/// Request payload for the after-hours capture path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    handoff: CreateHandoffRequest,
    contact: ContactDetails,
}

impl CaptureRequest {
    /// Creates a capture request.
    #[must_use]
    pub const fn new(handoff: CreateHandoffRequest, contact: ContactDetails) -> Self {
        Self { handoff, contact }
    }
}

/// Lifecycle and assignment service for handoffs.
pub struct HandoffDispatcher<S, D, T, N, C>
where
    S: HandoffStore,
    D: AgentDirectory,
    T: TenantIdentity,
    N: HandoffNotifier,
    C: Clock + Send + Sync,
{
    store: Arc<S>,
    directory: Arc<D>,
    tenants: Arc<T>,
    notifier: Arc<N>,
    clock: Arc<C>,
    config: DispatchConfig,
}

impl<S, D, T, N, C> HandoffDispatcher<S, D, T, N, C>
where
    S: HandoffStore,
    D: AgentDirectory,
    T: TenantIdentity,
    N: HandoffNotifier,
    C: Clock + Send + Sync,
{
    /// Creates a dispatcher over the given ports.
    #[must_use]
    pub const fn new(
        store: Arc<S>,
        directory: Arc<D>,
        tenants: Arc<T>,
        notifier: Arc<N>,
        clock: Arc<C>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            store,
            directory,
            tenants,
            notifier,
            clock,
            config,
        }
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Creates a `pending` handoff, or returns the open one already held by
    /// the same tenant session.
    ///
    /// Only a newly inserted handoff is announced to the tenant's agents.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidTenant`] for unknown or suspended
    /// tenants, [`DispatchError::Domain`] for an invalid session identifier,
    /// and transient store or tenant lookup failures.
    pub async fn create(&self, request: CreateHandoffRequest) -> DispatchResult<Handoff> {
        self.ensure_tenant(request.tenant_id()).await?;
        let handoff = Handoff::request(request.into_new_handoff()?, &*self.clock);

        match self.store.insert_unless_open(&handoff).await? {
            InsertOutcome::Inserted(created) => {
                info!(
                    handoff_id = %created.id(),
                    tenant_id = %created.tenant_id(),
                    session_id = %created.source_session_id(),
                    "handoff created"
                );
                self.broadcast(
                    HandoffEvent::Created(created.clone()),
                    Audience::TenantAgents(created.tenant_id()),
                )
                .await;
                Ok(created)
            }
            InsertOutcome::Existing(existing) => {
                debug!(
                    handoff_id = %existing.id(),
                    status = %existing.status(),
                    "session already has an open handoff"
                );
                Ok(existing)
            }
        }
    }

    /// Persists a terminal `captured` handoff carrying contact details.
    ///
    /// Nothing is broadcast: agents never see captured handoffs.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidTenant`], [`DispatchError::Domain`]
    /// for invalid contact details or session, and transient failures.
    pub async fn capture_after_hours(&self, request: CaptureRequest) -> DispatchResult<Handoff> {
        let CaptureRequest { handoff, contact } = request;
        self.ensure_tenant(handoff.tenant_id()).await?;
        let fallback = ContactFallback::new(contact.email, contact.message)?;
        let captured = Handoff::capture(handoff.into_new_handoff()?, fallback, &*self.clock);

        let stored = self.store.insert_unless_open(&captured).await?.into_handoff();
        info!(
            handoff_id = %stored.id(),
            tenant_id = %stored.tenant_id(),
            "after-hours contact captured"
        );
        Ok(stored)
    }

    /// Claims a pending handoff for `agent_id`.
    ///
    /// The claim is a single conditional write; of any number of concurrent
    /// callers, exactly one succeeds.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::NotFound`] for an unknown handoff or one of
    ///   another tenant.
    /// - [`DispatchError::AgentNotFound`] for an unknown agent.
    /// - [`DispatchError::ClosedHandoff`] when the handoff is terminal.
    /// - [`DispatchError::CapacityExceeded`] when the agent has no free slot.
    /// - [`DispatchError::AlreadyClaimed`] when another agent won.
    pub async fn pickup(&self, handoff_id: HandoffId, agent_id: AgentId) -> DispatchResult<Handoff> {
        let handoff = self.find(handoff_id).await?;
        let profile = self
            .directory
            .get_agent(agent_id)
            .await?
            .ok_or(DispatchError::AgentNotFound(agent_id))?;
        if profile.tenant_id != handoff.tenant_id() {
            return Err(DispatchError::NotFound(handoff_id));
        }
        match handoff.status() {
            HandoffStatus::Pending => {}
            HandoffStatus::Active => return Err(DispatchError::AlreadyClaimed(handoff_id)),
            status => return Err(DispatchError::ClosedHandoff { handoff_id, status }),
        }
        if !profile.load.has_headroom() {
            return Err(DispatchError::CapacityExceeded {
                agent_id,
                active_count: profile.load.active_count,
                max_capacity: profile.load.max_capacity,
            });
        }

        let request = ClaimRequest {
            handoff_id,
            tenant_id: profile.tenant_id,
            agent_id,
            at: self.clock.utc(),
        };
        let Some(active) = self.store.claim(request).await? else {
            return Err(self.lost_claim(handoff_id).await);
        };

        if let Err(err) = self.directory.increment_load(agent_id).await {
            warn!(%agent_id, error = %err, "failed to increment agent load after pickup");
        }
        info!(%handoff_id, %agent_id, "handoff picked up");

        self.broadcast(
            HandoffEvent::PickedUp(active.clone()),
            Audience::AgentsAndSession {
                tenant_id: active.tenant_id(),
                session_id: active.source_session_id().clone(),
            },
        )
        .await;
        if self.config.announce_pickup {
            self.announce_pickup(&active).await;
        }
        Ok(active)
    }

    /// Appends a message to an active handoff and pushes it to the
    /// counterpart.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::NotFound`] for an unknown handoff.
    /// - [`DispatchError::AwaitingAgent`] while the handoff is `pending`.
    /// - [`DispatchError::ClosedHandoff`] once the handoff is terminal.
    /// - [`DispatchError::Domain`] for empty or over-long content on an
    ///   active handoff.
    ///
    /// The status is checked before the content, and again by the store's
    /// conditional append.
    pub async fn post_message(
        &self,
        handoff_id: HandoffId,
        sender_role: SenderRole,
        content: &str,
    ) -> DispatchResult<HandoffMessage> {
        let handoff = self.find(handoff_id).await?;
        match handoff.status() {
            HandoffStatus::Active => {}
            HandoffStatus::Pending => return Err(DispatchError::AwaitingAgent(handoff_id)),
            status => return Err(DispatchError::ClosedHandoff { handoff_id, status }),
        }
        let draft = HandoffMessage::compose(
            handoff_id,
            sender_role,
            content,
            self.config.max_message_length,
            &*self.clock,
        )?;

        match self.store.append_message(&draft).await? {
            AppendOutcome::Appended(message) => {
                debug!(
                    %handoff_id,
                    message_id = %message.id(),
                    sender_role = %sender_role,
                    sequence = %message.sequence(),
                    "message appended"
                );
                self.broadcast(
                    HandoffEvent::Message(message.clone()),
                    counterpart_of(&handoff, sender_role),
                )
                .await;
                Ok(message)
            }
            AppendOutcome::Rejected(HandoffStatus::Pending) => {
                Err(DispatchError::AwaitingAgent(handoff_id))
            }
            AppendOutcome::Rejected(status) => {
                Err(DispatchError::ClosedHandoff { handoff_id, status })
            }
        }
    }

    /// Ends an active conversation. Resolving a resolved handoff returns it
    /// unchanged.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::NotFound`] for an unknown handoff.
    /// - [`DispatchError::Domain`] when the handoff is still `pending`.
    /// - [`DispatchError::ClosedHandoff`] when it expired or was captured.
    pub async fn resolve(
        &self,
        handoff_id: HandoffId,
        resolved_by: SenderRole,
    ) -> DispatchResult<Handoff> {
        let handoff = self.find(handoff_id).await?;
        if handoff.status() != HandoffStatus::Active {
            return settled_resolution(handoff);
        }

        let outcome = self
            .store
            .mark_resolved(handoff_id, resolved_by, self.clock.utc())
            .await?;
        let Some(resolved) = outcome else {
            return settled_resolution(self.find(handoff_id).await?);
        };

        self.release_agent(&resolved).await;
        info!(%handoff_id, resolved_by = %resolved_by, "handoff resolved");
        self.broadcast(
            HandoffEvent::Resolved(resolved.clone()),
            participants_of(&resolved),
        )
        .await;
        Ok(resolved)
    }

    /// Expires a pending handoff that has waited longer than the configured
    /// timeout. Returns `None` when the handoff was not eligible.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NotFound`] for an unknown handoff and
    /// transient store failures.
    pub async fn expire_pending(&self, handoff_id: HandoffId) -> DispatchResult<Option<Handoff>> {
        let now = self.clock.utc();
        let cutoff = window_start(now, self.config.pending_timeout);
        let expired = self
            .store
            .expire_pending(handoff_id, Some(cutoff), ExpiryReason::Timeout, now)
            .await?;

        match expired {
            Some(handoff) => {
                info!(%handoff_id, reason = %ExpiryReason::Timeout, "pending handoff expired");
                self.announce_expiry(&handoff).await;
                Ok(Some(handoff))
            }
            None => {
                self.find(handoff_id).await?;
                debug!(%handoff_id, "handoff not eligible for pending expiry");
                Ok(None)
            }
        }
    }

    /// Withdraws a pending handoff at the requester's initiative.
    /// Cancelling an already cancelled handoff returns it unchanged.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::NotFound`] for an unknown handoff.
    /// - [`DispatchError::AlreadyClaimed`] once an agent picked it up.
    /// - [`DispatchError::ClosedHandoff`] when it ended otherwise.
    pub async fn cancel(&self, handoff_id: HandoffId) -> DispatchResult<Handoff> {
        let cancelled = self
            .store
            .expire_pending(handoff_id, None, ExpiryReason::Cancelled, self.clock.utc())
            .await?;
        if let Some(handoff) = cancelled {
            info!(%handoff_id, reason = %ExpiryReason::Cancelled, "pending handoff cancelled");
            self.announce_expiry(&handoff).await;
            return Ok(handoff);
        }

        let current = self.find(handoff_id).await?;
        match (current.status(), current.expiry_reason()) {
            (HandoffStatus::Expired, Some(ExpiryReason::Cancelled)) => Ok(current),
            (HandoffStatus::Active, _) => Err(DispatchError::AlreadyClaimed(handoff_id)),
            (status, _) => Err(DispatchError::ClosedHandoff { handoff_id, status }),
        }
    }

    /// Expires an active handoff with no activity for the configured grace
    /// period. Always returns `None` while idle expiry is disabled.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NotFound`] for an unknown handoff and
    /// transient store failures.
    pub async fn expire_idle_active(
        &self,
        handoff_id: HandoffId,
    ) -> DispatchResult<Option<Handoff>> {
        let Some(grace) = self.config.active_idle_grace else {
            return Ok(None);
        };
        let now = self.clock.utc();
        let expired = self
            .store
            .expire_idle_active(handoff_id, window_start(now, grace), now)
            .await?;

        match expired {
            Some(handoff) => {
                self.release_agent(&handoff).await;
                info!(%handoff_id, reason = %ExpiryReason::AgentIdle, "idle active handoff expired");
                self.broadcast(
                    HandoffEvent::Expired(handoff.clone()),
                    participants_of(&handoff),
                )
                .await;
                Ok(Some(handoff))
            }
            None => {
                self.find(handoff_id).await?;
                Ok(None)
            }
        }
    }

    /// Recomputes an agent's active count from the store and writes it
    /// back to the directory.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::AgentNotFound`] for an unknown agent and
    /// transient store or directory failures.
    pub async fn recount_agent_load(&self, agent_id: AgentId) -> DispatchResult<u32> {
        let profile = self
            .directory
            .get_agent(agent_id)
            .await?
            .ok_or(DispatchError::AgentNotFound(agent_id))?;
        let counted = self.store.count_active_for_agent(agent_id).await?;
        self.directory.set_load(agent_id, counted).await?;

        if counted == profile.load.active_count {
            debug!(%agent_id, active_count = counted, "agent load consistent");
        } else {
            info!(
                %agent_id,
                cached = profile.load.active_count,
                counted,
                "agent load repaired"
            );
        }
        Ok(counted)
    }

    /// Returns up to one sweep batch of pending handoffs past the timeout.
    ///
    /// # Errors
    ///
    /// Returns transient store failures.
    pub async fn stale_pending_batch(&self) -> DispatchResult<Vec<HandoffId>> {
        let cutoff = window_start(self.clock.utc(), self.config.pending_timeout);
        Ok(self
            .store
            .list_stale_pending(cutoff, self.config.sweep_batch_size)
            .await?)
    }

    /// Returns up to one sweep batch of idle active handoffs, or nothing
    /// while idle expiry is disabled.
    ///
    /// # Errors
    ///
    /// Returns transient store failures.
    pub async fn idle_active_batch(&self) -> DispatchResult<Vec<HandoffId>> {
        let Some(grace) = self.config.active_idle_grace else {
            return Ok(Vec::new());
        };
        let cutoff = window_start(self.clock.utc(), grace);
        Ok(self
            .store
            .list_idle_active(cutoff, self.config.sweep_batch_size)
            .await?)
    }

    async fn ensure_tenant(&self, tenant_id: TenantId) -> DispatchResult<()> {
        let standing = self.tenants.resolve_tenant(tenant_id).await?;
        if standing.accepts_handoffs() {
            Ok(())
        } else {
            warn!(%tenant_id, exists = standing.exists, "rejected handoff for invalid tenant");
            Err(DispatchError::InvalidTenant(tenant_id))
        }
    }

    async fn find(&self, handoff_id: HandoffId) -> DispatchResult<Handoff> {
        self.store
            .find_by_id(handoff_id)
            .await?
            .ok_or(DispatchError::NotFound(handoff_id))
    }

    async fn lost_claim(&self, handoff_id: HandoffId) -> DispatchError {
        match self.find(handoff_id).await {
            Ok(current) if current.is_terminal() => DispatchError::ClosedHandoff {
                handoff_id,
                status: current.status(),
            },
            Ok(_) => DispatchError::AlreadyClaimed(handoff_id),
            Err(err) => err,
        }
    }

    async fn release_agent(&self, handoff: &Handoff) {
        let Some(agent_id) = handoff.assigned_agent_id() else {
            return;
        };
        if let Err(err) = self.directory.decrement_load(agent_id).await {
            warn!(%agent_id, handoff_id = %handoff.id(), error = %err, "failed to decrement agent load");
        }
    }

    async fn announce_pickup(&self, handoff: &Handoff) {
        let draft = match HandoffMessage::compose(
            handoff.id(),
            SenderRole::System,
            PICKUP_ANNOUNCEMENT,
            self.config.max_message_length,
            &*self.clock,
        ) {
            Ok(draft) => draft,
            Err(err) => {
                warn!(handoff_id = %handoff.id(), error = %err, "pickup announcement rejected");
                return;
            }
        };

        match self.store.append_message(&draft).await {
            Ok(AppendOutcome::Appended(message)) => {
                self.broadcast(HandoffEvent::Message(message), participants_of(handoff))
                    .await;
            }
            Ok(AppendOutcome::Rejected(status)) => {
                debug!(handoff_id = %handoff.id(), %status, "handoff closed before announcement");
            }
            Err(err) => {
                warn!(handoff_id = %handoff.id(), error = %err, "failed to append pickup announcement");
            }
        }
    }

    async fn announce_expiry(&self, handoff: &Handoff) {
        self.broadcast(
            HandoffEvent::Expired(handoff.clone()),
            Audience::AgentsAndSession {
                tenant_id: handoff.tenant_id(),
                session_id: handoff.source_session_id().clone(),
            },
        )
        .await;
    }

    async fn broadcast(&self, event: HandoffEvent, audience: Audience) {
        match self.notifier.publish(&event, &audience).await {
            Ok(report) => {
                debug!(
                    event = event.name(),
                    handoff_id = %event.handoff_id(),
                    delivered = report.delivered,
                    dropped = report.dropped,
                    "event published"
                );
            }
            Err(err) => {
                warn!(
                    event = event.name(),
                    handoff_id = %event.handoff_id(),
                    error = %err,
                    "event publish failed"
                );
            }
        }
    }
}

/// Maps a non-active handoff to the outcome of a resolve request.
fn settled_resolution(handoff: Handoff) -> DispatchResult<Handoff> {
    match handoff.status() {
        HandoffStatus::Resolved => {
            debug!(handoff_id = %handoff.id(), "handoff already resolved");
            Ok(handoff)
        }
        HandoffStatus::Pending | HandoffStatus::Active => {
            Err(DispatchError::Domain(HandoffDomainError::InvalidStateTransition {
                handoff_id: handoff.id(),
                from: handoff.status(),
                to: HandoffStatus::Resolved,
            }))
        }
        status => Err(DispatchError::ClosedHandoff {
            handoff_id: handoff.id(),
            status,
        }),
    }
}

fn participants_of(handoff: &Handoff) -> Audience {
    Audience::Participants {
        tenant_id: handoff.tenant_id(),
        session_id: handoff.source_session_id().clone(),
        agent_id: handoff.assigned_agent_id(),
    }
}

fn counterpart_of(handoff: &Handoff, sender_role: SenderRole) -> Audience {
    match (sender_role, handoff.assigned_agent_id()) {
        (SenderRole::User, Some(agent_id)) => Audience::Agent {
            tenant_id: handoff.tenant_id(),
            agent_id,
        },
        (SenderRole::Agent, _) => Audience::Session {
            tenant_id: handoff.tenant_id(),
            session_id: handoff.source_session_id().clone(),
        },
        _ => participants_of(handoff),
    }
}

/// Start of a trailing window of `length` ending at `now`.
fn window_start(now: DateTime<Utc>, length: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(length)
        .ok()
        .and_then(|delta| now.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
