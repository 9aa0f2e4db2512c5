//! Handoff aggregate root and lifecycle types.
//!
//! A handoff records one escalation from the automated chat agent to a
//! human operator. It moves forward through at most four states and is never
//! deleted; every transition is validated here before any adapter persists
//! it.

use super::{
    AgentId, HandoffDomainError, HandoffId, HandoffMessage, ParseExpiryReasonError,
    ParseHandoffStatusError, SenderRole, SessionId, TenantId,
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Handoff lifecycle state.
///
/// ```text
/// pending -> active     (pickup, exactly one winner)
/// pending -> expired    (timeout or explicit cancel)
/// active  -> resolved   (either party ends the session)
/// active  -> expired    (idle past the configured grace period)
/// ```
///
/// `captured` is only ever assigned at creation by the after-hours path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffStatus {
    /// Waiting in the tenant queue for an agent.
    Pending,
    /// Claimed by exactly one agent; messages flow.
    Active,
    /// Ended by one of the participants.
    Resolved,
    /// Timed out, cancelled, or abandoned.
    Expired,
    /// Recorded after hours with contact details; never offered to agents.
    Captured,
}

impl HandoffStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Resolved => "resolved",
            Self::Expired => "expired",
            Self::Captured => "captured",
        }
    }

    /// Returns `true` when no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Expired | Self::Captured)
    }

    /// Returns `true` for states that block a second handoff from the same
    /// session.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::Active)
    }

    /// Returns `true` when the lifecycle permits moving to `target`.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Active | Self::Expired)
                | (Self::Active, Self::Resolved | Self::Expired)
        )
    }
}

impl fmt::Display for HandoffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for HandoffStatus {
    type Error = ParseHandoffStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "resolved" => Ok(Self::Resolved),
            "expired" => Ok(Self::Expired),
            "captured" => Ok(Self::Captured),
            _ => Err(ParseHandoffStatusError(value.to_owned())),
        }
    }
}

/// Why a handoff ended up `expired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryReason {
    /// No agent picked the request up before the idle threshold.
    Timeout,
    /// The requesting session withdrew the request.
    Cancelled,
    /// An active conversation saw no activity within the grace period.
    AgentIdle,
}

impl ExpiryReason {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::AgentIdle => "agent_idle",
        }
    }
}

impl fmt::Display for ExpiryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ExpiryReason {
    type Error = ParseExpiryReasonError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim() {
            "timeout" => Ok(Self::Timeout),
            "cancelled" => Ok(Self::Cancelled),
            "agent_idle" => Ok(Self::AgentIdle),
            _ => Err(ParseExpiryReasonError(value.to_owned())),
        }
    }
}

/// Speaker of a turn in the automated conversation preceding escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    /// The end user typing into the widget.
    User,
    /// The automated chat agent.
    Assistant,
}

/// One prior turn of the automated conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Who produced the turn.
    pub role: TurnRole,
    /// Turn text.
    pub content: String,
    /// When the upstream system recorded the turn, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ConversationTurn {
    /// Creates a turn without an upstream timestamp.
    #[must_use]
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: None,
        }
    }

    /// Sets the upstream timestamp.
    #[must_use]
    pub const fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Contact details left by a user when nobody was available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactFallback {
    email: String,
    message: String,
}

impl ContactFallback {
    /// Creates validated contact details.
    ///
    /// # Errors
    ///
    /// Returns [`HandoffDomainError::InvalidContactEmail`] when the email has
    /// no local part or domain, and [`HandoffDomainError::EmptyContent`]
    /// when the message is blank.
    pub fn new(
        email: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<Self, HandoffDomainError> {
        let raw_email = email.into();
        let trimmed_email = raw_email.trim();
        let is_plausible = trimmed_email
            .split_once('@')
            .is_some_and(|(local, domain)| {
                !local.is_empty() && domain.contains('.') && !domain.contains('@')
            })
            && !trimmed_email.chars().any(char::is_whitespace);
        if !is_plausible {
            return Err(HandoffDomainError::InvalidContactEmail(raw_email));
        }

        let raw_message = message.into();
        if raw_message.trim().is_empty() {
            return Err(HandoffDomainError::EmptyContent);
        }

        Ok(Self {
            email: trimmed_email.to_owned(),
            message: raw_message.trim().to_owned(),
        })
    }

    /// Returns the contact email.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Returns the message left for the team.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Parameters shared by both creation paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHandoff {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Originating automated-chat session.
    pub source_session_id: SessionId,
    /// Automated turns captured at escalation time.
    pub conversation_snapshot: Vec<ConversationTurn>,
    /// Most recent user turn before escalation.
    pub last_user_message: Option<String>,
}

impl NewHandoff {
    /// Creates parameters with an empty snapshot.
    #[must_use]
    pub const fn new(tenant_id: TenantId, source_session_id: SessionId) -> Self {
        Self {
            tenant_id,
            source_session_id,
            conversation_snapshot: Vec::new(),
            last_user_message: None,
        }
    }

    /// Sets the conversation snapshot.
    #[must_use]
    pub fn with_snapshot(mut self, turns: impl IntoIterator<Item = ConversationTurn>) -> Self {
        self.conversation_snapshot = turns.into_iter().collect();
        self
    }

    /// Sets the cached last user message.
    #[must_use]
    pub fn with_last_user_message(mut self, message: impl Into<String>) -> Self {
        self.last_user_message = Some(message.into());
        self
    }
}

/// Handoff aggregate root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handoff {
    id: HandoffId,
    tenant_id: TenantId,
    source_session_id: SessionId,
    status: HandoffStatus,
    assigned_agent_id: Option<AgentId>,
    requested_at: DateTime<Utc>,
    picked_up_at: Option<DateTime<Utc>>,
    resolved_at: Option<DateTime<Utc>>,
    resolved_by: Option<SenderRole>,
    expired_at: Option<DateTime<Utc>>,
    expiry_reason: Option<ExpiryReason>,
    last_activity_at: DateTime<Utc>,
    conversation_snapshot: Vec<ConversationTurn>,
    last_user_message: Option<String>,
    contact_fallback: Option<ContactFallback>,
}

/// Parameter object for reconstructing a persisted handoff aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedHandoffData {
    /// Persisted handoff identifier.
    pub id: HandoffId,
    /// Persisted owning tenant.
    pub tenant_id: TenantId,
    /// Persisted originating session.
    pub source_session_id: SessionId,
    /// Persisted lifecycle state.
    pub status: HandoffStatus,
    /// Persisted assignee, if any.
    pub assigned_agent_id: Option<AgentId>,
    /// Persisted request timestamp.
    pub requested_at: DateTime<Utc>,
    /// Persisted pickup timestamp.
    pub picked_up_at: Option<DateTime<Utc>>,
    /// Persisted resolution timestamp.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Persisted resolving party.
    pub resolved_by: Option<SenderRole>,
    /// Persisted expiry timestamp.
    pub expired_at: Option<DateTime<Utc>>,
    /// Persisted expiry reason.
    pub expiry_reason: Option<ExpiryReason>,
    /// Persisted last activity timestamp.
    pub last_activity_at: DateTime<Utc>,
    /// Persisted conversation snapshot.
    pub conversation_snapshot: Vec<ConversationTurn>,
    /// Persisted cached last user message.
    pub last_user_message: Option<String>,
    /// Persisted after-hours contact details.
    pub contact_fallback: Option<ContactFallback>,
}

impl Handoff {
    /// Creates a `pending` handoff that will be offered to the tenant's
    /// agents.
    #[must_use]
    pub fn request(params: NewHandoff, clock: &impl Clock) -> Self {
        Self::build(params, HandoffStatus::Pending, None, clock.utc())
    }

    /// Creates a terminal `captured` handoff holding after-hours contact
    /// details. Captured handoffs never reach an agent.
    #[must_use]
    pub fn capture(params: NewHandoff, contact: ContactFallback, clock: &impl Clock) -> Self {
        Self::build(params, HandoffStatus::Captured, Some(contact), clock.utc())
    }

    fn build(
        params: NewHandoff,
        status: HandoffStatus,
        contact_fallback: Option<ContactFallback>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let last_user_message = params.last_user_message.or_else(|| {
            params
                .conversation_snapshot
                .iter()
                .rev()
                .find(|turn| turn.role == TurnRole::User)
                .map(|turn| turn.content.clone())
        });

        Self {
            id: HandoffId::new(),
            tenant_id: params.tenant_id,
            source_session_id: params.source_session_id,
            status,
            assigned_agent_id: None,
            requested_at: timestamp,
            picked_up_at: None,
            resolved_at: None,
            resolved_by: None,
            expired_at: None,
            expiry_reason: None,
            last_activity_at: timestamp,
            conversation_snapshot: params.conversation_snapshot,
            last_user_message,
            contact_fallback,
        }
    }

    /// Reconstructs a handoff from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedHandoffData) -> Self {
        Self {
            id: data.id,
            tenant_id: data.tenant_id,
            source_session_id: data.source_session_id,
            status: data.status,
            assigned_agent_id: data.assigned_agent_id,
            requested_at: data.requested_at,
            picked_up_at: data.picked_up_at,
            resolved_at: data.resolved_at,
            resolved_by: data.resolved_by,
            expired_at: data.expired_at,
            expiry_reason: data.expiry_reason,
            last_activity_at: data.last_activity_at,
            conversation_snapshot: data.conversation_snapshot,
            last_user_message: data.last_user_message,
            contact_fallback: data.contact_fallback,
        }
    }

    /// Returns the handoff identifier.
    #[must_use]
    pub const fn id(&self) -> HandoffId {
        self.id
    }

    /// Returns the owning tenant.
    #[must_use]
    pub const fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Returns the originating session.
    #[must_use]
    pub const fn source_session_id(&self) -> &SessionId {
        &self.source_session_id
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub const fn status(&self) -> HandoffStatus {
        self.status
    }

    /// Returns the assigned agent, if the handoff was ever picked up.
    #[must_use]
    pub const fn assigned_agent_id(&self) -> Option<AgentId> {
        self.assigned_agent_id
    }

    /// Returns when the handoff was requested.
    #[must_use]
    pub const fn requested_at(&self) -> DateTime<Utc> {
        self.requested_at
    }

    /// Returns when the handoff was picked up.
    #[must_use]
    pub const fn picked_up_at(&self) -> Option<DateTime<Utc>> {
        self.picked_up_at
    }

    /// Returns when the handoff was resolved.
    #[must_use]
    pub const fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
    }

    /// Returns which party resolved the handoff.
    #[must_use]
    pub const fn resolved_by(&self) -> Option<SenderRole> {
        self.resolved_by
    }

    /// Returns when the handoff expired.
    #[must_use]
    pub const fn expired_at(&self) -> Option<DateTime<Utc>> {
        self.expired_at
    }

    /// Returns why the handoff expired.
    #[must_use]
    pub const fn expiry_reason(&self) -> Option<ExpiryReason> {
        self.expiry_reason
    }

    /// Returns the timestamp of the most recent transition or message.
    #[must_use]
    pub const fn last_activity_at(&self) -> DateTime<Utc> {
        self.last_activity_at
    }

    /// Returns the automated turns captured at creation.
    #[must_use]
    pub fn conversation_snapshot(&self) -> &[ConversationTurn] {
        &self.conversation_snapshot
    }

    /// Returns the cached most recent user message.
    #[must_use]
    pub fn last_user_message(&self) -> Option<&str> {
        self.last_user_message.as_deref()
    }

    /// Returns the after-hours contact details.
    #[must_use]
    pub const fn contact_fallback(&self) -> Option<&ContactFallback> {
        self.contact_fallback.as_ref()
    }

    /// Returns `true` when the handoff can no longer change.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Returns `true` for a pending handoff requested strictly before
    /// `cutoff`.
    #[must_use]
    pub fn is_stale_pending(&self, cutoff: DateTime<Utc>) -> bool {
        self.status == HandoffStatus::Pending && self.requested_at < cutoff
    }

    /// Returns `true` for an active handoff whose last activity happened
    /// strictly before `cutoff`.
    #[must_use]
    pub fn is_idle_active(&self, cutoff: DateTime<Utc>) -> bool {
        self.status == HandoffStatus::Active && self.last_activity_at < cutoff
    }

    /// Assigns `agent_id` and moves the handoff to `active`.
    ///
    /// # Errors
    ///
    /// Returns [`HandoffDomainError::AgentAlreadyAssigned`] when an agent is
    /// already set, or [`HandoffDomainError::InvalidStateTransition`] when
    /// the handoff is not `pending`.
    pub fn claim(&mut self, agent_id: AgentId, at: DateTime<Utc>) -> Result<(), HandoffDomainError> {
        if self.assigned_agent_id.is_some() {
            return Err(HandoffDomainError::AgentAlreadyAssigned(self.id));
        }
        self.transition_to(HandoffStatus::Active)?;
        let stamped = self.monotonic(at);
        self.assigned_agent_id = Some(agent_id);
        self.picked_up_at = Some(stamped);
        self.touch(stamped);
        Ok(())
    }

    /// Ends an active conversation.
    ///
    /// # Errors
    ///
    /// Returns [`HandoffDomainError::InvalidStateTransition`] unless the
    /// handoff is `active`.
    pub fn resolve(
        &mut self,
        resolved_by: SenderRole,
        at: DateTime<Utc>,
    ) -> Result<(), HandoffDomainError> {
        self.transition_to(HandoffStatus::Resolved)?;
        let stamped = self.monotonic(at);
        self.resolved_at = Some(stamped);
        self.resolved_by = Some(resolved_by);
        self.touch(stamped);
        Ok(())
    }

    /// Expires a pending or active handoff.
    ///
    /// # Errors
    ///
    /// Returns [`HandoffDomainError::InvalidStateTransition`] when the
    /// handoff is already terminal.
    pub fn expire(&mut self, reason: ExpiryReason, at: DateTime<Utc>) -> Result<(), HandoffDomainError> {
        self.transition_to(HandoffStatus::Expired)?;
        let stamped = self.monotonic(at);
        self.expired_at = Some(stamped);
        self.expiry_reason = Some(reason);
        self.touch(stamped);
        Ok(())
    }

    /// Applies the side effects of an appended message to the aggregate.
    ///
    /// # Errors
    ///
    /// Returns [`HandoffDomainError::InvalidStateTransition`] (to the
    /// current state) when the handoff is not `active`.
    pub fn record_message(&mut self, message: &HandoffMessage) -> Result<(), HandoffDomainError> {
        if self.status != HandoffStatus::Active {
            return Err(HandoffDomainError::InvalidStateTransition {
                handoff_id: self.id,
                from: self.status,
                to: self.status,
            });
        }
        if message.sender_role() == SenderRole::User {
            self.last_user_message = Some(message.content().to_owned());
        }
        self.touch(message.timestamp());
        Ok(())
    }

    fn transition_to(&mut self, target: HandoffStatus) -> Result<(), HandoffDomainError> {
        if !self.status.can_transition_to(target) {
            return Err(HandoffDomainError::InvalidStateTransition {
                handoff_id: self.id,
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        Ok(())
    }

    /// Lifecycle timestamps never run backwards, even with clock skew
    /// between dispatcher instances.
    fn monotonic(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        at.max(self.last_activity_at)
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        if at > self.last_activity_at {
            self.last_activity_at = at;
        }
    }
}
