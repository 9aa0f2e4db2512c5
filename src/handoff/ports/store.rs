//! Store port for handoff records and their transcripts.
//!
//! Every state-changing method is a single conditional write: it names the
//! state the record must currently be in and reports through its return
//! value whether the write affected a record. Callers never read-then-write
//! across two calls to decide a transition.

use crate::handoff::domain::{
    AgentId, ExpiryReason, Handoff, HandoffId, HandoffMessage, HandoffMessageId, HandoffStatus,
    SenderRole, SessionId, TenantId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Result type for handoff store operations.
pub type HandoffStoreResult<T> = Result<T, HandoffStoreError>;

/// Outcome of inserting a handoff that must be unique per open session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The record was persisted.
    Inserted(Handoff),
    /// An open handoff for the same tenant and session already existed and
    /// was returned instead.
    Existing(Handoff),
}

impl InsertOutcome {
    /// Returns the handoff regardless of which branch was taken.
    #[must_use]
    pub fn into_handoff(self) -> Handoff {
        match self {
            Self::Inserted(handoff) | Self::Existing(handoff) => handoff,
        }
    }
}

/// Outcome of appending a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The message was persisted with its authoritative timestamp and
    /// sequence number.
    Appended(HandoffMessage),
    /// The handoff was not `active`; nothing was written.
    Rejected(HandoffStatus),
}

/// Conditional claim of a pending handoff by an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimRequest {
    /// Handoff to claim.
    pub handoff_id: HandoffId,
    /// Tenant the handoff must belong to.
    pub tenant_id: TenantId,
    /// Claiming agent.
    pub agent_id: AgentId,
    /// Pickup timestamp.
    pub at: DateTime<Utc>,
}

/// Position after which a poll wants messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageCursor {
    /// The whole transcript.
    #[default]
    Start,
    /// Messages ordered after the given message.
    AfterMessage(HandoffMessageId),
    /// Messages stamped strictly after the given instant.
    AfterTimestamp(DateTime<Utc>),
}

/// Persistence contract for handoffs and their transcripts.
#[async_trait]
pub trait HandoffStore: Send + Sync {
    /// Persists `handoff` unless an open (`pending`/`active`) handoff
    /// already exists for the same tenant and session, in which case that
    /// one is returned. Terminal handoffs (captures) are always inserted.
    ///
    /// # Errors
    ///
    /// Returns [`HandoffStoreError::DuplicateHandoff`] when the ID exists.
    async fn insert_unless_open(&self, handoff: &Handoff) -> HandoffStoreResult<InsertOutcome>;

    /// Finds a handoff by identifier.
    async fn find_by_id(&self, id: HandoffId) -> HandoffStoreResult<Option<Handoff>>;

    /// Finds the open handoff for a tenant's session, if any.
    async fn find_open_for_session(
        &self,
        tenant_id: TenantId,
        session_id: &SessionId,
    ) -> HandoffStoreResult<Option<Handoff>>;

    /// Sets `status=active`, the assignee and `picked_up_at` where the
    /// handoff is `pending` in the given tenant. Returns `None` when no
    /// record was affected.
    async fn claim(&self, request: ClaimRequest) -> HandoffStoreResult<Option<Handoff>>;

    /// Sets `status=resolved` where the handoff is `active`. Returns `None`
    /// when no record was affected.
    async fn mark_resolved(
        &self,
        id: HandoffId,
        resolved_by: SenderRole,
        at: DateTime<Utc>,
    ) -> HandoffStoreResult<Option<Handoff>>;

    /// Sets `status=expired` where the handoff is `pending` and, when
    /// `requested_before` is given, was requested strictly before it.
    /// Returns `None` when no record was affected.
    async fn expire_pending(
        &self,
        id: HandoffId,
        requested_before: Option<DateTime<Utc>>,
        reason: ExpiryReason,
        at: DateTime<Utc>,
    ) -> HandoffStoreResult<Option<Handoff>>;

    /// Sets `status=expired` where the handoff is `active` and its last
    /// activity happened strictly before `idle_before`. Returns `None` when
    /// no record was affected.
    async fn expire_idle_active(
        &self,
        id: HandoffId,
        idle_before: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> HandoffStoreResult<Option<Handoff>>;

    /// Appends a drafted message if, and only if, the handoff is `active`.
    ///
    /// # Errors
    ///
    /// Returns [`HandoffStoreError::NotFound`] for an unknown handoff.
    async fn append_message(&self, message: &HandoffMessage) -> HandoffStoreResult<AppendOutcome>;

    /// Returns the messages of a handoff ordered after `cursor`, in
    /// authoritative order.
    ///
    /// # Errors
    ///
    /// Returns [`HandoffStoreError::UnknownCursor`] when the cursor names a
    /// message that does not belong to the handoff.
    async fn messages_since(
        &self,
        id: HandoffId,
        cursor: MessageCursor,
    ) -> HandoffStoreResult<Vec<HandoffMessage>>;

    /// Lists a tenant's pending handoffs, oldest request first.
    async fn list_pending(&self, tenant_id: TenantId) -> HandoffStoreResult<Vec<Handoff>>;

    /// Lists up to `limit` pending handoffs requested strictly before
    /// `cutoff`, across tenants, oldest first.
    async fn list_stale_pending(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> HandoffStoreResult<Vec<HandoffId>>;

    /// Lists up to `limit` active handoffs idle since strictly before
    /// `cutoff`, oldest activity first.
    async fn list_idle_active(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> HandoffStoreResult<Vec<HandoffId>>;

    /// Counts the `active` handoffs assigned to an agent.
    async fn count_active_for_agent(&self, agent_id: AgentId) -> HandoffStoreResult<u32>;
}

/// Errors returned by handoff store implementations.
#[derive(Debug, Clone, Error)]
pub enum HandoffStoreError {
    /// A handoff with the same identifier already exists.
    #[error("duplicate handoff identifier: {0}")]
    DuplicateHandoff(HandoffId),

    /// The handoff was not found.
    #[error("handoff not found: {0}")]
    NotFound(HandoffId),

    /// The cursor message is not part of the handoff transcript.
    #[error("message {message_id} is not part of handoff {handoff_id}")]
    UnknownCursor {
        /// Handoff being polled.
        handoff_id: HandoffId,
        /// Cursor message that was not found.
        message_id: HandoffMessageId,
    },

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl HandoffStoreError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
