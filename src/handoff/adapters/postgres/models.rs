//! Diesel row models for handoff persistence and their domain mappings.

use super::schema::{handoff_messages, handoffs};
use crate::handoff::{
    domain::{
        AgentId, ContactFallback, ConversationTurn, ExpiryReason, Handoff, HandoffId,
        HandoffMessage, HandoffMessageId, HandoffStatus, PersistedHandoffData,
        PersistedMessageData, SenderRole, SequenceNumber, SessionId, TenantId,
    },
    ports::{HandoffStoreError, HandoffStoreResult},
};
use chrono::{DateTime, SubsecRound, Utc};
use diesel::prelude::*;
use serde_json::Value;

/// `timestamptz` keeps microseconds; rows are normalised before writing so
/// the returned aggregate equals what a later read produces.
const STORED_SUBSEC_DIGITS: u16 = 6;

fn stored(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(STORED_SUBSEC_DIGITS)
}

fn stored_opt(at: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    at.map(stored)
}

/// Handoff row, used for reads, inserts and full-row updates.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = handoffs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub struct HandoffRow {
    /// Handoff identifier.
    pub id: uuid::Uuid,
    /// Owning tenant.
    pub tenant_id: uuid::Uuid,
    /// Originating session.
    pub source_session_id: String,
    /// Lifecycle state.
    pub status: String,
    /// Assigned agent.
    pub assigned_agent_id: Option<uuid::Uuid>,
    /// Creation timestamp.
    pub requested_at: DateTime<Utc>,
    /// Pickup timestamp.
    pub picked_up_at: Option<DateTime<Utc>>,
    /// Resolution timestamp.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Resolving party.
    pub resolved_by: Option<String>,
    /// Expiry timestamp.
    pub expired_at: Option<DateTime<Utc>>,
    /// Expiry reason.
    pub expiry_reason: Option<String>,
    /// Last activity timestamp.
    pub last_activity_at: DateTime<Utc>,
    /// Snapshot JSON array.
    pub conversation_snapshot: Value,
    /// Cached last user message.
    pub last_user_message: Option<String>,
    /// After-hours contact email.
    pub contact_email: Option<String>,
    /// After-hours contact message.
    pub contact_message: Option<String>,
}

impl HandoffRow {
    /// Maps a domain aggregate to a row.
    pub fn from_handoff(handoff: &Handoff) -> HandoffStoreResult<Self> {
        let conversation_snapshot = serde_json::to_value(handoff.conversation_snapshot())
            .map_err(HandoffStoreError::persistence)?;
        let contact = handoff.contact_fallback();

        Ok(Self {
            id: handoff.id().into_inner(),
            tenant_id: handoff.tenant_id().into_inner(),
            source_session_id: handoff.source_session_id().as_str().to_owned(),
            status: handoff.status().as_str().to_owned(),
            assigned_agent_id: handoff.assigned_agent_id().map(AgentId::into_inner),
            requested_at: stored(handoff.requested_at()),
            picked_up_at: stored_opt(handoff.picked_up_at()),
            resolved_at: stored_opt(handoff.resolved_at()),
            resolved_by: handoff.resolved_by().map(|role| role.as_str().to_owned()),
            expired_at: stored_opt(handoff.expired_at()),
            expiry_reason: handoff
                .expiry_reason()
                .map(|reason| reason.as_str().to_owned()),
            last_activity_at: stored(handoff.last_activity_at()),
            conversation_snapshot,
            last_user_message: handoff.last_user_message().map(str::to_owned),
            contact_email: contact.map(|c| c.email().to_owned()),
            contact_message: contact.map(|c| c.message().to_owned()),
        })
    }

    /// Maps a row back to the domain aggregate.
    pub fn into_handoff(self) -> HandoffStoreResult<Handoff> {
        let Self {
            id,
            tenant_id,
            source_session_id,
            status,
            assigned_agent_id,
            requested_at,
            picked_up_at,
            resolved_at,
            resolved_by,
            expired_at,
            expiry_reason,
            last_activity_at,
            conversation_snapshot,
            last_user_message,
            contact_email,
            contact_message,
        } = self;

        let contact_fallback = match (contact_email, contact_message) {
            (Some(email), Some(message)) => Some(
                ContactFallback::new(email, message).map_err(HandoffStoreError::persistence)?,
            ),
            (None, None) => None,
            _ => {
                return Err(HandoffStoreError::persistence(std::io::Error::other(format!(
                    "handoff {id} stores only half of its contact fallback"
                ))));
            }
        };

        let data = PersistedHandoffData {
            id: HandoffId::from_uuid(id),
            tenant_id: TenantId::from_uuid(tenant_id),
            source_session_id: SessionId::new(source_session_id)
                .map_err(HandoffStoreError::persistence)?,
            status: HandoffStatus::try_from(status.as_str())
                .map_err(HandoffStoreError::persistence)?,
            assigned_agent_id: assigned_agent_id.map(AgentId::from_uuid),
            requested_at,
            picked_up_at,
            resolved_at,
            resolved_by: resolved_by
                .as_deref()
                .map(SenderRole::try_from)
                .transpose()
                .map_err(HandoffStoreError::persistence)?,
            expired_at,
            expiry_reason: expiry_reason
                .as_deref()
                .map(ExpiryReason::try_from)
                .transpose()
                .map_err(HandoffStoreError::persistence)?,
            last_activity_at,
            conversation_snapshot: serde_json::from_value::<Vec<ConversationTurn>>(
                conversation_snapshot,
            )
            .map_err(HandoffStoreError::persistence)?,
            last_user_message,
            contact_fallback,
        };
        Ok(Handoff::from_persisted(data))
    }
}

/// Transcript message row.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Insertable)]
#[diesel(table_name = handoff_messages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MessageRow {
    /// Message identifier.
    pub id: uuid::Uuid,
    /// Parent handoff.
    pub handoff_id: uuid::Uuid,
    /// Author role.
    pub sender_role: String,
    /// Message text.
    pub content: String,
    /// Authoritative timestamp.
    pub created_at: DateTime<Utc>,
    /// Per-handoff sequence number.
    pub sequence_number: i64,
}

impl MessageRow {
    /// Maps a stamped domain message to a row.
    pub fn from_message(message: &HandoffMessage) -> HandoffStoreResult<Self> {
        Ok(Self {
            id: message.id().into_inner(),
            handoff_id: message.handoff_id().into_inner(),
            sender_role: message.sender_role().as_str().to_owned(),
            content: message.content().to_owned(),
            created_at: stored(message.timestamp()),
            sequence_number: i64::try_from(message.sequence().value())
                .map_err(HandoffStoreError::persistence)?,
        })
    }

    /// Maps a row back to the domain message.
    pub fn into_message(self) -> HandoffStoreResult<HandoffMessage> {
        let sequence =
            u64::try_from(self.sequence_number).map_err(HandoffStoreError::persistence)?;
        let sender_role = SenderRole::try_from(self.sender_role.as_str())
            .map_err(HandoffStoreError::persistence)?;
        Ok(HandoffMessage::from_persisted(PersistedMessageData {
            id: HandoffMessageId::from_uuid(self.id),
            handoff_id: HandoffId::from_uuid(self.handoff_id),
            sender_role,
            content: self.content,
            timestamp: self.created_at,
            sequence: SequenceNumber::new(sequence),
        }))
    }

    /// Returns the ordering key of the stored row.
    pub fn ordering_key(&self) -> HandoffStoreResult<(DateTime<Utc>, SequenceNumber)> {
        let sequence =
            u64::try_from(self.sequence_number).map_err(HandoffStoreError::persistence)?;
        Ok((self.created_at, SequenceNumber::new(sequence)))
    }
}
