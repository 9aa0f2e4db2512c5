//! Messages exchanged between the requesting session and the assigned agent.
//!
//! Messages are append-only. The store is the single authoritative source
//! of ordering: it stamps every message with a timestamp and a per-handoff
//! sequence number when the append succeeds.

use super::{HandoffDomainError, HandoffId, HandoffMessageId, ParseSenderRoleError, SequenceNumber};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Author of a post-escalation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderRole {
    /// The end user in the widget session.
    User,
    /// The assigned human agent.
    Agent,
    /// Status narration such as "an agent joined".
    System,
}

impl SenderRole {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
            Self::System => "system",
        }
    }
}

impl fmt::Display for SenderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for SenderRole {
    type Error = ParseSenderRoleError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "agent" => Ok(Self::Agent),
            "system" => Ok(Self::System),
            _ => Err(ParseSenderRoleError(value.to_owned())),
        }
    }
}

/// One turn exchanged after escalation.
///
/// # Examples
///
/// ```
/// use switchboard::handoff::domain::{HandoffId, HandoffMessage, SenderRole};
/// use mockable::DefaultClock;
///
/// let message = HandoffMessage::compose(
///     HandoffId::new(),
///     SenderRole::User,
///     "  still there?  ",
///     4000,
///     &DefaultClock,
/// )
/// .expect("valid message");
/// assert_eq!(message.content(), "still there?");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffMessage {
    id: HandoffMessageId,
    handoff_id: HandoffId,
    sender_role: SenderRole,
    content: String,
    timestamp: DateTime<Utc>,
    sequence: SequenceNumber,
}

/// Parameter object for reconstructing a persisted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedMessageData {
    /// Persisted message identifier.
    pub id: HandoffMessageId,
    /// Persisted parent handoff.
    pub handoff_id: HandoffId,
    /// Persisted author role.
    pub sender_role: SenderRole,
    /// Persisted content.
    pub content: String,
    /// Persisted authoritative timestamp.
    pub timestamp: DateTime<Utc>,
    /// Persisted per-handoff sequence number.
    pub sequence: SequenceNumber,
}

impl HandoffMessage {
    /// Validates content and drafts a message for `handoff_id`.
    ///
    /// The timestamp taken from `clock` is provisional: the store replaces it
    /// if it would not sort after the previous message of the handoff.
    ///
    /// # Errors
    ///
    /// Returns [`HandoffDomainError::EmptyContent`] for blank content and
    /// [`HandoffDomainError::ContentTooLong`] when the trimmed content has
    /// more than `max_length` characters.
    pub fn compose(
        handoff_id: HandoffId,
        sender_role: SenderRole,
        content: &str,
        max_length: usize,
        clock: &impl Clock,
    ) -> Result<Self, HandoffDomainError> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(HandoffDomainError::EmptyContent);
        }
        let length = trimmed.chars().count();
        if length > max_length {
            return Err(HandoffDomainError::ContentTooLong {
                max: max_length,
                actual: length,
            });
        }

        Ok(Self {
            id: HandoffMessageId::new(),
            handoff_id,
            sender_role,
            content: trimmed.to_owned(),
            timestamp: clock.utc(),
            sequence: SequenceNumber::new(0),
        })
    }

    /// Reconstructs a message from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedMessageData) -> Self {
        Self {
            id: data.id,
            handoff_id: data.handoff_id,
            sender_role: data.sender_role,
            content: data.content,
            timestamp: data.timestamp,
            sequence: data.sequence,
        }
    }

    /// Applies the store's authoritative ordering to a drafted message.
    ///
    /// The timestamp is moved forward to one microsecond past `previous`
    /// when the drafted one would not sort strictly after it. Microseconds
    /// match the precision `PostgreSQL` keeps for `timestamptz`.
    #[must_use]
    pub fn stamped(mut self, previous: Option<(DateTime<Utc>, SequenceNumber)>) -> Self {
        match previous {
            Some((last_timestamp, last_sequence)) => {
                let floor = last_timestamp + chrono::Duration::microseconds(1);
                if self.timestamp < floor {
                    self.timestamp = floor;
                }
                self.sequence = last_sequence.next();
            }
            None => self.sequence = SequenceNumber::new(1),
        }
        self
    }

    /// Returns the message identifier.
    #[must_use]
    pub const fn id(&self) -> HandoffMessageId {
        self.id
    }

    /// Returns the parent handoff.
    #[must_use]
    pub const fn handoff_id(&self) -> HandoffId {
        self.handoff_id
    }

    /// Returns who sent the message.
    #[must_use]
    pub const fn sender_role(&self) -> SenderRole {
        self.sender_role
    }

    /// Returns the message text.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Returns the authoritative timestamp.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the per-handoff sequence number.
    #[must_use]
    pub const fn sequence(&self) -> SequenceNumber {
        self.sequence
    }

    /// Returns the key messages are totally ordered by.
    #[must_use]
    pub const fn ordering_key(&self) -> (DateTime<Utc>, SequenceNumber) {
        (self.timestamp, self.sequence)
    }
}
