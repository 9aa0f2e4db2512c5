//! Push events emitted after a successful state change.
//!
//! Every event carries the full updated record rather than a delta, so a
//! consumer that missed earlier events converges from the latest one plus a
//! poll.

use super::{Handoff, HandoffId, HandoffMessage};
use serde::{Deserialize, Serialize};

/// Event pushed to connected widget sessions and agent consoles.
///
/// Serialises as `{"event": "handoff.created", "data": {...}}`.
///
/// # Examples
///
/// ```
/// use switchboard::handoff::domain::{Handoff, HandoffEvent, NewHandoff, SessionId, TenantId};
/// use mockable::DefaultClock;
///
/// let params = NewHandoff::new(TenantId::new(), SessionId::new("s-1").expect("valid"));
/// let event = HandoffEvent::Created(Handoff::request(params, &DefaultClock));
/// let json = serde_json::to_value(&event).expect("serialisable");
/// assert_eq!(json["event"], "handoff.created");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum HandoffEvent {
    /// A new pending handoff entered the tenant queue.
    #[serde(rename = "handoff.created")]
    Created(Handoff),
    /// An agent won the pickup.
    #[serde(rename = "handoff.pickedUp")]
    PickedUp(Handoff),
    /// A message was appended to an active handoff.
    #[serde(rename = "handoff.message")]
    Message(HandoffMessage),
    /// A participant ended the conversation.
    #[serde(rename = "handoff.resolved")]
    Resolved(Handoff),
    /// The handoff timed out, was cancelled, or went idle.
    #[serde(rename = "handoff.expired")]
    Expired(Handoff),
}

impl HandoffEvent {
    /// Returns the wire name of the event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Created(_) => "handoff.created",
            Self::PickedUp(_) => "handoff.pickedUp",
            Self::Message(_) => "handoff.message",
            Self::Resolved(_) => "handoff.resolved",
            Self::Expired(_) => "handoff.expired",
        }
    }

    /// Returns the handoff the event concerns.
    #[must_use]
    pub const fn handoff_id(&self) -> HandoffId {
        match self {
            Self::Created(handoff)
            | Self::PickedUp(handoff)
            | Self::Resolved(handoff)
            | Self::Expired(handoff) => handoff.id(),
            Self::Message(message) => message.handoff_id(),
        }
    }
}
