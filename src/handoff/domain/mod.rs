//! Domain model for the handoff lifecycle.
//!
//! Pure types with no infrastructure dependencies: identifiers, the
//! [`Handoff`] aggregate and its state machine, post-escalation messages,
//! and the events pushed to connected parties.

mod error;
mod event;
mod handoff;
mod ids;
mod message;

pub use error::{
    HandoffDomainError, ParseExpiryReasonError, ParseHandoffStatusError, ParseSenderRoleError,
};
pub use event::HandoffEvent;
pub use handoff::{
    ContactFallback, ConversationTurn, ExpiryReason, Handoff, HandoffStatus, NewHandoff,
    PersistedHandoffData, TurnRole,
};
pub use ids::{AgentId, HandoffId, HandoffMessageId, SequenceNumber, SessionId, TenantId};
pub use message::{HandoffMessage, PersistedMessageData, SenderRole};
