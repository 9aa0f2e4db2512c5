//! Error types for handoff domain validation and parsing.

use super::{HandoffId, HandoffStatus};
use thiserror::Error;

/// Errors returned while constructing or transitioning handoff values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandoffDomainError {
    /// The upstream session identifier is blank or too long.
    #[error("invalid session identifier '{0}'")]
    InvalidSessionId(String),

    /// The requested lifecycle transition is not permitted.
    #[error("invalid handoff transition for {handoff_id}: {from} -> {to}")]
    InvalidStateTransition {
        /// Handoff being transitioned.
        handoff_id: HandoffId,
        /// Current lifecycle state.
        from: HandoffStatus,
        /// Rejected target state.
        to: HandoffStatus,
    },

    /// An agent has already been assigned; assignment is write-once.
    #[error("handoff {0} already has an assigned agent")]
    AgentAlreadyAssigned(HandoffId),

    /// Message content is empty after trimming.
    #[error("message content must not be empty")]
    EmptyContent,

    /// Message content exceeds the configured limit.
    #[error("message content has {actual} characters, exceeds limit of {max}")]
    ContentTooLong {
        /// Configured maximum length in characters.
        max: usize,
        /// Actual length in characters.
        actual: usize,
    },

    /// The after-hours contact email is not plausibly an address.
    #[error("invalid contact email '{0}'")]
    InvalidContactEmail(String),
}

/// Error returned while parsing handoff statuses from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown handoff status: {0}")]
pub struct ParseHandoffStatusError(pub String);

/// Error returned while parsing message sender roles from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown sender role: {0}")]
pub struct ParseSenderRoleError(pub String);

/// Error returned while parsing expiry reasons from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown expiry reason: {0}")]
pub struct ParseExpiryReasonError(pub String);
