//! Service-level error taxonomy for handoff dispatch.

use crate::handoff::{
    domain::{AgentId, HandoffDomainError, HandoffId, HandoffStatus, TenantId},
    ports::{DirectoryError, HandoffStoreError, TenantLookupError},
};
use thiserror::Error;

/// Result type for dispatcher, poll gateway and router operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors returned to callers of the handoff services.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// The tenant is unknown or suspended.
    #[error("tenant {0} is unknown or inactive")]
    InvalidTenant(TenantId),

    /// Another agent won the pickup race.
    #[error("handoff {0} has already been claimed")]
    AlreadyClaimed(HandoffId),

    /// The handoff is terminal and accepts no further interaction.
    #[error("handoff {handoff_id} is closed ({status})")]
    ClosedHandoff {
        /// Closed handoff.
        handoff_id: HandoffId,
        /// Its terminal status.
        status: HandoffStatus,
    },

    /// The agent has no free conversation slot.
    #[error("agent {agent_id} is at capacity ({active_count}/{max_capacity})")]
    CapacityExceeded {
        /// Rejected agent.
        agent_id: AgentId,
        /// Active conversations at check time.
        active_count: u32,
        /// Configured limit.
        max_capacity: u32,
    },

    /// The handoff does not exist, or belongs to another tenant.
    #[error("handoff {0} not found")]
    NotFound(HandoffId),

    /// A message was posted before any agent picked the handoff up.
    #[error("handoff {0} is still waiting for an agent")]
    AwaitingAgent(HandoffId),

    /// The agent is not known to the directory.
    #[error("agent {0} not found")]
    AgentNotFound(AgentId),

    /// Input or transition validation failed.
    #[error(transparent)]
    Domain(#[from] HandoffDomainError),

    /// The handoff store failed.
    #[error(transparent)]
    Store(HandoffStoreError),

    /// The agent directory failed.
    #[error(transparent)]
    Directory(DirectoryError),

    /// The tenant collaborator could not be reached.
    #[error(transparent)]
    Tenant(#[from] TenantLookupError),
}

impl DispatchError {
    /// Returns `true` for failures a caller may retry unchanged.
    ///
    /// ```
    /// use switchboard::handoff::{domain::HandoffId, services::DispatchError};
    ///
    /// assert!(!DispatchError::AlreadyClaimed(HandoffId::new()).is_transient());
    /// ```
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Store(HandoffStoreError::Persistence(_))
                | Self::Directory(DirectoryError::Backend(_))
                | Self::Tenant(_)
        )
    }
}

impl From<HandoffStoreError> for DispatchError {
    fn from(err: HandoffStoreError) -> Self {
        match err {
            HandoffStoreError::NotFound(handoff_id) => Self::NotFound(handoff_id),
            other => Self::Store(other),
        }
    }
}

impl From<DirectoryError> for DispatchError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::AgentNotFound(agent_id) => Self::AgentNotFound(agent_id),
            other => Self::Directory(other),
        }
    }
}
