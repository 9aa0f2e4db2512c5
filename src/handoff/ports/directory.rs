//! Port for the agent directory.
//!
//! The directory owns availability and load. The dispatcher only reads
//! profiles and adjusts the load counter after its own state transition has
//! been persisted; it never edits availability status.

use crate::handoff::domain::{AgentId, TenantId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Result type for agent directory operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Availability state of a human agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Accepting new conversations.
    Available,
    /// Signed in but not accepting new conversations.
    Busy,
    /// Signed out.
    Offline,
}

impl AgentStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Busy => "busy",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current load of one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentLoad {
    /// The agent.
    pub agent_id: AgentId,
    /// Handoffs currently assigned and active.
    pub active_count: u32,
    /// Configured concurrent conversation limit.
    pub max_capacity: u32,
}

impl AgentLoad {
    /// Returns `true` while the agent can take one more conversation.
    #[must_use]
    pub const fn has_headroom(&self) -> bool {
        self.active_count < self.max_capacity
    }
}

/// Directory view of an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Tenant the agent works for.
    pub tenant_id: TenantId,
    /// Availability state.
    pub status: AgentStatus,
    /// Load counters.
    pub load: AgentLoad,
}

impl AgentProfile {
    /// Creates an available agent with no active conversations.
    #[must_use]
    pub const fn available(tenant_id: TenantId, agent_id: AgentId, max_capacity: u32) -> Self {
        Self {
            tenant_id,
            status: AgentStatus::Available,
            load: AgentLoad {
                agent_id,
                active_count: 0,
                max_capacity,
            },
        }
    }

    /// Returns the profile with a different availability status.
    #[must_use]
    pub const fn with_status(mut self, status: AgentStatus) -> Self {
        self.status = status;
        self
    }

    /// Returns the profile with a different active count.
    #[must_use]
    pub const fn with_active_count(mut self, active_count: u32) -> Self {
        self.load.active_count = active_count;
        self
    }

    /// Returns the agent identifier.
    #[must_use]
    pub const fn agent_id(&self) -> AgentId {
        self.load.agent_id
    }
}

/// Read/adjust contract for the agent roster.
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    /// Returns the agent's profile, or `None` for an unknown agent.
    async fn get_agent(&self, agent_id: AgentId) -> DirectoryResult<Option<AgentProfile>>;

    /// Lists the tenant's agents that are `available` and below capacity.
    async fn list_available_agents(&self, tenant_id: TenantId) -> DirectoryResult<Vec<AgentLoad>>;

    /// Increments the agent's active count after a successful claim.
    async fn increment_load(&self, agent_id: AgentId) -> DirectoryResult<()>;

    /// Decrements the agent's active count, saturating at zero.
    async fn decrement_load(&self, agent_id: AgentId) -> DirectoryResult<()>;

    /// Overwrites the agent's active count with a recomputed value.
    async fn set_load(&self, agent_id: AgentId, active_count: u32) -> DirectoryResult<()>;
}

/// Errors returned by agent directory implementations.
#[derive(Debug, Clone, Error)]
pub enum DirectoryError {
    /// The agent is not known to the directory.
    #[error("agent not found: {0}")]
    AgentNotFound(AgentId),

    /// Backend failure.
    #[error("directory backend error: {0}")]
    Backend(Arc<dyn std::error::Error + Send + Sync>),
}

impl DirectoryError {
    /// Wraps a backend error.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Arc::new(err))
    }
}
