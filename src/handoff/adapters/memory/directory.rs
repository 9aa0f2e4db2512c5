//! In-memory agent directory used by tests and single-process deployments.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::handoff::{
    domain::{AgentId, TenantId},
    ports::{AgentDirectory, AgentLoad, AgentProfile, AgentStatus, DirectoryError, DirectoryResult},
};

/// Thread-safe in-memory agent roster.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAgentDirectory {
    agents: Arc<RwLock<HashMap<AgentId, AgentProfile>>>,
}

impl InMemoryAgentDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an agent profile.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Backend`] if the internal lock is poisoned.
    pub fn register(&self, profile: AgentProfile) -> DirectoryResult<()> {
        let mut agents = self.agents.write().map_err(poisoned)?;
        agents.insert(profile.agent_id(), profile);
        Ok(())
    }

    /// Changes an agent's availability status.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::AgentNotFound`] for an unknown agent.
    pub fn set_status(&self, agent_id: AgentId, status: AgentStatus) -> DirectoryResult<()> {
        self.update(agent_id, |profile| profile.status = status)
    }

    /// Returns the agent's current load counters.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Backend`] if the internal lock is poisoned.
    pub fn load_of(&self, agent_id: AgentId) -> DirectoryResult<Option<AgentLoad>> {
        let agents = self.agents.read().map_err(poisoned)?;
        Ok(agents.get(&agent_id).map(|profile| profile.load))
    }

    fn update(
        &self,
        agent_id: AgentId,
        apply: impl FnOnce(&mut AgentProfile),
    ) -> DirectoryResult<()> {
        let mut agents = self.agents.write().map_err(poisoned)?;
        let profile = agents
            .get_mut(&agent_id)
            .ok_or(DirectoryError::AgentNotFound(agent_id))?;
        apply(profile);
        Ok(())
    }
}

fn poisoned(err: impl ToString) -> DirectoryError {
    DirectoryError::backend(std::io::Error::other(err.to_string()))
}

#[async_trait]
impl AgentDirectory for InMemoryAgentDirectory {
    async fn get_agent(&self, agent_id: AgentId) -> DirectoryResult<Option<AgentProfile>> {
        let agents = self.agents.read().map_err(poisoned)?;
        Ok(agents.get(&agent_id).cloned())
    }

    async fn list_available_agents(&self, tenant_id: TenantId) -> DirectoryResult<Vec<AgentLoad>> {
        let agents = self.agents.read().map_err(poisoned)?;
        let mut available: Vec<AgentLoad> = agents
            .values()
            .filter(|profile| {
                profile.tenant_id == tenant_id
                    && profile.status == AgentStatus::Available
                    && profile.load.has_headroom()
            })
            .map(|profile| profile.load)
            .collect();
        available.sort_by_key(|load| (load.active_count, load.agent_id.into_inner()));
        Ok(available)
    }

    async fn increment_load(&self, agent_id: AgentId) -> DirectoryResult<()> {
        self.update(agent_id, |profile| {
            profile.load.active_count = profile.load.active_count.saturating_add(1);
        })
    }

    async fn decrement_load(&self, agent_id: AgentId) -> DirectoryResult<()> {
        self.update(agent_id, |profile| {
            profile.load.active_count = profile.load.active_count.saturating_sub(1);
        })
    }

    async fn set_load(&self, agent_id: AgentId, active_count: u32) -> DirectoryResult<()> {
        self.update(agent_id, |profile| profile.load.active_count = active_count)
    }
}
