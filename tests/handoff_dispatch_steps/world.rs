//! Shared world state for handoff dispatch BDD scenarios.

use std::collections::HashMap;
use std::sync::Arc;

use mockable::DefaultClock;
use rstest::fixture;
use switchboard::{
    config::DispatchConfig,
    handoff::{
        adapters::memory::{InMemoryAgentDirectory, InMemoryHandoffStore, InMemoryTenantIdentity},
        domain::{AgentId, Handoff, HandoffMessage, TenantId},
        services::{DispatchError, HandoffDispatcher},
    },
    realtime::{Broadcaster, InMemoryChannelRegistry},
};
use tokio::sync::mpsc::UnboundedReceiver;

/// Dispatcher type used by the BDD world.
pub type TestDispatcher = HandoffDispatcher<
    InMemoryHandoffStore,
    InMemoryAgentDirectory,
    InMemoryTenantIdentity,
    Broadcaster<InMemoryChannelRegistry>,
    DefaultClock,
>;

/// Scenario world for dispatch behaviour tests.
pub struct DispatchWorld {
    pub tenant_id: TenantId,
    pub store: Arc<InMemoryHandoffStore>,
    pub directory: Arc<InMemoryAgentDirectory>,
    pub tenants: Arc<InMemoryTenantIdentity>,
    pub broadcaster: Arc<Broadcaster<InMemoryChannelRegistry>>,
    pub dispatcher: TestDispatcher,
    pub agents: HashMap<String, AgentId>,
    pub handoffs: HashMap<String, Handoff>,
    pub console: Option<UnboundedReceiver<String>>,
    pub console_events: Vec<String>,
    pub repeated_escalation: Option<Handoff>,
    pub last_result: Option<Result<Handoff, DispatchError>>,
    pub last_message_result: Option<Result<HandoffMessage, DispatchError>>,
}

impl DispatchWorld {
    /// Creates a world with an unknown tenant and no agents.
    #[must_use]
    pub fn new() -> Self {
        let store = Arc::new(InMemoryHandoffStore::new());
        let directory = Arc::new(InMemoryAgentDirectory::new());
        let tenants = Arc::new(InMemoryTenantIdentity::new());
        let broadcaster = Arc::new(Broadcaster::new(Arc::new(InMemoryChannelRegistry::new())));
        let dispatcher = HandoffDispatcher::new(
            Arc::clone(&store),
            Arc::clone(&directory),
            Arc::clone(&tenants),
            Arc::clone(&broadcaster),
            Arc::new(DefaultClock),
            DispatchConfig::default(),
        );

        Self {
            tenant_id: TenantId::new(),
            store,
            directory,
            tenants,
            broadcaster,
            dispatcher,
            agents: HashMap::new(),
            handoffs: HashMap::new(),
            console: None,
            console_events: Vec::new(),
            repeated_escalation: None,
            last_result: None,
            last_message_result: None,
        }
    }

    /// Returns a named agent.
    pub fn agent(&self, name: &str) -> Result<AgentId, eyre::Report> {
        self.agents
            .get(name)
            .copied()
            .ok_or_else(|| eyre::eyre!("unknown agent '{name}' in scenario world"))
    }

    /// Returns the handoff recorded for a session.
    pub fn handoff(&self, session: &str) -> Result<&Handoff, eyre::Report> {
        self.handoffs
            .get(session)
            .ok_or_else(|| eyre::eyre!("no handoff recorded for session '{session}'"))
    }

    /// Moves every event pushed to the console so far into `console_events`.
    pub fn drain_console(&mut self) -> Result<(), eyre::Report> {
        let outbox = self
            .console
            .as_mut()
            .ok_or_else(|| eyre::eyre!("no agent console registered"))?;
        while let Ok(payload) = outbox.try_recv() {
            let json: serde_json::Value = serde_json::from_str(&payload)?;
            let name = json
                .get("event")
                .and_then(serde_json::Value::as_str)
                .ok_or_else(|| eyre::eyre!("pushed payload has no event name: {payload}"))?;
            self.console_events.push(name.to_owned());
        }
        Ok(())
    }
}

impl Default for DispatchWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> DispatchWorld {
    DispatchWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
