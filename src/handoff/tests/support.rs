//! Shared doubles and fixtures for handoff service tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use mockable::DefaultClock;
use rstest::fixture;

use crate::config::DispatchConfig;
use crate::handoff::{
    adapters::memory::{InMemoryAgentDirectory, InMemoryHandoffStore, InMemoryTenantIdentity},
    domain::{
        AgentId, Handoff, HandoffEvent, HandoffId, HandoffStatus, PersistedHandoffData,
        SessionId, TenantId,
    },
    ports::{
        AgentProfile, Audience, DeliveryReport, HandoffNotifier, HandoffStore, NotifyResult,
    },
    services::{CreateHandoffRequest, HandoffDispatcher},
};

/// Notifier that records every publish call.
#[derive(Debug, Default)]
pub(super) struct RecordingNotifier {
    published: Mutex<Vec<(HandoffEvent, Audience)>>,
}

impl RecordingNotifier {
    pub(super) fn events(&self) -> Vec<(HandoffEvent, Audience)> {
        self.published.lock().expect("notifier lock").clone()
    }

    pub(super) fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(|(event, _)| event.name()).collect()
    }

    pub(super) fn clear(&self) {
        self.published.lock().expect("notifier lock").clear();
    }
}

#[async_trait]
impl HandoffNotifier for RecordingNotifier {
    async fn publish(
        &self,
        event: &HandoffEvent,
        audience: &Audience,
    ) -> NotifyResult<DeliveryReport> {
        self.published
            .lock()
            .expect("notifier lock")
            .push((event.clone(), audience.clone()));
        Ok(DeliveryReport {
            delivered: 1,
            dropped: 0,
        })
    }
}

pub(super) type TestDispatcher = HandoffDispatcher<
    InMemoryHandoffStore,
    InMemoryAgentDirectory,
    InMemoryTenantIdentity,
    RecordingNotifier,
    DefaultClock,
>;

/// A dispatcher wired to in-memory adapters, with one active tenant.
pub(super) struct Harness {
    pub(super) tenant_id: TenantId,
    pub(super) store: Arc<InMemoryHandoffStore>,
    pub(super) directory: Arc<InMemoryAgentDirectory>,
    pub(super) tenants: Arc<InMemoryTenantIdentity>,
    pub(super) notifier: Arc<RecordingNotifier>,
    pub(super) dispatcher: Arc<TestDispatcher>,
}

impl Harness {
    pub(super) fn with_config(config: DispatchConfig) -> Self {
        let tenant_id = TenantId::new();
        let store = Arc::new(InMemoryHandoffStore::new());
        let directory = Arc::new(InMemoryAgentDirectory::new());
        let tenants = Arc::new(InMemoryTenantIdentity::with_active([tenant_id]));
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = Arc::new(HandoffDispatcher::new(
            Arc::clone(&store),
            Arc::clone(&directory),
            Arc::clone(&tenants),
            Arc::clone(&notifier),
            Arc::new(DefaultClock),
            config,
        ));
        Self {
            tenant_id,
            store,
            directory,
            tenants,
            notifier,
            dispatcher,
        }
    }

    /// Registers an available agent of the harness tenant.
    pub(super) fn add_agent(&self, max_capacity: u32) -> AgentId {
        let agent_id = AgentId::new();
        self.directory
            .register(AgentProfile::available(self.tenant_id, agent_id, max_capacity))
            .expect("agent registration");
        agent_id
    }

    pub(super) fn active_count(&self, agent_id: AgentId) -> u32 {
        self.directory
            .load_of(agent_id)
            .expect("directory lookup")
            .map_or(0, |load| load.active_count)
    }

    pub(super) fn request(&self, session: &str) -> CreateHandoffRequest {
        CreateHandoffRequest::new(self.tenant_id, session)
    }

    pub(super) async fn pending(&self, session: &str) -> Handoff {
        self.dispatcher
            .create(self.request(session))
            .await
            .expect("handoff creation")
    }

    pub(super) async fn active(&self, session: &str, agent_id: AgentId) -> Handoff {
        let pending = self.pending(session).await;
        self.dispatcher
            .pickup(pending.id(), agent_id)
            .await
            .expect("pickup")
    }

    /// Inserts a handoff whose timestamps lie `age` in the past.
    pub(super) async fn aged(
        &self,
        session: &str,
        status: HandoffStatus,
        agent_id: Option<AgentId>,
        age: Duration,
    ) -> Handoff {
        let then = Utc::now() - age;
        let handoff = Handoff::from_persisted(aged_data(
            self.tenant_id,
            session,
            status,
            agent_id,
            then,
        ));
        self.store
            .insert_unless_open(&handoff)
            .await
            .expect("insert aged handoff")
            .into_handoff()
    }
}

fn aged_data(
    tenant_id: TenantId,
    session: &str,
    status: HandoffStatus,
    agent_id: Option<AgentId>,
    then: DateTime<Utc>,
) -> PersistedHandoffData {
    PersistedHandoffData {
        id: HandoffId::new(),
        tenant_id,
        source_session_id: SessionId::new(session).expect("valid session id"),
        status,
        assigned_agent_id: agent_id,
        requested_at: then,
        picked_up_at: agent_id.map(|_| then),
        resolved_at: None,
        resolved_by: None,
        expired_at: None,
        expiry_reason: None,
        last_activity_at: then,
        conversation_snapshot: Vec::new(),
        last_user_message: None,
        contact_fallback: None,
    }
}

#[fixture]
pub(super) fn harness() -> Harness {
    Harness::with_config(DispatchConfig::default())
}

/// Harness with a ten-minute pending timeout and idle expiry after one
/// hour.
#[fixture]
pub(super) fn idle_harness() -> Harness {
    Harness::with_config(
        DispatchConfig::default().with_active_idle_grace(std::time::Duration::from_secs(3600)),
    )
}
