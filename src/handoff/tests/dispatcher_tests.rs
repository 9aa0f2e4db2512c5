//! Lifecycle and assignment tests for the handoff dispatcher.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use eyre::{bail, ensure};
use mockable::DefaultClock;
use mockall::mock;
use rstest::rstest;

use super::support::{Harness, harness, idle_harness};
use crate::config::DispatchConfig;
use crate::handoff::{
    adapters::memory::{InMemoryAgentDirectory, InMemoryHandoffStore, InMemoryTenantIdentity},
    domain::{
        AgentId, ExpiryReason, HandoffDomainError, HandoffEvent, HandoffId, HandoffStatus,
        SenderRole, SequenceNumber, TenantId,
    },
    ports::{
        AgentProfile, Audience, DeliveryReport, HandoffNotifier, HandoffStore, MessageCursor,
        NotifyError, NotifyResult, TenantIdentity, TenantLookupError, TenantResult,
        TenantStanding,
    },
    services::{
        CaptureRequest, ContactDetails, CreateHandoffRequest, DispatchError, HandoffDispatcher,
        PICKUP_ANNOUNCEMENT,
    },
};

mock! {
    Tenants {}

    #[async_trait]
    impl TenantIdentity for Tenants {
        async fn resolve_tenant(&self, tenant_id: TenantId) -> TenantResult<TenantStanding>;
    }
}

mock! {
    Notifier {}

    #[async_trait]
    impl HandoffNotifier for Notifier {
        async fn publish(
            &self,
            event: &HandoffEvent,
            audience: &Audience,
        ) -> NotifyResult<DeliveryReport>;
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn create_announces_to_tenant_agents(harness: Harness) -> eyre::Result<()> {
    let created = harness
        .dispatcher
        .create(harness.request("widget-1").with_last_user_message("I need a human"))
        .await?;

    ensure!(created.status() == HandoffStatus::Pending);
    ensure!(created.last_user_message() == Some("I need a human"));
    let events = harness.notifier.events();
    ensure!(events.len() == 1);
    ensure!(events.first().map(|(_, audience)| audience) == Some(&Audience::TenantAgents(harness.tenant_id)));
    ensure!(harness.notifier.names() == vec!["handoff.created"]);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn create_returns_open_handoff_for_same_session(harness: Harness) -> eyre::Result<()> {
    let first = harness.dispatcher.create(harness.request("widget-1")).await?;
    let second = harness.dispatcher.create(harness.request("widget-1")).await?;

    ensure!(first == second);
    ensure!(harness.store.len() == 1);
    ensure!(harness.notifier.names() == vec!["handoff.created"]);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn create_after_terminal_handoff_opens_a_new_one(harness: Harness) -> eyre::Result<()> {
    let first = harness.pending("widget-1").await;
    harness.dispatcher.cancel(first.id()).await?;

    let second = harness.dispatcher.create(harness.request("widget-1")).await?;

    ensure!(second.id() != first.id());
    ensure!(second.status() == HandoffStatus::Pending);
    Ok(())
}

#[rstest]
#[case(None)]
#[case(Some(TenantStanding::SUSPENDED))]
#[tokio::test(flavor = "multi_thread")]
async fn create_rejects_invalid_tenant(
    harness: Harness,
    #[case] standing: Option<TenantStanding>,
) -> eyre::Result<()> {
    let tenant_id = TenantId::new();
    if let Some(known) = standing {
        harness.tenants.insert(tenant_id, known)?;
    }

    let result = harness
        .dispatcher
        .create(CreateHandoffRequest::new(tenant_id, "widget-1"))
        .await;

    match result {
        Err(DispatchError::InvalidTenant(id)) if id == tenant_id => {}
        other => bail!("expected InvalidTenant, got {other:?}"),
    }
    ensure!(harness.store.is_empty());
    ensure!(harness.notifier.events().is_empty());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn create_rejects_blank_session(harness: Harness) -> eyre::Result<()> {
    let result = harness.dispatcher.create(harness.request("   ")).await;

    match result {
        Err(DispatchError::Domain(HandoffDomainError::InvalidSessionId(_))) => Ok(()),
        other => bail!("expected InvalidSessionId, got {other:?}"),
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn capture_is_terminal_and_never_broadcast(harness: Harness) -> eyre::Result<()> {
    let request = CaptureRequest::new(
        harness.request("widget-1"),
        ContactDetails::new("jo@example.com", "Please call me tomorrow"),
    );

    let captured = harness.dispatcher.capture_after_hours(request).await?;

    ensure!(captured.status() == HandoffStatus::Captured);
    ensure!(captured.is_terminal());
    ensure!(captured.contact_fallback().map(|contact| contact.message()) == Some("Please call me tomorrow"));
    ensure!(harness.notifier.events().is_empty());
    let stored = harness.store.find_by_id(captured.id()).await?;
    ensure!(stored == Some(captured));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn capture_rejects_invalid_email(harness: Harness) -> eyre::Result<()> {
    let request = CaptureRequest::new(
        harness.request("widget-1"),
        ContactDetails::new("not-an-email", "hello"),
    );

    let result = harness.dispatcher.capture_after_hours(request).await;

    match result {
        Err(DispatchError::Domain(HandoffDomainError::InvalidContactEmail(_))) => {}
        other => bail!("expected InvalidContactEmail, got {other:?}"),
    }
    ensure!(harness.store.is_empty());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn pickup_respects_agent_capacity(harness: Harness) -> eyre::Result<()> {
    let agent_a = harness.add_agent(1);
    let agent_b = harness.add_agent(1);
    let h1 = harness.pending("widget-1").await;
    let h2 = harness.pending("widget-2").await;

    let picked = harness.dispatcher.pickup(h1.id(), agent_a).await?;
    ensure!(picked.assigned_agent_id() == Some(agent_a));
    ensure!(harness.active_count(agent_a) == 1);

    match harness.dispatcher.pickup(h2.id(), agent_a).await {
        Err(DispatchError::CapacityExceeded {
            agent_id,
            active_count: 1,
            max_capacity: 1,
        }) if agent_id == agent_a => {}
        other => bail!("expected CapacityExceeded, got {other:?}"),
    }
    let still_pending = harness.store.find_by_id(h2.id()).await?;
    ensure!(still_pending.map(|handoff| handoff.status()) == Some(HandoffStatus::Pending));

    let second = harness.dispatcher.pickup(h2.id(), agent_b).await?;
    ensure!(second.assigned_agent_id() == Some(agent_b));
    ensure!(harness.active_count(agent_b) == 1);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn pickup_broadcasts_and_announces(harness: Harness) -> eyre::Result<()> {
    let agent_id = harness.add_agent(3);
    let pending = harness.pending("widget-1").await;
    harness.notifier.clear();

    let active = harness.dispatcher.pickup(pending.id(), agent_id).await?;

    ensure!(harness.notifier.names() == vec!["handoff.pickedUp", "handoff.message"]);
    let events = harness.notifier.events();
    let expected_audience = Audience::AgentsAndSession {
        tenant_id: harness.tenant_id,
        session_id: active.source_session_id().clone(),
    };
    ensure!(events.first().map(|(_, audience)| audience) == Some(&expected_audience));

    let transcript = harness
        .store
        .messages_since(active.id(), MessageCursor::Start)
        .await?;
    match transcript.as_slice() {
        [announcement] => {
            ensure!(announcement.sender_role() == SenderRole::System);
            ensure!(announcement.content() == PICKUP_ANNOUNCEMENT);
            ensure!(announcement.sequence() == SequenceNumber::new(1));
        }
        other => bail!("expected one announcement, got {other:?}"),
    }
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn pickup_without_announcement_leaves_transcript_empty() -> eyre::Result<()> {
    let harness = Harness::with_config(DispatchConfig::default().without_pickup_announcement());
    let agent_id = harness.add_agent(1);
    let active = harness.active("widget-1", agent_id).await;

    let transcript = harness
        .store
        .messages_since(active.id(), MessageCursor::Start)
        .await?;

    ensure!(transcript.is_empty());
    ensure!(!harness.notifier.names().contains(&"handoff.message"));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn second_pickup_is_already_claimed(harness: Harness) -> eyre::Result<()> {
    let winner = harness.add_agent(1);
    let loser = harness.add_agent(1);
    let active = harness.active("widget-1", winner).await;

    match harness.dispatcher.pickup(active.id(), loser).await {
        Err(err @ DispatchError::AlreadyClaimed(_)) => ensure!(!err.is_transient()),
        other => bail!("expected AlreadyClaimed, got {other:?}"),
    }
    ensure!(harness.active_count(loser) == 0);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn pickup_rejects_unknown_and_foreign_parties(harness: Harness) -> eyre::Result<()> {
    let agent_id = harness.add_agent(1);
    let pending = harness.pending("widget-1").await;

    let missing = HandoffId::new();
    match harness.dispatcher.pickup(missing, agent_id).await {
        Err(DispatchError::NotFound(id)) if id == missing => {}
        other => bail!("expected NotFound, got {other:?}"),
    }

    let stranger = AgentId::new();
    match harness.dispatcher.pickup(pending.id(), stranger).await {
        Err(DispatchError::AgentNotFound(id)) if id == stranger => {}
        other => bail!("expected AgentNotFound, got {other:?}"),
    }

    let foreign = AgentId::new();
    harness
        .directory
        .register(AgentProfile::available(TenantId::new(), foreign, 5))?;
    match harness.dispatcher.pickup(pending.id(), foreign).await {
        Err(DispatchError::NotFound(id)) if id == pending.id() => {}
        other => bail!("expected NotFound for foreign agent, got {other:?}"),
    }
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn concurrent_pickups_have_exactly_one_winner(harness: Harness) -> eyre::Result<()> {
    let pending = harness.pending("widget-1").await;
    let agents: Vec<AgentId> = (0..12).map(|_| harness.add_agent(1)).collect();

    let attempts: Vec<_> = agents
        .iter()
        .map(|&agent_id| {
            let dispatcher = Arc::clone(&harness.dispatcher);
            let handoff_id = pending.id();
            tokio::spawn(async move { dispatcher.pickup(handoff_id, agent_id).await })
        })
        .collect();

    let mut winners = Vec::new();
    for attempt in attempts {
        match attempt.await? {
            Ok(handoff) => winners.extend(handoff.assigned_agent_id()),
            Err(DispatchError::AlreadyClaimed(_)) => {}
            Err(other) => bail!("unexpected pickup failure: {other:?}"),
        }
    }

    ensure!(winners.len() == 1, "expected one winner, got {winners:?}");
    let total_load: u32 = agents.iter().map(|&agent| harness.active_count(agent)).sum();
    ensure!(total_load == 1);
    Ok(())
}

#[rstest]
#[case::with_content("anyone there?")]
#[case::blank("")]
#[tokio::test(flavor = "multi_thread")]
async fn post_message_requires_an_agent(
    harness: Harness,
    #[case] content: &str,
) -> eyre::Result<()> {
    let pending = harness.pending("widget-1").await;

    let result = harness
        .dispatcher
        .post_message(pending.id(), SenderRole::User, content)
        .await;

    match result {
        Err(DispatchError::AwaitingAgent(id)) if id == pending.id() => Ok(()),
        other => bail!("expected AwaitingAgent, got {other:?}"),
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn post_message_after_resolve_is_closed(harness: Harness) -> eyre::Result<()> {
    let agent_id = harness.add_agent(1);
    let active = harness.active("widget-1", agent_id).await;
    harness.dispatcher.resolve(active.id(), SenderRole::Agent).await?;

    let result = harness
        .dispatcher
        .post_message(active.id(), SenderRole::User, "still there?")
        .await;

    match result {
        Err(DispatchError::ClosedHandoff {
            status: HandoffStatus::Resolved,
            ..
        }) => {}
        other => bail!("expected ClosedHandoff, got {other:?}"),
    }
    let transcript = harness
        .store
        .messages_since(active.id(), MessageCursor::Start)
        .await?;
    ensure!(transcript.iter().all(|message| message.content() != "still there?"));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn blank_post_to_closed_handoff_reports_closed(harness: Harness) -> eyre::Result<()> {
    let agent_id = harness.add_agent(1);
    let active = harness.active("widget-1", agent_id).await;
    harness.dispatcher.resolve(active.id(), SenderRole::User).await?;

    let result = harness
        .dispatcher
        .post_message(active.id(), SenderRole::User, "   ")
        .await;

    match result {
        Err(DispatchError::ClosedHandoff {
            status: HandoffStatus::Resolved,
            ..
        }) => Ok(()),
        other => bail!("expected ClosedHandoff, got {other:?}"),
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn post_message_pushes_to_counterpart(harness: Harness) -> eyre::Result<()> {
    let agent_id = harness.add_agent(1);
    let active = harness.active("widget-1", agent_id).await;
    harness.notifier.clear();

    harness
        .dispatcher
        .post_message(active.id(), SenderRole::User, "my order is late")
        .await?;
    harness
        .dispatcher
        .post_message(active.id(), SenderRole::Agent, "let me check")
        .await?;

    let audiences: Vec<Audience> = harness
        .notifier
        .events()
        .into_iter()
        .map(|(_, audience)| audience)
        .collect();
    ensure!(
        audiences
            == vec![
                Audience::Agent {
                    tenant_id: harness.tenant_id,
                    agent_id,
                },
                Audience::Session {
                    tenant_id: harness.tenant_id,
                    session_id: active.source_session_id().clone(),
                },
            ]
    );
    let stored = harness.store.find_by_id(active.id()).await?;
    ensure!(stored.as_ref().and_then(|handoff| handoff.last_user_message()) == Some("my order is late"));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn post_message_validates_length(harness: Harness) -> eyre::Result<()> {
    let agent_id = harness.add_agent(1);
    let active = harness.active("widget-1", agent_id).await;
    let limit = harness.dispatcher.config().max_message_length;

    let result = harness
        .dispatcher
        .post_message(active.id(), SenderRole::Agent, &"x".repeat(limit + 1))
        .await;

    match result {
        Err(DispatchError::Domain(HandoffDomainError::ContentTooLong { max, .. })) if max == limit => Ok(()),
        other => bail!("expected ContentTooLong, got {other:?}"),
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn resolve_is_idempotent(harness: Harness) -> eyre::Result<()> {
    let agent_id = harness.add_agent(2);
    let active = harness.active("widget-1", agent_id).await;
    ensure!(harness.active_count(agent_id) == 1);

    let first = harness.dispatcher.resolve(active.id(), SenderRole::Agent).await?;
    let second = harness.dispatcher.resolve(active.id(), SenderRole::User).await?;

    ensure!(first == second);
    ensure!(first.status() == HandoffStatus::Resolved);
    ensure!(first.resolved_by() == Some(SenderRole::Agent));
    ensure!(harness.active_count(agent_id) == 0);
    let resolved_events = harness
        .notifier
        .names()
        .into_iter()
        .filter(|name| *name == "handoff.resolved")
        .count();
    ensure!(resolved_events == 1);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn resolve_rejects_pending_and_expired(harness: Harness) -> eyre::Result<()> {
    let pending = harness.pending("widget-1").await;
    match harness.dispatcher.resolve(pending.id(), SenderRole::User).await {
        Err(DispatchError::Domain(HandoffDomainError::InvalidStateTransition {
            from: HandoffStatus::Pending,
            to: HandoffStatus::Resolved,
            ..
        })) => {}
        other => bail!("expected InvalidStateTransition, got {other:?}"),
    }

    harness.dispatcher.cancel(pending.id()).await?;
    match harness.dispatcher.resolve(pending.id(), SenderRole::User).await {
        Err(DispatchError::ClosedHandoff {
            status: HandoffStatus::Expired,
            ..
        }) => Ok(()),
        other => bail!("expected ClosedHandoff, got {other:?}"),
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn fresh_pending_is_not_expired(harness: Harness) -> eyre::Result<()> {
    let pending = harness.pending("widget-1").await;

    let outcome = harness.dispatcher.expire_pending(pending.id()).await?;

    ensure!(outcome.is_none());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stale_pending_expires_and_refuses_pickup(harness: Harness) -> eyre::Result<()> {
    let agent_id = harness.add_agent(1);
    let stale = harness
        .aged("widget-1", HandoffStatus::Pending, None, Duration::minutes(20))
        .await;

    let expired = harness
        .dispatcher
        .expire_pending(stale.id())
        .await?
        .ok_or_else(|| eyre::eyre!("stale handoff should expire"))?;

    ensure!(expired.status() == HandoffStatus::Expired);
    ensure!(expired.expiry_reason() == Some(ExpiryReason::Timeout));
    ensure!(harness.notifier.names() == vec!["handoff.expired"]);
    match harness.dispatcher.pickup(stale.id(), agent_id).await {
        Err(DispatchError::ClosedHandoff {
            status: HandoffStatus::Expired,
            ..
        }) => {}
        other => bail!("expected ClosedHandoff, got {other:?}"),
    }
    ensure!(harness.active_count(agent_id) == 0);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn expire_pending_reports_unknown_handoff(harness: Harness) -> eyre::Result<()> {
    let missing = HandoffId::new();

    match harness.dispatcher.expire_pending(missing).await {
        Err(DispatchError::NotFound(id)) if id == missing => Ok(()),
        other => bail!("expected NotFound, got {other:?}"),
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn cancel_is_idempotent_for_pending(harness: Harness) -> eyre::Result<()> {
    let pending = harness.pending("widget-1").await;

    let first = harness.dispatcher.cancel(pending.id()).await?;
    let second = harness.dispatcher.cancel(pending.id()).await?;

    ensure!(first == second);
    ensure!(first.expiry_reason() == Some(ExpiryReason::Cancelled));
    ensure!(harness.notifier.names() == vec!["handoff.created", "handoff.expired"]);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn cancel_after_pickup_is_already_claimed(harness: Harness) -> eyre::Result<()> {
    let agent_id = harness.add_agent(1);
    let active = harness.active("widget-1", agent_id).await;

    match harness.dispatcher.cancel(active.id()).await {
        Err(DispatchError::AlreadyClaimed(id)) if id == active.id() => {}
        other => bail!("expected AlreadyClaimed, got {other:?}"),
    }

    harness.dispatcher.resolve(active.id(), SenderRole::Agent).await?;
    match harness.dispatcher.cancel(active.id()).await {
        Err(DispatchError::ClosedHandoff {
            status: HandoffStatus::Resolved,
            ..
        }) => Ok(()),
        other => bail!("expected ClosedHandoff, got {other:?}"),
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn idle_expiry_is_disabled_by_default(harness: Harness) -> eyre::Result<()> {
    let agent_id = harness.add_agent(1);
    let idle = harness
        .aged("widget-1", HandoffStatus::Active, Some(agent_id), Duration::days(2))
        .await;

    ensure!(harness.dispatcher.expire_idle_active(idle.id()).await?.is_none());
    ensure!(harness.dispatcher.idle_active_batch().await?.is_empty());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn idle_active_expires_and_releases_agent(idle_harness: Harness) -> eyre::Result<()> {
    let harness = idle_harness;
    let agent_id = AgentId::new();
    harness.directory.register(
        AgentProfile::available(harness.tenant_id, agent_id, 2).with_active_count(1),
    )?;
    let idle = harness
        .aged("widget-1", HandoffStatus::Active, Some(agent_id), Duration::hours(2))
        .await;
    let busy = harness.active("widget-2", agent_id).await;

    ensure!(harness.dispatcher.idle_active_batch().await? == vec![idle.id()]);
    let expired = harness
        .dispatcher
        .expire_idle_active(idle.id())
        .await?
        .ok_or_else(|| eyre::eyre!("idle handoff should expire"))?;

    ensure!(expired.expiry_reason() == Some(ExpiryReason::AgentIdle));
    ensure!(harness.active_count(agent_id) == 1);
    ensure!(harness.dispatcher.expire_idle_active(busy.id()).await?.is_none());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn recount_repairs_drifted_load(harness: Harness) -> eyre::Result<()> {
    let agent_id = harness.add_agent(5);
    harness.active("widget-1", agent_id).await;
    harness.active("widget-2", agent_id).await;
    harness.directory.register(
        AgentProfile::available(harness.tenant_id, agent_id, 5).with_active_count(4),
    )?;

    let counted = harness.dispatcher.recount_agent_load(agent_id).await?;

    ensure!(counted == 2);
    ensure!(harness.active_count(agent_id) == 2);
    match harness.dispatcher.recount_agent_load(AgentId::new()).await {
        Err(DispatchError::AgentNotFound(_)) => Ok(()),
        other => bail!("expected AgentNotFound, got {other:?}"),
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn tenant_lookup_failure_is_transient() -> eyre::Result<()> {
    let mut tenants = MockTenants::new();
    tenants.expect_resolve_tenant().returning(|_| {
        Err(TenantLookupError::backend(std::io::Error::other(
            "tenant service unavailable",
        )))
    });
    let store = Arc::new(InMemoryHandoffStore::new());
    let dispatcher = HandoffDispatcher::new(
        Arc::clone(&store),
        Arc::new(InMemoryAgentDirectory::new()),
        Arc::new(tenants),
        Arc::new(super::support::RecordingNotifier::default()),
        Arc::new(DefaultClock),
        DispatchConfig::default(),
    );

    let result = dispatcher
        .create(CreateHandoffRequest::new(TenantId::new(), "widget-1"))
        .await;

    match result {
        Err(err @ DispatchError::Tenant(_)) => ensure!(err.is_transient()),
        other => bail!("expected Tenant error, got {other:?}"),
    }
    ensure!(store.is_empty());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn publish_failures_never_reach_the_caller() -> eyre::Result<()> {
    let encode_error = serde_json::from_str::<u8>("not json").expect_err("invalid json");
    let failure = NotifyError::from(encode_error);
    let mut notifier = MockNotifier::new();
    notifier
        .expect_publish()
        .times(3)
        .returning(move |_, _| Err(failure.clone()));

    let tenant_id = TenantId::new();
    let agent_id = AgentId::new();
    let directory = Arc::new(InMemoryAgentDirectory::new());
    directory.register(AgentProfile::available(tenant_id, agent_id, 1))?;
    let store = Arc::new(InMemoryHandoffStore::new());
    let dispatcher = HandoffDispatcher::new(
        Arc::clone(&store),
        directory,
        Arc::new(InMemoryTenantIdentity::with_active([tenant_id])),
        Arc::new(notifier),
        Arc::new(DefaultClock),
        DispatchConfig::default().without_pickup_announcement(),
    );

    let created = dispatcher
        .create(CreateHandoffRequest::new(tenant_id, "widget-1"))
        .await?;
    dispatcher.pickup(created.id(), agent_id).await?;
    let resolved = dispatcher.resolve(created.id(), SenderRole::User).await?;

    ensure!(resolved.status() == HandoffStatus::Resolved);
    let stored = store.find_by_id(created.id()).await?;
    ensure!(stored == Some(resolved));
    Ok(())
}
