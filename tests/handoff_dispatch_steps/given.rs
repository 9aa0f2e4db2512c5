//! Given steps for handoff dispatch BDD scenarios.

use std::sync::Arc;

use super::world::{DispatchWorld, run_async};
use eyre::WrapErr;
use rstest_bdd_macros::given;
use switchboard::{
    handoff::{
        domain::AgentId,
        ports::{AgentProfile, TenantStanding},
        services::CreateHandoffRequest,
    },
    realtime::{ChannelKey, MpscEventChannel},
};

#[given("an active tenant")]
fn active_tenant(world: &mut DispatchWorld) -> Result<(), eyre::Report> {
    world
        .tenants
        .insert(world.tenant_id, TenantStanding::ACTIVE)
        .wrap_err("register tenant")?;
    Ok(())
}

#[given("an agent console listening for the tenant")]
fn agent_console(world: &mut DispatchWorld) {
    let (channel, outbox) = MpscEventChannel::pair();
    let key = ChannelKey::agent(world.tenant_id, AgentId::new());
    run_async(world.broadcaster.register(key, Arc::new(channel)));
    world.console = Some(outbox);
}

#[given(r#"agent "{name}" with capacity {capacity:u32}"#)]
fn agent_with_capacity(
    world: &mut DispatchWorld,
    name: String,
    capacity: u32,
) -> Result<(), eyre::Report> {
    let agent_id = AgentId::new();
    world
        .directory
        .register(AgentProfile::available(world.tenant_id, agent_id, capacity))
        .wrap_err("register agent")?;
    world.agents.insert(name, agent_id);
    Ok(())
}

#[given(r#"session "{session}" has escalated"#)]
fn session_escalated(world: &mut DispatchWorld, session: String) -> Result<(), eyre::Report> {
    let request = CreateHandoffRequest::new(world.tenant_id, session.clone());
    let handoff = run_async(world.dispatcher.create(request)).wrap_err("create handoff")?;
    world.handoffs.insert(session, handoff);
    Ok(())
}

#[given(r#"agent "{name}" has picked up the handoff of session "{session}""#)]
fn agent_picked_up(
    world: &mut DispatchWorld,
    name: String,
    session: String,
) -> Result<(), eyre::Report> {
    let agent_id = world.agent(&name)?;
    let handoff_id = world.handoff(&session)?.id();
    let active =
        run_async(world.dispatcher.pickup(handoff_id, agent_id)).wrap_err("pick up handoff")?;
    world.handoffs.insert(session, active);
    Ok(())
}
