//! When steps for handoff dispatch BDD scenarios.

use super::world::{DispatchWorld, run_async};
use eyre::WrapErr;
use rstest_bdd_macros::when;
use switchboard::handoff::{
    domain::SenderRole,
    services::{CaptureRequest, ContactDetails, CreateHandoffRequest},
};

#[when(r#"agent "{name}" picks up the handoff of session "{session}""#)]
fn agent_picks_up(
    world: &mut DispatchWorld,
    name: String,
    session: String,
) -> Result<(), eyre::Report> {
    let agent_id = world.agent(&name)?;
    let handoff_id = world.handoff(&session)?.id();
    let result = run_async(world.dispatcher.pickup(handoff_id, agent_id));
    if let Ok(ref active) = result {
        world.handoffs.insert(session, active.clone());
    }
    world.last_result = Some(result);
    Ok(())
}

#[when(r#"the agent resolves the handoff of session "{session}""#)]
fn agent_resolves(world: &mut DispatchWorld, session: String) -> Result<(), eyre::Report> {
    let handoff_id = world.handoff(&session)?.id();
    let resolved = run_async(world.dispatcher.resolve(handoff_id, SenderRole::Agent))
        .wrap_err("resolve handoff")?;
    world.handoffs.insert(session, resolved);
    Ok(())
}

#[when(r#"session "{session}" posts "{content}""#)]
fn session_posts(
    world: &mut DispatchWorld,
    session: String,
    content: String,
) -> Result<(), eyre::Report> {
    let handoff_id = world.handoff(&session)?.id();
    let result = run_async(
        world
            .dispatcher
            .post_message(handoff_id, SenderRole::User, &content),
    );
    world.last_message_result = Some(result);
    Ok(())
}

#[when(r#"session "{session}" leaves contact details "{email}" with message "{message}""#)]
fn session_leaves_contact(
    world: &mut DispatchWorld,
    session: String,
    email: String,
    message: String,
) -> Result<(), eyre::Report> {
    let request = CaptureRequest::new(
        CreateHandoffRequest::new(world.tenant_id, session.clone()),
        ContactDetails::new(email, message),
    );
    let captured = run_async(world.dispatcher.capture_after_hours(request))
        .wrap_err("capture after-hours contact")?;
    world.handoffs.insert(session, captured);
    Ok(())
}

#[when(r#"session "{session}" escalates again"#)]
fn session_escalates_again(world: &mut DispatchWorld, session: String) -> Result<(), eyre::Report> {
    let request = CreateHandoffRequest::new(world.tenant_id, session);
    let handoff = run_async(world.dispatcher.create(request)).wrap_err("repeat escalation")?;
    world.repeated_escalation = Some(handoff);
    Ok(())
}

#[when(r#"session "{session}" cancels its handoff"#)]
fn session_cancels(world: &mut DispatchWorld, session: String) -> Result<(), eyre::Report> {
    let handoff_id = world.handoff(&session)?.id();
    world.last_result = Some(run_async(world.dispatcher.cancel(handoff_id)));
    Ok(())
}
