//! Then steps for handoff dispatch BDD scenarios.

use super::world::{DispatchWorld, run_async};
use eyre::WrapErr;
use rstest_bdd_macros::then;
use switchboard::handoff::{
    domain::HandoffStatus,
    ports::{HandoffStore, MessageCursor},
    services::DispatchError,
};

#[then("the pickup succeeds")]
fn pickup_succeeds(world: &DispatchWorld) -> Result<(), eyre::Report> {
    match world.last_result.as_ref() {
        Some(Ok(handoff)) if handoff.status() == HandoffStatus::Active => Ok(()),
        other => Err(eyre::eyre!("expected a successful pickup, got {other:?}")),
    }
}

#[then("the pickup fails because the agent is at capacity")]
fn pickup_fails_at_capacity(world: &DispatchWorld) -> Result<(), eyre::Report> {
    match world.last_result.as_ref() {
        Some(Err(DispatchError::CapacityExceeded { .. })) => Ok(()),
        other => Err(eyre::eyre!("expected CapacityExceeded, got {other:?}")),
    }
}

#[then("the cancellation fails because the handoff was claimed")]
fn cancellation_fails_claimed(world: &DispatchWorld) -> Result<(), eyre::Report> {
    match world.last_result.as_ref() {
        Some(Err(DispatchError::AlreadyClaimed(_))) => Ok(()),
        other => Err(eyre::eyre!("expected AlreadyClaimed, got {other:?}")),
    }
}

#[then(r#"agent "{name}" has {count:u32} active conversations"#)]
fn agent_has_active(world: &DispatchWorld, name: String, count: u32) -> Result<(), eyre::Report> {
    let agent_id = world.agent(&name)?;
    let load = world
        .directory
        .load_of(agent_id)
        .wrap_err("read agent load")?
        .ok_or_else(|| eyre::eyre!("agent '{name}' missing from directory"))?;

    if load.active_count != count {
        return Err(eyre::eyre!(
            "expected {count} active conversations for '{name}', found {}",
            load.active_count
        ));
    }
    Ok(())
}

#[then("the message is rejected because the handoff is closed")]
fn message_rejected_closed(world: &DispatchWorld) -> Result<(), eyre::Report> {
    match world.last_message_result.as_ref() {
        Some(Err(DispatchError::ClosedHandoff { .. })) => Ok(()),
        other => Err(eyre::eyre!("expected ClosedHandoff, got {other:?}")),
    }
}

#[then(r#"the transcript of session "{session}" does not contain "{content}""#)]
fn transcript_lacks(
    world: &DispatchWorld,
    session: String,
    content: String,
) -> Result<(), eyre::Report> {
    let handoff_id = world.handoff(&session)?.id();
    let transcript = run_async(world.store.messages_since(handoff_id, MessageCursor::Start))
        .wrap_err("read transcript")?;

    if transcript.iter().any(|message| message.content() == content) {
        return Err(eyre::eyre!("transcript unexpectedly contains '{content}'"));
    }
    Ok(())
}

#[then(r#"the handoff of session "{session}" is "{status}""#)]
fn handoff_status_is(
    world: &DispatchWorld,
    session: String,
    status: String,
) -> Result<(), eyre::Report> {
    let expected = HandoffStatus::try_from(status.as_str())
        .map_err(|err| eyre::eyre!("invalid expected status in scenario: {err}"))?;
    let handoff_id = world.handoff(&session)?.id();
    let stored = run_async(world.store.find_by_id(handoff_id))
        .wrap_err("find handoff")?
        .ok_or_else(|| eyre::eyre!("handoff of '{session}' not stored"))?;

    if stored.status() != expected {
        return Err(eyre::eyre!(
            "expected status {expected}, found {}",
            stored.status()
        ));
    }
    Ok(())
}

#[then(r#"the agent console received {count:u32} "{event}" events"#)]
fn console_received(
    world: &mut DispatchWorld,
    count: u32,
    event: String,
) -> Result<(), eyre::Report> {
    world.drain_console()?;
    let received = world
        .console_events
        .iter()
        .filter(|name| **name == event)
        .count();

    if u32::try_from(received)? != count {
        return Err(eyre::eyre!(
            "expected {count} '{event}' events, received {received}"
        ));
    }
    Ok(())
}

#[then("both escalations refer to the same handoff")]
fn same_handoff(world: &DispatchWorld) -> Result<(), eyre::Report> {
    let repeated = world
        .repeated_escalation
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing repeated escalation"))?;
    let original = world.handoff(repeated.source_session_id().as_str())?;

    if original.id() != repeated.id() {
        return Err(eyre::eyre!(
            "expected handoff {}, got {}",
            original.id(),
            repeated.id()
        ));
    }
    Ok(())
}
