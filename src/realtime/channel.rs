//! Duplex channel handles and the keys they are registered under.

use crate::handoff::{
    domain::{AgentId, SessionId, TenantId},
    ports::Audience,
};
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

/// Which side of a handoff a channel belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelRole {
    /// A widget session.
    Session,
    /// An agent console.
    Agent,
}

impl ChannelRole {
    /// Returns the canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Agent => "agent",
        }
    }
}

impl fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Party on the other end of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelIdentity {
    /// The originating automated-chat session.
    Session(SessionId),
    /// A human agent.
    Agent(AgentId),
}

/// Registry key: `(tenant, role, identity)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelKey {
    tenant_id: TenantId,
    identity: ChannelIdentity,
}

impl ChannelKey {
    /// Key for a widget session channel.
    #[must_use]
    pub const fn session(tenant_id: TenantId, session_id: SessionId) -> Self {
        Self {
            tenant_id,
            identity: ChannelIdentity::Session(session_id),
        }
    }

    /// Key for an agent console channel.
    #[must_use]
    pub const fn agent(tenant_id: TenantId, agent_id: AgentId) -> Self {
        Self {
            tenant_id,
            identity: ChannelIdentity::Agent(agent_id),
        }
    }

    /// Returns the owning tenant.
    #[must_use]
    pub const fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Returns the connected party.
    #[must_use]
    pub const fn identity(&self) -> &ChannelIdentity {
        &self.identity
    }

    /// Returns the channel role.
    #[must_use]
    pub const fn role(&self) -> ChannelRole {
        match self.identity {
            ChannelIdentity::Session(_) => ChannelRole::Session,
            ChannelIdentity::Agent(_) => ChannelRole::Agent,
        }
    }

    /// Returns `true` when an event for `audience` should reach this
    /// channel. Channels never match an audience of another tenant.
    #[must_use]
    pub fn matches(&self, audience: &Audience) -> bool {
        if self.tenant_id != audience.tenant_id() {
            return false;
        }
        match (audience, &self.identity) {
            (Audience::TenantAgents(_), ChannelIdentity::Agent(_)) => true,
            (Audience::Session { session_id, .. }, ChannelIdentity::Session(own))
            | (Audience::AgentsAndSession { session_id, .. }, ChannelIdentity::Session(own)) => {
                own == session_id
            }
            (Audience::Agent { agent_id, .. }, ChannelIdentity::Agent(own)) => own == agent_id,
            (Audience::Participants { session_id, .. }, ChannelIdentity::Session(own)) => {
                own == session_id
            }
            (Audience::Participants { agent_id, .. }, ChannelIdentity::Agent(own)) => {
                agent_id.as_ref() == Some(own)
            }
            (Audience::AgentsAndSession { .. }, ChannelIdentity::Agent(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.identity {
            ChannelIdentity::Session(session_id) => {
                write!(f, "{}/session/{session_id}", self.tenant_id)
            }
            ChannelIdentity::Agent(agent_id) => write!(f, "{}/agent/{agent_id}", self.tenant_id),
        }
    }
}

/// Registry-assigned handle for one open channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u64);

impl ChannelId {
    /// Wraps a raw identifier.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch-{}", self.0)
    }
}

/// The remote end of a channel has gone away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("channel closed")]
pub struct ChannelClosed;

/// Write half of a duplex connection.
#[async_trait]
pub trait EventChannel: Send + Sync {
    /// Writes one serialised event.
    async fn send(&self, payload: &str) -> Result<(), ChannelClosed>;
}

/// Channel backed by an unbounded Tokio queue, drained by the connection's
/// writer task.
///
/// ```
/// use switchboard::realtime::MpscEventChannel;
///
/// let (channel, mut outbox) = MpscEventChannel::pair();
/// drop(channel);
/// assert!(outbox.try_recv().is_err());
/// ```
#[derive(Debug, Clone)]
pub struct MpscEventChannel {
    sender: mpsc::UnboundedSender<String>,
}

impl MpscEventChannel {
    /// Wraps an existing sender.
    #[must_use]
    pub const fn new(sender: mpsc::UnboundedSender<String>) -> Self {
        Self { sender }
    }

    /// Creates a channel and the receiver its writer task drains.
    #[must_use]
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }
}

#[async_trait]
impl EventChannel for MpscEventChannel {
    async fn send(&self, payload: &str) -> Result<(), ChannelClosed> {
        self.sender
            .send(payload.to_owned())
            .map_err(|_| ChannelClosed)
    }
}
