//! Push delivery over duplex channels.
//!
//! The [`Broadcaster`] implements the handoff notifier port on top of a
//! [`ChannelRegistry`] keyed by tenant, role and identity. Consumers merge
//! what it pushes with poll results through a [`DeliveryReconciler`].

mod broadcaster;
mod channel;
mod reconcile;
mod registry;

pub use broadcaster::Broadcaster;
pub use channel::{
    ChannelClosed, ChannelId, ChannelIdentity, ChannelKey, ChannelRole, EventChannel,
    MpscEventChannel,
};
pub use reconcile::DeliveryReconciler;
pub use registry::{ChannelRegistry, InMemoryChannelRegistry, RegisteredChannel};
