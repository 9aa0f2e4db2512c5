//! In-memory adapters for the handoff ports.

mod directory;
mod store;
mod tenant;

pub use directory::InMemoryAgentDirectory;
pub use store::InMemoryHandoffStore;
pub use tenant::InMemoryTenantIdentity;
