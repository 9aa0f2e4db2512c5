//! Port contracts for the handoff core.
//!
//! Ports define the infrastructure-agnostic interfaces the dispatcher
//! consumes: the store it owns, the collaborators it consults, and the push
//! channel it emits into.

pub mod directory;
pub mod notifier;
pub mod store;
pub mod tenant;

pub use directory::{
    AgentDirectory, AgentLoad, AgentProfile, AgentStatus, DirectoryError, DirectoryResult,
};
pub use notifier::{Audience, DeliveryReport, HandoffNotifier, NotifyError, NotifyResult};
pub use store::{
    AppendOutcome, ClaimRequest, HandoffStore, HandoffStoreError, HandoffStoreResult,
    InsertOutcome, MessageCursor,
};
pub use tenant::{TenantIdentity, TenantLookupError, TenantResult, TenantStanding};
