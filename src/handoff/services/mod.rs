//! Orchestration services for handoff dispatch.
//!
//! - [`HandoffDispatcher`] owns the lifecycle state machine.
//! - [`PollGateway`] serves reconciliation reads.
//! - [`InboxRouter`] decides between queueing and after-hours capture.
//! - [`ExpirySweeper`] drives timeouts in the background.

mod dispatcher;
mod error;
mod poll;
mod router;
mod sweeper;

pub use dispatcher::{
    CaptureRequest, ContactDetails, CreateHandoffRequest, HandoffDispatcher, PICKUP_ANNOUNCEMENT,
};
pub use error::{DispatchError, DispatchResult};
pub use poll::{HandoffStatusView, PollGateway};
pub use router::{EscalationOutcome, InboxRouter, RoutingDecision};
pub use sweeper::{ExpirySweeper, SweepReport};
