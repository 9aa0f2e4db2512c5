//! Handoff lifecycle and dispatch.
//!
//! A handoff escalates one automated-chat session to a human agent and
//! carries the resulting conversation until it is resolved or expires.
//! The module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
