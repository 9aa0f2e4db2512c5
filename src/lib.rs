//! Switchboard: human handoff dispatch for automated chat.
//!
//! This crate escalates conversations from an automated chat agent to a
//! human operator and coordinates the resulting conversation until it is
//! resolved. It owns the handoff state machine, concurrency-safe pickup
//! under agent capacity limits, and hybrid push/poll message delivery, all
//! scoped per tenant.
//!
//! # Architecture
//!
//! Switchboard follows hexagonal architecture principles:
//!
//! - **Domain**: Pure lifecycle rules with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for storage and collaborators
//! - **Adapters**: Concrete implementations of ports (in-memory, `PostgreSQL`)
//!
//! # Modules
//!
//! - [`handoff`]: Handoff lifecycle, dispatch, polling and routing
//! - [`realtime`]: Channel registry, broadcaster and delivery reconciliation
//! - [`config`]: Dispatcher configuration

pub mod config;
pub mod handoff;
pub mod realtime;
