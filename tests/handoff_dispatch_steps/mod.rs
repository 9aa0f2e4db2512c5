//! Step definitions for handoff dispatch scenarios.

pub mod given;
pub mod then;
pub mod when;
pub mod world;
