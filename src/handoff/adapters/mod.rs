//! Adapter implementations of the handoff ports.
//!
//! - [`memory`] keeps everything in process and backs the test suites.
//! - [`postgres`] persists handoffs and transcripts through Diesel, using
//!   conditional `UPDATE` statements for every lifecycle transition.

pub mod memory;
pub mod postgres;
