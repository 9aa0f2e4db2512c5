//! Unit tests for the handoff bounded context.

mod dispatcher_tests;
mod support;
