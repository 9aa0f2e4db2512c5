//! `PostgreSQL` adapters for handoff persistence.

mod models;
mod schema;
mod store;

pub use store::{HandoffPgPool, PostgresHandoffStore};
