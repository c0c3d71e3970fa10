//! PostgreSQL persistence module.
//!
//! Provides connection pooling and schema migrations for the Postgres-backed
//! stores.

pub mod pool;

pub use pool::{PostgresPool, PostgresPoolError};
