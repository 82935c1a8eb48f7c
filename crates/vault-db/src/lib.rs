//! Database layer for the Vault.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization
//! and embedded SQL migrations. Every table the entity store reads or writes
//! is created through the versioned migrations in this crate.
//!
//! SQLite allows one writer at a time. Reconciliation relies on that: a
//! write transaction started with `BEGIN IMMEDIATE` holds the database write
//! lock for its whole read-then-update sequence, so two reconciliations of
//! the same job can never interleave.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError, PooledConnection};
