//! PostgreSQL target driver.
//!
//! - [`PostgresWriter`]: pooled target writer
//! - [`PostgresSession`]: per-job batch executor with savepoint replay
//! - [`dialect`]: identifier quoting and insert-if-absent SQL

pub mod dialect;
mod writer;

pub use writer::{PostgresSession, PostgresWriter};
