//! Database driver implementations of the core traits.
//!
//! - [`mysql`]: MySQL/MariaDB source reader (sqlx)
//! - [`postgres`]: PostgreSQL target writer (tokio-postgres, deadpool)
//! - [`memory`]: in-memory source and target for tests
//! - [`common`]: shared helpers (TLS)

pub mod common;
pub mod memory;
pub mod mysql;
pub mod postgres;

pub use common::{make_tls_connector, SslMode};
pub use memory::{MemorySource, MemoryTarget};
pub use mysql::MysqlReader;
pub use postgres::{PostgresSession, PostgresWriter};
