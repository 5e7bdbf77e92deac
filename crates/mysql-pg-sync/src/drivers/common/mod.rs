//! Helpers shared by the database drivers.
//!
//! - [`tls`]: rustls connector for the PostgreSQL target

pub mod tls;

pub use tls::{make_tls_connector, SslMode};
