//! MySQL/MariaDB source driver.
//!
//! Uses SQLx for pooling and streaming; see [`MysqlReader`].
//!
//! # Supported Versions
//!
//! - MySQL 5.7+, 8.0+
//! - MariaDB 10.2+

mod reader;

pub use reader::MysqlReader;
