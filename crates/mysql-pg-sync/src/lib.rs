//! # mysql-pg-sync
//!
//! Recurring MySQL/MariaDB to PostgreSQL row sync.
//!
//! Each configured table job runs a read query against the source, converts
//! every row according to per-column type rules and loads it into an existing
//! target table with insert-if-absent semantics:
//!
//! - **Typed conversion** of dates, timestamps, intervals and bounded
//!   numerics, rejecting rows that would not fit before they reach the target
//! - **Insert-if-absent** keyed on the `id`/`ID` column, so re-running a job
//!   only adds rows that are new
//! - **Per-row rejects** written to CSV and log files with the reason, while
//!   the rest of the batch still loads
//! - **Commit cadence** every N pages, with rollback of the open transaction
//!   when a job fails
//!
//! ## Example
//!
//! ```rust,no_run
//! use mysql_pg_sync::{Config, Orchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), mysql_pg_sync::SyncError> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::new(config).await?;
//!     let result = orchestrator.run(CancellationToken::new()).await?;
//!     println!("Accepted {} rows", result.rows_accepted);
//!     orchestrator.close().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod convert;
pub mod core;
pub mod drivers;
pub mod error;
pub mod orchestrator;
pub mod reject;
pub mod transfer;
pub mod typemap;
pub mod upsert;

// Re-exports for convenient access
pub use config::{Config, OnJobError, SourceConfig, SyncSettings, TableJobConfig, TargetConfig};
pub use convert::RowConverter;
pub use crate::core::{ConvertedRow, RawRow, RawValue, RejectedRow, SourcePage, TypedValue};
pub use error::{ConversionCause, ConversionError, Result, SyncError};
pub use orchestrator::{HealthCheckResult, JobFailure, Orchestrator, SyncRunResult};
pub use reject::{FileRejectSinkFactory, MemoryRejectSinkFactory, RejectSink, RejectSinkFactory};
pub use transfer::{JobSummary, TableSync, TableSyncJob};
pub use typemap::{ColumnKind, ColumnTypeRule, NumericSpec, TypeRuleRegistry, TypeRuleSet};
pub use upsert::{BatchResult, BatchUpsertEngine};
