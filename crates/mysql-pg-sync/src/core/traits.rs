//! Core traits at the driver seams.
//!
//! - [`SourceReader`]: streams pages of rows for an arbitrary read query
//! - [`TargetWriter`]: opens per-job write sessions on the target
//! - [`BatchExecutor`]: submits insert-if-absent batches in error-continuation
//!   mode and reports per-row failures by offset
//!
//! Drivers implement these for real databases (`drivers::mysql`,
//! `drivers::postgres`) and in memory (`drivers::memory`).

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;

use super::value::{ConvertedRow, SourcePage};

/// Read pages of rows from a source database.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Stream the result of `query` in pages of at most `page_size` rows.
    ///
    /// The stream is pull-based: the next page is only fetched when polled,
    /// so pages never overlap with the processing of the previous one.
    /// Dropping the stream releases the underlying connection.
    fn read_pages<'a>(
        &'a self,
        query: &'a str,
        page_size: usize,
    ) -> BoxStream<'a, Result<SourcePage>>;

    /// Cheap round-trip used by health checks.
    async fn ping(&self) -> Result<()>;

    /// Get the database type identifier (e.g., "mysql", "memory").
    fn db_type(&self) -> &str;

    /// Close the connection pool.
    async fn close(&self);
}

/// Opens write sessions on a target database.
#[async_trait]
pub trait TargetWriter: Send + Sync {
    /// Open an exclusive session for one table job.
    ///
    /// The session owns one connection for the job's duration.
    async fn open_session(&self) -> Result<Box<dyn BatchExecutor>>;

    /// Cheap round-trip used by health checks.
    async fn ping(&self) -> Result<()>;

    /// Get the database type identifier (e.g., "postgres", "memory").
    fn db_type(&self) -> &str;

    /// Close the connection pool.
    async fn close(&self);
}

/// Target table reference as configured (`table` or `schema.table`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetTable {
    pub schema: Option<String>,
    pub name: String,
}

impl TargetTable {
    /// Parse `schema.table` or a bare `table`.
    pub fn parse(qualified: &str) -> Self {
        match qualified.split_once('.') {
            Some((schema, name)) => Self {
                schema: Some(schema.to_string()),
                name: name.to_string(),
            },
            None => Self {
                schema: None,
                name: qualified.to_string(),
            },
        }
    }

    /// Fill in the schema when the reference is unqualified.
    pub fn with_default_schema(mut self, schema: &str) -> Self {
        if self.schema.is_none() && !schema.is_empty() {
            self.schema = Some(schema.to_string());
        }
        self
    }

    pub fn display_name(&self) -> String {
        match &self.schema {
            Some(s) => format!("{}.{}", s, self.name),
            None => self.name.clone(),
        }
    }
}

/// Insert-if-absent plan for one `(table, header)` pair.
///
/// Semantics: for each submitted row, insert it only when no existing target
/// row has the same value in `columns[identity_idx]`; otherwise skip it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertPlan {
    pub table: TargetTable,
    /// Header columns, in the order values appear in each row.
    pub columns: Vec<String>,
    /// Position of the identity column within `columns`.
    pub identity_idx: usize,
}

impl InsertPlan {
    pub fn identity_column(&self) -> &str {
        &self.columns[self.identity_idx]
    }
}

/// A row the target refused, addressed by its position in the submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFailure {
    /// Zero-based offset within the submitted rows.
    pub offset: usize,
    /// Target-reported message.
    pub message: String,
}

/// Outcome of one error-continuation submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Rows actually written.
    pub inserted: u64,
    /// Rows refused by the target; all other rows were attempted.
    pub failures: Vec<RowFailure>,
}

/// Executes insert-if-absent batches on one target connection.
///
/// Contract: a failing row never prevents the remaining rows of the same
/// submission from being attempted, and every failure carries the exact
/// offset of the row that caused it. Only connectivity or statement-level
/// problems are returned as `Err`.
#[async_trait]
pub trait BatchExecutor: Send {
    /// Bind the session to a plan; called once per job before any submit.
    ///
    /// Fails when the table or one of the plan's columns cannot be resolved.
    async fn prepare(&mut self, plan: &InsertPlan) -> Result<()>;

    /// Submit rows under the prepared plan.
    async fn submit(&mut self, rows: &[ConvertedRow]) -> Result<BatchOutcome>;

    /// Commit everything submitted since the previous commit.
    async fn commit(&mut self) -> Result<()>;

    /// Discard uncommitted work; used on job failure.
    async fn rollback(&mut self) -> Result<()>;
}
