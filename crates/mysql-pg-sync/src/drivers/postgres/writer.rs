//! PostgreSQL target writer.
//!
//! Uses deadpool-postgres for pooling. Each table job gets its own
//! [`PostgresSession`] holding one pooled connection. Batches are loaded with
//! a set-based insert-if-absent statement inside a savepoint; when the server
//! refuses the statement because of a row, the savepoint is rolled back and
//! the batch is replayed row by row so that every failure is attributed to
//! its offset while the remaining rows still load.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use tokio_postgres::types::ToSql;
use tracing::{debug, info};

use crate::config::TargetConfig;
use crate::core::{
    BatchExecutor, BatchOutcome, ConvertedRow, InsertPlan, RowFailure, TargetTable, TargetWriter,
};
use crate::drivers::common::make_tls_connector;
use crate::error::{Result, SyncError};

use super::dialect::{build_insert_if_absent, max_rows_per_statement, qualify, TABLE_COLUMNS_SQL};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// SQLSTATE classes that end the job instead of rejecting a row.
///
/// 08 connection, 25 transaction state, 40 rollback, 42 syntax or undefined
/// object, 53 resources, 57 operator intervention, 58 system, XX internal.
const FATAL_SQLSTATE_CLASSES: &[&str] = &["08", "25", "40", "42", "53", "57", "58", "XX"];

/// PostgreSQL target writer.
pub struct PostgresWriter {
    pool: Pool,
    schema: String,
}

impl PostgresWriter {
    /// Build the pool and check that the target answers.
    pub async fn new(config: &TargetConfig) -> Result<Self> {
        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let pool = match make_tls_connector(config.ssl_mode)? {
            None => {
                let mgr = Manager::from_config(config.pg_config(), tokio_postgres::NoTls, mgr_config);
                Pool::builder(mgr)
                    .max_size(config.max_connections as usize)
                    .wait_timeout(Some(POOL_CONNECTION_TIMEOUT))
                    .runtime(deadpool_postgres::Runtime::Tokio1)
                    .build()
                    .map_err(|e| SyncError::pool(e, "creating PostgreSQL target pool"))?
            }
            Some(tls) => {
                let mgr = Manager::from_config(config.pg_config(), tls, mgr_config);
                Pool::builder(mgr)
                    .max_size(config.max_connections as usize)
                    .wait_timeout(Some(POOL_CONNECTION_TIMEOUT))
                    .runtime(deadpool_postgres::Runtime::Tokio1)
                    .build()
                    .map_err(|e| SyncError::pool(e, "creating PostgreSQL target pool"))?
            }
        };

        let writer = Self {
            pool,
            schema: config.schema.clone(),
        };
        writer.ping().await?;

        info!(
            "Connected to PostgreSQL target: {}:{}/{} (ssl_mode={})",
            config.host, config.port, config.database, config.ssl_mode
        );
        Ok(writer)
    }

    async fn connection(&self, context: &str) -> Result<Object> {
        self.pool.get().await.map_err(|e| SyncError::pool(e, context))
    }
}

#[async_trait]
impl TargetWriter for PostgresWriter {
    async fn open_session(&self) -> Result<Box<dyn BatchExecutor>> {
        let client = self.connection("opening PostgreSQL write session").await?;
        Ok(Box::new(PostgresSession {
            client,
            default_schema: self.schema.clone(),
            prepared: None,
            in_transaction: false,
        }))
    }

    async fn ping(&self) -> Result<()> {
        let client = self.connection("testing PostgreSQL target connection").await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }

    fn db_type(&self) -> &str {
        "postgres"
    }

    async fn close(&self) {
        self.pool.close();
    }
}

/// Plan resolved against the target catalog.
struct PreparedPlan {
    table: TargetTable,
    /// Target-side column names, parallel to the header.
    columns: Vec<String>,
    types: Vec<String>,
    identity_idx: usize,
    /// Last multi-row statement, keyed by its row count.
    batch_sql: Option<(usize, String)>,
    row_sql: String,
}

impl PreparedPlan {
    fn sql_for(&mut self, rows: usize) -> String {
        if rows == 1 {
            return self.row_sql.clone();
        }
        match &self.batch_sql {
            Some((n, sql)) if *n == rows => sql.clone(),
            _ => {
                let sql = build_insert_if_absent(
                    &self.table,
                    &self.columns,
                    &self.types,
                    self.identity_idx,
                    rows,
                );
                self.batch_sql = Some((rows, sql.clone()));
                sql
            }
        }
    }
}

/// One job's exclusive connection.
pub struct PostgresSession {
    client: Object,
    default_schema: String,
    prepared: Option<PreparedPlan>,
    in_transaction: bool,
}

impl PostgresSession {
    async fn begin_if_needed(&mut self) -> Result<()> {
        if !self.in_transaction {
            self.client.batch_execute("BEGIN").await?;
            self.in_transaction = true;
        }
        Ok(())
    }

    /// Run one insert statement, returning rows inserted.
    async fn execute_rows(
        &self,
        sql: &str,
        rows: &[ConvertedRow],
    ) -> std::result::Result<u64, tokio_postgres::Error> {
        let params: Vec<Option<String>> = rows
            .iter()
            .flat_map(|row| row.values.iter().map(|v| v.to_text()))
            .collect();
        let refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let stmt = self.client.prepare_cached(sql).await?;
        self.client.execute(&stmt, &refs).await
    }

    /// Load one statement-sized chunk starting at `base` within the submission.
    async fn submit_chunk(
        &self,
        batch_sql: &str,
        row_sql: &str,
        rows: &[ConvertedRow],
        base: usize,
        outcome: &mut BatchOutcome,
    ) -> Result<()> {
        self.client.batch_execute("SAVEPOINT sync_batch").await?;
        match self.execute_rows(batch_sql, rows).await {
            Ok(n) => {
                self.client.batch_execute("RELEASE SAVEPOINT sync_batch").await?;
                outcome.inserted += n;
                return Ok(());
            }
            Err(e) if is_fatal(&e) => return Err(e.into()),
            Err(e) => {
                debug!(
                    "Batch of {} rows refused ({}), replaying row by row",
                    rows.len(),
                    format_pg_error(&e)
                );
                self.client
                    .batch_execute("ROLLBACK TO SAVEPOINT sync_batch")
                    .await?;
            }
        }

        for (i, row) in rows.iter().enumerate() {
            self.client.batch_execute("SAVEPOINT sync_row").await?;
            match self.execute_rows(row_sql, std::slice::from_ref(row)).await {
                Ok(n) => {
                    self.client.batch_execute("RELEASE SAVEPOINT sync_row").await?;
                    outcome.inserted += n;
                }
                Err(e) if is_fatal(&e) => return Err(e.into()),
                Err(e) => {
                    self.client
                        .batch_execute("ROLLBACK TO SAVEPOINT sync_row")
                        .await?;
                    outcome.failures.push(RowFailure {
                        offset: base + i,
                        message: format_pg_error(&e),
                    });
                }
            }
        }

        self.client.batch_execute("RELEASE SAVEPOINT sync_batch").await?;
        Ok(())
    }

    async fn submit_all(
        &self,
        plan: &mut PreparedPlan,
        rows: &[ConvertedRow],
    ) -> Result<BatchOutcome> {
        let chunk_rows = max_rows_per_statement(plan.columns.len());
        let mut outcome = BatchOutcome::default();
        for (chunk_idx, chunk) in rows.chunks(chunk_rows).enumerate() {
            let batch_sql = plan.sql_for(chunk.len());
            self.submit_chunk(
                &batch_sql,
                &plan.row_sql,
                chunk,
                chunk_idx * chunk_rows,
                &mut outcome,
            )
            .await?;
        }

        debug!(
            "{}: submitted {}, inserted {}, refused {}",
            plan.table.display_name(),
            rows.len(),
            outcome.inserted,
            outcome.failures.len()
        );
        Ok(outcome)
    }
}

#[async_trait]
impl BatchExecutor for PostgresSession {
    async fn prepare(&mut self, plan: &InsertPlan) -> Result<()> {
        let table = plan.table.clone().with_default_schema(&self.default_schema);
        let qualified = qualify(&table);

        let rows = self
            .client
            .query(TABLE_COLUMNS_SQL, &[&qualified])
            .await?;
        let target_columns: Vec<(String, String)> = rows
            .iter()
            .map(|r| (r.get::<_, String>(0), r.get::<_, String>(1)))
            .collect();
        if target_columns.is_empty() {
            return Err(SyncError::sync(
                table.display_name(),
                "target table has no columns",
            ));
        }

        let mut columns = Vec::with_capacity(plan.columns.len());
        let mut types = Vec::with_capacity(plan.columns.len());
        for header_col in &plan.columns {
            let (name, ty) = match_column(&target_columns, header_col).ok_or_else(|| {
                SyncError::sync(
                    table.display_name(),
                    format!("column '{}' does not exist in the target table", header_col),
                )
            })?;
            columns.push(name.clone());
            types.push(ty.clone());
        }

        let row_sql = build_insert_if_absent(&table, &columns, &types, plan.identity_idx, 1);
        debug!("Insert statement for {}: {}", table.display_name(), row_sql);

        self.prepared = Some(PreparedPlan {
            table,
            columns,
            types,
            identity_idx: plan.identity_idx,
            batch_sql: None,
            row_sql,
        });
        Ok(())
    }

    async fn submit(&mut self, rows: &[ConvertedRow]) -> Result<BatchOutcome> {
        let mut plan = self
            .prepared
            .take()
            .ok_or_else(|| SyncError::sync("<unprepared>", "submit called before prepare"))?;

        let result = match self.begin_if_needed().await {
            Ok(()) => self.submit_all(&mut plan, rows).await,
            Err(e) => Err(e),
        };
        self.prepared = Some(plan);
        result
    }

    async fn commit(&mut self) -> Result<()> {
        if self.in_transaction {
            self.client.batch_execute("COMMIT").await?;
            self.in_transaction = false;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if self.in_transaction {
            self.in_transaction = false;
            self.client.batch_execute("ROLLBACK").await?;
        }
        Ok(())
    }
}

/// Exact name first, then a unique case-insensitive match.
fn match_column<'a>(
    target_columns: &'a [(String, String)],
    header_col: &str,
) -> Option<&'a (String, String)> {
    if let Some(exact) = target_columns.iter().find(|(name, _)| name == header_col) {
        return Some(exact);
    }
    let mut folded = target_columns
        .iter()
        .filter(|(name, _)| name.eq_ignore_ascii_case(header_col));
    match (folded.next(), folded.next()) {
        (Some(only), None) => Some(only),
        _ => None,
    }
}

/// Whether the error should end the job rather than reject a row.
fn is_fatal(error: &tokio_postgres::Error) -> bool {
    match error.as_db_error() {
        Some(db) => sqlstate_is_fatal(db.code().code()),
        None => true,
    }
}

fn sqlstate_is_fatal(code: &str) -> bool {
    FATAL_SQLSTATE_CLASSES
        .iter()
        .any(|class| code.starts_with(class))
}

/// Reject reason text for a server-reported row error.
fn format_pg_error(error: &tokio_postgres::Error) -> String {
    match error.as_db_error() {
        Some(db) => {
            let mut msg = format!("{} {}: {}", db.severity(), db.code().code(), db.message());
            if let Some(detail) = db.detail() {
                msg.push_str(&format!(" ({})", detail));
            }
            msg
        }
        None => error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(n, t)| (n.to_string(), t.to_string()))
            .collect()
    }

    #[test]
    fn test_match_column_exact_then_folded() {
        let target = cols(&[("id", "integer"), ("DATUM", "date"), ("price", "numeric")]);
        assert_eq!(match_column(&target, "id").unwrap().1, "integer");
        assert_eq!(match_column(&target, "datum").unwrap().0, "DATUM");
        assert_eq!(match_column(&target, "PRICE").unwrap().0, "price");
        assert!(match_column(&target, "missing").is_none());
    }

    #[test]
    fn test_match_column_ambiguous_fold() {
        let target = cols(&[("Name", "text"), ("NAME", "text")]);
        assert!(match_column(&target, "name").is_none());
        assert_eq!(match_column(&target, "NAME").unwrap().0, "NAME");
    }

    #[test]
    fn test_sqlstate_classification() {
        // row-level: unique violation, value too long, invalid input syntax
        assert!(!sqlstate_is_fatal("23505"));
        assert!(!sqlstate_is_fatal("22001"));
        assert!(!sqlstate_is_fatal("22P02"));
        // job-level: undefined table, connection failure, internal
        assert!(sqlstate_is_fatal("42P01"));
        assert!(sqlstate_is_fatal("08006"));
        assert!(sqlstate_is_fatal("XX000"));
        assert!(sqlstate_is_fatal("57014"));
    }
}
