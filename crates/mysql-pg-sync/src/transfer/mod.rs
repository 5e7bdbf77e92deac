//! Single-table sync job.
//!
//! A [`TableSync`] streams one source query in pages, converts each row with
//! the job's type rules, loads the survivors with insert-if-absent semantics
//! and forwards every reject to the job's sink. Rows are never retried: a
//! row is either accepted, skipped as already present, or rejected.

use std::time::{Duration, Instant};

use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{Config, TableJobConfig};
use crate::convert::RowConverter;
use crate::core::{RejectedRow, SourcePage, SourceReader, TargetTable, TargetWriter};
use crate::error::{Result, SyncError};
use crate::reject::{RejectSink, RejectSinkFactory};
use crate::typemap::TypeRuleRegistry;
use crate::upsert::BatchUpsertEngine;

/// Everything one table job needs, resolved from configuration.
#[derive(Debug, Clone)]
pub struct TableSyncJob {
    /// Job name, used in logs and reject artifact names.
    pub name: String,

    /// Source query.
    pub query: String,

    /// Target table.
    pub target: TargetTable,

    /// Column rules for this job (shared rules plus table overrides).
    pub registry: TypeRuleRegistry,

    /// Rows per page.
    pub batch_size: usize,

    /// Pages per commit.
    pub commit_every: usize,
}

impl TableSyncJob {
    /// Resolve a configured table job against run-wide settings.
    pub fn from_config(
        table: &TableJobConfig,
        config: &Config,
        shared: &TypeRuleRegistry,
    ) -> Self {
        Self {
            name: table.name.clone(),
            query: table.query.clone(),
            target: table.target(&config.target.schema),
            registry: table.registry(shared),
            batch_size: table.batch_size.unwrap_or(config.sync.batch_size),
            commit_every: config.sync.commit_every,
        }
    }
}

/// Counters for one finished job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    /// Job name.
    pub name: String,

    /// Target table as `schema.table`.
    pub target_table: String,

    /// Rows read from the source.
    pub rows_read: u64,

    /// Rows newly written to the target.
    pub rows_accepted: u64,

    /// Rows whose identity already existed.
    pub rows_skipped: u64,

    /// Rows rejected before or during loading.
    pub rows_rejected: u64,

    /// Pages processed.
    pub pages: u64,

    /// Reject artifacts, empty when nothing was rejected.
    pub reject_locations: Vec<String>,

    /// Wall time in seconds.
    pub duration_seconds: f64,
}

impl JobSummary {
    /// One-line operator report: counts plus where the rejects went.
    pub fn report_line(&self) -> String {
        let rejects = if self.reject_locations.is_empty() {
            "no rejects".to_string()
        } else {
            self.reject_locations.join(", ")
        };
        format!(
            "{} -> {}: read {}, accepted {}, skipped {}, rejected {} ({})",
            self.name,
            self.target_table,
            self.rows_read,
            self.rows_accepted,
            self.rows_skipped,
            self.rows_rejected,
            rejects
        )
    }
}

/// Mutable per-job state, kept outside the page loop so cleanup can see it.
#[derive(Default)]
struct JobState {
    header: Option<Vec<String>>,
    converter: Option<RowConverter>,
    engine: Option<BatchUpsertEngine>,
    sink: Option<Box<dyn RejectSink>>,
    pages_since_commit: usize,
    summary: JobSummary,
}

/// Runs table jobs against a source, a target and a reject sink factory.
pub struct TableSync<'a> {
    source: &'a dyn SourceReader,
    target: &'a dyn TargetWriter,
    rejects: &'a dyn RejectSinkFactory,
}

impl<'a> TableSync<'a> {
    pub fn new(
        source: &'a dyn SourceReader,
        target: &'a dyn TargetWriter,
        rejects: &'a dyn RejectSinkFactory,
    ) -> Self {
        Self {
            source,
            target,
            rejects,
        }
    }

    /// Run one job to completion.
    ///
    /// On failure the open transaction is rolled back; pages committed
    /// before the failure stay in the target.
    pub async fn run(&self, job: &TableSyncJob) -> Result<JobSummary> {
        let start = Instant::now();
        info!(
            "{}: syncing into {} (batch size {}, commit every {} pages)",
            job.name,
            job.target.display_name(),
            job.batch_size,
            job.commit_every
        );

        let mut state = JobState::default();
        state.summary.name = job.name.clone();
        state.summary.target_table = job.target.display_name();

        let result = self.run_pages(job, &mut state).await;

        if let Err(ref e) = result {
            if let Some(engine) = state.engine.as_mut() {
                if let Err(rollback_err) = engine.rollback().await {
                    warn!("{}: rollback after failure failed: {}", job.name, rollback_err);
                }
            }
            warn!("{}: job failed: {}", job.name, e);
        }

        let finished = match state.sink.as_mut() {
            Some(sink) => {
                let finished = sink.finish();
                state.summary.reject_locations = sink.locations();
                finished
            }
            None => Ok(()),
        };
        result?;
        finished?;

        let mut summary = state.summary;
        summary.duration_seconds = start.elapsed().as_secs_f64();
        log_summary(&summary, start.elapsed());
        Ok(summary)
    }

    async fn run_pages(&self, job: &TableSyncJob, state: &mut JobState) -> Result<()> {
        let mut pages = self.source.read_pages(&job.query, job.batch_size);

        while let Some(page) = pages.try_next().await? {
            self.process_page(job, state, page).await?;
        }
        drop(pages);

        if state.pages_since_commit > 0 {
            if let Some(engine) = state.engine.as_mut() {
                engine.commit().await?;
                debug!("{}: final commit", job.name);
            }
        }

        if state.summary.rows_read == 0 {
            info!("{}: source returned no rows", job.name);
        }
        Ok(())
    }

    async fn process_page(
        &self,
        job: &TableSyncJob,
        state: &mut JobState,
        page: SourcePage,
    ) -> Result<()> {
        if page.is_empty() {
            return Ok(());
        }

        let header = match &state.header {
            Some(header) => {
                if header != &page.columns {
                    return Err(SyncError::sync(
                        &job.name,
                        "result columns changed between pages",
                    ));
                }
                header.clone()
            }
            None => {
                let header = page.columns.clone();
                self.bind(job, state, &header).await?;
                header
            }
        };

        let (converter, engine) = match (state.converter.as_ref(), state.engine.as_mut()) {
            (Some(converter), Some(engine)) => (converter, engine),
            _ => return Err(SyncError::sync(&job.name, "job was not bound to a target")),
        };

        let mut converted = Vec::with_capacity(page.rows.len());
        let mut rejects = Vec::new();
        for row in &page.rows {
            match converter.convert(row) {
                Ok(row) => converted.push(row),
                Err(e) => {
                    debug!("{}: {}", job.name, e);
                    rejects.push(RejectedRow::new(
                        row.project(header.len()),
                        format!("PRECHECK: {}", e),
                    ));
                }
            }
        }

        let batch = engine.upsert(&converted).await?;
        rejects.extend(batch.rejects);

        let summary = &mut state.summary;
        summary.rows_read += page.rows.len() as u64;
        summary.rows_accepted += batch.accepted;
        summary.rows_skipped += batch.skipped;
        summary.rows_rejected += rejects.len() as u64;
        summary.pages += 1;

        debug!(
            "{}: page {} read={} accepted={} skipped={} rejected={}",
            job.name,
            summary.pages,
            page.rows.len(),
            batch.accepted,
            batch.skipped,
            rejects.len()
        );

        if !rejects.is_empty() {
            if state.sink.is_none() {
                state.sink = Some(self.rejects.create(&job.name, &header)?);
            }
            if let Some(sink) = state.sink.as_mut() {
                for reject in &rejects {
                    sink.write(reject)?;
                }
            }
        }

        state.pages_since_commit += 1;
        if state.pages_since_commit >= job.commit_every.max(1) {
            engine.commit().await?;
            state.pages_since_commit = 0;
            debug!("{}: committed after page {}", job.name, state.summary.pages);
        }
        Ok(())
    }

    /// Fix the header, then open and prepare a target session for it.
    async fn bind(&self, job: &TableSyncJob, state: &mut JobState, header: &[String]) -> Result<()> {
        let converter = RowConverter::new(&job.registry, header);
        let executor = self.target.open_session().await?;
        let engine = BatchUpsertEngine::new(executor, job.target.clone(), header).await?;

        debug!(
            "{}: bound {} columns, identity column {}",
            job.name,
            header.len(),
            engine.plan().identity_column()
        );

        state.header = Some(header.to_vec());
        state.converter = Some(converter);
        state.engine = Some(engine);
        Ok(())
    }
}

fn log_summary(summary: &JobSummary, elapsed: Duration) {
    info!(
        "{}: read={} accepted={} skipped={} rejected={} pages={} in {:.1}s",
        summary.name,
        summary.rows_read,
        summary.rows_accepted,
        summary.rows_skipped,
        summary.rows_rejected,
        summary.pages,
        elapsed.as_secs_f64()
    );
    if summary.rows_rejected > 0 {
        warn!(
            "{}: {} rows rejected, see {}",
            summary.name,
            summary.rows_rejected,
            summary.reject_locations.join(", ")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{RawRow, RawValue};
    use crate::drivers::{MemorySource, MemoryTarget};
    use crate::reject::MemoryRejectSinkFactory;
    use crate::typemap::{ColumnKind, ColumnTypeRule};

    const QUERY: &str = "SELECT id, amount, booked FROM orders";

    fn job(batch_size: usize, commit_every: usize) -> TableSyncJob {
        let mut registry = TypeRuleRegistry::new();
        registry.insert(ColumnTypeRule::new(
            "amount",
            ColumnKind::Numeric {
                precision: 5,
                scale: 2,
            },
        ));
        registry.insert(ColumnTypeRule::new("booked", ColumnKind::Date));
        TableSyncJob {
            name: "orders".to_string(),
            query: QUERY.to_string(),
            target: TargetTable::parse("public.orders"),
            registry,
            batch_size,
            commit_every,
        }
    }

    fn row(id: i64, amount: &str, booked: &str) -> RawRow {
        RawRow::new(vec![
            RawValue::Int(id),
            RawValue::Text(amount.to_string()),
            RawValue::Text(booked.to_string()),
        ])
    }

    fn target() -> MemoryTarget {
        let target = MemoryTarget::new();
        target.create_table("public.orders", &["id", "amount", "booked"]);
        target
    }

    #[tokio::test]
    async fn test_precheck_rejects_keep_raw_values() {
        let source = MemorySource::new().with_result(
            QUERY,
            &["id", "amount", "booked"],
            vec![
                row(1, "10.50", "2024-01-31"),
                row(2, "123456.00", "2024-01-31"),
                row(3, "1.00", "31/01/2024"),
            ],
        );
        let target = target();
        let rejects = MemoryRejectSinkFactory::new();

        let summary = TableSync::new(&source, &target, &rejects)
            .run(&job(10, 1))
            .await
            .unwrap();

        assert_eq!(summary.rows_read, 3);
        assert_eq!(summary.rows_accepted, 1);
        assert_eq!(summary.rows_rejected, 2);
        assert_eq!(summary.reject_locations, vec!["memory:orders".to_string()]);

        let collected = rejects.collected("orders").unwrap();
        assert_eq!(collected.sinks_created, 1);
        assert_eq!(collected.rows[0].values, vec!["2", "123456.00", "2024-01-31"]);
        assert!(collected.rows[0].reason.starts_with("PRECHECK: "));
        assert!(collected.rows[1].reason.starts_with("PRECHECK: "));
        assert_eq!(target.row_count("public.orders"), 1);
    }

    #[tokio::test]
    async fn test_commit_cadence() {
        let rows = (1..=5).map(|i| row(i, "1.00", "2024-01-01")).collect();
        let source = MemorySource::new().with_result(QUERY, &["id", "amount", "booked"], rows);
        let target = target();
        let rejects = MemoryRejectSinkFactory::new();

        // pages of 1 row, commit every 2 pages: commits after pages 2 and 4, then a final one
        let summary = TableSync::new(&source, &target, &rejects)
            .run(&job(1, 2))
            .await
            .unwrap();

        assert_eq!(summary.pages, 5);
        assert_eq!(target.commit_count(), 3);
        assert_eq!(target.row_count("public.orders"), 5);
        assert!(rejects.collected("orders").is_none());
        assert!(summary.reject_locations.is_empty());
    }

    #[tokio::test]
    async fn test_empty_source_opens_no_session() {
        let source = MemorySource::new().with_result(QUERY, &["id", "amount", "booked"], vec![]);
        let target = target();
        let rejects = MemoryRejectSinkFactory::new();

        let summary = TableSync::new(&source, &target, &rejects)
            .run(&job(10, 1))
            .await
            .unwrap();

        assert_eq!(summary.rows_read, 0);
        assert_eq!(summary.pages, 0);
        assert_eq!(target.session_count(), 0);
        assert_eq!(target.commit_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_identity_fails_before_loading() {
        let source = MemorySource::new().with_result(
            QUERY,
            &["code", "amount", "booked"],
            vec![row(1, "1.00", "2024-01-01")],
        );
        let target = MemoryTarget::new();
        target.create_table("public.orders", &["code", "amount", "booked"]);
        let rejects = MemoryRejectSinkFactory::new();

        let err = TableSync::new(&source, &target, &rejects)
            .run(&job(10, 1))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::MissingIdentity { .. }));
        assert_eq!(target.row_count("public.orders"), 0);
        assert_eq!(target.commit_count(), 0);
    }

    #[tokio::test]
    async fn test_source_error_fails_job() {
        let source = MemorySource::new();
        let target = target();
        let rejects = MemoryRejectSinkFactory::new();

        let err = TableSync::new(&source, &target, &rejects)
            .run(&job(10, 1))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("no result registered"));
        assert_eq!(target.rollback_count(), 0);
    }

    #[test]
    fn test_report_line() {
        let mut summary = JobSummary {
            name: "orders".to_string(),
            target_table: "public.orders".to_string(),
            rows_read: 10,
            rows_accepted: 7,
            rows_skipped: 2,
            rows_rejected: 1,
            pages: 1,
            reject_locations: vec!["out/orders.csv".to_string(), "out/orders.log".to_string()],
            duration_seconds: 0.5,
        };
        assert_eq!(
            summary.report_line(),
            "orders -> public.orders: read 10, accepted 7, skipped 2, rejected 1 \
             (out/orders.csv, out/orders.log)"
        );

        summary.rows_rejected = 0;
        summary.reject_locations.clear();
        assert!(summary.report_line().ends_with("rejected 0 (no rejects)"));
    }
}
