//! Sync orchestrator - runs the configured table jobs in order.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{Config, OnJobError};
use crate::core::{SourceReader, TargetWriter};
use crate::drivers::{MysqlReader, PostgresWriter};
use crate::error::{Result, SyncError};
use crate::reject::{FileRejectSinkFactory, RejectSinkFactory};
use crate::transfer::{JobSummary, TableSync, TableSyncJob};

/// Sync orchestrator.
pub struct Orchestrator {
    config: Config,
    source: Arc<dyn SourceReader>,
    target: Arc<dyn TargetWriter>,
    rejects: Arc<dyn RejectSinkFactory>,
}

/// A table job that failed fatally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub name: String,
    pub error: String,
}

/// Result of a sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRunResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status: completed, failed, aborted or cancelled.
    pub status: String,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Jobs configured for this run.
    pub jobs_total: usize,

    /// Summaries of the jobs that finished.
    pub jobs: Vec<JobSummary>,

    /// Jobs that failed.
    pub failures: Vec<JobFailure>,

    pub rows_read: u64,
    pub rows_accepted: u64,
    pub rows_skipped: u64,
    pub rows_rejected: u64,
}

/// Connectivity report for both ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub source_connected: bool,
    pub source_latency_ms: u64,
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    pub target_error: Option<String>,
    pub healthy: bool,
}

impl Orchestrator {
    /// Create an orchestrator with MySQL and PostgreSQL pools from `config`.
    pub async fn new(config: Config) -> Result<Self> {
        let source = MysqlReader::new(&config.source).await?;
        let target = PostgresWriter::new(&config.target).await?;
        let rejects = FileRejectSinkFactory::new(&config.sync.reject_dir);

        Ok(Self::with_drivers(
            config,
            Arc::new(source),
            Arc::new(target),
            Arc::new(rejects),
        ))
    }

    /// Create an orchestrator over already-built drivers.
    pub fn with_drivers(
        config: Config,
        source: Arc<dyn SourceReader>,
        target: Arc<dyn TargetWriter>,
        rejects: Arc<dyn RejectSinkFactory>,
    ) -> Self {
        Self {
            config,
            source,
            target,
            rejects,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run every configured job in order.
    ///
    /// With `on_job_error: abort` the first job failure ends the run with
    /// [`SyncError::Aborted`], which carries the jobs finished so far. With
    /// `continue` failures are recorded and the run goes on.
    /// Cancellation is observed between jobs; a job that has started runs
    /// to completion.
    pub async fn run(&self, cancel: CancellationToken) -> Result<SyncRunResult> {
        let started_at = Utc::now();
        let start = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();

        info!(
            "Starting sync run {}: {} table jobs, {} -> {}",
            run_id,
            self.config.tables.len(),
            self.source.db_type(),
            self.target.db_type()
        );

        let shared = self.config.registry();
        let sync = TableSync::new(
            self.source.as_ref(),
            self.target.as_ref(),
            self.rejects.as_ref(),
        );

        let mut jobs = Vec::with_capacity(self.config.tables.len());
        let mut failures = Vec::new();
        let mut aborted = None;
        let mut cancelled = false;

        for table in &self.config.tables {
            if cancel.is_cancelled() {
                warn!("Run cancelled before job {}", table.name);
                cancelled = true;
                break;
            }

            let job = TableSyncJob::from_config(table, &self.config, &shared);
            match sync.run(&job).await {
                Ok(summary) => jobs.push(summary),
                Err(e) => {
                    error!("Job {} failed: {}", table.name, e);
                    failures.push(JobFailure {
                        name: table.name.clone(),
                        error: e.to_string(),
                    });
                    if self.config.sync.on_job_error == OnJobError::Abort {
                        aborted = Some((table.name.clone(), e));
                        break;
                    }
                }
            }
        }

        let status = if aborted.is_some() {
            "aborted"
        } else if !failures.is_empty() {
            "failed"
        } else if cancelled {
            "cancelled"
        } else {
            "completed"
        };

        let result = SyncRunResult {
            run_id,
            status: status.to_string(),
            duration_seconds: start.elapsed().as_secs_f64(),
            started_at,
            completed_at: Utc::now(),
            jobs_total: self.config.tables.len(),
            rows_read: jobs.iter().map(|j| j.rows_read).sum(),
            rows_accepted: jobs.iter().map(|j| j.rows_accepted).sum(),
            rows_skipped: jobs.iter().map(|j| j.rows_skipped).sum(),
            rows_rejected: jobs.iter().map(|j| j.rows_rejected).sum(),
            jobs,
            failures,
        };

        info!(
            "Sync {}: {}/{} jobs, read={} accepted={} skipped={} rejected={} in {:.1}s",
            result.status,
            result.jobs.len(),
            result.jobs_total,
            result.rows_read,
            result.rows_accepted,
            result.rows_skipped,
            result.rows_rejected,
            result.duration_seconds
        );

        if let Some((job, e)) = aborted {
            return Err(SyncError::Aborted {
                job,
                partial: Box::new(result),
                source: Box::new(e),
            });
        }
        Ok(result)
    }

    /// Ping both databases.
    pub async fn health_check(&self) -> Result<HealthCheckResult> {
        let start = Instant::now();
        let source = self.source.ping().await;
        let source_latency_ms = start.elapsed().as_millis() as u64;

        let start = Instant::now();
        let target = self.target.ping().await;
        let target_latency_ms = start.elapsed().as_millis() as u64;

        let result = HealthCheckResult {
            source_connected: source.is_ok(),
            source_latency_ms,
            source_error: source.err().map(|e| e.to_string()),
            target_connected: target.is_ok(),
            target_latency_ms,
            target_error: target.err().map(|e| e.to_string()),
            healthy: false,
        };
        Ok(HealthCheckResult {
            healthy: result.source_connected && result.target_connected,
            ..result
        })
    }

    /// Close both connection pools.
    pub async fn close(&self) {
        self.source.close().await;
        self.target.close().await;
    }
}

impl SyncRunResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Error to report for a run that did not complete cleanly.
    pub fn outcome(&self) -> Result<()> {
        match self.status.as_str() {
            "cancelled" => Err(SyncError::Cancelled),
            "failed" | "aborted" => Err(SyncError::sync(
                self.failures
                    .iter()
                    .map(|f| f.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                format!("{} of {} jobs failed", self.failures.len(), self.jobs_total),
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{RawRow, RawValue};
    use crate::drivers::{MemorySource, MemoryTarget};
    use crate::reject::MemoryRejectSinkFactory;

    fn config(on_job_error: &str) -> Config {
        let yaml = format!(
            r#"
source:
  host: mysql.internal
  database: legacy
  user: reader
  password: secret
target:
  host: pg.internal
  database: warehouse
  user: loader
  password: secret
sync:
  on_job_error: {}
tables:
  - name: items
    query: SELECT id FROM items
    target_table: items
  - name: broken
    query: SELECT id FROM missing
    target_table: items
  - name: never
    query: SELECT id FROM items
    target_table: items
"#,
            on_job_error
        );
        Config::from_yaml(&yaml).unwrap()
    }

    fn orchestrator(on_job_error: &str) -> (Orchestrator, MemoryTarget) {
        let rows = (1..=3).map(|i| RawRow::new(vec![RawValue::Int(i)])).collect();
        let source = MemorySource::new().with_result("SELECT id FROM items", &["id"], rows);
        let target = MemoryTarget::new();
        target.create_table("public.items", &["id"]);
        let orchestrator = Orchestrator::with_drivers(
            config(on_job_error),
            Arc::new(source),
            Arc::new(target.clone()),
            Arc::new(MemoryRejectSinkFactory::new()),
        );
        (orchestrator, target)
    }

    #[tokio::test]
    async fn test_abort_keeps_finished_jobs() {
        let (orchestrator, target) = orchestrator("abort");
        let err = orchestrator.run(CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert!(err.format_detailed().contains("no result registered"));

        let SyncError::Aborted { job, partial, .. } = err else {
            panic!("expected an aborted run");
        };
        assert_eq!(job, "broken");
        assert_eq!(partial.status, "aborted");
        assert_eq!(partial.jobs_total, 3);
        assert_eq!(partial.jobs.len(), 1);
        assert_eq!(partial.jobs[0].name, "items");
        assert_eq!(partial.jobs[0].rows_accepted, 3);
        assert_eq!(partial.failures.len(), 1);
        assert_eq!(target.row_count("public.items"), 3);
    }

    #[tokio::test]
    async fn test_continue_runs_remaining_jobs() {
        let (orchestrator, target) = orchestrator("continue");
        let result = orchestrator.run(CancellationToken::new()).await.unwrap();
        assert_eq!(result.status, "failed");
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].name, "broken");
        assert_eq!(result.jobs.len(), 2);
        assert_eq!(result.rows_accepted, 3);
        assert_eq!(result.rows_skipped, 3);
        assert_eq!(target.row_count("public.items"), 3);
        assert_eq!(result.outcome().unwrap_err().exit_code(), 4);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_job() {
        let (orchestrator, target) = orchestrator("continue");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = orchestrator.run(cancel).await.unwrap();
        assert_eq!(result.status, "cancelled");
        assert!(result.jobs.is_empty());
        assert!(matches!(result.outcome(), Err(SyncError::Cancelled)));
        assert_eq!(target.session_count(), 0);
    }

    #[tokio::test]
    async fn test_health_check_memory() {
        let (orchestrator, _) = orchestrator("abort");
        let health = orchestrator.health_check().await.unwrap();
        assert!(health.healthy);
        assert!(health.source_error.is_none());
    }

    #[tokio::test]
    async fn test_result_json() {
        let (orchestrator, _) = orchestrator("continue");
        let result = orchestrator.run(CancellationToken::new()).await.unwrap();
        let json = result.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["jobs"][0]["name"], "items");
    }
}
