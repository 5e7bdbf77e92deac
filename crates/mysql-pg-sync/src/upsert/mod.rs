//! Insert-if-absent batch loading with per-row reject attribution.
//!
//! The engine is bound to one `(table, header)` pair for the lifetime of a
//! job. It resolves the identity column, prepares the target session once,
//! then turns each executor outcome into counts and [`RejectedRow`]s.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::core::{BatchExecutor, ConvertedRow, InsertPlan, RejectedRow, TargetTable};
use crate::error::{Result, SyncError};

/// Outcome of one [`BatchUpsertEngine::upsert`] call.
///
/// `accepted + skipped + rejects.len()` equals the number of rows submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    /// Rows newly written.
    pub accepted: u64,

    /// Rows whose identity already existed in the target.
    pub skipped: u64,

    /// Rows the target refused, with the target's message as the reason.
    pub rejects: Vec<RejectedRow>,
}

/// Locate the identity column: exactly `id`, else exactly `ID`.
pub fn resolve_identity(header: &[String]) -> Option<usize> {
    header
        .iter()
        .position(|c| c == "id")
        .or_else(|| header.iter().position(|c| c == "ID"))
}

/// Indices of the rows to submit: the first row for each identity value.
///
/// Rows with a NULL identity are all kept so the target can refuse them.
fn first_per_identity(rows: &[ConvertedRow], identity_idx: usize) -> Vec<usize> {
    let mut seen = HashSet::with_capacity(rows.len());
    rows.iter()
        .enumerate()
        .filter(|(_, row)| {
            match row.values.get(identity_idx).and_then(|v| v.to_text()) {
                Some(key) => seen.insert(key),
                None => true,
            }
        })
        .map(|(i, _)| i)
        .collect()
}

/// Loads converted rows into one target table.
pub struct BatchUpsertEngine {
    executor: Box<dyn BatchExecutor>,
    plan: InsertPlan,
}

impl BatchUpsertEngine {
    /// Bind an executor to `table` for rows shaped like `header`.
    ///
    /// Fails with [`SyncError::MissingIdentity`] before anything is sent when
    /// the header has no identity column.
    pub async fn new(
        mut executor: Box<dyn BatchExecutor>,
        table: TargetTable,
        header: &[String],
    ) -> Result<Self> {
        let identity_idx = resolve_identity(header).ok_or_else(|| SyncError::MissingIdentity {
            table: table.display_name(),
        })?;

        let plan = InsertPlan {
            table,
            columns: header.to_vec(),
            identity_idx,
        };
        executor.prepare(&plan).await?;

        debug!(
            "Prepared insert-if-absent on {} ({} columns, identity {})",
            plan.table.display_name(),
            plan.columns.len(),
            plan.identity_column()
        );

        Ok(Self { executor, plan })
    }

    pub fn plan(&self) -> &InsertPlan {
        &self.plan
    }

    /// Submit one batch.
    ///
    /// Only the first row for each identity value is sent; later rows with
    /// the same identity count as skipped. Per-row target failures become
    /// rejects; the batch itself only fails on executor errors or when the
    /// executor reports an offset that does not address a submitted row.
    pub async fn upsert(&mut self, rows: &[ConvertedRow]) -> Result<BatchResult> {
        if rows.is_empty() {
            return Ok(BatchResult::default());
        }

        let table = self.plan.table.display_name();
        let keep = first_per_identity(rows, self.plan.identity_idx);
        let dropped = (rows.len() - keep.len()) as u64;
        if dropped > 0 {
            debug!("{}: {} repeated identities in batch skipped", table, dropped);
        }

        let outcome = if dropped == 0 {
            self.executor.submit(rows).await?
        } else {
            let submitted: Vec<ConvertedRow> = keep.iter().map(|&i| rows[i].clone()).collect();
            self.executor.submit(&submitted).await?
        };

        let mut seen = vec![false; keep.len()];
        let mut rejects = Vec::with_capacity(outcome.failures.len());
        for failure in outcome.failures {
            let row = keep.get(failure.offset).map(|&i| &rows[i]).ok_or_else(|| {
                SyncError::sync(
                    &table,
                    format!(
                        "target reported offset {} outside batch of {}",
                        failure.offset,
                        keep.len()
                    ),
                )
            })?;
            if std::mem::replace(&mut seen[failure.offset], true) {
                return Err(SyncError::sync(
                    &table,
                    format!("target reported offset {} twice", failure.offset),
                ));
            }
            warn!("{}: row {} rejected: {}", table, keep[failure.offset], failure.message);
            rejects.push(RejectedRow::new(row.project(), failure.message));
        }

        let attempted = keep.len() as u64 - rejects.len() as u64;
        if outcome.inserted > attempted {
            return Err(SyncError::sync(
                &table,
                format!(
                    "target reported {} inserted of {} attempted rows",
                    outcome.inserted, attempted
                ),
            ));
        }

        Ok(BatchResult {
            accepted: outcome.inserted,
            skipped: attempted - outcome.inserted + dropped,
            rejects,
        })
    }

    pub async fn commit(&mut self) -> Result<()> {
        self.executor.commit().await
    }

    pub async fn rollback(&mut self) -> Result<()> {
        self.executor.rollback().await
    }
}
