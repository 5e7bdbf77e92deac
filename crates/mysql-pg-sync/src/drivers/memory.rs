//! In-memory source and target drivers.
//!
//! Used by tests and dry runs. The target keeps committed and uncommitted
//! rows apart so commit cadence and rollback are observable, and can be told
//! to refuse rows carrying a given value the way a real constraint would.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use crate::core::{
    BatchExecutor, BatchOutcome, ConvertedRow, InsertPlan, RawRow, RowFailure, SourcePage,
    SourceReader, TargetWriter,
};
use crate::error::{Result, SyncError};

/// Source serving canned result sets keyed by query text.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    results: HashMap<String, (Vec<String>, Vec<RawRow>)>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the result of `query`.
    pub fn with_result(mut self, query: &str, columns: &[&str], rows: Vec<RawRow>) -> Self {
        let columns = columns.iter().map(|c| c.to_string()).collect();
        self.results.insert(query.to_string(), (columns, rows));
        self
    }
}

#[async_trait]
impl SourceReader for MemorySource {
    fn read_pages<'a>(
        &'a self,
        query: &'a str,
        page_size: usize,
    ) -> BoxStream<'a, Result<SourcePage>> {
        let Some((columns, rows)) = self.results.get(query) else {
            let err = SyncError::sync("memory", format!("no result registered for query: {}", query));
            return stream::once(async move { Err(err) }).boxed();
        };
        let pages: Vec<Result<SourcePage>> = rows
            .chunks(page_size.max(1))
            .map(|chunk| Ok(SourcePage::new(columns.clone(), chunk.to_vec())))
            .collect();
        stream::iter(pages).boxed()
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn db_type(&self) -> &str {
        "memory"
    }

    async fn close(&self) {}
}

/// Stored row: canonical text per column, NULL as `None`.
pub type StoredRow = Vec<Option<String>>;

#[derive(Debug, Default)]
struct MemoryTable {
    columns: Vec<String>,
    /// Committed rows by identity text.
    rows: BTreeMap<String, StoredRow>,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<String, MemoryTable>,
    /// `(column, value) -> message`; matching rows are refused.
    refusals: Vec<(String, String, String)>,
    commits: usize,
    rollbacks: usize,
    sessions: usize,
}

/// Target holding tables in memory. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryTarget {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // a poisoned lock only means a test thread panicked mid-update
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Create an empty table. `name` is matched against the plan's
    /// `schema.table` display name.
    pub fn create_table(&self, name: &str, columns: &[&str]) {
        let table = MemoryTable {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: BTreeMap::new(),
        };
        self.lock().tables.insert(name.to_string(), table);
    }

    /// Refuse any row whose `column` renders as `value`.
    pub fn refuse_value(&self, column: &str, value: &str, message: &str) {
        self.lock()
            .refusals
            .push((column.to_string(), value.to_string(), message.to_string()));
    }

    /// Committed rows of a table in identity order.
    pub fn rows(&self, table: &str) -> Vec<StoredRow> {
        self.lock()
            .tables
            .get(table)
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.lock().tables.get(table).map_or(0, |t| t.rows.len())
    }

    pub fn commit_count(&self) -> usize {
        self.lock().commits
    }

    pub fn rollback_count(&self) -> usize {
        self.lock().rollbacks
    }

    pub fn session_count(&self) -> usize {
        self.lock().sessions
    }
}

#[async_trait]
impl TargetWriter for MemoryTarget {
    async fn open_session(&self) -> Result<Box<dyn BatchExecutor>> {
        self.lock().sessions += 1;
        Ok(Box::new(MemorySession {
            target: self.clone(),
            plan: None,
            pending: Vec::new(),
        }))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn db_type(&self) -> &str {
        "memory"
    }

    async fn close(&self) {}
}

/// Plan bound to a memory table: header position for each table column.
struct BoundPlan {
    table: String,
    identity_idx: usize,
    /// For each table column, the header index feeding it.
    sources: Vec<Option<usize>>,
    /// Header index per column name, upper-cased.
    by_name: HashMap<String, usize>,
}

struct MemorySession {
    target: MemoryTarget,
    plan: Option<BoundPlan>,
    /// Uncommitted inserts as `(identity, row)`.
    pending: Vec<(String, StoredRow)>,
}

#[async_trait]
impl BatchExecutor for MemorySession {
    async fn prepare(&mut self, plan: &InsertPlan) -> Result<()> {
        let table_name = plan.table.display_name();
        let state = self.target.lock();
        let table = state.tables.get(&table_name).ok_or_else(|| {
            SyncError::sync(&table_name, "relation does not exist in the target")
        })?;

        let by_name: HashMap<String, usize> = plan
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.to_uppercase(), i))
            .collect();
        let known: HashSet<String> = table.columns.iter().map(|c| c.to_uppercase()).collect();
        if let Some(missing) = plan.columns.iter().find(|c| !known.contains(&c.to_uppercase())) {
            return Err(SyncError::sync(
                &table_name,
                format!("column '{}' does not exist in the target table", missing),
            ));
        }

        let sources = table
            .columns
            .iter()
            .map(|c| by_name.get(&c.to_uppercase()).copied())
            .collect();
        drop(state);

        self.plan = Some(BoundPlan {
            table: table_name,
            identity_idx: plan.identity_idx,
            sources,
            by_name,
        });
        Ok(())
    }

    async fn submit(&mut self, rows: &[ConvertedRow]) -> Result<BatchOutcome> {
        let plan = self
            .plan
            .as_ref()
            .ok_or_else(|| SyncError::sync("memory", "submit called before prepare"))?;
        let state = self.target.lock();
        let table = state
            .tables
            .get(&plan.table)
            .ok_or_else(|| SyncError::sync(&plan.table, "relation was dropped"))?;

        let mut outcome = BatchOutcome::default();
        for (offset, row) in rows.iter().enumerate() {
            let refused = state.refusals.iter().find(|(column, value, _)| {
                plan.by_name
                    .get(&column.to_uppercase())
                    .and_then(|&i| row.values.get(i))
                    .and_then(|v| v.to_text())
                    .is_some_and(|text| &text == value)
            });
            if let Some((_, _, message)) = refused {
                outcome.failures.push(RowFailure {
                    offset,
                    message: message.clone(),
                });
                continue;
            }

            let Some(identity) = row.values.get(plan.identity_idx).and_then(|v| v.to_text())
            else {
                outcome.failures.push(RowFailure {
                    offset,
                    message: "null value in identity column".to_string(),
                });
                continue;
            };

            let exists = table.rows.contains_key(&identity)
                || self.pending.iter().any(|(id, _)| id == &identity);
            if exists {
                continue;
            }

            let stored = plan
                .sources
                .iter()
                .map(|src| src.and_then(|i| row.values.get(i)).and_then(|v| v.to_text()))
                .collect();
            self.pending.push((identity, stored));
            outcome.inserted += 1;
        }
        Ok(outcome)
    }

    async fn commit(&mut self) -> Result<()> {
        let mut state = self.target.lock();
        state.commits += 1;
        if let Some(plan) = &self.plan {
            if let Some(table) = state.tables.get_mut(&plan.table) {
                for (identity, row) in self.pending.drain(..) {
                    table.rows.insert(identity, row);
                }
            }
        }
        self.pending.clear();
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.target.lock().rollbacks += 1;
        self.pending.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{RawValue, TargetTable, TypedValue};
    use futures::TryStreamExt;

    fn plan(columns: &[&str]) -> InsertPlan {
        InsertPlan {
            table: TargetTable::parse("public.t"),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            identity_idx: 0,
        }
    }

    fn row(id: i64, name: &str) -> ConvertedRow {
        ConvertedRow::new(vec![TypedValue::Int(id), TypedValue::Text(name.to_string())])
    }

    #[tokio::test]
    async fn test_source_pages() {
        let rows = (0..5).map(|i| RawRow::new(vec![RawValue::Int(i)])).collect();
        let source = MemorySource::new().with_result("q", &["id"], rows);
        let pages: Vec<SourcePage> = source.read_pages("q", 2).try_collect().await.unwrap();
        assert_eq!(pages.iter().map(|p| p.len()).collect::<Vec<_>>(), vec![2, 2, 1]);
        assert_eq!(pages[0].columns, vec!["id".to_string()]);
    }

    #[tokio::test]
    async fn test_source_unknown_query_fails() {
        let source = MemorySource::new();
        let result: Result<Vec<SourcePage>> = source.read_pages("nope", 10).try_collect().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_insert_if_absent_and_commit() {
        let target = MemoryTarget::new();
        target.create_table("public.t", &["id", "name"]);
        let mut session = target.open_session().await.unwrap();
        session.prepare(&plan(&["ID", "NAME"])).await.unwrap();

        let outcome = session
            .submit(&[row(1, "a"), row(2, "b"), row(1, "dup")])
            .await
            .unwrap();
        assert_eq!(outcome.inserted, 2);
        assert!(outcome.failures.is_empty());
        assert_eq!(target.row_count("public.t"), 0);

        session.commit().await.unwrap();
        assert_eq!(target.row_count("public.t"), 2);
        assert_eq!(
            target.rows("public.t")[0],
            vec![Some("1".to_string()), Some("a".to_string())]
        );
    }

    #[tokio::test]
    async fn test_refusals_carry_offsets() {
        let target = MemoryTarget::new();
        target.create_table("public.t", &["id", "name"]);
        target.refuse_value("name", "bad", "value violates check constraint");
        let mut session = target.open_session().await.unwrap();
        session.prepare(&plan(&["id", "name"])).await.unwrap();

        let outcome = session
            .submit(&[row(1, "ok"), row(2, "bad"), row(3, "ok")])
            .await
            .unwrap();
        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].offset, 1);
    }

    #[tokio::test]
    async fn test_rollback_discards_pending() {
        let target = MemoryTarget::new();
        target.create_table("public.t", &["id", "name"]);
        let mut session = target.open_session().await.unwrap();
        session.prepare(&plan(&["id", "name"])).await.unwrap();
        session.submit(&[row(1, "a")]).await.unwrap();
        session.rollback().await.unwrap();
        session.commit().await.unwrap();
        assert_eq!(target.row_count("public.t"), 0);
        assert_eq!(target.rollback_count(), 1);
    }

    #[tokio::test]
    async fn test_prepare_unknown_column() {
        let target = MemoryTarget::new();
        target.create_table("public.t", &["id"]);
        let mut session = target.open_session().await.unwrap();
        let err = session.prepare(&plan(&["id", "extra"])).await.unwrap_err();
        assert!(err.to_string().contains("extra"));
    }
}
