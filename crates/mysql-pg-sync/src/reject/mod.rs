//! Reject reporting.
//!
//! A [`RejectSink`] receives every row a job could not load. Sinks are made
//! by a [`RejectSinkFactory`], which the job calls at most once, on its first
//! reject, so a clean job leaves no artifacts behind.
//!
//! The file sink writes two files per job into the reject directory:
//!
//! - `rejects_<job>_<YYYYmmdd_HHMMSS>.csv`: UTF-8 with BOM, `;` delimited,
//!   the job header plus a trailing `__REASON__` column
//! - `rejects_<job>_<YYYYmmdd_HHMMSS>.log`: one `<reason> | VALUES=[...]`
//!   line per reject

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::core::RejectedRow;
use crate::error::{Result, SyncError};

/// Name of the reason column appended to the reject CSV header.
pub const REASON_COLUMN: &str = "__REASON__";

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Destination for one job's rejected rows.
pub trait RejectSink: Send {
    fn write(&mut self, reject: &RejectedRow) -> Result<()>;

    /// Flush buffered output; the sink is not written to afterwards.
    fn finish(&mut self) -> Result<()>;

    /// Where the rejects went, for the job summary.
    fn locations(&self) -> Vec<String>;
}

/// Creates a sink for a job on its first reject.
pub trait RejectSinkFactory: Send + Sync {
    fn create(&self, job: &str, header: &[String]) -> Result<Box<dyn RejectSink>>;
}

/// Writes reject CSV and log files under a directory created on demand.
#[derive(Debug, Clone)]
pub struct FileRejectSinkFactory {
    dir: PathBuf,
}

impl FileRejectSinkFactory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl RejectSinkFactory for FileRejectSinkFactory {
    fn create(&self, job: &str, header: &[String]) -> Result<Box<dyn RejectSink>> {
        fs::create_dir_all(&self.dir).map_err(|e| sink_error("creating", &self.dir, e))?;

        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let base = format!("rejects_{}_{}", file_safe(job), stamp);
        let csv_path = self.dir.join(format!("{}.csv", base));
        let log_path = self.dir.join(format!("{}.log", base));

        let mut csv_file =
            File::create(&csv_path).map_err(|e| sink_error("creating", &csv_path, e))?;
        csv_file
            .write_all(UTF8_BOM)
            .map_err(|e| sink_error("writing", &csv_path, e))?;

        let mut csv = csv::WriterBuilder::new()
            .delimiter(b';')
            .from_writer(csv_file);
        let mut record: Vec<&str> = header.iter().map(String::as_str).collect();
        record.push(REASON_COLUMN);
        csv.write_record(&record)
            .map_err(|e| sink_error("writing", &csv_path, e))?;

        let log_file =
            File::create(&log_path).map_err(|e| sink_error("creating", &log_path, e))?;

        info!(
            "Writing rejects for {} to {} and {}",
            job,
            csv_path.display(),
            log_path.display()
        );

        Ok(Box::new(FileRejectSink {
            csv,
            log: BufWriter::new(log_file),
            csv_path,
            log_path,
        }))
    }
}

struct FileRejectSink {
    csv: csv::Writer<File>,
    log: BufWriter<File>,
    csv_path: PathBuf,
    log_path: PathBuf,
}

impl RejectSink for FileRejectSink {
    fn write(&mut self, reject: &RejectedRow) -> Result<()> {
        let mut record: Vec<&str> = reject.values.iter().map(String::as_str).collect();
        record.push(&reject.reason);
        self.csv
            .write_record(&record)
            .map_err(|e| sink_error("writing", &self.csv_path, e))?;
        writeln!(self.log, "{} | VALUES={:?}", reject.reason, reject.values)
            .map_err(|e| sink_error("writing", &self.log_path, e))?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.csv
            .flush()
            .map_err(|e| sink_error("flushing", &self.csv_path, e))?;
        self.log
            .flush()
            .map_err(|e| sink_error("flushing", &self.log_path, e))?;
        Ok(())
    }

    fn locations(&self) -> Vec<String> {
        vec![
            self.csv_path.display().to_string(),
            self.log_path.display().to_string(),
        ]
    }
}

fn sink_error(action: &str, path: &Path, e: impl std::fmt::Display) -> SyncError {
    SyncError::RejectSink(format!("{} {}: {}", action, path.display(), e))
}

/// Keep job names usable as file name parts.
fn file_safe(job: &str) -> String {
    job.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Rejects collected in memory for one job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectedRejects {
    pub header: Vec<String>,
    pub rows: Vec<RejectedRow>,
    /// How many sinks the factory made for this job.
    pub sinks_created: usize,
}

/// Factory that keeps rejects in memory, keyed by job name. Clones share
/// state.
#[derive(Debug, Clone, Default)]
pub struct MemoryRejectSinkFactory {
    jobs: Arc<Mutex<HashMap<String, CollectedRejects>>>,
}

impl MemoryRejectSinkFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collected(&self, job: &str) -> Option<CollectedRejects> {
        self.jobs
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(job)
            .cloned()
    }
}

impl RejectSinkFactory for MemoryRejectSinkFactory {
    fn create(&self, job: &str, header: &[String]) -> Result<Box<dyn RejectSink>> {
        let mut jobs = self.jobs.lock().unwrap_or_else(|p| p.into_inner());
        let entry = jobs.entry(job.to_string()).or_default();
        entry.header = header.to_vec();
        entry.sinks_created += 1;
        Ok(Box::new(MemoryRejectSink {
            job: job.to_string(),
            jobs: Arc::clone(&self.jobs),
        }))
    }
}

struct MemoryRejectSink {
    job: String,
    jobs: Arc<Mutex<HashMap<String, CollectedRejects>>>,
}

impl RejectSink for MemoryRejectSink {
    fn write(&mut self, reject: &RejectedRow) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap_or_else(|p| p.into_inner());
        jobs.entry(self.job.clone())
            .or_default()
            .rows
            .push(reject.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }

    fn locations(&self) -> Vec<String> {
        vec![format!("memory:{}", self.job)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Vec<String> {
        vec!["id".to_string(), "name".to_string()]
    }

    #[test]
    fn test_file_sink_writes_csv_and_log() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let factory = FileRejectSinkFactory::new(&out);

        let mut sink = factory.create("booked history", &header()).unwrap();
        sink.write(&RejectedRow::new(
            vec!["7".into(), "a;b".into()],
            "PRECHECK: Numeric overflow for ID='7' target NUMBER(1,0)",
        ))
        .unwrap();
        sink.finish().unwrap();

        let locations = sink.locations();
        assert_eq!(locations.len(), 2);
        assert!(locations[0].ends_with(".csv"));
        assert!(locations[0].contains("rejects_booked_history_"));

        let csv_bytes = fs::read(&locations[0]).unwrap();
        assert!(csv_bytes.starts_with(UTF8_BOM));
        let csv_text = String::from_utf8(csv_bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        let mut lines = csv_text.lines();
        assert_eq!(lines.next().unwrap(), "id;name;__REASON__");
        assert_eq!(
            lines.next().unwrap(),
            "7;\"a;b\";PRECHECK: Numeric overflow for ID='7' target NUMBER(1,0)"
        );

        let log_text = fs::read_to_string(&locations[1]).unwrap();
        assert_eq!(
            log_text,
            "PRECHECK: Numeric overflow for ID='7' target NUMBER(1,0) | VALUES=[\"7\", \"a;b\"]\n"
        );
    }

    #[test]
    fn test_factory_creates_directory_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("out");
        let factory = FileRejectSinkFactory::new(&out);
        assert!(!out.exists());
        let _sink = factory.create("t", &header()).unwrap();
        assert!(out.is_dir());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_full_disk_reported_with_path() {
        let full = PathBuf::from("/dev/full");
        let mut sink = FileRejectSink {
            csv: csv::WriterBuilder::new()
                .delimiter(b';')
                .from_writer(File::create(&full).unwrap()),
            log: BufWriter::new(File::create(&full).unwrap()),
            csv_path: full.clone(),
            log_path: full,
        };
        sink.write(&RejectedRow::new(vec!["1".into(), "x".into()], "too long"))
            .unwrap();

        let err = sink.finish().unwrap_err();
        assert!(
            matches!(err, SyncError::RejectSink(ref msg) if msg.starts_with("flushing /dev/full"))
        );
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn test_memory_factory_collects() {
        let factory = MemoryRejectSinkFactory::new();
        let mut sink = factory.create("orders", &header()).unwrap();
        sink.write(&RejectedRow::new(vec!["1".into(), "x".into()], "nope"))
            .unwrap();
        sink.finish().unwrap();

        let collected = factory.collected("orders").unwrap();
        assert_eq!(collected.header, header());
        assert_eq!(collected.rows.len(), 1);
        assert_eq!(collected.sinks_created, 1);
        assert!(factory.collected("other").is_none());
    }

    #[test]
    fn test_file_safe() {
        assert_eq!(file_safe("sync.orders v2"), "sync_orders_v2");
        assert_eq!(file_safe("a-b_c"), "a-b_c");
    }
}
