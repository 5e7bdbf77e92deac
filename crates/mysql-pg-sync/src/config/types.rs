//! Configuration type definitions.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::drivers::common::SslMode;
use crate::typemap::TypeRuleSet;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (MySQL/MariaDB).
    pub source: SourceConfig,

    /// Target database configuration (PostgreSQL).
    pub target: TargetConfig,

    /// Paging, commit cadence and failure policy.
    #[serde(default)]
    pub sync: SyncSettings,

    /// Shared column type rules, applied in order.
    #[serde(default)]
    pub type_rules: Vec<TypeRuleSet>,

    /// Table jobs, run in the order listed.
    #[serde(default)]
    pub tables: Vec<TableJobConfig>,
}

/// Source database (MySQL/MariaDB) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Database type (always "mysql").
    #[serde(default = "default_mysql")]
    pub r#type: String,

    /// Database host.
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// MySQL TLS mode: disabled, preferred, required, verify_ca or
    /// verify_identity (default: "preferred").
    #[serde(default = "default_preferred")]
    pub ssl_mode: String,

    /// Pool size (default: 2).
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Target database (PostgreSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database type (always "postgres").
    #[serde(default = "default_postgres")]
    pub r#type: String,

    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Schema for unqualified target tables (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// SSL mode (default: require).
    #[serde(default)]
    pub ssl_mode: SslMode,

    /// Pool size (default: 2).
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// What the run does after a table job fails fatally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnJobError {
    /// Stop at the first failed job.
    #[default]
    Abort,
    /// Record the failure and run the remaining jobs.
    Continue,
}

/// Run-wide sync behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Rows per source page and target batch (default: 1000).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Commit after this many pages (default: 1).
    #[serde(default = "default_commit_every")]
    pub commit_every: usize,

    /// Directory for reject artifacts, created on first reject (default: "out").
    #[serde(default = "default_reject_dir")]
    pub reject_dir: PathBuf,

    /// Failure policy (default: abort).
    #[serde(default)]
    pub on_job_error: OnJobError,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            commit_every: default_commit_every(),
            reject_dir: default_reject_dir(),
            on_job_error: OnJobError::default(),
        }
    }
}

/// One table job: a source query loaded into one target table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableJobConfig {
    /// Job name, used in logs and reject file names.
    pub name: String,

    /// Read query run against the source.
    pub query: String,

    /// Target table, `table` or `schema.table`.
    pub target_table: String,

    /// Rules layered over the shared ones for this table only.
    #[serde(default, skip_serializing_if = "TypeRuleSet::is_empty")]
    pub type_rules: TypeRuleSet,

    /// Per-table page size override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
}

fn default_mysql() -> String {
    "mysql".to_string()
}

fn default_postgres() -> String {
    "postgres".to_string()
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_pg_port() -> u16 {
    5432
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_preferred() -> String {
    "preferred".to_string()
}

fn default_max_connections() -> u32 {
    2
}

fn default_batch_size() -> usize {
    1000
}

fn default_commit_every() -> usize {
    1
}

fn default_reject_dir() -> PathBuf {
    PathBuf::from("out")
}
