//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use std::path::Path;
use std::time::Duration;

use sqlx::mysql::{MySqlConnectOptions, MySqlSslMode};

use crate::core::TargetTable;
use crate::error::{Result, SyncError};
use crate::typemap::TypeRuleRegistry;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Shared rule registry built from `type_rules`, later sets winning.
    pub fn registry(&self) -> TypeRuleRegistry {
        TypeRuleRegistry::from_sets(&self.type_rules)
    }

    /// Look up a table job by name.
    pub fn table(&self, name: &str) -> Option<&TableJobConfig> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Keep only the named job.
    pub fn select_table(&mut self, name: &str) -> Result<()> {
        if self.table(name).is_none() {
            return Err(SyncError::Config(format!(
                "no table job named '{}' (configured: {})",
                name,
                self.tables
                    .iter()
                    .map(|t| t.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }
        self.tables.retain(|t| t.name == name);
        Ok(())
    }
}

impl SourceConfig {
    /// Connect options for sqlx.
    pub fn connect_options(&self) -> Result<MySqlConnectOptions> {
        let ssl_mode: MySqlSslMode = self.ssl_mode.parse().map_err(|_| {
            SyncError::Config(format!(
                "invalid source.ssl_mode '{}' (expected disabled, preferred, required, verify_ca or verify_identity)",
                self.ssl_mode
            ))
        })?;

        Ok(MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user)
            .password(&self.password)
            .ssl_mode(ssl_mode))
    }
}

impl TargetConfig {
    /// Connection settings for tokio-postgres.
    pub fn pg_config(&self) -> tokio_postgres::Config {
        let mut pg = tokio_postgres::Config::new();
        pg.host(&self.host)
            .port(self.port)
            .dbname(&self.database)
            .user(&self.user)
            .password(&self.password)
            .application_name("mysql-pg-sync")
            .keepalives(true)
            .keepalives_idle(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(30));
        pg
    }
}

impl TableJobConfig {
    /// Target table with the configured default schema filled in.
    pub fn target(&self, default_schema: &str) -> TargetTable {
        TargetTable::parse(&self.target_table).with_default_schema(default_schema)
    }

    /// Shared registry with this table's overrides on top.
    pub fn registry(&self, shared: &TypeRuleRegistry) -> TypeRuleRegistry {
        shared.with_overrides(&self.type_rules)
    }
}
