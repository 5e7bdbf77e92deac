//! Configuration validation.

use std::collections::HashSet;

use super::Config;
use crate::error::{Result, SyncError};
use crate::typemap::TypeRuleSet;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.host.is_empty() {
        return Err(SyncError::Config("source.host is required".into()));
    }
    if config.source.database.is_empty() {
        return Err(SyncError::Config("source.database is required".into()));
    }
    if config.source.user.is_empty() {
        return Err(SyncError::Config("source.user is required".into()));
    }
    if config.source.r#type != "mysql" {
        return Err(SyncError::Config(format!(
            "source.type must be 'mysql', got '{}'",
            config.source.r#type
        )));
    }
    config.source.connect_options()?;

    // Target validation
    if config.target.host.is_empty() {
        return Err(SyncError::Config("target.host is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(SyncError::Config("target.database is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(SyncError::Config("target.user is required".into()));
    }
    if config.target.r#type != "postgres" {
        return Err(SyncError::Config(format!(
            "target.type must be 'postgres', got '{}'",
            config.target.r#type
        )));
    }
    if config.source.max_connections == 0 || config.target.max_connections == 0 {
        return Err(SyncError::Config(
            "max_connections must be at least 1".into(),
        ));
    }

    if config.sync.batch_size == 0 {
        return Err(SyncError::Config("sync.batch_size must be at least 1".into()));
    }
    if config.sync.commit_every == 0 {
        return Err(SyncError::Config(
            "sync.commit_every must be at least 1".into(),
        ));
    }

    for (i, set) in config.type_rules.iter().enumerate() {
        validate_rule_set(set, &format!("type_rules[{}]", i))?;
    }

    let mut names = HashSet::new();
    for table in &config.tables {
        if table.name.trim().is_empty() {
            return Err(SyncError::Config("tables[].name is required".into()));
        }
        if !names.insert(table.name.as_str()) {
            return Err(SyncError::Config(format!(
                "duplicate table job name '{}'",
                table.name
            )));
        }
        if table.query.trim().is_empty() {
            return Err(SyncError::Config(format!(
                "tables.{}.query is required",
                table.name
            )));
        }
        if table.target_table.trim().is_empty() {
            return Err(SyncError::Config(format!(
                "tables.{}.target_table is required",
                table.name
            )));
        }
        if table.batch_size == Some(0) {
            return Err(SyncError::Config(format!(
                "tables.{}.batch_size must be at least 1",
                table.name
            )));
        }
        validate_rule_set(&table.type_rules, &format!("tables.{}.type_rules", table.name))?;
    }

    Ok(())
}

fn validate_rule_set(set: &TypeRuleSet, path: &str) -> Result<()> {
    for (column, spec) in &set.numeric {
        if spec.precision == 0 {
            return Err(SyncError::Config(format!(
                "{}.numeric.{}: precision must be at least 1",
                path, column
            )));
        }
        if spec.scale > spec.precision {
            return Err(SyncError::Config(format!(
                "{}.numeric.{}: scale {} exceeds precision {}",
                path, column, spec.scale, spec.precision
            )));
        }
    }

    let conflicts = set.conflicting_columns();
    if !conflicts.is_empty() {
        return Err(SyncError::Config(format!(
            "{}: columns declared under more than one kind: {}",
            path,
            conflicts.join(", ")
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SourceConfig, SyncSettings, TableJobConfig, TargetConfig};
    use crate::drivers::common::SslMode;
    use crate::typemap::NumericSpec;

    fn valid_config() -> Config {
        Config {
            source: SourceConfig {
                r#type: "mysql".to_string(),
                host: "localhost".to_string(),
                port: 3306,
                database: "legacy".to_string(),
                user: "reader".to_string(),
                password: "password".to_string(),
                ssl_mode: "disabled".to_string(),
                max_connections: 2,
            },
            target: TargetConfig {
                r#type: "postgres".to_string(),
                host: "localhost".to_string(),
                port: 5432,
                database: "warehouse".to_string(),
                user: "postgres".to_string(),
                password: "password".to_string(),
                schema: "public".to_string(),
                ssl_mode: SslMode::Disable,
                max_connections: 2,
            },
            sync: SyncSettings::default(),
            type_rules: Vec::new(),
            tables: vec![table("orders")],
        }
    }

    fn table(name: &str) -> TableJobConfig {
        TableJobConfig {
            name: name.to_string(),
            query: format!("SELECT * FROM {}", name),
            target_table: name.to_string(),
            type_rules: TypeRuleSet::default(),
            batch_size: None,
        }
    }

    #[test]
    fn test_valid_config() {
        let config = valid_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_missing_source_host() {
        let mut config = valid_config();
        config.source.host = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_wrong_source_type() {
        let mut config = valid_config();
        config.source.r#type = "mssql".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_batch_size_and_cadence() {
        let mut config = valid_config();
        config.sync.batch_size = 0;
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.sync.commit_every = 0;
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.tables[0].batch_size = Some(0);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_duplicate_job_names() {
        let mut config = valid_config();
        config.tables.push(table("orders"));
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate table job name 'orders'"));
    }

    #[test]
    fn test_numeric_spec_sanity() {
        let mut config = valid_config();
        config.type_rules.push(TypeRuleSet {
            numeric: [(
                "PRICE".to_string(),
                NumericSpec {
                    precision: 2,
                    scale: 3,
                },
            )]
            .into(),
            ..Default::default()
        });
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("scale 3 exceeds precision 2"));
    }

    #[test]
    fn test_conflicting_kinds_in_one_set() {
        let mut config = valid_config();
        config.tables[0].type_rules = TypeRuleSet {
            date: vec!["DATUM".into()],
            interval: vec!["datum".into()],
            ..Default::default()
        };
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("DATUM"));
    }

    #[test]
    fn test_source_config_debug_redacts_password() {
        let mut config = valid_config();
        config.source.password = "super_secret_password_123".to_string();
        let debug_output = format!("{:?}", config.source);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_password_123"));
    }

    #[test]
    fn test_target_config_debug_redacts_password() {
        let mut config = valid_config();
        config.target.password = "super_secret_password_456".to_string();
        let debug_output = format!("{:?}", config.target);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_password_456"));
    }
}
