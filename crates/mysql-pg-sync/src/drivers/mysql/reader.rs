//! MySQL/MariaDB source reader.
//!
//! Runs the job's query once and streams the result set in pages. Values are
//! decoded by the column's reported type into [`RawValue`]s; anything the
//! reader cannot decode fails the job.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use tracing::info;

use crate::config::SourceConfig;
use crate::core::{RawRow, RawValue, SourcePage, SourceReader};
use crate::error::{Result, SyncError};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// MySQL/MariaDB source reader.
pub struct MysqlReader {
    pool: MySqlPool,
}

impl MysqlReader {
    /// Create the pool and check that the source answers.
    pub async fn new(config: &SourceConfig) -> Result<Self> {
        let options = config.connect_options()?;

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| SyncError::pool(e, "creating MySQL source pool"))?;

        let reader = Self { pool };
        reader.ping().await?;

        info!(
            "Connected to MySQL source: {}:{}/{}",
            config.host, config.port, config.database
        );
        Ok(reader)
    }
}

#[async_trait]
impl SourceReader for MysqlReader {
    fn read_pages<'a>(
        &'a self,
        query: &'a str,
        page_size: usize,
    ) -> BoxStream<'a, Result<SourcePage>> {
        sqlx::query(query)
            .fetch(&self.pool)
            .map_err(SyncError::from)
            .try_chunks(page_size.max(1))
            .map_err(|chunk_err| chunk_err.1)
            .and_then(|rows| async move { rows_to_page(&rows) })
            .boxed()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| SyncError::pool(e, "testing MySQL source connection"))?;
        Ok(())
    }

    fn db_type(&self) -> &str {
        "mysql"
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

fn rows_to_page(rows: &[MySqlRow]) -> Result<SourcePage> {
    let columns = rows
        .first()
        .map(|row| {
            row.columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let raw_rows = rows
        .iter()
        .map(|row| {
            (0..columns.len())
                .map(|i| decode_value(row, i))
                .collect::<Result<Vec<_>>>()
                .map(RawRow::new)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(SourcePage::new(columns, raw_rows))
}

/// How a column of a given reported MySQL type is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decoder {
    Int,
    UInt,
    Float,
    Double,
    Decimal,
    Date,
    DateTime,
    Duration,
    Json,
    Bytes,
    Fallback,
}

/// Pick the decoder for a type name as sqlx reports it (upper-cased).
///
/// sqlx reports `TINYINT(1)` as `BOOLEAN`; MySQL has no boolean storage, so
/// those columns are read as the integers they hold. `TIME` is a signed
/// duration of up to 838 hours, not a time of day.
fn decoder_for(type_name: &str) -> Decoder {
    match type_name {
        "BOOLEAN" | "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            Decoder::Int
        }
        t if t.ends_with(" UNSIGNED") => Decoder::UInt,
        "BIT" => Decoder::UInt,
        "FLOAT" => Decoder::Float,
        "DOUBLE" => Decoder::Double,
        "DECIMAL" => Decoder::Decimal,
        "DATE" => Decoder::Date,
        "DATETIME" | "TIMESTAMP" => Decoder::DateTime,
        "TIME" => Decoder::Duration,
        "JSON" => Decoder::Json,
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
            Decoder::Bytes
        }
        _ => Decoder::Fallback,
    }
}

/// Decode one column by its reported MySQL type.
fn decode_value(row: &MySqlRow, idx: usize) -> Result<RawValue> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(RawValue::Null);
    }
    let type_name = raw.type_info().name().to_uppercase();

    let value = match decoder_for(&type_name) {
        Decoder::Int => RawValue::Int(row.try_get_unchecked::<i64, _>(idx)?),
        Decoder::UInt => RawValue::UInt(row.try_get_unchecked::<u64, _>(idx)?),
        Decoder::Float => RawValue::Float(f64::from(row.try_get::<f32, _>(idx)?)),
        Decoder::Double => RawValue::Float(row.try_get::<f64, _>(idx)?),
        Decoder::Decimal => RawValue::Decimal(row.try_get::<rust_decimal::Decimal, _>(idx)?),
        Decoder::Date => RawValue::Date(row.try_get::<chrono::NaiveDate, _>(idx)?),
        Decoder::DateTime => RawValue::DateTime(row.try_get::<chrono::NaiveDateTime, _>(idx)?),
        Decoder::Duration => {
            RawValue::Duration(row.try_get_unchecked::<chrono::TimeDelta, _>(idx)?)
        }
        Decoder::Json => RawValue::Text(row.try_get::<serde_json::Value, _>(idx)?.to_string()),
        Decoder::Bytes => RawValue::Bytes(row.try_get::<Vec<u8>, _>(idx)?),
        Decoder::Fallback => decode_fallback(row, idx, &type_name)?,
    };
    Ok(value)
}

/// Text first, then the numeric and binary decoders.
fn decode_fallback(row: &MySqlRow, idx: usize, type_name: &str) -> Result<RawValue> {
    if let Ok(s) = row.try_get::<String, _>(idx) {
        return Ok(RawValue::Text(s));
    }
    if let Ok(i) = row.try_get::<i64, _>(idx) {
        return Ok(RawValue::Int(i));
    }
    if let Ok(u) = row.try_get::<u64, _>(idx) {
        return Ok(RawValue::UInt(u));
    }
    if let Ok(f) = row.try_get::<f64, _>(idx) {
        return Ok(RawValue::Float(f));
    }
    if let Ok(b) = row.try_get::<Vec<u8>, _>(idx) {
        return Ok(RawValue::Bytes(b));
    }
    Err(SyncError::Source(sqlx::Error::ColumnDecode {
        index: row.columns()[idx].name().to_string(),
        source: format!("unsupported MySQL type {}", type_name).into(),
    }))
}
