//! Row value types flowing through the sync pipeline.
//!
//! Source drivers produce loosely-typed [`RawValue`]s; the row converter turns
//! them into [`TypedValue`]s whose shape matches the target column kinds.
//! Both sides can be projected to plain strings for reject reporting.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use rust_decimal::Decimal;

/// A value as read from the source, before any normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    /// Time of day (MySQL `TIME` within 00:00:00..24:00:00).
    Time(NaiveTime),
    Duration(TimeDelta),
}

impl RawValue {
    /// Short type label used in conversion error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            RawValue::Null => "null",
            RawValue::Bool(_) => "boolean",
            RawValue::Int(_) | RawValue::UInt(_) => "integer",
            RawValue::Float(_) => "float",
            RawValue::Decimal(_) => "decimal",
            RawValue::Text(_) => "text",
            RawValue::Bytes(_) => "binary",
            RawValue::Date(_) => "date",
            RawValue::DateTime(_) => "timestamp",
            RawValue::Time(_) => "time",
            RawValue::Duration(_) => "interval",
        }
    }

    /// Null or empty string; both load as target NULL.
    pub fn is_blank(&self) -> bool {
        match self {
            RawValue::Null => true,
            RawValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// String projection used for pre-insert reject reporting.
    ///
    /// NULL projects to the empty string.
    pub fn to_text(&self) -> String {
        match self {
            RawValue::Null => String::new(),
            RawValue::Bool(b) => b.to_string(),
            RawValue::Int(i) => i.to_string(),
            RawValue::UInt(u) => u.to_string(),
            RawValue::Float(f) => f.to_string(),
            RawValue::Decimal(d) => d.to_string(),
            RawValue::Text(s) => s.clone(),
            RawValue::Bytes(b) => format_bytes(b),
            RawValue::Date(d) => format_date(d),
            RawValue::DateTime(dt) => format_datetime(dt),
            RawValue::Time(t) => format_time(t),
            RawValue::Duration(d) => format_interval(d),
        }
    }
}

impl From<&str> for RawValue {
    fn from(v: &str) -> Self {
        RawValue::Text(v.to_string())
    }
}

impl From<String> for RawValue {
    fn from(v: String) -> Self {
        RawValue::Text(v)
    }
}

impl From<i64> for RawValue {
    fn from(v: i64) -> Self {
        RawValue::Int(v)
    }
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        RawValue::Float(v)
    }
}

impl From<Decimal> for RawValue {
    fn from(v: Decimal) -> Self {
        RawValue::Decimal(v)
    }
}

impl From<NaiveDate> for RawValue {
    fn from(v: NaiveDate) -> Self {
        RawValue::Date(v)
    }
}

impl From<NaiveDateTime> for RawValue {
    fn from(v: NaiveDateTime) -> Self {
        RawValue::DateTime(v)
    }
}

impl From<NaiveTime> for RawValue {
    fn from(v: NaiveTime) -> Self {
        RawValue::Time(v)
    }
}

impl<T: Into<RawValue>> From<Option<T>> for RawValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(RawValue::Null)
    }
}

/// A value normalized for the target column kind.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    /// Validated fixed-precision number.
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    /// Timestamp; whole seconds when it came through a TIMESTAMP rule.
    DateTime(NaiveDateTime),
    Time(NaiveTime),
    Interval(TimeDelta),
}

impl TypedValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, TypedValue::Null)
    }

    /// Canonical text rendering, `None` for NULL.
    ///
    /// This is the form bound as a statement parameter and the form used when
    /// a target-reported reject is projected for reporting.
    pub fn to_text(&self) -> Option<String> {
        let text = match self {
            TypedValue::Null => return None,
            TypedValue::Bool(b) => b.to_string(),
            TypedValue::Int(i) => i.to_string(),
            TypedValue::UInt(u) => u.to_string(),
            TypedValue::Float(f) => f.to_string(),
            TypedValue::Decimal(d) => d.to_string(),
            TypedValue::Text(s) => s.clone(),
            TypedValue::Bytes(b) => format_bytes(b),
            TypedValue::Date(d) => format_date(d),
            TypedValue::DateTime(dt) => format_datetime(dt),
            TypedValue::Time(t) => format_time(t),
            TypedValue::Interval(d) => format_interval(d),
        };
        Some(text)
    }
}

impl From<RawValue> for TypedValue {
    /// Passthrough mapping; no kind-specific normalization.
    fn from(v: RawValue) -> Self {
        match v {
            RawValue::Null => TypedValue::Null,
            RawValue::Bool(b) => TypedValue::Bool(b),
            RawValue::Int(i) => TypedValue::Int(i),
            RawValue::UInt(u) => TypedValue::UInt(u),
            RawValue::Float(f) => TypedValue::Float(f),
            RawValue::Decimal(d) => TypedValue::Decimal(d),
            RawValue::Text(s) if s.is_empty() => TypedValue::Null,
            RawValue::Text(s) => TypedValue::Text(s),
            RawValue::Bytes(b) => TypedValue::Bytes(b),
            RawValue::Date(d) => TypedValue::Date(d),
            RawValue::DateTime(dt) => TypedValue::DateTime(dt),
            RawValue::Time(t) => TypedValue::Time(t),
            RawValue::Duration(d) => TypedValue::Interval(d),
        }
    }
}

/// One source row, positionally parallel to its page's column list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawRow {
    pub values: Vec<RawValue>,
}

impl RawRow {
    pub fn new(values: Vec<RawValue>) -> Self {
        Self { values }
    }

    /// Value at a header position; missing trailing values read as NULL.
    pub fn get(&self, idx: usize) -> &RawValue {
        self.values.get(idx).unwrap_or(&RawValue::Null)
    }

    /// Per-column string projection for the given header width.
    pub fn project(&self, width: usize) -> Vec<String> {
        (0..width).map(|i| self.get(i).to_text()).collect()
    }
}

/// A fully converted row, one value per header column.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedRow {
    pub values: Vec<TypedValue>,
}

impl ConvertedRow {
    pub fn new(values: Vec<TypedValue>) -> Self {
        Self { values }
    }

    /// Per-column string projection (NULL → empty string).
    pub fn project(&self) -> Vec<String> {
        self.values
            .iter()
            .map(|v| v.to_text().unwrap_or_default())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A row that was not loaded, with the reason it was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRow {
    pub values: Vec<String>,
    pub reason: String,
}

impl RejectedRow {
    pub fn new(values: Vec<String>, reason: impl Into<String>) -> Self {
        Self {
            values,
            reason: reason.into(),
        }
    }
}

/// A bounded chunk of rows read from the source.
#[derive(Debug, Clone, Default)]
pub struct SourcePage {
    /// Column names in the order the source returned them.
    pub columns: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl SourcePage {
    pub fn new(columns: Vec<String>, rows: Vec<RawRow>) -> Self {
        Self { columns, rows }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn format_date(d: &NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

fn format_datetime(dt: &NaiveDateTime) -> String {
    if dt.nanosecond() == 0 {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
    }
}

fn format_time(t: &NaiveTime) -> String {
    if t.nanosecond() == 0 {
        t.format("%H:%M:%S").to_string()
    } else {
        t.format("%H:%M:%S%.6f").to_string()
    }
}

/// `[-]HH:MM:SS[.ffffff]`, hours unbounded. PostgreSQL accepts this as
/// interval input.
fn format_interval(d: &TimeDelta) -> String {
    let sign = if *d < TimeDelta::zero() { "-" } else { "" };
    let abs = d.abs();
    let total_secs = abs.num_seconds();
    let micros = abs.subsec_nanos() / 1_000;
    let (h, m, s) = (total_secs / 3600, (total_secs % 3600) / 60, total_secs % 60);
    if micros == 0 {
        format!("{}{:02}:{:02}:{:02}", sign, h, m, s)
    } else {
        format!("{}{:02}:{:02}:{:02}.{:06}", sign, h, m, s, micros)
    }
}

/// PostgreSQL `bytea` hex input form.
fn format_bytes(b: &[u8]) -> String {
    let mut out = String::with_capacity(2 + b.len() * 2);
    out.push_str("\\x");
    for byte in b {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}
