//! Row conversion: source values to target-typed values.
//!
//! A [`RowConverter`] is built once per `(registry, header)` pair and applied
//! to every row of a job. Conversion is pure; it reads nothing but the row and
//! the resolved column kinds.

pub mod numeric;
pub mod temporal;

use chrono::NaiveTime;
use rust_decimal::Decimal;

use crate::core::{ConvertedRow, RawRow, RawValue, TypedValue};
use crate::error::{ConversionCause, ConversionError};
use crate::typemap::{ColumnKind, TypeRuleRegistry};

/// Converts raw rows for one result header.
#[derive(Debug, Clone)]
pub struct RowConverter {
    /// Upper-cased header names, used in error messages.
    columns: Vec<String>,
    kinds: Vec<ColumnKind>,
}

impl RowConverter {
    pub fn new(registry: &TypeRuleRegistry, header: &[String]) -> Self {
        Self {
            columns: header.iter().map(|c| c.to_uppercase()).collect(),
            kinds: registry.resolve(header),
        }
    }

    pub fn kinds(&self) -> &[ColumnKind] {
        &self.kinds
    }

    /// Convert one row, failing on the first column that cannot be converted.
    ///
    /// Values missing from a short row read as NULL.
    pub fn convert(&self, row: &RawRow) -> Result<ConvertedRow, ConversionError> {
        let values = self
            .columns
            .iter()
            .zip(&self.kinds)
            .enumerate()
            .map(|(idx, (column, kind))| convert_value(column, *kind, row.get(idx)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ConvertedRow::new(values))
    }
}

/// One-shot conversion; resolves kinds for `header` on every call.
pub fn convert_row(
    registry: &TypeRuleRegistry,
    header: &[String],
    row: &RawRow,
) -> Result<ConvertedRow, ConversionError> {
    RowConverter::new(registry, header).convert(row)
}

/// Convert a single value for a column of the given kind.
pub fn convert_value(
    column: &str,
    kind: ColumnKind,
    raw: &RawValue,
) -> Result<TypedValue, ConversionError> {
    if raw.is_blank() {
        return Ok(TypedValue::Null);
    }

    let fail = |cause: ConversionCause| ConversionError::new(column, raw.to_text(), cause);
    let incompatible = || {
        fail(ConversionCause::Incompatible {
            kind: kind.to_string(),
            found: raw.type_name().to_string(),
        })
    };

    match kind {
        ColumnKind::Passthrough => Ok(TypedValue::from(raw.clone())),

        ColumnKind::Date => match raw {
            RawValue::Date(d) => Ok(TypedValue::Date(*d)),
            RawValue::DateTime(dt) => Ok(TypedValue::Date(dt.date())),
            RawValue::Text(s) => match blank_or(s) {
                None => Ok(TypedValue::Null),
                Some(s) => temporal::parse_date(s)
                    .map(TypedValue::Date)
                    .ok_or_else(|| fail(ConversionCause::InvalidDate)),
            },
            _ => Err(incompatible()),
        },

        ColumnKind::Timestamp => match raw {
            RawValue::Date(d) => Ok(TypedValue::DateTime(d.and_time(NaiveTime::MIN))),
            RawValue::DateTime(dt) => Ok(TypedValue::DateTime(temporal::truncate_to_seconds(dt))),
            RawValue::Text(s) => match blank_or(s) {
                None => Ok(TypedValue::Null),
                Some(s) => temporal::parse_timestamp(s)
                    .map(TypedValue::DateTime)
                    .ok_or_else(|| fail(ConversionCause::InvalidTimestamp)),
            },
            _ => Err(incompatible()),
        },

        ColumnKind::Interval => match raw {
            RawValue::Duration(d) => Ok(TypedValue::Interval(*d)),
            RawValue::Time(t) => Ok(TypedValue::Interval(temporal::time_to_interval(t))),
            RawValue::Text(s) => match blank_or(s) {
                None => Ok(TypedValue::Null),
                Some(s) => temporal::parse_interval(s)
                    .map(TypedValue::Interval)
                    .ok_or_else(|| fail(ConversionCause::InvalidInterval)),
            },
            _ => Err(incompatible()),
        },

        ColumnKind::Numeric { precision, scale } => {
            let overflow = || fail(ConversionCause::NumericOverflow { precision, scale });
            let value = match raw {
                RawValue::Decimal(d) => *d,
                RawValue::Int(i) => Decimal::from(*i),
                RawValue::UInt(u) => Decimal::from(*u),
                // flag columns stored as TINYINT(1) / NUMBER(1,0)
                RawValue::Bool(b) => Decimal::from(u8::from(*b)),
                RawValue::Float(f) => numeric::parse_exact(&f.to_string()).ok_or_else(overflow)?,
                RawValue::Text(s) => numeric::parse_exact(s).ok_or_else(overflow)?,
                _ => return Err(incompatible()),
            };
            if numeric::decimal_fits(&value, precision, scale) {
                Ok(TypedValue::Decimal(value))
            } else {
                Err(overflow())
            }
        }
    }
}

/// `None` for whitespace-only text, otherwise the trimmed text.
fn blank_or(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
