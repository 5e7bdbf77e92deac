//! Core abstractions shared by the engine and the drivers.
//!
//! - [`value`]: raw source values, converted target values, reject rows
//! - [`traits`]: source reader, target writer and batch executor seams

pub mod traits;
pub mod value;

pub use traits::{
    BatchExecutor, BatchOutcome, InsertPlan, RowFailure, SourceReader, TargetTable, TargetWriter,
};
pub use value::{ConvertedRow, RawRow, RawValue, RejectedRow, SourcePage, TypedValue};
