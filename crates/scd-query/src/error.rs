use scd_types::Timestamp;
use thiserror::Error;

/// Errors raised while validating or rendering a query.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueryError {
    #[error("interval start {start} is after end {end}")]
    InvertedRange { start: Timestamp, end: Timestamp },

    #[error("table {table} has no payload column {column}")]
    UnknownColumn { table: String, column: String },

    #[error("invalid value for column {column}: {reason}")]
    InvalidValue { column: String, reason: String },
}
