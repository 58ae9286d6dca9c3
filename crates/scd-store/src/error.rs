use scd_query::QueryError;
use scd_types::{SurrogateKey, TypeError};

/// Name of the `(business_key, version)` uniqueness constraint.
pub const VERSION_CONSTRAINT: &str = "business_key_version";
/// Name of the surrogate key primary key.
pub const SURROGATE_CONSTRAINT: &str = "surrogate_key";

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected an insert.
    #[error("unique constraint {constraint} violated on {table}")]
    UniqueViolation {
        table: String,
        constraint: &'static str,
    },

    /// A reference column points at a row that does not exist.
    #[error("foreign key violated on {table}.{column}")]
    ForeignKeyViolation { table: String, column: String },

    /// Another open transaction holds a pending close on this row.
    #[error("row {surrogate_key} in {table} is locked by another transaction")]
    RowLocked {
        table: String,
        surrogate_key: SurrogateKey,
    },

    /// The table has not been created (run the schema migration first).
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// A payload column is absent, null or of the wrong type.
    #[error("column {table}.{column}: {reason}")]
    BadColumn {
        table: String,
        column: String,
        reason: String,
    },

    #[error("query error: {0}")]
    Query(#[from] QueryError),

    /// Row encoding or decoding failure.
    #[error("codec error: {0}")]
    Codec(#[from] TypeError),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store lock poisoned")]
    LockPoisoned,

    #[error("migration failed: {0}")]
    Migration(String),
}

impl StoreError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation { .. })
    }

    /// Violation of the `(business_key, version)` constraint specifically.
    pub fn is_version_conflict(&self) -> bool {
        matches!(
            self,
            Self::UniqueViolation { constraint, .. } if *constraint == VERSION_CONSTRAINT
        )
    }

    pub fn is_row_locked(&self) -> bool {
        matches!(self, Self::RowLocked { .. })
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
