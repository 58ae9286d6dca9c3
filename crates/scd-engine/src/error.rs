use scd_store::StoreError;
use scd_types::TypeError;

/// Errors returned by engine operations.
///
/// The first four variants are domain outcomes and reach the caller
/// unchanged. Store failures are wrapped in [`EngineError::Infrastructure`]
/// with the protocol step and business key that failed.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{table} '{business_key}' not found")]
    NotFound {
        table: &'static str,
        business_key: String,
    },

    #[error("{table} '{business_key}' already exists")]
    AlreadyExists {
        table: &'static str,
        business_key: String,
    },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("version conflict on {table} '{business_key}' after {attempts} attempt(s)")]
    ConflictExhausted {
        table: &'static str,
        business_key: String,
        attempts: u32,
    },

    #[error("{operation} failed for '{business_key}': {source}")]
    Infrastructure {
        operation: &'static str,
        business_key: String,
        #[source]
        source: StoreError,
    },
}

/// Coarse error category for collaborators (HTTP status, exit code).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    Validation,
    Conflict,
    Infrastructure,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::Validation(_) => ErrorKind::Validation,
            Self::ConflictExhausted { .. } => ErrorKind::Conflict,
            Self::Infrastructure { .. } => ErrorKind::Infrastructure,
        }
    }

    /// The request itself was wrong; retrying it unchanged will not help.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotFound | ErrorKind::AlreadyExists | ErrorKind::Validation
        )
    }

    /// Retrying the whole operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Conflict | ErrorKind::Infrastructure)
    }

    pub(crate) fn not_found(table: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            table,
            business_key: key.to_string(),
        }
    }

    pub(crate) fn already_exists(table: &'static str, key: impl ToString) -> Self {
        Self::AlreadyExists {
            table,
            business_key: key.to_string(),
        }
    }

    /// Classify a store failure: bad queries and broken references are the
    /// caller's fault, everything else is wrapped as infrastructure.
    pub(crate) fn store(
        operation: &'static str,
        key: impl ToString,
    ) -> impl FnOnce(StoreError) -> Self {
        let wrap = Self::infra(operation, key);
        move |source| match source {
            StoreError::Query(err) => Self::Validation(err.to_string()),
            StoreError::ForeignKeyViolation { table, column } => {
                Self::Validation(format!("{table}.{column} references a missing row"))
            }
            other => wrap(other),
        }
    }

    /// Wrap a store failure with the protocol step and key it happened on.
    pub(crate) fn infra(
        operation: &'static str,
        key: impl ToString,
    ) -> impl FnOnce(StoreError) -> Self {
        let business_key = key.to_string();
        move |source| Self::Infrastructure {
            operation,
            business_key,
            source,
        }
    }
}

impl From<TypeError> for EngineError {
    fn from(err: TypeError) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
