use thiserror::Error;

use crate::identity::SurrogateKey;
use crate::temporal::Timestamp;

/// Errors produced by type construction and envelope transitions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("business key cannot be empty")]
    EmptyBusinessKey,

    #[error("version numbers start at 1")]
    ZeroVersion,

    #[error("invalid surrogate key: {0}")]
    InvalidSurrogateKey(String),

    /// `close` was called on a row whose `valid_to` is already set.
    #[error("row {surrogate_key} is already closed at {closed_at}")]
    AlreadyClosed {
        surrogate_key: SurrogateKey,
        closed_at: Timestamp,
    },

    #[error("cannot close row {surrogate_key} at {at}: it became valid at {valid_from}")]
    CloseBeforeOpen {
        surrogate_key: SurrogateKey,
        valid_from: Timestamp,
        at: Timestamp,
    },

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("payload error: {0}")]
    Payload(String),
}
