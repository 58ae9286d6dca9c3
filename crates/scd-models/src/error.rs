/// Errors from parsing model enums.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("unknown job status: {0}")]
    UnknownJobStatus(String),

    #[error("unknown timelog type: {0}")]
    UnknownTimelogKind(String),

    #[error("unknown payment status: {0}")]
    UnknownPaymentStatus(String),

    #[error("unknown entity kind: {0}")]
    UnknownKind(String),
}
