use thiserror::Error;

/// Domain errors for the origin subsystem. Handlers translate these into
/// HTTP statuses at the dispatch boundary; only `DbFailure` and
/// `InvalidConfiguration` surface as 5xx.
#[derive(Debug, Error)]
pub enum OriginError {
    #[error("invalid UTF-8")]
    InvalidUtf8,

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid content type: {0}")]
    InvalidContentType(String),

    #[error("invalid container key: {0}")]
    InvalidHash(String),

    #[error("invalid metadata record: {0}")]
    InvalidRecord(String),

    #[error("origin db entry not found")]
    DbNotFound,

    #[error("origin db failure: {0}")]
    DbFailure(String),

    #[error("origin request not allowed: {0}")]
    NotAllowed(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}
