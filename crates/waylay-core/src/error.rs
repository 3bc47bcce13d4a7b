//! Structured error types for the job backend.
//!
//! `WaylayError` is the boundary type for everything in `waylay-core` —
//! callers pattern-match on it instead of downcasting an `anyhow::Error`.
//! Handler bodies still speak `anyhow` internally (see `waylay-handlers`);
//! only the backend's own operations return this enum.

use thiserror::Error;

/// Errors raised by `Backend` and `Job` operations.
#[derive(Debug, Error)]
pub enum WaylayError {
    /// A transient or unexpected error from the underlying database driver.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The `handler` column held JSON that the registry could not turn into
    /// a `Handler` — either malformed JSON or an unregistered `type`.
    #[error("deserialization error: {0}")]
    Deserialization(#[from] DeserializationError),

    /// A registered constructor rejected its parameters.
    #[error("handler construction failed for job {job_id}: {message}")]
    HandlerBuild {
        /// The job whose handler failed to construct.
        job_id: i64,
        /// The constructor's rejection message.
        message: String,
    },

    /// A `Job`'s `Weak<Backend>` reference could no longer be upgraded —
    /// the backend that created it has been dropped.
    #[error("job {0} has outlived its backend")]
    BackendGone(i64),

    /// `Backend::connect` could not infer a dialect from the connection URL.
    #[error("unrecognized database URL scheme: {0}")]
    UnknownDialect(String),
}

/// Failure modes when turning a stored `handler` JSON blob back into a
/// constructible descriptor. Both variants are permanent: no amount of
/// retrying un-breaks a payload that will never parse or a type that was
/// never registered.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeserializationError {
    /// `handler` was not valid JSON, or was JSON but not an object.
    #[error("malformed handler payload: {0}")]
    MalformedPayload(String),

    /// The `handler` object had no `type` key, or it was not a string.
    #[error("handler payload is missing a `type` key")]
    MissingType,

    /// `type` named a kind with no registered constructor.
    #[error("unknown handler type: {0}")]
    UnknownType(String),
}

impl DeserializationError {
    /// All deserialization errors are permanent for the row they occurred
    /// on — see spec §7.2.
    pub fn is_permanent(&self) -> bool {
        true
    }
}

/// Result alias used throughout `waylay-core`.
pub type Result<T> = std::result::Result<T, WaylayError>;
