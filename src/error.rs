use std::sync::Arc;

/// Represents a result type for operations in the SDK core.
///
/// This `Result` type is a standard Rust `Result` type where the error variant is defined by the
/// [`Error`] enum.
pub type Result<T> = std::result::Result<T, Error>;

/// Enum representing errors that can occur while synchronizing split and segment data.
///
/// Evaluation never returns these. Evaluation failures are resolved into an
/// [`EvaluationResult`](crate::eval::EvaluationResult) label instead.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Fetching from the remote origin failed (network error, non-2xx response).
    #[error("transport failure: {0}")]
    Transport(String),

    /// The request was unauthorized, possibly due to an invalid API key. This is not recoverable
    /// by retrying.
    #[error("unauthorized, api_key is likely invalid")]
    Unauthorized,

    /// Applying fetched data to storage failed.
    #[error("failed to apply update to storage: {0}")]
    Storage(String),

    /// A payload could not be parsed.
    #[error(transparent)]
    // serde_json::Error is not clonable, so we're wrapping it in an Arc.
    Parse(Arc<serde_json::Error>),

    /// A targeted sync finished but storage still holds an older change number.
    #[error("change number {expected} not reached (storage is at {actual})")]
    ChangeNumberNotReached {
        /// Change number the sync was asked to reach.
        expected: i64,
        /// Change number stored after the sync.
        actual: i64,
    },

    /// A bounded worker gave up.
    #[error("giving up after {attempts} attempts")]
    RetriesExhausted {
        /// Number of sync attempts made.
        attempts: u32,
    },

    /// The worker was stopped before it could complete.
    #[error("sync worker was stopped")]
    WorkerStopped,

    /// The worker has already been started. Workers are single-use.
    #[error("sync worker already started")]
    WorkerAlreadyStarted,

    /// Indicates that a worker thread panicked. This should normally never happen.
    #[error("sync worker thread panicked")]
    WorkerThreadPanicked,

    /// An I/O error.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Io(Arc<std::io::Error>),
}

impl Error {
    /// Return `false` for errors that retrying cannot fix.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::Unauthorized | Error::WorkerStopped)
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(Arc::new(value))
    }
}

/// Failures detected while walking a split definition. They never escape the evaluator.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EvaluationError {
    /// Split misses one of the fields required for evaluation (conditions or seeds).
    #[error("split definition is malformed")]
    MalformedDefinition,

    /// A matcher type this SDK does not know how to evaluate.
    #[error("matcher not found")]
    MatcherNotFound,

    /// Dependency matchers lead back to a split already being evaluated.
    #[error("split dependencies form a cycle")]
    DependencyCycle,
}
