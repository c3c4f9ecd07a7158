//! # Errors
//!
//! Error kinds surfaced by the status manager. Labels are semantic: the
//! orchestration layer retries any failure that is not
//! [`Error::InvalidRepoState`], so transient backend faults are wrapped in
//! [`Error::Other`] rather than given kinds of their own.

use thiserror::Error;

/// Result type for status manager operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the status manager.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input: unknown status purpose, invalid credential id,
    /// unsupported `@context` dialect, compact-JWT input, missing required
    /// options, or unknown git service.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The credential id is not present in the event log.
    #[error("not found: {0}")]
    NotFound(String),

    /// The DID seed is neither a multibase-encoded value nor a UTF-8 string
    /// of at least 32 bytes.
    #[error("invalid DID seed: {0}")]
    InvalidDidSeed(String),

    /// An access token lacks admin, push, or pull rights on a repository,
    /// or a repository is unreachable with the supplied credentials.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// A repository has not been pre-created by the operator.
    #[error("missing repository: {0}")]
    MissingRepository(String),

    /// A snapshot already exists. Signals the caller to run snapshot
    /// cleanup before capturing a new pre-image.
    #[error("snapshot already exists")]
    SnapshotExists,

    /// Repository state failed validation and the snapshot-recovery
    /// protocol could not converge. Carries a message identifying the
    /// violated check. Never retried.
    #[error("invalid repository state: {0}")]
    InvalidRepoState(String),

    /// Transport, serialization, or other backend fault. Retryable.
    #[error("internal error: {0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// `true` for the one kind the orchestration layer must not retry.
    #[must_use]
    pub const fn is_invalid_repo_state(&self) -> bool {
        matches!(self, Self::InvalidRepoState(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Other(e.into())
    }
}
