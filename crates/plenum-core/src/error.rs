//! Error taxonomy shared by every kernel layer.
//!
//! Invariant and signature failures are fatal to the current transaction: the
//! local clone is discarded and nothing is committed, so no partial state can
//! land. Remote errors on reads may be retried by the caller; a rejected push
//! surfaces as [`GovError::Conflict`] and is the caller's cue to re-clone and
//! re-run the tick.

use thiserror::Error;

/// Result alias used throughout the kernel.
pub type Result<T, E = GovError> = std::result::Result<T, E>;

/// Error kinds produced by governance operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GovError {
    /// A repository path that was expected to exist is missing.
    #[error("not found: {path}")]
    NotExist {
        /// Repo-relative path of the missing object.
        path: String,
    },

    /// A create operation collided with an existing object.
    #[error("already exists: {subject}")]
    AlreadyExists {
        /// Description of the colliding object.
        subject: String,
    },

    /// A governance invariant was violated (negative balance, unknown choice,
    /// operation on a closed ballot, ...).
    #[error("invariant violation: {reason}")]
    Invariant {
        /// What was violated.
        reason: String,
    },

    /// A signature failed to verify or signed material was inconsistent.
    #[error("signature verification failed: {reason}")]
    Signature {
        /// Why verification failed.
        reason: String,
    },

    /// A network or version-control operation failed.
    #[error("remote operation failed: {reason}")]
    Remote {
        /// The underlying git/network failure.
        reason: String,
    },

    /// The remote advanced underneath us; a push was rejected.
    #[error("push conflict: {reason}")]
    Conflict {
        /// The rejection reported by the remote.
        reason: String,
    },

    /// The operation observed a cancelled [`crate::CancelToken`].
    #[error("operation cancelled")]
    Cancelled,

    /// Local filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failure.
    #[error("encoding error: {reason}")]
    Encoding {
        /// The underlying codec failure.
        reason: String,
    },
}

impl GovError {
    /// Missing-path constructor.
    pub fn not_exist(path: impl Into<String>) -> Self {
        Self::NotExist { path: path.into() }
    }

    /// Collision constructor.
    pub fn already_exists(subject: impl Into<String>) -> Self {
        Self::AlreadyExists {
            subject: subject.into(),
        }
    }

    /// Invariant-violation constructor.
    pub fn invariant(reason: impl Into<String>) -> Self {
        Self::Invariant {
            reason: reason.into(),
        }
    }

    /// Signature-failure constructor.
    pub fn signature(reason: impl Into<String>) -> Self {
        Self::Signature {
            reason: reason.into(),
        }
    }

    /// Remote-failure constructor.
    pub fn remote(reason: impl Into<String>) -> Self {
        Self::Remote {
            reason: reason.into(),
        }
    }

    /// Returns true when the error is a missing-path error.
    pub fn is_not_exist(&self) -> bool {
        matches!(self, Self::NotExist { .. })
    }

    /// Returns true when the error is an invariant violation.
    pub fn is_invariant(&self) -> bool {
        matches!(self, Self::Invariant { .. })
    }
}

impl From<serde_json::Error> for GovError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encoding {
            reason: err.to_string(),
        }
    }
}
