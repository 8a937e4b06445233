//! Profile resolver error types.

use thiserror::Error;

/// Profile resolution error.
///
/// Clonable so a single failed fetch can be reported to every caller that
/// coalesced onto it. Transport errors are captured as strings at the REST
/// boundary for the same reason.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    /// The backend has no profile row for this user
    #[error("No profile found for user {0}")]
    NotFound(String),

    /// The access token was rejected (expired or revoked)
    #[error("Profile request unauthorized: {0}")]
    Unauthorized(String),

    /// Network-level failure (transient, can retry)
    #[error("Network error: {0}")]
    Network(String),

    /// The request exceeded its time bound (transient)
    #[error("Profile request timed out")]
    Timeout,

    /// The backend returned something we could not parse
    #[error("Malformed profile response: {0}")]
    Malformed(String),
}

impl ProfileError {
    /// Returns true if a later retry of the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProfileError::Network(_) | ProfileError::Timeout)
    }

    /// Returns true if the failure points at a stale access token, in which
    /// case the caller should refresh and retry once.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ProfileError::Unauthorized(_))
    }
}

/// Result type alias using ProfileError.
pub type ProfileResult<T> = Result<T, ProfileError>;
