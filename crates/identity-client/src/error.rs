//! Identity client error types.

use thiserror::Error;

/// Identity client error type.
///
/// Low-level transport failures are translated into one of these categories
/// at this boundary; the coordinator never sees a raw transport error.
#[derive(Error, Debug)]
pub enum IdentityError {
    /// Provider rejected the credential (invalid, expired, or revoked)
    #[error("Credential rejected by provider: {0}")]
    Rejected(String),

    /// Sign-in failed due to bad credentials
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// No session is stored
    #[error("Not signed in")]
    NotSignedIn,

    /// A second identity client was constructed against the same store
    #[error("Duplicate identity client: the credential store writer is already claimed")]
    DuplicateClient,

    /// Network unavailable (transient, can retry)
    #[error("Network unavailable")]
    NetworkUnavailable,

    /// Operation exceeded its time bound (transient)
    #[error("Operation timed out")]
    Timeout,

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] credential_store::StoreError),

    /// Malformed provider response
    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),
}

impl IdentityError {
    /// Returns true if this error is transient and the operation can be retried.
    ///
    /// Transient errors include network unavailability, timeouts, and 5xx
    /// responses. Rejections (401-class) are never transient.
    pub fn is_transient(&self) -> bool {
        match self {
            IdentityError::NetworkUnavailable => true,
            IdentityError::Timeout => true,
            IdentityError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                if let Some(status) = e.status() {
                    return status.is_server_error();
                }
                false
            }
            _ => false,
        }
    }
}

/// Result type alias using IdentityError.
pub type IdentityResult<T> = Result<T, IdentityError>;
