//! Coordinator error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoordinatorError {
    /// `start()` called on a coordinator that is already running
    #[error("Coordinator already started")]
    AlreadyStarted,

    /// Identity client failure
    #[error("Identity error: {0}")]
    Identity(#[from] identity_client::IdentityError),
}

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
