//! Credential persistence for the session coordinator.
//!
//! This crate owns the single canonical storage location for the session
//! credential (access + refresh token pair):
//! - A `StorageBackend` trait over string key/value storage
//! - A file-backed implementation with synchronous reads
//! - The high-level `CredentialStore` API (read/write/clear under one key)
//! - Allow-listed, once-per-install cleanup of legacy keys
//! - A single-writer claim that construction of the identity client uses to
//!   fail fast on duplicate instances

mod credential;
mod file;
mod keys;
mod store;
mod traits;

pub use credential::{Credential, SessionMeta};
pub use file::FileStorage;
pub use keys::{StorageKeys, LEGACY_KEYS};
pub use store::CredentialStore;
pub use traits::StorageBackend;

use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Stored value exists but could not be decoded
    #[error("Stored credential is corrupted: {0}")]
    Corrupted(String),

    /// The store's writer slot has already been claimed
    #[error("Credential store writer already claimed")]
    WriterAlreadyClaimed,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding error
    #[error("Encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;
