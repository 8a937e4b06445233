//! Identity provider client for the session coordinator.
//!
//! This crate provides:
//! - The `IdentityProvider` trait over the remote provider's four operations
//! - A REST implementation against the provider's HTTP API
//! - `IdentityClient`, the single writer of the credential store, with a
//!   local no-network session read, deduplicated token refresh, and typed
//!   auth-event broadcast

mod client;
mod error;
mod provider;
mod rest;
mod session;

pub use client::{AuthEvent, IdentityClient, RefreshConfig};
pub use error::{IdentityError, IdentityResult};
pub use provider::{IdentityProvider, ProviderSession, ProviderUser};
pub use rest::RestIdentityProvider;
pub use session::{CredentialState, Session};
