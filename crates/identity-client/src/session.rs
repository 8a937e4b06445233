//! The verified session.

use credential_store::{Credential, SessionMeta};

/// Provider-verified identity plus its credential.
///
/// Created on successful sign-in or refresh; destroyed on sign-out or
/// rejection. Lives no longer than the credential's expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// The token pair backing this session.
    pub credential: Credential,
    /// Who the provider says this session belongs to.
    pub identity: SessionMeta,
}

impl Session {
    /// The session user's provider-assigned ID.
    pub fn user_id(&self) -> &str {
        &self.identity.user_id
    }

    /// Bearer token for API calls.
    pub fn access_token(&self) -> &str {
        &self.credential.access_token
    }
}

/// What the local store holds, without any network verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    /// An unexpired credential is stored.
    Valid,
    /// A credential is stored but its access token has expired.
    Expired,
    /// Nothing is stored (or the stored value is unreadable).
    Missing,
}
