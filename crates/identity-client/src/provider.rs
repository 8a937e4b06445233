//! Identity provider trait definitions.

use crate::IdentityResult;
use async_trait::async_trait;

/// A session as returned by the provider on sign-in or refresh.
#[derive(Debug, Clone)]
pub struct ProviderSession {
    /// Bearer token for API calls.
    pub access_token: String,
    /// Token for the next refresh exchange.
    pub refresh_token: String,
    /// Seconds until the access token expires.
    pub expires_in: i64,
    /// The verified user.
    pub user: ProviderUser,
}

/// The provider's view of a user.
#[derive(Debug, Clone)]
pub struct ProviderUser {
    /// Provider-assigned user ID.
    pub id: String,
    /// Email, when the provider reports one.
    pub email: Option<String>,
}

/// The remote identity provider's operations.
///
/// Implementations translate transport failures into categorized
/// `IdentityError`s: a 401-class response becomes `Rejected` (or
/// `InvalidCredentials` for sign-in), everything transient stays
/// retriable via `is_transient()`.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange email/password for a session.
    async fn sign_in(&self, email: &str, password: &str) -> IdentityResult<ProviderSession>;

    /// Exchange a refresh token for a new session.
    async fn refresh(&self, refresh_token: &str) -> IdentityResult<ProviderSession>;

    /// Revoke the session server-side.
    async fn sign_out(&self, access_token: &str) -> IdentityResult<()>;

    /// Fetch the user the access token belongs to.
    async fn fetch_user(&self, access_token: &str) -> IdentityResult<ProviderUser>;
}
