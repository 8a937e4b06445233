//! REST implementation of the identity provider.

use crate::{IdentityError, IdentityProvider, IdentityResult, ProviderSession, ProviderUser};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Sign-in request body.
#[derive(Debug, Serialize)]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Token refresh request body.
#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Session response for sign-in and refresh.
#[derive(Debug, Deserialize)]
struct SessionResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    user: UserResponse,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

/// Identity provider backed by the HTTP API:
/// `POST /auth/session`, `DELETE /auth/session`, `POST /auth/refresh`,
/// `GET /auth/user`.
#[derive(Clone)]
pub struct RestIdentityProvider {
    http_client: reqwest::Client,
    base_url: String,
    publishable_key: String,
}

impl RestIdentityProvider {
    /// Create a new REST provider.
    ///
    /// # Arguments
    /// * `base_url` - The provider base URL (e.g., `https://auth.example.com`)
    /// * `publishable_key` - The provider's public API key
    pub fn new(base_url: impl Into<String>, publishable_key: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            publishable_key: publishable_key.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn parse_session(data: SessionResponse) -> ProviderSession {
        ProviderSession {
            access_token: data.access_token,
            refresh_token: data.refresh_token,
            expires_in: data.expires_in,
            user: ProviderUser {
                id: data.user.id,
                email: data.user.email,
            },
        }
    }
}

/// Map a non-success status to a categorized error.
///
/// 401/403 means the credential is invalid or revoked; everything else is
/// left on the HTTP error so `is_transient()` can classify 5xx as retriable.
fn rejection_or_http(status: StatusCode, body: String, context: &str) -> IdentityError {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        IdentityError::Rejected(format!("{}: HTTP {}: {}", context, status, body))
    } else {
        IdentityError::MalformedResponse(format!("{}: HTTP {}: {}", context, status, body))
    }
}

#[async_trait]
impl IdentityProvider for RestIdentityProvider {
    async fn sign_in(&self, email: &str, password: &str) -> IdentityResult<ProviderSession> {
        let url = self.endpoint("/auth/session");
        debug!(url = %url, email = %email, "Signing in");

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.publishable_key)
            .json(&SignInRequest { email, password })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "Sign-in failed");
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::BAD_REQUEST {
                return Err(IdentityError::InvalidCredentials(format!(
                    "HTTP {}: {}",
                    status, body
                )));
            }
            return Err(rejection_or_http(status, body, "sign-in"));
        }

        let data: SessionResponse = response.json().await?;
        Ok(Self::parse_session(data))
    }

    async fn refresh(&self, refresh_token: &str) -> IdentityResult<ProviderSession> {
        let url = self.endpoint("/auth/refresh");
        debug!(url = %url, "Refreshing token");

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.publishable_key)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() {
            // Leave 5xx on the HTTP error path so it classifies as transient
            response.error_for_status()?;
            return Err(IdentityError::MalformedResponse(format!(
                "refresh: unexpected HTTP {}",
                status
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "Token refresh rejected");
            return Err(rejection_or_http(status, body, "refresh"));
        }

        let data: SessionResponse = response.json().await?;
        Ok(Self::parse_session(data))
    }

    async fn sign_out(&self, access_token: &str) -> IdentityResult<()> {
        let url = self.endpoint("/auth/session");
        debug!(url = %url, "Signing out");

        let response = self
            .http_client
            .delete(&url)
            .header("apikey", &self.publishable_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "Server-side sign-out failed");
            return Err(rejection_or_http(status, body, "sign-out"));
        }

        Ok(())
    }

    async fn fetch_user(&self, access_token: &str) -> IdentityResult<ProviderUser> {
        let url = self.endpoint("/auth/user");
        debug!(url = %url, "Fetching user");

        let response = self
            .http_client
            .get(&url)
            .header("apikey", &self.publishable_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(rejection_or_http(status, body, "fetch-user"));
        }

        let user: UserResponse = response.json().await?;
        Ok(ProviderUser {
            id: user.id,
            email: user.email,
        })
    }
}
