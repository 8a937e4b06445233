//! REST implementation of the profile fetcher.

use crate::{Profile, ProfileError, ProfileFetcher, ProfileResult, Role};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    user_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    role: Option<Role>,
    #[serde(default)]
    display_name: Option<String>,
}

/// Profile fetcher backed by `GET /profiles/{user_id}`.
#[derive(Clone)]
pub struct RestProfileFetcher {
    http_client: reqwest::Client,
    base_url: String,
    publishable_key: String,
}

impl RestProfileFetcher {
    pub fn new(base_url: impl Into<String>, publishable_key: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            publishable_key: publishable_key.into(),
        }
    }

    fn classify_transport(err: reqwest::Error) -> ProfileError {
        if err.is_timeout() {
            ProfileError::Timeout
        } else if err.is_connect() || err.is_request() {
            ProfileError::Network(err.to_string())
        } else {
            ProfileError::Malformed(err.to_string())
        }
    }
}

#[async_trait]
impl ProfileFetcher for RestProfileFetcher {
    async fn fetch(&self, user_id: &str, access_token: &str) -> ProfileResult<Profile> {
        let url = format!("{}/profiles/{}", self.base_url, user_id);
        debug!(url = %url, "Fetching profile");

        let response = self
            .http_client
            .get(&url)
            .header("apikey", &self.publishable_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await
            .map_err(Self::classify_transport)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(ProfileError::Unauthorized(format!(
                "HTTP {}: {}",
                status, body
            )));
        }
        if status == StatusCode::NOT_FOUND {
            return Err(ProfileError::NotFound(user_id.to_string()));
        }
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProfileError::Network(format!("HTTP {}: {}", status, body)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProfileError::Malformed(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let data: ProfileResponse = response
            .json()
            .await
            .map_err(|e| ProfileError::Malformed(e.to_string()))?;

        Ok(Profile {
            user_id: data.user_id,
            email: data.email,
            role: data.role.unwrap_or(Role::Unknown),
            display_name: data.display_name,
            cached_at: Utc::now(),
        })
    }
}
