//! The persisted session credential.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Access + refresh token pair with its expiry.
///
/// At most one credential exists in storage at a time, under the canonical
/// key. UI code never reads this directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Bearer token for API calls.
    pub access_token: String,
    /// Token exchanged for a new access token when the current one expires.
    pub refresh_token: String,
    /// When the access token expires.
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// Create a credential expiring `expires_in` seconds from now.
    pub fn with_expiry_in(access_token: String, refresh_token: String, expires_in: i64) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at: Utc::now() + Duration::seconds(expires_in),
        }
    }

    /// True if the access token has expired.
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// True if the access token expires within the given margin.
    pub fn expires_within(&self, margin: std::time::Duration) -> bool {
        let margin = Duration::from_std(margin).unwrap_or(Duration::zero());
        self.expires_at <= Utc::now() + margin
    }
}

/// Identity metadata persisted beside the credential.
///
/// Written by the identity client when the provider verifies the user, so a
/// local session read needs no network round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMeta {
    /// Provider-assigned user ID.
    pub user_id: String,
    /// User email, when the provider reports one.
    #[serde(default)]
    pub email: Option<String>,
}
