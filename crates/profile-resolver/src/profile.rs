//! Profile data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authorization role attached to a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
    /// The role could not be determined yet. Grants no privileges.
    Unknown,
}

impl Default for Role {
    fn default() -> Self {
        Role::Unknown
    }
}

/// Secondary identity data for an authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub display_name: Option<String>,
    /// When this profile was fetched; drives cache expiry.
    pub cached_at: DateTime<Utc>,
}

impl Profile {
    /// A placeholder profile used when resolution cannot complete in time.
    /// Carries only what the session already knows (id and email), so the
    /// caller can proceed and refine later.
    pub fn minimal(user_id: impl Into<String>, email: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email,
            role: Role::Unknown,
            display_name: None,
            cached_at: Utc::now(),
        }
    }

    /// Whether this profile is still a placeholder awaiting refinement.
    pub fn is_minimal(&self) -> bool {
        self.role == Role::Unknown && self.display_name.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_profile_grants_nothing() {
        let profile = Profile::minimal("user-1", Some("u@example.com".to_string()));
        assert_eq!(profile.user_id, "user-1");
        assert_eq!(profile.email.as_deref(), Some("u@example.com"));
        assert_eq!(profile.role, Role::Unknown);
        assert!(profile.is_minimal());
    }

    #[test]
    fn test_role_serialization_is_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        assert_eq!(serde_json::to_string(&Role::Member).unwrap(), "\"member\"");
        let role: Role = serde_json::from_str("\"unknown\"").unwrap();
        assert_eq!(role, Role::Unknown);
    }

    #[test]
    fn test_missing_role_defaults_to_unknown() {
        let json = r#"{ "user_id": "user-1", "cached_at": "2026-08-26T00:00:00Z" }"#;
        let profile: Profile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.role, Role::Unknown);
    }
}
