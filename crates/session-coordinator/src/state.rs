//! Externally visible coordinator state.

use profile_resolver::{Profile, Role};
use serde::{Deserialize, Serialize};

/// The single source of truth for authentication status.
///
/// Consumers observe this and nothing else; they never see sessions or
/// credentials directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CoordinatorState {
    /// Coordinator constructed but not started.
    Idle,
    /// Resolving whether a session exists.
    Checking,
    /// A session exists. The profile may still be minimal and refine later.
    Authenticated { profile: Profile },
    /// No session.
    Unauthenticated,
    /// An unrecoverable error. The coordinator no longer processes events.
    Error { reason: String },
}

impl CoordinatorState {
    /// A settled state: downstream consumers may act on it.
    /// `Checking` is explicitly not settled.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            CoordinatorState::Authenticated { .. }
                | CoordinatorState::Unauthenticated
                | CoordinatorState::Error { .. }
        )
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, CoordinatorState::Authenticated { .. })
    }

    /// The profile, when authenticated.
    pub fn profile(&self) -> Option<&Profile> {
        match self {
            CoordinatorState::Authenticated { profile } => Some(profile),
            _ => None,
        }
    }
}

/// Flat status summary for IPC and CLI output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSnapshot {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<&CoordinatorState> for AuthSnapshot {
    fn from(state: &CoordinatorState) -> Self {
        match state {
            CoordinatorState::Idle => Self::bare("idle"),
            CoordinatorState::Checking => Self::bare("checking"),
            CoordinatorState::Unauthenticated => Self::bare("unauthenticated"),
            CoordinatorState::Authenticated { profile } => Self {
                status: "authenticated".to_string(),
                user_id: Some(profile.user_id.clone()),
                role: Some(profile.role),
                display_name: profile.display_name.clone(),
                reason: None,
            },
            CoordinatorState::Error { reason } => Self {
                reason: Some(reason.clone()),
                ..Self::bare("error")
            },
        }
    }
}

impl AuthSnapshot {
    fn bare(status: &str) -> Self {
        Self {
            status: status.to_string(),
            user_id: None,
            role: None,
            display_name: None,
            reason: None,
        }
    }
}
