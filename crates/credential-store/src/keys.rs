//! Storage key constants.

/// Storage keys used by the coordinator.
pub struct StorageKeys;

impl StorageKeys {
    /// The canonical session credential (JSON: access token, refresh token, expiry)
    pub const CREDENTIAL: &'static str = "session_credential";

    /// Verified identity metadata for the stored credential (JSON)
    pub const SESSION_META: &'static str = "session_meta";

    /// Migration flag recording that legacy-key cleanup has run
    pub const LEGACY_CLEANUP_DONE: &'static str = "legacy_cleanup_v1";
}

/// Keys known to be stale from earlier releases.
///
/// Cleanup is scoped to exactly this list. The canonical credential key must
/// never appear here.
pub const LEGACY_KEYS: &[&str] = &[
    "auth_access_token",
    "auth_refresh_token",
    "auth_session_meta",
    "remembered_login",
];
