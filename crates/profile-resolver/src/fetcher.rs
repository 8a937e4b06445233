//! Profile fetcher trait definition.

use crate::{Profile, ProfileResult};
use async_trait::async_trait;

/// Fetches a single profile from the backend.
///
/// Implementations map a 401-class response to `ProfileError::Unauthorized`
/// and a missing row to `ProfileError::NotFound`, so callers can distinguish
/// "refresh the token and retry" from "this user has no profile".
#[async_trait]
pub trait ProfileFetcher: Send + Sync {
    async fn fetch(&self, user_id: &str, access_token: &str) -> ProfileResult<Profile>;
}
