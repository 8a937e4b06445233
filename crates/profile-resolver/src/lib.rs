//! Profile resolution with caching and request deduplication.
//!
//! Profiles are secondary identity data (role, display name) fetched from
//! the backend after authentication. The resolver caches them with a TTL
//! and coalesces concurrent fetches for the same user into one request.

mod error;
mod fetcher;
mod profile;
mod resolver;
mod rest;

pub use error::{ProfileError, ProfileResult};
pub use fetcher::ProfileFetcher;
pub use profile::{Profile, Role};
pub use resolver::{ProfileResolver, ResolverConfig};
pub use rest::RestProfileFetcher;
