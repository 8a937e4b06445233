//! Cached, deduplicated profile resolution.

use crate::{Profile, ProfileFetcher, ProfileResult};
use chrono::Utc;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

type SharedFetch = Shared<BoxFuture<'static, ProfileResult<Profile>>>;

/// Resolver tuning knobs.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// How long a cached profile is served without a refetch.
    pub ttl: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
        }
    }
}

struct ResolverState {
    cache: HashMap<String, Profile>,
    inflight: HashMap<String, SharedFetch>,
}

/// Resolves profiles through a fetcher, with a TTL cache in front and
/// coalescing of concurrent requests for the same user.
#[derive(Clone)]
pub struct ProfileResolver {
    fetcher: Arc<dyn ProfileFetcher>,
    config: ResolverConfig,
    state: Arc<Mutex<ResolverState>>,
}

impl ProfileResolver {
    pub fn new(fetcher: Arc<dyn ProfileFetcher>) -> Self {
        Self::with_config(fetcher, ResolverConfig::default())
    }

    pub fn with_config(fetcher: Arc<dyn ProfileFetcher>, config: ResolverConfig) -> Self {
        Self {
            fetcher,
            config,
            state: Arc::new(Mutex::new(ResolverState {
                cache: HashMap::new(),
                inflight: HashMap::new(),
            })),
        }
    }

    /// Resolve a profile, serving from cache when fresh.
    ///
    /// Concurrent calls for the same user share one fetch; every waiter
    /// receives the same result (including the same error). Failed fetches
    /// are never cached.
    pub async fn resolve(&self, user_id: &str, access_token: &str) -> ProfileResult<Profile> {
        let fetch = {
            let mut state = self.lock_state();

            if let Some(profile) = state.cache.get(user_id) {
                if self.is_fresh(profile) {
                    debug!(user_id = %user_id, "Profile served from cache");
                    return Ok(profile.clone());
                }
            }

            if let Some(existing) = state.inflight.get(user_id) {
                debug!(user_id = %user_id, "Joining in-flight profile fetch");
                existing.clone()
            } else {
                let fetcher = Arc::clone(&self.fetcher);
                let uid = user_id.to_string();
                let token = access_token.to_string();
                let fetch = async move { fetcher.fetch(&uid, &token).await }
                    .boxed()
                    .shared();
                state.inflight.insert(user_id.to_string(), fetch.clone());
                fetch
            }
        };

        let result = fetch.clone().await;

        let mut state = self.lock_state();
        // If an invalidation raced the fetch, our in-flight entry is gone
        // and the result must not repopulate the cache. Pointer equality
        // keeps a slow waiter from evicting a newer fetch's entry.
        let still_tracked = state
            .inflight
            .get(user_id)
            .map(|existing| existing.ptr_eq(&fetch))
            .unwrap_or(false);
        if still_tracked {
            state.inflight.remove(user_id);
            if let Ok(profile) = &result {
                state.cache.insert(user_id.to_string(), profile.clone());
            }
        }
        result
    }

    /// Return the cached profile, if fresh, without fetching.
    pub fn peek(&self, user_id: &str) -> Option<Profile> {
        let state = self.lock_state();
        state
            .cache
            .get(user_id)
            .filter(|profile| self.is_fresh(profile))
            .cloned()
    }

    /// Drop the cached entry for one user and orphan any in-flight fetch so
    /// its result is not cached. The next resolve refetches.
    pub fn invalidate(&self, user_id: &str) {
        let mut state = self.lock_state();
        state.cache.remove(user_id);
        state.inflight.remove(user_id);
    }

    /// Drop every cached entry and orphan all in-flight fetches. Called on
    /// sign-out so the next session starts from an empty cache.
    pub fn invalidate_all(&self) {
        let mut state = self.lock_state();
        state.cache.clear();
        state.inflight.clear();
    }

    fn is_fresh(&self, profile: &Profile) -> bool {
        let age = Utc::now().signed_duration_since(profile.cached_at);
        age < chrono::Duration::milliseconds(self.config.ttl.as_millis() as i64)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ResolverState> {
        // Lock is only held for map operations; a poisoned lock means a
        // panic mid-insert, in which case continuing with the map as-is
        // is safe.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
