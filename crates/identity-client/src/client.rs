//! Identity client: the single writer of the credential store.
//!
//! Owns sign-in, sign-out and token refresh. All other components read
//! sessions through this client (or through store snapshots it maintains)
//! and observe changes via the broadcast event channel.

use crate::{
    CredentialState, IdentityError, IdentityProvider, IdentityResult, ProviderSession, Session,
};
use credential_store::{Credential, CredentialStore, SessionMeta};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

/// Capacity of the auth event channel. Slow subscribers that fall more
/// than this far behind observe a `Lagged` error and resynchronize from
/// `get_session()`.
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Session lifecycle events broadcast to subscribers.
#[derive(Debug, Clone)]
pub enum AuthEvent {
    /// Interactive sign-in completed and the credential was persisted.
    SignedIn(Session),
    /// The credential was cleared, either by explicit sign-out or after
    /// the provider rejected a refresh.
    SignedOut,
    /// A refresh produced a new credential for the same identity.
    TokenRefreshed(Session),
    /// A refresh attempt gave up. When `transient` is true the stored
    /// credential was kept and a later retry may succeed; when false the
    /// provider rejected the refresh token and the store was cleared.
    TokenRefreshFailed { transient: bool },
}

/// Retry policy for token refresh.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Maximum number of attempts per refresh call (first try included).
    pub max_attempts: u32,
    /// Base delay before a retry attempt.
    pub base_delay: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RefreshConfig {
    /// Delay to sleep before the given attempt (1-based). Attempt 1 runs
    /// immediately; later attempts back off exponentially.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            Duration::ZERO
        } else {
            self.base_delay * 2u32.saturating_pow(attempt - 2)
        }
    }
}

struct ClientInner {
    provider: Arc<dyn IdentityProvider>,
    store: CredentialStore,
    events: broadcast::Sender<AuthEvent>,
    refresh_config: RefreshConfig,
    /// Serializes refresh attempts so concurrent callers coalesce into a
    /// single network request.
    refresh_lock: Mutex<()>,
    /// Bumped whenever a refresh settles (success or terminal failure).
    /// A caller that observes a bump while waiting for the lock knows
    /// another task already did the work.
    refresh_generation: AtomicU64,
}

/// The authority over the persisted credential.
///
/// Exactly one `IdentityClient` may exist per store; constructing a second
/// one against the same store fails with [`IdentityError::DuplicateClient`].
#[derive(Clone)]
pub struct IdentityClient {
    inner: Arc<ClientInner>,
}

impl IdentityClient {
    /// Create the client and claim write authority over the store.
    pub fn new(provider: Arc<dyn IdentityProvider>, store: CredentialStore) -> IdentityResult<Self> {
        Self::with_config(provider, store, RefreshConfig::default())
    }

    pub fn with_config(
        provider: Arc<dyn IdentityProvider>,
        store: CredentialStore,
        refresh_config: RefreshConfig,
    ) -> IdentityResult<Self> {
        store
            .claim_writer()
            .map_err(|_| IdentityError::DuplicateClient)?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            inner: Arc::new(ClientInner {
                provider,
                store,
                events,
                refresh_config,
                refresh_lock: Mutex::new(()),
                refresh_generation: AtomicU64::new(0),
            }),
        })
    }

    /// Subscribe to session lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }

    /// Read the current session from local storage. Never touches the
    /// network and never fails: a missing, partial, or unreadable
    /// credential all read as signed out (unreadable is logged).
    pub fn get_session(&self) -> Option<Session> {
        let credential = match self.inner.store.read() {
            Ok(Some(credential)) => credential,
            Ok(None) => return None,
            Err(err) => {
                warn!(error = %err, "Credential storage unreadable, treating as signed out");
                return None;
            }
        };
        let identity = match self.inner.store.read_meta() {
            Ok(Some(identity)) => identity,
            // A credential without identity metadata is unusable; treat it
            // as signed out rather than fabricating a session.
            Ok(None) => {
                warn!("Credential present without session metadata, ignoring");
                return None;
            }
            Err(err) => {
                warn!(error = %err, "Session metadata unreadable, treating as signed out");
                return None;
            }
        };
        Some(Session {
            credential,
            identity,
        })
    }

    /// Classify the stored credential without any network traffic.
    /// Unreadable storage classifies as missing.
    pub fn credential_state(&self) -> CredentialState {
        match self.inner.store.read() {
            Ok(None) => CredentialState::Missing,
            Ok(Some(credential)) if credential.is_expired() => CredentialState::Expired,
            Ok(Some(_)) => CredentialState::Valid,
            Err(err) => {
                warn!(error = %err, "Credential storage unreadable, treating as signed out");
                CredentialState::Missing
            }
        }
    }

    /// Sign in with email and password, persist the resulting credential,
    /// and broadcast [`AuthEvent::SignedIn`].
    pub async fn sign_in(&self, email: &str, password: &str) -> IdentityResult<Session> {
        info!(email = %email, "Signing in");
        let provider_session = self.inner.provider.sign_in(email, password).await?;
        let session = self.persist_session(provider_session)?;
        let _ = self.inner.events.send(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    /// Sign out: clear the local credential and best-effort revoke the
    /// session server-side. Local state is cleared even when the network
    /// call fails, so sign-out always succeeds locally.
    pub async fn sign_out(&self) -> IdentityResult<()> {
        let access_token = self
            .inner
            .store
            .read()?
            .map(|credential| credential.access_token);
        self.inner.store.clear()?;
        self.bump_generation();
        let _ = self.inner.events.send(AuthEvent::SignedOut);

        if let Some(token) = access_token {
            if let Err(err) = self.inner.provider.sign_out(&token).await {
                warn!(error = %err, "Server-side sign-out failed, local state already cleared");
            }
        }
        info!("Signed out");
        Ok(())
    }

    /// Refresh the stored credential.
    ///
    /// Concurrent callers coalesce: only one network request is in flight
    /// at a time, and callers that arrive while a refresh is running return
    /// its result instead of issuing their own.
    ///
    /// Returns `Ok(Some(session))` on success. Returns `Ok(None)` when the
    /// refresh settled without a usable session: either the provider
    /// rejected the refresh token (store cleared, terminal) or transient
    /// failures exhausted the retry budget (store kept). Both outcomes are
    /// announced via [`AuthEvent::TokenRefreshFailed`].
    pub async fn refresh_session(&self) -> IdentityResult<Option<Session>> {
        let observed_generation = self.inner.refresh_generation.load(Ordering::Acquire);
        let _guard = self.inner.refresh_lock.lock().await;

        // Someone else finished a refresh while we waited for the lock.
        if self.inner.refresh_generation.load(Ordering::Acquire) != observed_generation {
            debug!("Refresh already performed by concurrent caller");
            return Ok(self.get_session());
        }

        let Some(credential) = self.inner.store.read()? else {
            return Err(IdentityError::NotSignedIn);
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let delay = self.inner.refresh_config.delay_for_attempt(attempt);
            if !delay.is_zero() {
                debug!(attempt, delay_ms = delay.as_millis() as u64, "Backing off before refresh retry");
                tokio::time::sleep(delay).await;
            }

            match self.inner.provider.refresh(&credential.refresh_token).await {
                Ok(provider_session) => {
                    let session = self.persist_session(provider_session)?;
                    self.bump_generation();
                    info!(user_id = %session.user_id(), "Token refreshed");
                    let _ = self
                        .inner
                        .events
                        .send(AuthEvent::TokenRefreshed(session.clone()));
                    return Ok(Some(session));
                }
                Err(err) if err.is_transient() => {
                    warn!(attempt, error = %err, "Transient refresh failure");
                    if attempt >= self.inner.refresh_config.max_attempts {
                        // Keep the stored credential: the provider never
                        // rejected it, the network did.
                        let _ = self
                            .inner
                            .events
                            .send(AuthEvent::TokenRefreshFailed { transient: true });
                        return Ok(None);
                    }
                }
                Err(err) => {
                    warn!(error = %err, "Refresh rejected by provider, clearing credential");
                    self.inner.store.clear()?;
                    self.bump_generation();
                    let _ = self
                        .inner
                        .events
                        .send(AuthEvent::TokenRefreshFailed { transient: false });
                    let _ = self.inner.events.send(AuthEvent::SignedOut);
                    return Ok(None);
                }
            }
        }
    }

    fn persist_session(&self, provider_session: ProviderSession) -> IdentityResult<Session> {
        let credential = Credential::with_expiry_in(
            provider_session.access_token,
            provider_session.refresh_token,
            provider_session.expires_in,
        );
        let identity = SessionMeta {
            user_id: provider_session.user.id,
            email: provider_session.user.email,
        };
        self.inner.store.write(&credential)?;
        self.inner.store.write_meta(&identity)?;
        Ok(Session {
            credential,
            identity,
        })
    }

    fn bump_generation(&self) {
        self.inner
            .refresh_generation
            .fetch_add(1, Ordering::AcqRel);
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.store.release_writer();
    }
}
