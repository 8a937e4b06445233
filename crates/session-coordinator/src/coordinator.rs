//! The session coordinator: single owner of authentication status.
//!
//! Orchestrates the identity client and profile resolver behind one
//! reactive output. All timeout and ordering policy lives here: startup is
//! local-only, profile resolution is budgeted with degradation, refreshes
//! are scheduled ahead of expiry, and stale async results are discarded by
//! epoch.

use crate::machine::{CoordinatorMachine, MachineInput};
use crate::{AuthSnapshot, CoordinatorError, CoordinatorResult, CoordinatorState, ResolutionBudget};
use chrono::Utc;
use identity_client::{AuthEvent, CredentialState, IdentityClient, Session};
use profile_resolver::{Profile, ProfileResolver};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How long the refresh scheduler sleeps while signed out.
const SCHEDULER_IDLE_POLL: Duration = Duration::from_secs(30);
/// Pause after any refresh attempt before the scheduler re-evaluates, so a
/// failing provider is not hammered.
const SCHEDULER_COOLDOWN: Duration = Duration::from_secs(30);
/// Upper bound on one scheduler sleep; long waits re-check the credential
/// periodically in case it was rotated by another code path.
const SCHEDULER_MAX_SLEEP: Duration = Duration::from_secs(300);
/// Delay before the single background profile retry.
const REFINEMENT_RETRY_DELAY: Duration = Duration::from_millis(500);
/// Scheduled refresh attempts per credential: the initial one plus one
/// retry. Further attempts wait for the credential to rotate.
const SCHEDULER_MAX_ATTEMPTS: u32 = 2;

/// Outcome of one budgeted profile attempt.
enum ProfileAttempt {
    Resolved(Profile),
    /// The access token was rejected; refresh and retry once.
    Unauthorized,
    /// Timed out or failed; degrade to a minimal profile.
    Degraded,
}

struct CoordinatorInner {
    client: IdentityClient,
    resolver: ProfileResolver,
    budget: ResolutionBudget,
    state_tx: watch::Sender<CoordinatorState>,
    machine: Mutex<CoordinatorMachine>,
    /// Bumped whenever the session identity changes (sign-in, sign-out).
    /// Async work captures the epoch at dispatch and discards its result
    /// if the epoch moved on.
    epoch: AtomicU64,
    started: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// The process-wide authentication coordinator.
///
/// Construct once, call [`start`](Self::start), and observe state through
/// [`subscribe`](Self::subscribe). Cheap to clone.
#[derive(Clone)]
pub struct SessionCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl SessionCoordinator {
    pub fn new(client: IdentityClient, resolver: ProfileResolver) -> Self {
        Self::with_budget(client, resolver, ResolutionBudget::default())
    }

    pub fn with_budget(
        client: IdentityClient,
        resolver: ProfileResolver,
        budget: ResolutionBudget,
    ) -> Self {
        let (state_tx, _) = watch::channel(CoordinatorState::Idle);
        Self {
            inner: Arc::new(CoordinatorInner {
                client,
                resolver,
                budget,
                state_tx,
                machine: Mutex::new(CoordinatorMachine::new()),
                epoch: AtomicU64::new(0),
                started: AtomicBool::new(false),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Observe coordinator state. The receiver immediately holds the
    /// current value; it is only notified again when the state actually
    /// changes.
    pub fn subscribe(&self) -> watch::Receiver<CoordinatorState> {
        self.inner.state_tx.subscribe()
    }

    /// The current state.
    pub fn state(&self) -> CoordinatorState {
        self.inner.state_tx.borrow().clone()
    }

    /// Flat status summary for IPC and CLI.
    pub fn snapshot(&self) -> AuthSnapshot {
        AuthSnapshot::from(&self.state())
    }

    /// The timeout budget downstream gates must derive their waits from.
    pub fn budget(&self) -> &ResolutionBudget {
        &self.inner.budget
    }

    /// Start the coordinator: resolve the initial state from local storage
    /// only, then run the event loop and the proactive refresh scheduler.
    ///
    /// Returns once the initial state is settled. Never issues a network
    /// request when an unexpired credential is present; an expired
    /// credential gets exactly one refresh attempt.
    pub async fn start(&self) -> CoordinatorResult<()> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(CoordinatorError::AlreadyStarted);
        }

        // Subscribe before resolving so no event can slip past unseen.
        let events = self.inner.client.subscribe();
        self.inner
            .transition(&MachineInput::Start, CoordinatorState::Checking);
        self.inner.startup_resolution().await;

        let event_task = tokio::spawn(Arc::clone(&self.inner).event_loop(events));
        let refresh_task = tokio::spawn(Arc::clone(&self.inner).refresh_scheduler());
        let mut tasks = self.inner.lock_tasks();
        tasks.push(event_task);
        tasks.push(refresh_task);
        Ok(())
    }

    /// Sign in. The resulting state change arrives through the event loop.
    pub async fn sign_in(&self, email: &str, password: &str) -> CoordinatorResult<()> {
        self.inner.client.sign_in(email, password).await?;
        Ok(())
    }

    /// Sign out. Local state is cleared even if the provider is down.
    pub async fn sign_out(&self) -> CoordinatorResult<()> {
        self.inner.client.sign_out().await?;
        Ok(())
    }

    /// Stop background tasks. State stays at its last value.
    pub fn shutdown(&self) {
        for task in self.inner.lock_tasks().drain(..) {
            task.abort();
        }
    }
}

impl CoordinatorInner {
    /// Feed the machine and publish the new public state if the transition
    /// is legal. Illegal transitions mean a stale or out-of-order event and
    /// are dropped.
    fn transition(&self, input: &MachineInput, next: CoordinatorState) -> bool {
        self.transition_with(input, || next)
    }

    /// Like [`transition`](Self::transition), with the published value
    /// computed under the machine lock. The lock is held across consume and
    /// publish, so concurrent publishers (event loop, refinement tasks)
    /// cannot interleave a consume with a stale publish.
    fn transition_with(&self, input: &MachineInput, next: impl FnOnce() -> CoordinatorState) -> bool {
        let mut machine = self.lock_machine();
        let accepted = machine.consume(input).is_ok();
        if accepted {
            self.publish(next());
        } else {
            warn!(input = ?input, "Transition not legal in current state, discarding event");
        }
        drop(machine);
        accepted
    }

    /// Publish only on change, so subscribers never see redundant updates.
    fn publish(&self, next: CoordinatorState) {
        self.state_tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            info!(from = ?AuthSnapshot::from(&*current).status, to = ?AuthSnapshot::from(&next).status, "Coordinator state changed");
            *current = next;
            true
        });
    }

    async fn startup_resolution(self: &Arc<Self>) {
        let epoch = self.epoch.load(Ordering::Acquire);
        match self.client.credential_state() {
            CredentialState::Missing => {
                debug!("No stored credential");
                self.transition(&MachineInput::NoSession, CoordinatorState::Unauthenticated);
            }
            CredentialState::Valid => match self.client.get_session() {
                Some(session) => {
                    // Provisionally trust the local credential; background
                    // refresh corrects it later if it was revoked.
                    self.settle(session, epoch).await;
                }
                None => {
                    self.transition(&MachineInput::NoSession, CoordinatorState::Unauthenticated);
                }
            },
            CredentialState::Expired => {
                info!("Stored credential expired, attempting one refresh");
                match self.client.refresh_session().await {
                    Ok(Some(session)) => self.settle(session, epoch).await,
                    Ok(None) => {
                        self.transition(&MachineInput::NoSession, CoordinatorState::Unauthenticated);
                    }
                    Err(err) => {
                        warn!(error = %err, "Startup refresh failed");
                        self.transition(&MachineInput::NoSession, CoordinatorState::Unauthenticated);
                    }
                }
            }
        }
    }

    /// Settle a session into a terminal state within the profile budget.
    async fn settle(self: &Arc<Self>, session: Session, epoch: u64) {
        match self.resolve_with_budget(&session).await {
            ProfileAttempt::Resolved(profile) => {
                if self.epoch_current(epoch) {
                    self.transition(
                        &MachineInput::ProfileResolved,
                        CoordinatorState::Authenticated { profile },
                    );
                }
            }
            ProfileAttempt::Unauthorized => {
                // The store said the token was fine but the backend
                // disagreed. Refresh once and retry once.
                info!("Profile fetch unauthorized, refreshing token");
                match self.client.refresh_session().await {
                    Ok(Some(fresh)) => match self.resolve_with_budget(&fresh).await {
                        ProfileAttempt::Resolved(profile) => {
                            if self.epoch_current(epoch) {
                                self.transition(
                                    &MachineInput::ProfileResolved,
                                    CoordinatorState::Authenticated { profile },
                                );
                            }
                        }
                        _ => self.degrade(fresh, epoch),
                    },
                    // Transient failure keeps the credential around; trust
                    // it provisionally. A cleared store means the refresh
                    // token was rejected outright.
                    Ok(None) => match self.client.get_session() {
                        Some(kept) => self.degrade(kept, epoch),
                        None => {
                            if self.epoch_current(epoch) {
                                self.transition(
                                    &MachineInput::NoSession,
                                    CoordinatorState::Unauthenticated,
                                );
                            }
                        }
                    },
                    Err(err) => {
                        warn!(error = %err, "Reactive refresh failed");
                        self.degrade(session, epoch);
                    }
                }
            }
            ProfileAttempt::Degraded => self.degrade(session, epoch),
        }
    }

    async fn resolve_with_budget(&self, session: &Session) -> ProfileAttempt {
        let resolve = self
            .resolver
            .resolve(session.user_id(), session.access_token());
        match tokio::time::timeout(self.budget.profile_budget, resolve).await {
            Ok(Ok(profile)) => ProfileAttempt::Resolved(profile),
            Ok(Err(err)) if err.is_unauthorized() => ProfileAttempt::Unauthorized,
            Ok(Err(err)) => {
                warn!(error = %err, "Profile resolution failed within budget");
                ProfileAttempt::Degraded
            }
            Err(_) => {
                warn!(
                    budget_ms = self.budget.profile_budget.as_millis() as u64,
                    "Profile resolution exceeded budget"
                );
                ProfileAttempt::Degraded
            }
        }
    }

    /// Authenticate with a minimal profile now, refine in the background.
    fn degrade(self: &Arc<Self>, session: Session, epoch: u64) {
        if !self.epoch_current(epoch) {
            return;
        }
        let profile = Profile::minimal(session.user_id(), session.identity.email.clone());
        if self.transition(
            &MachineInput::ProfileDegraded,
            CoordinatorState::Authenticated { profile },
        ) {
            self.spawn_refinement(session, epoch);
        }
    }

    /// Resolve the full profile off the critical path. At most one retry on
    /// a transient failure, then stay minimal.
    fn spawn_refinement(self: &Arc<Self>, session: Session, epoch: u64) {
        let inner = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut attempt = 0;
            loop {
                attempt += 1;
                match inner
                    .resolver
                    .resolve(session.user_id(), session.access_token())
                    .await
                {
                    Ok(profile) => {
                        if inner.epoch_current(epoch) {
                            inner.transition(
                                &MachineInput::ProfileResolved,
                                CoordinatorState::Authenticated { profile },
                            );
                        } else {
                            debug!("Discarding profile refinement for superseded session");
                        }
                        return;
                    }
                    Err(err) if err.is_transient() && attempt < 2 => {
                        warn!(error = %err, "Profile refinement failed, retrying once");
                        tokio::time::sleep(REFINEMENT_RETRY_DELAY).await;
                    }
                    Err(err) => {
                        warn!(error = %err, "Profile refinement gave up, staying minimal");
                        return;
                    }
                }
            }
        });
        self.lock_tasks().push(handle);
    }

    /// Sequential event processing: one event is fully handled before the
    /// next is received, so transitions never interleave.
    async fn event_loop(self: Arc<Self>, mut events: broadcast::Receiver<AuthEvent>) {
        loop {
            match events.recv().await {
                Ok(AuthEvent::SignedIn(session)) => {
                    let epoch = self.bump_epoch();
                    self.transition(&MachineInput::SignedIn, CoordinatorState::Checking);
                    self.settle(session, epoch).await;
                }
                Ok(AuthEvent::SignedOut) => {
                    self.bump_epoch();
                    self.resolver.invalidate_all();
                    self.transition(&MachineInput::SignedOut, CoordinatorState::Unauthenticated);
                }
                Ok(AuthEvent::TokenRefreshed(_)) => {
                    // Same identity, same profile. The current state is
                    // re-read under the machine lock and republishing an
                    // equal state is a no-op, so subscribers see no churn
                    // on refresh.
                    self.transition_with(&MachineInput::TokenRefreshed, || {
                        self.state_tx.borrow().clone()
                    });
                }
                Ok(AuthEvent::TokenRefreshFailed { transient: true }) => {
                    if matches!(self.client.credential_state(), CredentialState::Expired) {
                        // The outage outlived the token. The credential is
                        // kept so a later startup can retry the refresh, but
                        // the user is no longer authenticated.
                        warn!("Refresh failed and the credential has expired, signing out");
                        self.bump_epoch();
                        self.resolver.invalidate_all();
                        self.transition(&MachineInput::SignedOut, CoordinatorState::Unauthenticated);
                    } else {
                        warn!("Transient token refresh failure, keeping last known state");
                    }
                }
                Ok(AuthEvent::TokenRefreshFailed { transient: false }) => {
                    // The client clears the store and follows up with
                    // SignedOut; that event drives the transition.
                    debug!("Token refresh rejected by provider");
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Auth event stream lagged, resynchronizing from storage");
                    let epoch = self.bump_epoch();
                    match self.client.get_session() {
                        Some(session) => {
                            self.transition(&MachineInput::SignedIn, CoordinatorState::Checking);
                            self.settle(session, epoch).await;
                        }
                        None => {
                            self.transition(
                                &MachineInput::SignedOut,
                                CoordinatorState::Unauthenticated,
                            );
                        }
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    // The identity client is gone while the coordinator
                    // still runs; no further event can ever arrive.
                    error!("Auth event channel closed, coordinator unrecoverable");
                    self.transition(
                        &MachineInput::Fatal,
                        CoordinatorState::Error {
                            reason: "auth event channel closed".to_string(),
                        },
                    );
                    return;
                }
            }
        }
    }

    /// Refresh the credential ahead of expiry, by the configured margin.
    ///
    /// A failing credential gets the initial attempt plus one scheduled
    /// retry; after that the scheduler leaves it alone until it rotates
    /// (sign-in or reactive refresh), so a dead provider is not polled
    /// forever.
    async fn refresh_scheduler(self: Arc<Self>) {
        // Scheduled attempts made against the current refresh token.
        let mut attempted: Option<(String, u32)> = None;
        loop {
            let Some(session) = self.client.get_session() else {
                attempted = None;
                tokio::time::sleep(SCHEDULER_IDLE_POLL).await;
                continue;
            };

            let token = session.credential.refresh_token.clone();
            let attempts = match &attempted {
                Some((failed, count)) if *failed == token => *count,
                _ => 0,
            };
            if attempts >= SCHEDULER_MAX_ATTEMPTS {
                tokio::time::sleep(SCHEDULER_IDLE_POLL).await;
                continue;
            }

            let margin =
                chrono::Duration::milliseconds(self.budget.refresh_margin.as_millis() as i64);
            let due_in = session.credential.expires_at - margin - Utc::now();
            match due_in.to_std() {
                Ok(wait) if !wait.is_zero() => {
                    tokio::time::sleep(wait.min(SCHEDULER_MAX_SLEEP)).await;
                }
                _ => {
                    debug!("Proactive token refresh due");
                    attempted = Some((token, attempts + 1));
                    match self.client.refresh_session().await {
                        Ok(Some(_)) => {
                            attempted = None;
                            debug!("Proactive refresh succeeded");
                        }
                        Ok(None) => warn!("Proactive refresh did not yield a session"),
                        Err(err) => warn!(error = %err, "Proactive refresh failed"),
                    }
                    tokio::time::sleep(SCHEDULER_COOLDOWN).await;
                }
            }
        }
    }

    fn epoch_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::Acquire) == epoch
    }

    fn bump_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn lock_machine(&self) -> MutexGuard<'_, CoordinatorMachine> {
        match self.machine.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use credential_store::{Credential, CredentialStore, SessionMeta, StorageBackend, StoreError};
    use identity_client::{
        IdentityError, IdentityProvider, IdentityResult, ProviderSession, ProviderUser,
        RefreshConfig,
    };
    use profile_resolver::{ProfileError, ProfileFetcher, ProfileResult, ResolverConfig, Role};
    use std::collections::HashMap;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex as StdMutex;

    struct MemoryBackend {
        data: StdMutex<HashMap<String, String>>,
    }

    impl MemoryBackend {
        fn new() -> Self {
            Self {
                data: StdMutex::new(HashMap::new()),
            }
        }
    }

    impl StorageBackend for MemoryBackend {
        fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
            self.data
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }

        fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            Ok(self.data.lock().unwrap().get(key).cloned())
        }

        fn delete(&self, key: &str) -> Result<bool, StoreError> {
            Ok(self.data.lock().unwrap().remove(key).is_some())
        }
    }

    struct FakeProvider {
        refresh_calls: AtomicU32,
        sign_in_calls: AtomicU32,
        reject_refresh: AtomicBool,
        /// When set every refresh fails with a timeout.
        fail_transient: AtomicBool,
    }

    impl FakeProvider {
        fn new() -> Self {
            Self {
                refresh_calls: AtomicU32::new(0),
                sign_in_calls: AtomicU32::new(0),
                reject_refresh: AtomicBool::new(false),
                fail_transient: AtomicBool::new(false),
            }
        }

        fn session(token: &str) -> ProviderSession {
            ProviderSession {
                access_token: token.to_string(),
                refresh_token: format!("{token}-refresh"),
                expires_in: 3600,
                user: ProviderUser {
                    id: "user-1".to_string(),
                    email: Some("u@example.com".to_string()),
                },
            }
        }
    }

    #[async_trait]
    impl IdentityProvider for FakeProvider {
        async fn sign_in(&self, _email: &str, _password: &str) -> IdentityResult<ProviderSession> {
            self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Self::session("signed-in"))
        }

        async fn refresh(&self, _refresh_token: &str) -> IdentityResult<ProviderSession> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            if self.reject_refresh.load(Ordering::SeqCst) {
                return Err(IdentityError::Rejected("refresh token revoked".into()));
            }
            if self.fail_transient.load(Ordering::SeqCst) {
                return Err(IdentityError::Timeout);
            }
            Ok(Self::session("refreshed"))
        }

        async fn sign_out(&self, _access_token: &str) -> IdentityResult<()> {
            Ok(())
        }

        async fn fetch_user(&self, _access_token: &str) -> IdentityResult<ProviderUser> {
            Ok(Self::session("user").user)
        }
    }

    struct FakeFetcher {
        calls: AtomicU32,
        delay: Duration,
        /// Access token treated as stale: fetches with it get 401.
        unauthorized_token: Option<String>,
    }

    impl FakeFetcher {
        fn new() -> Self {
            Self {
                calls: AtomicU32::new(0),
                delay: Duration::ZERO,
                unauthorized_token: None,
            }
        }

        fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl ProfileFetcher for FakeFetcher {
        async fn fetch(&self, user_id: &str, access_token: &str) -> ProfileResult<Profile> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.unauthorized_token.as_deref() == Some(access_token) {
                return Err(ProfileError::Unauthorized("stale token".to_string()));
            }
            Ok(Profile {
                user_id: user_id.to_string(),
                email: Some("u@example.com".to_string()),
                role: Role::Member,
                display_name: Some("Ada".to_string()),
                cached_at: Utc::now(),
            })
        }
    }

    struct Harness {
        coordinator: SessionCoordinator,
        provider: Arc<FakeProvider>,
        fetcher: Arc<FakeFetcher>,
        store: CredentialStore,
    }

    fn harness_with(
        provider: FakeProvider,
        fetcher: FakeFetcher,
        seed: Option<Credential>,
        budget: ResolutionBudget,
    ) -> Harness {
        let store = CredentialStore::new(Box::new(MemoryBackend::new()));
        if let Some(credential) = seed {
            store.write(&credential).unwrap();
            store
                .write_meta(&SessionMeta {
                    user_id: "user-1".to_string(),
                    email: Some("u@example.com".to_string()),
                })
                .unwrap();
        }
        let provider = Arc::new(provider);
        let fetcher = Arc::new(fetcher);
        let client = IdentityClient::with_config(
            provider.clone(),
            store.clone(),
            RefreshConfig {
                max_attempts: 2,
                base_delay: Duration::from_millis(1),
            },
        )
        .unwrap();
        let resolver =
            ProfileResolver::with_config(fetcher.clone(), ResolverConfig::default());
        let coordinator = SessionCoordinator::with_budget(client, resolver, budget);
        Harness {
            coordinator,
            provider,
            fetcher,
            store,
        }
    }

    fn fast_budget() -> ResolutionBudget {
        ResolutionBudget {
            profile_budget: Duration::from_millis(100),
            refresh_margin: Duration::from_secs(60),
        }
    }

    fn valid_credential() -> Credential {
        Credential::with_expiry_in("access-valid".into(), "refresh-valid".into(), 3600)
    }

    fn expired_credential() -> Credential {
        Credential::with_expiry_in("access-stale".into(), "refresh-stale".into(), -60)
    }

    #[tokio::test]
    async fn test_cold_start_with_valid_credential_uses_no_network() {
        let h = harness_with(
            FakeProvider::new(),
            FakeFetcher::new(),
            Some(valid_credential()),
            fast_budget(),
        );
        h.coordinator.start().await.unwrap();

        let state = h.coordinator.state();
        assert!(state.is_authenticated());
        assert_eq!(state.profile().unwrap().role, Role::Member);
        // Only the profile fetch touched the network.
        assert_eq!(h.provider.refresh_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.provider.sign_in_calls.load(Ordering::SeqCst), 0);
        h.coordinator.shutdown();
    }

    #[tokio::test]
    async fn test_cold_start_without_credential_is_unauthenticated() {
        let h = harness_with(FakeProvider::new(), FakeFetcher::new(), None, fast_budget());
        h.coordinator.start().await.unwrap();
        assert_eq!(h.coordinator.state(), CoordinatorState::Unauthenticated);
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 0);
        h.coordinator.shutdown();
    }

    #[tokio::test]
    async fn test_expired_credential_refreshes_once_then_authenticates() {
        let h = harness_with(
            FakeProvider::new(),
            FakeFetcher::new(),
            Some(expired_credential()),
            fast_budget(),
        );
        h.coordinator.start().await.unwrap();
        assert!(h.coordinator.state().is_authenticated());
        assert_eq!(h.provider.refresh_calls.load(Ordering::SeqCst), 1);
        h.coordinator.shutdown();
    }

    #[tokio::test]
    async fn test_expired_refresh_token_signs_out_and_clears_store() {
        let provider = FakeProvider::new();
        provider.reject_refresh.store(true, Ordering::SeqCst);
        let h = harness_with(
            provider,
            FakeFetcher::new(),
            Some(expired_credential()),
            fast_budget(),
        );
        h.coordinator.start().await.unwrap();

        assert_eq!(h.coordinator.state(), CoordinatorState::Unauthenticated);
        assert!(h.store.read().unwrap().is_none());
        h.coordinator.shutdown();
    }

    #[tokio::test]
    async fn test_fresh_login_scenario() {
        let h = harness_with(FakeProvider::new(), FakeFetcher::new(), None, fast_budget());
        h.coordinator.start().await.unwrap();
        assert_eq!(h.coordinator.state(), CoordinatorState::Unauthenticated);

        let mut rx = h.coordinator.subscribe();
        h.coordinator.sign_in("u@example.com", "pw").await.unwrap();

        let state = rx
            .wait_for(|state| state.is_authenticated())
            .await
            .unwrap()
            .clone();
        // The sign-in path runs full profile resolution, same as startup.
        assert_eq!(state.profile().unwrap().role, Role::Member);
        assert!(h.store.read().unwrap().is_some());
        h.coordinator.shutdown();
    }

    #[tokio::test]
    async fn test_sign_out_scenario() {
        let h = harness_with(
            FakeProvider::new(),
            FakeFetcher::new(),
            Some(valid_credential()),
            fast_budget(),
        );
        h.coordinator.start().await.unwrap();
        assert!(h.coordinator.state().is_authenticated());

        let mut rx = h.coordinator.subscribe();
        h.coordinator.sign_out().await.unwrap();
        rx.wait_for(|state| *state == CoordinatorState::Unauthenticated)
            .await
            .unwrap();
        assert!(h.store.read().unwrap().is_none());
        h.coordinator.shutdown();
    }

    #[tokio::test]
    async fn test_slow_profile_degrades_within_budget_then_refines() {
        let h = harness_with(
            FakeProvider::new(),
            FakeFetcher::with_delay(Duration::from_millis(300)),
            Some(valid_credential()),
            ResolutionBudget {
                profile_budget: Duration::from_millis(50),
                refresh_margin: Duration::from_secs(60),
            },
        );
        let mut rx = h.coordinator.subscribe();
        h.coordinator.start().await.unwrap();

        // Budget exhausted: authenticated with a minimal profile, never
        // stuck in Checking.
        let state = h.coordinator.state();
        assert!(state.is_authenticated());
        assert!(state.profile().unwrap().is_minimal());

        // The full profile arrives as a later update.
        let refined = rx
            .wait_for(|state| {
                state
                    .profile()
                    .map(|profile| !profile.is_minimal())
                    .unwrap_or(false)
            })
            .await
            .unwrap()
            .clone();
        assert_eq!(refined.profile().unwrap().role, Role::Member);
        h.coordinator.shutdown();
    }

    #[tokio::test]
    async fn test_stale_profile_result_discarded_after_sign_out() {
        let h = harness_with(
            FakeProvider::new(),
            FakeFetcher::with_delay(Duration::from_millis(200)),
            Some(valid_credential()),
            ResolutionBudget {
                profile_budget: Duration::from_millis(30),
                refresh_margin: Duration::from_secs(60),
            },
        );
        h.coordinator.start().await.unwrap();
        assert!(h.coordinator.state().is_authenticated());

        let mut rx = h.coordinator.subscribe();
        h.coordinator.sign_out().await.unwrap();
        rx.wait_for(|state| *state == CoordinatorState::Unauthenticated)
            .await
            .unwrap();

        // Let the in-flight profile fetch land; it must not resurrect the
        // authenticated state.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(h.coordinator.state(), CoordinatorState::Unauthenticated);
        h.coordinator.shutdown();
    }

    #[tokio::test]
    async fn test_token_refresh_does_not_republish_state() {
        let h = harness_with(
            FakeProvider::new(),
            FakeFetcher::new(),
            Some(valid_credential()),
            fast_budget(),
        );
        h.coordinator.start().await.unwrap();
        assert!(h.coordinator.state().is_authenticated());

        let mut rx = h.coordinator.subscribe();
        rx.borrow_and_update();

        // Rotate the credential through the client the coordinator owns.
        h.coordinator
            .inner
            .client
            .refresh_session()
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The profile did not change, so subscribers saw nothing.
        assert!(!rx.has_changed().unwrap());
        assert!(h.coordinator.state().is_authenticated());
        h.coordinator.shutdown();
    }

    #[tokio::test]
    async fn test_unauthorized_profile_triggers_reactive_refresh() {
        let fetcher = FakeFetcher {
            unauthorized_token: Some("access-valid".to_string()),
            ..FakeFetcher::new()
        };
        let h = harness_with(
            FakeProvider::new(),
            fetcher,
            Some(valid_credential()),
            fast_budget(),
        );
        h.coordinator.start().await.unwrap();

        let state = h.coordinator.state();
        assert!(state.is_authenticated());
        assert_eq!(state.profile().unwrap().role, Role::Member);
        // One reactive refresh, then the retry succeeded with the new token.
        assert_eq!(h.provider.refresh_calls.load(Ordering::SeqCst), 1);
        h.coordinator.shutdown();
    }

    #[tokio::test]
    async fn test_expired_credential_with_failing_refresh_signs_out() {
        let h = harness_with(
            FakeProvider::new(),
            FakeFetcher::new(),
            Some(valid_credential()),
            fast_budget(),
        );
        h.coordinator.start().await.unwrap();
        assert!(h.coordinator.state().is_authenticated());

        // The credential expires while the provider is unreachable.
        h.store.write(&expired_credential()).unwrap();
        h.provider.fail_transient.store(true, Ordering::SeqCst);

        let mut rx = h.coordinator.subscribe();
        let refreshed = h.coordinator.inner.client.refresh_session().await.unwrap();
        assert!(refreshed.is_none());

        rx.wait_for(|state| *state == CoordinatorState::Unauthenticated)
            .await
            .unwrap();
        // The credential is kept so a later restart can retry the refresh;
        // only the published state signs out.
        assert!(h.store.read().unwrap().is_some());
        h.coordinator.shutdown();
    }

    #[tokio::test]
    async fn test_transient_refresh_failure_keeps_state_while_credential_valid() {
        let h = harness_with(
            FakeProvider::new(),
            FakeFetcher::new(),
            Some(valid_credential()),
            fast_budget(),
        );
        h.coordinator.start().await.unwrap();
        assert!(h.coordinator.state().is_authenticated());

        h.provider.fail_transient.store(true, Ordering::SeqCst);
        let refreshed = h.coordinator.inner.client.refresh_session().await.unwrap();
        assert!(refreshed.is_none());

        // The credential is still unexpired, so last-known-good stands.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.coordinator.state().is_authenticated());
        h.coordinator.shutdown();
    }

    #[tokio::test]
    async fn test_stale_transition_after_sign_out_is_discarded() {
        let h = harness_with(
            FakeProvider::new(),
            FakeFetcher::new(),
            Some(valid_credential()),
            fast_budget(),
        );
        h.coordinator.start().await.unwrap();
        assert!(h.coordinator.state().is_authenticated());

        let mut rx = h.coordinator.subscribe();
        h.coordinator.sign_out().await.unwrap();
        rx.wait_for(|state| *state == CoordinatorState::Unauthenticated)
            .await
            .unwrap();

        // A profile result that raced the sign-out must neither advance the
        // machine nor publish the outdated state.
        let accepted = h.coordinator.inner.transition(
            &MachineInput::ProfileResolved,
            CoordinatorState::Authenticated {
                profile: Profile::minimal("user-1", None),
            },
        );
        assert!(!accepted);
        assert_eq!(h.coordinator.state(), CoordinatorState::Unauthenticated);
        h.coordinator.shutdown();
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let h = harness_with(FakeProvider::new(), FakeFetcher::new(), None, fast_budget());
        h.coordinator.start().await.unwrap();
        let second = h.coordinator.start().await;
        assert!(matches!(second, Err(CoordinatorError::AlreadyStarted)));
        h.coordinator.shutdown();
    }

    #[tokio::test]
    async fn test_snapshot_reflects_state() {
        let h = harness_with(
            FakeProvider::new(),
            FakeFetcher::new(),
            Some(valid_credential()),
            fast_budget(),
        );
        h.coordinator.start().await.unwrap();

        let snapshot = h.coordinator.snapshot();
        assert_eq!(snapshot.status, "authenticated");
        assert_eq!(snapshot.user_id.as_deref(), Some("user-1"));
        h.coordinator.shutdown();
    }
}
