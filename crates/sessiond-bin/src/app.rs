//! Wiring: build the coordinator stack and drive it from CLI commands.

use std::sync::Arc;

use credential_store::{CredentialStore, FileStorage};
use identity_client::{IdentityClient, RestIdentityProvider};
use profile_resolver::{ProfileResolver, RestProfileFetcher};
use restoration_gate::{LastProjectStore, RestorationGate};
use session_coordinator::{AuthSnapshot, SessionCoordinator};
use sessiond_core::{Config, Paths};
use tracing::{info, warn};

type AppResult<T> = Result<T, Box<dyn std::error::Error>>;

fn open_store(paths: &Paths) -> AppResult<CredentialStore> {
    paths.ensure_dirs()?;
    let backend = FileStorage::open(paths.storage_file())?;
    let store = CredentialStore::new(Box::new(backend));
    // One-time removal of keys left behind by earlier layouts. Scoped to a
    // fixed allow-list; never touches the live credential.
    store.run_legacy_cleanup()?;
    Ok(store)
}

fn build_client(config: &Config, store: CredentialStore) -> AppResult<IdentityClient> {
    config.validate()?;
    let provider = Arc::new(RestIdentityProvider::new(
        &config.provider_url,
        &config.provider_publishable_key,
    ));
    Ok(IdentityClient::new(provider, store)?)
}

fn build_coordinator(config: &Config, paths: &Paths) -> AppResult<SessionCoordinator> {
    let store = open_store(paths)?;
    let client = build_client(config, store)?;
    let fetcher = Arc::new(RestProfileFetcher::new(
        &config.provider_url,
        &config.provider_publishable_key,
    ));
    let resolver = ProfileResolver::new(fetcher);
    Ok(SessionCoordinator::new(client, resolver))
}

/// Run the coordinator until interrupted.
pub async fn run(config: Config, paths: Paths) -> AppResult<()> {
    let coordinator = build_coordinator(&config, &paths)?;
    coordinator.start().await?;

    // Resume the last-viewed project once authentication settles.
    let gate = RestorationGate::new(coordinator.budget());
    let last_project = LastProjectStore::open(paths.last_project_file())?;
    let mut states = coordinator.subscribe();
    match gate.restore_last_project(&mut states, &last_project).await {
        Ok(Some(project_id)) => info!(project_id = %project_id, "Restored last project"),
        Ok(None) => info!("No project to restore"),
        Err(err) => warn!(error = %err, "Project restoration skipped"),
    }

    info!("sessiond running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    coordinator.shutdown();
    Ok(())
}

/// Print session status from local storage only.
pub fn status(config: Config, paths: Paths) -> AppResult<()> {
    let store = open_store(&paths)?;
    let client = build_client(&config, store)?;
    let output = match client.get_session() {
        Some(session) => serde_json::json!({
            "authenticated": true,
            "user_id": session.user_id(),
            "email": session.identity.email,
            "expires_at": session.credential.expires_at.to_rfc3339(),
            "expired": session.credential.is_expired(),
        }),
        None => serde_json::json!({ "authenticated": false }),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Sign in and print the settled status.
pub async fn login(config: Config, paths: Paths, email: &str, password: &str) -> AppResult<()> {
    let coordinator = build_coordinator(&config, &paths)?;
    coordinator.start().await?;

    let mut states = coordinator.subscribe();
    states.borrow_and_update();
    coordinator.sign_in(email, password).await?;

    // Sign-in succeeded, so the coordinator will settle on Authenticated;
    // give it the same window a downstream gate would.
    let wait = states.wait_for(|state| state.is_authenticated());
    match tokio::time::timeout(coordinator.budget().gate_timeout(), wait).await {
        Ok(_) => {}
        Err(_) => warn!("Coordinator did not settle in time, printing current state"),
    }
    let snapshot = AuthSnapshot::from(&coordinator.state());
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    coordinator.shutdown();
    Ok(())
}

/// Sign out and clear the stored credential.
pub async fn logout(config: Config, paths: Paths) -> AppResult<()> {
    let store = open_store(&paths)?;
    let client = build_client(&config, store)?;
    client.sign_out().await?;
    println!("Signed out");
    Ok(())
}
