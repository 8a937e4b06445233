//! Waiting for a settled coordinator state.

use crate::LastProjectStore;
use session_coordinator::{CoordinatorState, ResolutionBudget};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum GateError {
    /// The coordinator did not settle within the gate timeout
    #[error("Coordinator did not settle within {waited_ms}ms")]
    Timeout { waited_ms: u64 },

    /// The coordinator went away while we were waiting
    #[error("Coordinator channel closed")]
    ChannelClosed,
}

pub type GateResult<T> = Result<T, GateError>;

/// Gate that blocks downstream work until authentication settles.
///
/// The timeout always comes from [`ResolutionBudget::gate_timeout`], which
/// is strictly longer than any single coordinator transition. Choosing an
/// independent constant here reintroduces the two-timeouts race this type
/// exists to prevent.
#[derive(Debug, Clone)]
pub struct RestorationGate {
    timeout: Duration,
}

impl RestorationGate {
    pub fn new(budget: &ResolutionBudget) -> Self {
        Self {
            timeout: budget.gate_timeout(),
        }
    }

    /// Wait until the coordinator reaches a settled state and return it.
    ///
    /// Returns immediately when the current state is already settled.
    pub async fn wait_settled(
        &self,
        states: &mut watch::Receiver<CoordinatorState>,
    ) -> GateResult<CoordinatorState> {
        let wait = states.wait_for(|state| state.is_settled());
        match tokio::time::timeout(self.timeout, wait).await {
            Ok(Ok(state)) => Ok(state.clone()),
            Ok(Err(_)) => Err(GateError::ChannelClosed),
            Err(_) => {
                warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Gave up waiting for coordinator to settle"
                );
                Err(GateError::Timeout {
                    waited_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Restore the last-viewed project for the settled user, if any.
    ///
    /// Waits for settlement first; acts only on `Authenticated`. An
    /// unauthenticated or errored outcome restores nothing.
    pub async fn restore_last_project(
        &self,
        states: &mut watch::Receiver<CoordinatorState>,
        store: &LastProjectStore,
    ) -> GateResult<Option<String>> {
        let state = self.wait_settled(states).await?;
        let Some(profile) = state.profile() else {
            debug!("Not authenticated, nothing to restore");
            return Ok(None);
        };
        let project = store.load(&profile.user_id);
        if let Some(project_id) = &project {
            info!(user_id = %profile.user_id, project_id = %project_id, "Restoring last project");
        }
        Ok(project)
    }
}
