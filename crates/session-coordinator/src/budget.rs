//! Coordinated timeout budget.
//!
//! Every time bound in the system derives from this one struct. Downstream
//! gates must call [`ResolutionBudget::gate_timeout`] instead of choosing
//! their own constant, so a gate can never give up before the coordinator
//! has had its full budget to settle.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ResolutionBudget {
    /// Maximum time a state transition waits for profile resolution before
    /// degrading to a minimal profile.
    pub profile_budget: Duration,
    /// How far ahead of credential expiry the proactive refresh fires.
    pub refresh_margin: Duration,
}

impl Default for ResolutionBudget {
    fn default() -> Self {
        Self {
            profile_budget: Duration::from_millis(1500),
            refresh_margin: Duration::from_secs(60),
        }
    }
}

impl ResolutionBudget {
    /// Timeout for downstream consumers waiting on a settled state.
    ///
    /// Strictly longer than any single transition can take: the worst case
    /// is one budgeted profile attempt, a reactive refresh, and a second
    /// budgeted attempt.
    pub fn gate_timeout(&self) -> Duration {
        self.profile_budget * 2 + Duration::from_millis(500)
    }
}
