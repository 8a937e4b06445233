//! Downstream consumer gate for the session coordinator.
//!
//! Subsystems that need the authenticated user before doing their own work
//! (here: restoring the last-viewed project) must wait for the coordinator
//! to settle, with a timeout derived from the coordinator's own budget.
//! They never act while the coordinator is still `Checking`.

mod gate;
mod last_project;

pub use gate::{GateError, GateResult, RestorationGate};
pub use last_project::{LastProjectError, LastProjectStore};
