//! Process-wide authentication state coordination.
//!
//! One [`SessionCoordinator`] per application owns the answer to "is the
//! user authenticated, and as whom". It is driven by an explicit finite
//! state machine, publishes a single reactive [`CoordinatorState`], and
//! owns all timeout and ordering policy so dependent subsystems cannot
//! race each other.

mod budget;
mod coordinator;
mod error;
mod machine;
mod state;

pub use budget::ResolutionBudget;
pub use coordinator::SessionCoordinator;
pub use error::{CoordinatorError, CoordinatorResult};
pub use machine::{CoordinatorMachine, MachineInput, MachineState};
pub use state::{AuthSnapshot, CoordinatorState};
