//! Coordinator state machine using rust-fsm.
//!
//! The machine makes every legal transition explicit, so out-of-order or
//! stale events are rejected at the transition level instead of silently
//! corrupting state.
//!
//! ## State Diagram
//!
//! ```text
//! ┌────────────┐
//! │    Idle    │ (initial)
//! └─────┬──────┘
//!       │ Start
//!       ▼
//! ┌────────────┐  NoSession / SignedOut   ┌─────────────────┐
//! │  Checking  │ ───────────────────────► │ Unauthenticated │
//! └─────┬──────┘                          └────────┬────────┘
//!       │ ProfileResolved /                        │ SignedIn
//!       │ ProfileDegraded                          ▼
//!       ▼                                     (Checking)
//! ┌───────────────┐  SignedOut
//! │ Authenticated │ ───────────► Unauthenticated
//! └───────────────┘
//!   │ TokenRefreshed / ProfileResolved: self-loop
//!   │ SignedIn: back to Checking
//!
//! any state --Fatal--> Failed (terminal)
//! ```

use rust_fsm::*;

// Generates a module `coordinator_machine` with State, Input, and
// StateMachine types.
state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub coordinator_machine(Idle)

    Idle => {
        Start => Checking
    },
    Checking => {
        ProfileResolved => Authenticated,
        ProfileDegraded => Authenticated,
        NoSession => Unauthenticated,
        SignedOut => Unauthenticated,
        Fatal => Failed
    },
    Authenticated => {
        // Background profile refinement lands without leaving the state
        ProfileResolved => Authenticated,
        // A refresh rotates the credential but changes nothing visible
        TokenRefreshed => Authenticated,
        SignedIn => Checking,
        SignedOut => Unauthenticated,
        Fatal => Failed
    },
    Unauthenticated => {
        SignedIn => Checking,
        // Repeated sign-out is a no-op, not an error
        SignedOut => Unauthenticated,
        Fatal => Failed
    }
}

pub use coordinator_machine::Input as MachineInput;
pub use coordinator_machine::State as MachineState;
pub use coordinator_machine::StateMachine as CoordinatorMachine;
