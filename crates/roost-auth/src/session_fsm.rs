//! Caller-visible session state machine.
//!
//! ## State Diagram
//!
//! ```text
//! ┌──────────────┐ NoSession            ┌─────────────────┐
//! │ Initializing │ ───────────────────► │ Unauthenticated │
//! └──────┬───────┘                      └───────┬─────────┘
//!        │ ReconcileStarted                     │ ReconcileStarted
//!        ▼                                      ▼
//! ┌──────────────┐  ReconcileFailed   ┌─────────────┐
//! │  Reconciling │ ─────────────────► │ (back to    │
//! └──────┬───────┘                    │  Unauth.)   │
//!        │ ReconcileSucceeded         └─────────────┘
//!        ▼
//! ┌──────────────┐ SessionRevoked ──► Unauthenticated
//! │ Authenticated│ ReconcileStarted ► Reconciling
//! └──────┬───────┘
//!        │ SignOutRequested
//!        ▼
//! ┌──────────────┐ SignOutComplete
//! │  SigningOut  │ ───────────────► Unauthenticated
//! └──────────────┘
//! ```
//!
//! Every reconcile outcome leaves the machine in `Authenticated` or
//! `Unauthenticated`; nothing strands it in `Initializing`.

use crate::provider::Provider;
use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(Initializing)

    Initializing => {
        ReconcileStarted => Reconciling,
        NoSession => Unauthenticated
    },
    Unauthenticated => {
        ReconcileStarted => Reconciling
    },
    Reconciling => {
        ReconcileSucceeded => Authenticated,
        ReconcileFailed => Unauthenticated
    },
    Authenticated => {
        ReconcileStarted => Reconciling,
        SessionRevoked => Unauthenticated,
        SignOutRequested => SigningOut
    },
    SigningOut => {
        SignOutComplete => Unauthenticated
    }
}

// Re-export the generated types with clearer names
pub use session_machine::Input as SessionMachineInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionMachine;

/// Caller-visible authentication state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Process start, pending the authority's current-session check.
    Initializing,
    /// A reconciliation is in flight.
    Reconciling,
    /// Signed in with a canonical profile.
    Authenticated,
    /// No active session.
    Unauthenticated,
    /// Sign-out side effects in flight.
    SigningOut,
}

impl SessionState {
    /// Returns true when a valid session and profile are established.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated)
    }

    /// Returns true for transient in-progress states.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SessionState::Initializing | SessionState::Reconciling | SessionState::SigningOut
        )
    }
}

impl From<&SessionMachineState> for SessionState {
    fn from(state: &SessionMachineState) -> Self {
        match state {
            SessionMachineState::Initializing => SessionState::Initializing,
            SessionMachineState::Reconciling => SessionState::Reconciling,
            SessionMachineState::Authenticated => SessionState::Authenticated,
            SessionMachineState::Unauthenticated => SessionState::Unauthenticated,
            SessionMachineState::SigningOut => SessionState::SigningOut,
        }
    }
}

/// Payload delivered with every state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionChangedPayload {
    /// Current session state.
    pub state: SessionState,
    /// Profile identifier when authenticated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Account email when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Events surfaced to the embedder through the injected callback.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The session state changed.
    StateChanged(SessionChangedPayload),
    /// A federated sign-in finished; the UI should run its post-sign-in
    /// redirect to the provider-agnostic landing view.
    FederatedSignInComplete { provider: Provider },
}
