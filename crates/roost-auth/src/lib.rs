//! Identity unification and session establishment for Roost.
//!
//! This crate provides:
//! - PKCE material generation for the federated authorization flow
//! - The browser-redirect OAuth2 client with a per-attempt state machine
//! - The credential authority seam and its REST implementation
//! - The credential bridge mapping federated identities onto the
//!   password-only authority
//! - Handle allocation for new profiles
//! - The identity reconciliation engine
//! - Explicit FSM-based session state tracking

mod authority;
mod bridge;
mod error;
mod handle;
mod oauth;
mod pkce;
mod provider;
mod reconcile;
mod redirect;
mod session;
mod session_fsm;

#[cfg(test)]
mod testutil;

pub use authority::{
    AuthoritySession, CredentialAuthority, RegistrationMetadata, RestCredentialAuthority,
};
pub use bridge::{bridge_secret, CredentialBridge};
pub use error::{AuthError, AuthResult};
pub use handle::{normalize, timestamped, HandleAllocator, MAX_SUFFIX_ATTEMPTS};
pub use oauth::attempt_machine;
pub use oauth::{
    AttemptInput, AttemptMachine, AttemptState, OAuthFlow, DEFAULT_CALLBACK_TIMEOUT_SECS,
};
pub use pkce::{challenge_for, PkceContext};
pub use provider::{
    Provider, ProviderCredentials, ProviderIdentity, ProviderRegistry, REDIRECT_SCHEME,
};
pub use reconcile::{Reconciled, Reconciler};
pub use redirect::{RedirectHandler, RedirectRouter};
pub use session::{SessionCallback, SessionTracker};
pub use session_fsm::session_machine;
pub use session_fsm::{
    SessionChangedPayload, SessionEvent, SessionMachine, SessionMachineInput, SessionMachineState,
    SessionState,
};
