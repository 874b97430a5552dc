//! Session tracking for the identity engine.
//!
//! The `SessionTracker` owns the caller-visible state machine and routes
//! every proof of identity (password sign-ins, resumed redirect callbacks,
//! authority session-change notifications) through the reconciliation
//! engine. State changes reach the embedder through an injected callback;
//! nothing here installs process-global listeners.

use crate::authority::{AuthoritySession, CredentialAuthority, RestCredentialAuthority};
use crate::oauth::OAuthFlow;
use crate::provider::{Provider, ProviderIdentity, ProviderRegistry};
use crate::reconcile::{Reconciled, Reconciler};
use crate::redirect::RedirectRouter;
use crate::session_fsm::{
    SessionChangedPayload, SessionEvent, SessionMachine, SessionMachineInput, SessionState,
};
use crate::{AuthError, AuthResult};
use roost_core::Config;
use roost_directory::{Profile, ProfileDirectory, RestProfileDirectory};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use url::Url;

/// Callback type for session event notifications.
pub type SessionCallback = Box<dyn Fn(SessionEvent) + Send + Sync>;

/// Tracks the caller-visible authentication state.
///
/// The FSM tracks transient states (reconciling, signing out) while the
/// authenticated profile and session live beside it.
pub struct SessionTracker {
    authority: Arc<dyn CredentialAuthority>,
    reconciler: Reconciler,
    oauth: OAuthFlow,
    fsm: Mutex<SessionMachine>,
    profile: Mutex<Option<Profile>>,
    session: Mutex<Option<AuthoritySession>>,
    callback: Mutex<Option<SessionCallback>>,
}

impl SessionTracker {
    /// Create a tracker over the external seams.
    pub fn new(
        authority: Arc<dyn CredentialAuthority>,
        directory: Arc<dyn ProfileDirectory>,
        oauth: OAuthFlow,
        legacy_bridge_sign_in: bool,
    ) -> Self {
        Self {
            reconciler: Reconciler::new(authority.clone(), directory, legacy_bridge_sign_in),
            authority,
            oauth,
            fsm: Mutex::new(SessionMachine::new()),
            profile: Mutex::new(None),
            session: Mutex::new(None),
            callback: Mutex::new(None),
        }
    }

    /// Wire a tracker over the REST seams described by the configuration.
    pub fn from_config(config: &Config) -> Self {
        let authority = Arc::new(RestCredentialAuthority::new(
            config.authority_url.clone(),
            config.authority_publishable_key.clone(),
        ));
        let directory = Arc::new(RestProfileDirectory::new(
            config.authority_url.clone(),
            config.authority_publishable_key.clone(),
        ));
        let registry = ProviderRegistry::from_config(config);
        Self::new(
            authority,
            directory,
            OAuthFlow::new(registry),
            config.legacy_bridge_sign_in,
        )
    }

    /// Set the callback notified of session events.
    pub fn set_callback(&self, callback: SessionCallback) {
        let mut slot = self.callback.lock().unwrap();
        *slot = Some(callback);
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        let fsm = self.fsm.lock().unwrap();
        SessionState::from(fsm.state())
    }

    /// The authenticated profile, if any.
    pub fn current_profile(&self) -> Option<Profile> {
        self.profile.lock().unwrap().clone()
    }

    /// Resolve the startup state: check the authority's current session and
    /// reconcile it. Always lands in `Authenticated` or `Unauthenticated`.
    pub async fn bootstrap(&self) -> AuthResult<SessionState> {
        match self.authority.current_session().await {
            Ok(Some(session)) => {
                self.transition(&SessionMachineInput::ReconcileStarted)?;
                match self.reconciler.reconcile_session(session).await {
                    Ok(outcome) => {
                        self.adopt(&outcome);
                        self.transition(&SessionMachineInput::ReconcileSucceeded)
                    }
                    Err(e) => {
                        warn!(error = %e, kind = e.kind(), "Startup reconciliation failed");
                        self.clear();
                        self.transition(&SessionMachineInput::ReconcileFailed)
                    }
                }
            }
            Ok(None) => {
                info!("No existing session found on startup");
                self.transition(&SessionMachineInput::NoSession)
            }
            Err(e) => {
                warn!(error = %e, "Current-session check failed on startup");
                self.transition(&SessionMachineInput::NoSession)
            }
        }
    }

    /// Direct credential sign-in.
    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<Profile> {
        self.transition(&SessionMachineInput::ReconcileStarted)?;
        match self.reconciler.sign_in_with_password(email, password).await {
            Ok(outcome) => {
                self.adopt(&outcome);
                self.transition(&SessionMachineInput::ReconcileSucceeded)?;
                Ok(outcome.profile)
            }
            Err(e) => {
                let _ = self.transition(&SessionMachineInput::ReconcileFailed);
                Err(e)
            }
        }
    }

    /// Begin a federated sign-in: returns the authorization URL the embedder
    /// opens in the system browser.
    pub fn begin_federated_sign_in(&self, provider: Provider) -> AuthResult<Url> {
        self.oauth.begin_authorization(provider, None)
    }

    /// Route an inbound redirect callback to the pending attempt.
    pub fn handle_redirect(&self, url: &str) -> AuthResult<()> {
        self.oauth.resume(url)
    }

    /// Abort the pending federated attempt, discarding its PKCE context.
    pub fn cancel_federated_sign_in(&self) {
        self.oauth.cancel();
    }

    /// Wait for the redirect callback, then reconcile the fetched identity.
    pub async fn complete_federated_sign_in(&self) -> AuthResult<Profile> {
        let identity = self.oauth.await_identity().await?;
        self.sign_in_federated(&identity).await
    }

    /// Reconcile a federated identity the embedder obtained itself.
    pub async fn sign_in_federated(&self, identity: &ProviderIdentity) -> AuthResult<Profile> {
        self.transition(&SessionMachineInput::ReconcileStarted)?;
        match self.reconciler.sign_in_federated(identity).await {
            Ok(outcome) => {
                self.adopt(&outcome);
                self.transition(&SessionMachineInput::ReconcileSucceeded)?;
                self.emit(SessionEvent::FederatedSignInComplete {
                    provider: identity.provider,
                });
                Ok(outcome.profile)
            }
            Err(e) => {
                let _ = self.transition(&SessionMachineInput::ReconcileFailed);
                Err(e)
            }
        }
    }

    /// Inbound session-change notification from the authority.
    pub async fn handle_session_change(
        &self,
        session: Option<AuthoritySession>,
    ) -> AuthResult<SessionState> {
        match session {
            None => {
                self.clear();
                match self.state() {
                    SessionState::Authenticated => {
                        info!("Authority session revoked");
                        self.transition(&SessionMachineInput::SessionRevoked)
                    }
                    SessionState::Initializing => {
                        self.transition(&SessionMachineInput::NoSession)
                    }
                    state => Ok(state),
                }
            }
            Some(session) => {
                self.transition(&SessionMachineInput::ReconcileStarted)?;
                match self.reconciler.reconcile_session(session).await {
                    Ok(outcome) => {
                        self.adopt(&outcome);
                        self.transition(&SessionMachineInput::ReconcileSucceeded)
                    }
                    Err(e) => {
                        warn!(error = %e, kind = e.kind(), "Session-change reconciliation failed");
                        self.clear();
                        self.transition(&SessionMachineInput::ReconcileFailed)
                    }
                }
            }
        }
    }

    /// Sign out: mark the profile offline (best-effort), ask the authority
    /// to invalidate the session, and transition to `Unauthenticated`
    /// regardless of either side effect.
    pub async fn sign_out(&self) -> AuthResult<()> {
        let profile = self.profile.lock().unwrap().clone();
        let session = self.session.lock().unwrap().clone();

        let _ = self.transition(&SessionMachineInput::SignOutRequested);

        if let Some(profile) = &profile {
            self.reconciler.mark_offline(&profile.id).await;
        }

        if let Some(session) = &session {
            if let Err(e) = self.authority.sign_out(session).await {
                warn!(error = %e, "Authority sign-out failed; clearing local session anyway");
            }
        }

        self.clear();
        let _ = self.transition(&SessionMachineInput::SignOutComplete);
        info!("Signed out");
        Ok(())
    }

    /// Install this tracker as the redirect router's handler. The handler
    /// holds a weak reference, so routing dies with the tracker.
    pub fn install_redirect_handler(self: &Arc<Self>, router: &RedirectRouter) {
        let tracker = Arc::downgrade(self);
        router.install(Box::new(move |url| match tracker.upgrade() {
            Some(tracker) => tracker.handle_redirect(url),
            None => Err(AuthError::Config(
                "Session tracker no longer alive".to_string(),
            )),
        }));
    }

    fn adopt(&self, outcome: &Reconciled) {
        *self.profile.lock().unwrap() = Some(outcome.profile.clone());
        *self.session.lock().unwrap() = Some(outcome.session.clone());
    }

    fn clear(&self) {
        *self.profile.lock().unwrap() = None;
        *self.session.lock().unwrap() = None;
    }

    /// Transition the FSM and notify the callback if the state changed.
    fn transition(&self, input: &SessionMachineInput) -> AuthResult<SessionState> {
        let mut fsm = self.fsm.lock().unwrap();
        let old_state = SessionState::from(fsm.state());

        fsm.consume(input).map_err(|_| {
            AuthError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                fsm.state()
            ))
        })?;

        let new_state = SessionState::from(fsm.state());
        drop(fsm);

        if old_state != new_state {
            debug!(
                old_state = ?old_state,
                new_state = ?new_state,
                "Session state transition"
            );
            self.notify_state_change(&new_state);
        }

        Ok(new_state)
    }

    fn notify_state_change(&self, state: &SessionState) {
        let (user_id, email) = self
            .profile
            .lock()
            .unwrap()
            .as_ref()
            .map(|p| (Some(p.id.clone()), Some(p.email.clone())))
            .unwrap_or((None, None));

        self.emit(SessionEvent::StateChanged(SessionChangedPayload {
            state: state.clone(),
            user_id,
            email,
        }));
    }

    fn emit(&self, event: SessionEvent) {
        let slot = self.callback.lock().unwrap();
        if let Some(callback) = slot.as_ref() {
            callback(event);
        }
    }
}
