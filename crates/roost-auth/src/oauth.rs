//! Browser-redirect authorization flow (OAuth2 authorization code + PKCE).
//!
//! One attempt at a time: beginning a new authorization replaces any pending
//! attempt, and each attempt's PKCE context is single-use. The redirect
//! callback is routed in through [`OAuthFlow::resume`]; the caller awaits the
//! outcome with [`OAuthFlow::await_identity`].
//!
//! ## Attempt state diagram
//!
//! ```text
//! Idle → AuthorizationRequested → CallbackAwaited
//!   CallbackAwaited → CodeReceived → TokenExchanged → UserFetched → Done
//!   CallbackAwaited → Cancelled | Dismissed | Errored
//! ```

use crate::pkce::PkceContext;
use crate::provider::{
    parse_identity, Provider, ProviderCredentials, ProviderIdentity, ProviderRegistry,
    REDIRECT_SCHEME,
};
use crate::{AuthError, AuthResult};
use rust_fsm::*;
use serde::Deserialize;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use url::Url;

/// Default bounded wait for the redirect callback, in seconds.
pub const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 120;

// Per-attempt machine. The callback-awaiting branch resolves to exactly one
// of the terminal-ish outcomes; only a received code continues toward Done.
state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub attempt_machine(Idle)

    Idle => {
        Begin => AuthorizationRequested
    },
    AuthorizationRequested => {
        BrowserOpened => CallbackAwaited,
        Abort => Cancelled
    },
    CallbackAwaited => {
        CodeDelivered => CodeReceived,
        Denied => Errored,
        NoCode => Errored,
        TimedOut => Errored,
        Abort => Cancelled,
        Dismiss => Dismissed
    },
    CodeReceived => {
        Exchanged => TokenExchanged,
        ExchangeFailed => Errored
    },
    TokenExchanged => {
        IdentityFetched => UserFetched,
        FetchFailed => Errored
    },
    UserFetched => {
        Complete => Done
    }
}

pub use attempt_machine::Input as AttemptInput;
pub use attempt_machine::State as AttemptState;
pub use attempt_machine::StateMachine as AttemptMachine;

struct PendingAttempt {
    provider: Provider,
    context: PkceContext,
    machine: AttemptMachine,
    tx: oneshot::Sender<AuthResult<ResumedAttempt>>,
}

struct ResumedAttempt {
    provider: Provider,
    context: PkceContext,
    machine: AttemptMachine,
    code: String,
}

/// Drives the redirect exchange against any configured provider.
pub struct OAuthFlow {
    http_client: reqwest::Client,
    registry: ProviderRegistry,
    pending: Mutex<Option<PendingAttempt>>,
    waiter: Mutex<Option<oneshot::Receiver<AuthResult<ResumedAttempt>>>>,
    consumed_state: Mutex<Option<String>>,
    callback_timeout: Duration,
}

impl OAuthFlow {
    /// Create a flow with the default callback timeout.
    pub fn new(registry: ProviderRegistry) -> Self {
        Self::with_timeout(registry, Duration::from_secs(DEFAULT_CALLBACK_TIMEOUT_SECS))
    }

    /// Create a flow with a custom callback timeout.
    pub fn with_timeout(registry: ProviderRegistry, callback_timeout: Duration) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            registry,
            pending: Mutex::new(None),
            waiter: Mutex::new(None),
            consumed_state: Mutex::new(None),
            callback_timeout,
        }
    }

    /// Build the provider's authorization URL and arm a new attempt.
    ///
    /// Returns the URL the caller opens in the system browser. Any previous
    /// pending attempt is replaced and its waiter woken with a cancellation.
    pub fn begin_authorization(
        &self,
        provider: Provider,
        scopes: Option<&[&str]>,
    ) -> AuthResult<Url> {
        let credentials = self.registry.credentials(provider)?;
        let context = PkceContext::generate();

        let scope = match scopes {
            Some(scopes) => scopes.join(" "),
            None => provider.default_scopes().join(" "),
        };

        let mut url = Url::parse(provider.authorize_endpoint())?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &credentials.client_id)
            .append_pair("redirect_uri", &provider.redirect_uri())
            .append_pair("scope", &scope)
            .append_pair("state", &context.state)
            .append_pair("code_challenge", &context.challenge)
            .append_pair("code_challenge_method", "S256");

        let mut machine = AttemptMachine::new();
        let _ = machine.consume(&AttemptInput::Begin);
        let _ = machine.consume(&AttemptInput::BrowserOpened);

        let (tx, rx) = oneshot::channel();
        let attempt = PendingAttempt {
            provider,
            context,
            machine,
            tx,
        };

        if let Some(previous) = self.pending.lock().unwrap().replace(attempt) {
            // Dropping the previous sender wakes its waiter with a cancellation.
            warn!(
                provider = %previous.provider,
                "Replacing pending authorization attempt"
            );
        }
        *self.waiter.lock().unwrap() = Some(rx);

        info!(provider = %provider, "Authorization requested");
        Ok(url)
    }

    /// Route an inbound redirect callback to the pending attempt.
    ///
    /// `Ok(())` means the callback was accepted and its outcome (including a
    /// provider-reported denial or a missing code) was delivered to the
    /// awaiting caller. Errors are refusals that leave any pending attempt
    /// untouched: a URL outside the registered pattern, a state mismatch, or
    /// a replay of a consumed attempt.
    pub fn resume(&self, redirect_url: &str) -> AuthResult<()> {
        let url = Url::parse(redirect_url)?;
        if url.scheme() != REDIRECT_SCHEME || url.host_str() != Some("auth") {
            warn!(url = %redirect_url, "Redirect URL does not match the registered pattern");
            return Err(AuthError::Config(
                "Redirect URL does not match the registered pattern".to_string(),
            ));
        }

        let mut code = None;
        let mut state = None;
        let mut error = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                _ => {}
            }
        }

        let mut pending = self.pending.lock().unwrap();

        let Some(current) = pending.as_ref() else {
            drop(pending);
            let replayed = state.is_some() && *self.consumed_state.lock().unwrap() == state;
            if replayed {
                warn!("Redirect callback replayed for a consumed attempt; refusing");
                return Err(AuthError::ReplayedCallback);
            }
            warn!("Redirect callback received with no attempt in flight; refusing");
            return Err(AuthError::StateMismatch);
        };

        let state_matches = state.as_deref() == Some(current.context.state.as_str());

        // CSRF defense: a mismatched state never consumes the attempt.
        if !state_matches && (error.is_none() || state.is_some()) {
            warn!("Redirect callback state does not match the pending attempt; refusing");
            return Err(AuthError::StateMismatch);
        }

        let PendingAttempt {
            provider,
            context,
            mut machine,
            tx,
        } = pending.take().unwrap();
        drop(pending);

        *self.consumed_state.lock().unwrap() = Some(context.state.clone());

        if let Some(reason) = error {
            let _ = machine.consume(&AttemptInput::Denied);
            warn!(provider = %provider, reason = %reason, "Authorization denied by provider");
            let _ = tx.send(Err(AuthError::AuthorizationDenied(reason)));
            return Ok(());
        }

        let Some(code) = code else {
            let _ = machine.consume(&AttemptInput::NoCode);
            warn!(provider = %provider, "Redirect callback carried no authorization code");
            let _ = tx.send(Err(AuthError::MissingCode));
            return Ok(());
        };

        let _ = machine.consume(&AttemptInput::CodeDelivered);
        debug!(provider = %provider, "Authorization code received");
        let _ = tx.send(Ok(ResumedAttempt {
            provider,
            context,
            machine,
            code,
        }));
        Ok(())
    }

    /// Wait (bounded) for the redirect callback, then exchange the code and
    /// fetch the provider identity.
    pub async fn await_identity(&self) -> AuthResult<ProviderIdentity> {
        let rx = self
            .waiter
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| AuthError::Config("No authorization attempt in flight".to_string()))?;

        let resumed = match tokio::time::timeout(self.callback_timeout, rx).await {
            Err(_elapsed) => {
                if let Some(mut attempt) = self.pending.lock().unwrap().take() {
                    let _ = attempt.machine.consume(&AttemptInput::TimedOut);
                    *self.consumed_state.lock().unwrap() = Some(attempt.context.state.clone());
                }
                warn!("Authorization attempt timed out waiting for the redirect callback");
                return Err(AuthError::AuthorizationTimeout);
            }
            Ok(Err(_closed)) => {
                info!("Authorization attempt cancelled before completion");
                return Err(AuthError::AuthorizationDenied(
                    "authorization attempt cancelled".to_string(),
                ));
            }
            Ok(Ok(Err(outcome))) => return Err(outcome),
            Ok(Ok(Ok(resumed))) => resumed,
        };

        let ResumedAttempt {
            provider,
            context,
            mut machine,
            code,
        } = resumed;

        let credentials = self.registry.credentials(provider)?;

        let access_token = match self
            .exchange_code(provider, credentials, &code, &context.verifier)
            .await
        {
            Ok(token) => {
                let _ = machine.consume(&AttemptInput::Exchanged);
                token
            }
            Err(e) => {
                let _ = machine.consume(&AttemptInput::ExchangeFailed);
                return Err(e);
            }
        };

        let identity = match self.fetch_identity(provider, &access_token).await {
            Ok(identity) => {
                let _ = machine.consume(&AttemptInput::IdentityFetched);
                identity
            }
            Err(e) => {
                let _ = machine.consume(&AttemptInput::FetchFailed);
                return Err(e);
            }
        };

        let _ = machine.consume(&AttemptInput::Complete);
        info!(provider = %provider, "Federated identity fetched");
        Ok(identity)
    }

    /// Abort the pending attempt and discard its PKCE context, so a late or
    /// spoofed callback cannot be replayed.
    pub fn cancel(&self) {
        self.discard(AttemptInput::Abort, "Authorization attempt cancelled");
    }

    /// Like [`cancel`](Self::cancel), for when the user dismissed the browser
    /// flow rather than aborting it in the app.
    pub fn dismiss(&self) {
        self.discard(AttemptInput::Dismiss, "Authorization attempt dismissed");
    }

    fn discard(&self, input: AttemptInput, message: &str) {
        if let Some(mut attempt) = self.pending.lock().unwrap().take() {
            let _ = attempt.machine.consume(&input);
            *self.consumed_state.lock().unwrap() = Some(attempt.context.state.clone());
            info!(provider = %attempt.provider, "{}", message);
        }
    }

    /// Whether an attempt is currently awaiting its callback.
    pub fn has_pending_attempt(&self) -> bool {
        self.pending.lock().unwrap().is_some()
    }

    /// POST the code + verifier to the provider's token endpoint.
    async fn exchange_code(
        &self,
        provider: Provider,
        credentials: &ProviderCredentials,
        code: &str,
        verifier: &str,
    ) -> AuthResult<String> {
        let mut form = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("redirect_uri", provider.redirect_uri()),
            ("client_id", credentials.client_id.clone()),
            ("code_verifier", verifier.to_string()),
        ];
        if let Some(secret) = &credentials.client_secret {
            form.push(("client_secret", secret.clone()));
        }

        debug!(provider = %provider, "Exchanging authorization code");

        let response = self
            .http_client
            .post(provider.token_endpoint())
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(provider = %provider, status = %status, "Token exchange failed");
            return Err(AuthError::TokenExchangeFailed(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
        }

        let data: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::TokenExchangeFailed(format!("invalid token response: {e}")))?;

        Ok(data.access_token)
    }

    /// GET the provider's profile endpoint with the bearer token.
    async fn fetch_identity(
        &self,
        provider: Provider,
        access_token: &str,
    ) -> AuthResult<ProviderIdentity> {
        debug!(provider = %provider, "Fetching provider identity");

        let response = self
            .http_client
            .get(provider.identity_endpoint())
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Accept", "application/json")
            .header("User-Agent", "roost-auth")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(provider = %provider, status = %status, "Identity fetch failed");
            return Err(AuthError::IdentityFetchFailed(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AuthError::IdentityFetchFailed(format!("invalid identity body: {e}")))?;

        parse_identity(provider, body)
    }
}
