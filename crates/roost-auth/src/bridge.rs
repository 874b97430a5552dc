//! Credential bridge: maps federated identities onto the authority's
//! email+password primitive.
//!
//! The authority does not support native federation, so a fixed per-provider
//! marker stands in as the working secret. This is a compatibility layer, not
//! a security boundary: the trust decision was already made by the provider's
//! redirect exchange. Every chain here is bounded, one register and one
//! sign-in retry, never an open-ended loop.

use crate::authority::{AuthoritySession, CredentialAuthority, RegistrationMetadata};
use crate::provider::Provider;
use crate::{AuthError, AuthResult};
use std::sync::Arc;
use tracing::{debug, info};

/// The fixed working secret for a provider's bridged accounts.
pub fn bridge_secret(provider: Provider) -> String {
    format!("{}-federated", provider.tag())
}

/// Orchestrates the authority's password primitives on behalf of federated
/// identities.
pub struct CredentialBridge {
    authority: Arc<dyn CredentialAuthority>,
}

impl CredentialBridge {
    pub fn new(authority: Arc<dyn CredentialAuthority>) -> Self {
        Self { authority }
    }

    /// Sign in with the given secret, registering when the authority has no
    /// credential yet.
    ///
    /// A concurrent registration surfacing as `AlreadyRegistered` gets one
    /// sign-in retry; exhaustion of both paths is `BridgeExhausted`.
    /// Returns the session and whether a new authority row was created.
    pub async fn sign_in_or_register(
        &self,
        email: &str,
        secret: &str,
        metadata: &RegistrationMetadata,
    ) -> AuthResult<(AuthoritySession, bool)> {
        match self.authority.sign_in(email, secret).await {
            Ok(session) => Ok((session, false)),
            Err(AuthError::InvalidCredentials(_)) => {
                debug!(email = %email, "No matching credential, attempting registration");
                match self.authority.register(email, secret, metadata).await {
                    Ok(session) => {
                        info!(user_id = %session.user_id, "Registered new authority credential");
                        Ok((session, true))
                    }
                    Err(AuthError::AlreadyRegistered(_)) => {
                        // Lost a registration race; the credential exists now.
                        debug!(email = %email, "Registration raced, retrying sign-in once");
                        match self.authority.sign_in(email, secret).await {
                            Ok(session) => Ok((session, false)),
                            Err(AuthError::InvalidCredentials(_)) => {
                                Err(AuthError::BridgeExhausted(email.to_string()))
                            }
                            Err(e) => Err(e),
                        }
                    }
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Obtain an authority session for a federated identity whose profile
    /// already exists.
    ///
    /// Tries the identity's own provider secret, then the remaining
    /// providers' secrets in the fixed fallback order (the account may have
    /// been created through a different provider), then registers a fresh
    /// credential as a last resort.
    pub async fn session_for_identity(
        &self,
        provider: Provider,
        email: &str,
        metadata: &RegistrationMetadata,
    ) -> AuthResult<(AuthoritySession, bool)> {
        let mut chain = vec![provider];
        chain.extend(Provider::ALL.into_iter().filter(|p| *p != provider));

        for candidate in chain {
            match self.authority.sign_in(email, &bridge_secret(candidate)).await {
                Ok(session) => {
                    debug!(
                        provider = %candidate,
                        user_id = %session.user_id,
                        "Bridge sign-in matched"
                    );
                    return Ok((session, false));
                }
                Err(AuthError::InvalidCredentials(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        debug!(email = %email, "No bridge secret matched, registering as last resort");
        match self
            .sign_in_or_register(email, &bridge_secret(provider), metadata)
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err(AuthError::BridgeExhausted(_)) | Err(AuthError::InvalidCredentials(_)) => {
                Err(AuthError::BridgeExhausted(email.to_string()))
            }
            Err(e) => Err(e),
        }
    }
}
