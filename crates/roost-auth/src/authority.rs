//! Credential authority seam.
//!
//! The authority is the external system of record for login secrets and
//! sessions. It exposes only email+password primitives; federated identities
//! reach it through the credential bridge.

use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// An authority-issued session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthoritySession {
    /// Stable user identifier assigned by the authority.
    pub user_id: String,
    pub email: String,
    pub access_token: String,
}

/// Extra attributes attached to a registration.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistrationMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Tag of the federated provider a bridged registration came through.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

/// External system of record for login secrets and sessions.
#[async_trait]
pub trait CredentialAuthority: Send + Sync {
    /// Authenticate with an email and secret.
    async fn sign_in(&self, email: &str, secret: &str) -> AuthResult<AuthoritySession>;

    /// Register a new credential. Fails with `AlreadyRegistered` when the
    /// email already has one.
    async fn register(
        &self,
        email: &str,
        secret: &str,
        metadata: &RegistrationMetadata,
    ) -> AuthResult<AuthoritySession>;

    /// The current session, if one is active and still valid.
    async fn current_session(&self) -> AuthResult<Option<AuthoritySession>>;

    /// Invalidate a session.
    async fn sign_out(&self, session: &AuthoritySession) -> AuthResult<()>;
}

#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: String,
    user: GrantUser,
}

#[derive(Debug, Deserialize)]
struct GrantUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

/// REST client for a Supabase-Auth-style credential authority.
///
/// Holds the active session for the engine's lifetime; durable persistence
/// is the embedder's concern.
pub struct RestCredentialAuthority {
    http_client: reqwest::Client,
    api_url: String,
    publishable_key: String,
    session: Mutex<Option<AuthoritySession>>,
}

impl RestCredentialAuthority {
    /// Create a new authority client.
    pub fn new(api_url: impl Into<String>, publishable_key: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_url: api_url.into(),
            publishable_key: publishable_key.into(),
            session: Mutex::new(None),
        }
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.api_url, path)
    }

    fn store_session(&self, session: &AuthoritySession) {
        *self.session.lock().unwrap() = Some(session.clone());
    }

    fn grant_to_session(&self, grant: TokenGrant, fallback_email: &str) -> AuthoritySession {
        AuthoritySession {
            user_id: grant.user.id,
            email: grant.user.email.unwrap_or_else(|| fallback_email.to_string()),
            access_token: grant.access_token,
        }
    }
}

#[async_trait]
impl CredentialAuthority for RestCredentialAuthority {
    async fn sign_in(&self, email: &str, secret: &str) -> AuthResult<AuthoritySession> {
        let url = self.auth_url("token?grant_type=password");

        debug!(email = %email, "Attempting authority sign-in");

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.publishable_key)
            .header("Content-Type", "application/json")
            .json(&serde_json::json!({
                "email": email,
                "password": secret,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if status.is_server_error() {
                warn!(status = %status, "Authority sign-in failed server-side");
                return Err(AuthError::NetworkUnavailable);
            }
            debug!(status = %status, "Authority rejected sign-in");
            return Err(AuthError::InvalidCredentials(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let grant: TokenGrant = response.json().await?;
        let session = self.grant_to_session(grant, email);
        self.store_session(&session);

        info!(user_id = %session.user_id, "Authority sign-in successful");
        Ok(session)
    }

    async fn register(
        &self,
        email: &str,
        secret: &str,
        metadata: &RegistrationMetadata,
    ) -> AuthResult<AuthoritySession> {
        let url = self.auth_url("signup");

        debug!(email = %email, "Registering authority credential");

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.publishable_key)
            .header("Content-Type", "application/json")
            .json(&serde_json::json!({
                "email": email,
                "password": secret,
                "data": metadata,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::UNPROCESSABLE_ENTITY
                || body.contains("already registered")
                || body.contains("user_already_exists")
            {
                debug!(email = %email, "Authority already has a credential for this email");
                return Err(AuthError::AlreadyRegistered(email.to_string()));
            }
            if status.is_server_error() {
                warn!(status = %status, "Authority registration failed server-side");
                return Err(AuthError::NetworkUnavailable);
            }
            return Err(AuthError::InvalidCredentials(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let grant: TokenGrant = response.json().await?;
        let session = self.grant_to_session(grant, email);
        self.store_session(&session);

        info!(user_id = %session.user_id, "Authority credential registered");
        Ok(session)
    }

    async fn current_session(&self) -> AuthResult<Option<AuthoritySession>> {
        let session = match self.session.lock().unwrap().clone() {
            Some(session) => session,
            None => return Ok(None),
        };

        // Verify the session server-side; it may have been revoked.
        let url = self.auth_url("user");
        let response = self
            .http_client
            .get(&url)
            .header("apikey", &self.publishable_key)
            .header("Authorization", format!("Bearer {}", session.access_token))
            .send()
            .await?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "Stored session rejected by authority");
            *self.session.lock().unwrap() = None;
            return Ok(None);
        }

        let user: UserResponse = response.json().await?;
        debug!(user_id = %user.id, "Session verified with authority");

        Ok(Some(AuthoritySession {
            user_id: user.id,
            email: user.email.unwrap_or(session.email),
            access_token: session.access_token,
        }))
    }

    async fn sign_out(&self, session: &AuthoritySession) -> AuthResult<()> {
        let url = self.auth_url("logout");

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.publishable_key)
            .header("Authorization", format!("Bearer {}", session.access_token))
            .send()
            .await?;

        *self.session.lock().unwrap() = None;

        if !response.status().is_success() {
            let status = response.status();
            warn!(status = %status, "Authority sign-out returned an error");
            return Err(AuthError::Config(format!(
                "Authority sign-out failed: HTTP {}",
                status
            )));
        }

        info!(user_id = %session.user_id, "Authority session invalidated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let authority = RestCredentialAuthority::new("https://test.supabase.co", "test-key");
        assert_eq!(authority.api_url, "https://test.supabase.co");
        assert_eq!(authority.publishable_key, "test-key");
    }

    #[test]
    fn test_auth_url() {
        let authority = RestCredentialAuthority::new("https://test.supabase.co", "test-key");
        assert_eq!(
            authority.auth_url("token?grant_type=password"),
            "https://test.supabase.co/auth/v1/token?grant_type=password"
        );
        assert_eq!(
            authority.auth_url("signup"),
            "https://test.supabase.co/auth/v1/signup"
        );
    }

    #[test]
    fn test_grant_to_session_uses_fallback_email() {
        let authority = RestCredentialAuthority::new("https://test.supabase.co", "test-key");
        let grant = TokenGrant {
            access_token: "tok".to_string(),
            user: GrantUser {
                id: "user-1".to_string(),
                email: None,
            },
        };

        let session = authority.grant_to_session(grant, "fallback@example.com");
        assert_eq!(session.email, "fallback@example.com");
        assert_eq!(session.user_id, "user-1");
    }

    #[test]
    fn test_registration_metadata_serializes_sparsely() {
        let metadata = RegistrationMetadata {
            display_name: None,
            provider: Some("github".to_string()),
        };
        let json = serde_json::to_value(&metadata).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object.len(), 1);
        assert_eq!(object["provider"], serde_json::json!("github"));
    }

    #[tokio::test]
    async fn test_current_session_none_without_sign_in() {
        let authority = RestCredentialAuthority::new("https://test.supabase.co", "test-key");
        // No stored session: returns None without touching the network.
        let session = authority.current_session().await.unwrap();
        assert!(session.is_none());
    }
}
