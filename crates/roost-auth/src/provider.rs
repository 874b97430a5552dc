//! Federated provider registry and identities.

use crate::{AuthError, AuthResult};
use roost_core::Config;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Custom URL scheme the redirect URIs are registered under.
pub const REDIRECT_SCHEME: &str = "roost";

/// Federated identity providers the engine can drive.
///
/// The declaration order is the fixed fallback order used wherever a
/// deterministic provider chain is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    GitHub,
    Discord,
}

impl Provider {
    /// All providers, in the fixed fallback order.
    pub const ALL: [Provider; 3] = [Provider::Google, Provider::GitHub, Provider::Discord];

    /// Stable lowercase tag, used in redirect URIs, bridge secrets, and the
    /// profile's social-accounts map.
    pub fn tag(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::GitHub => "github",
            Provider::Discord => "discord",
        }
    }

    /// Parse a provider tag.
    pub fn from_tag(tag: &str) -> Option<Provider> {
        match tag {
            "google" => Some(Provider::Google),
            "github" => Some(Provider::GitHub),
            "discord" => Some(Provider::Discord),
            _ => None,
        }
    }

    /// Authorization endpoint for the browser redirect.
    pub fn authorize_endpoint(&self) -> &'static str {
        match self {
            Provider::Google => "https://accounts.google.com/o/oauth2/v2/auth",
            Provider::GitHub => "https://github.com/login/oauth/authorize",
            Provider::Discord => "https://discord.com/oauth2/authorize",
        }
    }

    /// Token endpoint for the code exchange.
    pub fn token_endpoint(&self) -> &'static str {
        match self {
            Provider::Google => "https://oauth2.googleapis.com/token",
            Provider::GitHub => "https://github.com/login/oauth/access_token",
            Provider::Discord => "https://discord.com/api/oauth2/token",
        }
    }

    /// Profile endpoint queried with the bearer token.
    pub fn identity_endpoint(&self) -> &'static str {
        match self {
            Provider::Google => "https://openidconnect.googleapis.com/v1/userinfo",
            Provider::GitHub => "https://api.github.com/user",
            Provider::Discord => "https://discord.com/api/users/@me",
        }
    }

    /// Scopes requested when the caller does not override them.
    pub fn default_scopes(&self) -> &'static [&'static str] {
        match self {
            Provider::Google => &["openid", "email", "profile"],
            Provider::GitHub => &["read:user", "user:email"],
            Provider::Discord => &["identify", "email"],
        }
    }

    /// Fixed redirect URI registered with the provider:
    /// `roost://auth/<provider>`.
    pub fn redirect_uri(&self) -> String {
        format!("{}://auth/{}", REDIRECT_SCHEME, self.tag())
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// OAuth client credentials for one provider.
#[derive(Debug, Clone)]
pub struct ProviderCredentials {
    pub client_id: String,
    /// Only set for providers that require it on the token exchange
    /// (GitHub does, even for PKCE clients).
    pub client_secret: Option<String>,
}

/// Per-deployment registry of enabled providers.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    credentials: BTreeMap<Provider, ProviderCredentials>,
}

impl ProviderRegistry {
    /// Build the registry from configuration. Providers without a configured
    /// client id are simply absent.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::default();

        if let Some(client_id) = &config.google_client_id {
            registry.insert(
                Provider::Google,
                ProviderCredentials {
                    client_id: client_id.clone(),
                    client_secret: None,
                },
            );
        }
        if let Some(client_id) = &config.github_client_id {
            registry.insert(
                Provider::GitHub,
                ProviderCredentials {
                    client_id: client_id.clone(),
                    client_secret: config.github_client_secret.clone(),
                },
            );
        }
        if let Some(client_id) = &config.discord_client_id {
            registry.insert(
                Provider::Discord,
                ProviderCredentials {
                    client_id: client_id.clone(),
                    client_secret: None,
                },
            );
        }

        registry
    }

    /// Register or replace credentials for a provider.
    pub fn insert(&mut self, provider: Provider, credentials: ProviderCredentials) {
        self.credentials.insert(provider, credentials);
    }

    /// Credentials for a provider, or a configuration error when the
    /// deployment has not enabled it.
    pub fn credentials(&self, provider: Provider) -> AuthResult<&ProviderCredentials> {
        self.credentials.get(&provider).ok_or_else(|| {
            AuthError::Config(format!("No client id configured for provider {provider}"))
        })
    }

    /// Providers enabled in this deployment, in fallback order.
    pub fn enabled(&self) -> Vec<Provider> {
        Provider::ALL
            .into_iter()
            .filter(|p| self.credentials.contains_key(p))
            .collect()
    }
}

/// Identity asserted by a provider after a completed redirect exchange.
///
/// Transient: folded into the profile's social-accounts map and used to
/// derive the bridge secret, never persisted as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderIdentity {
    pub provider: Provider,
    /// Opaque provider user id.
    pub id: String,
    /// Username/handle at the provider.
    pub handle: String,
    pub display_name: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub verified: Option<bool>,
}

impl ProviderIdentity {
    /// Email the reconciliation engine keys on. Providers that withhold the
    /// email get a stable placeholder so repeat sign-ins reconcile to the
    /// same profile.
    pub fn effective_email(&self) -> String {
        match &self.email {
            Some(email) => email.clone(),
            None => format!("{}-{}@users.roost.chat", self.provider.tag(), self.id),
        }
    }

    /// Base string for handle allocation.
    pub fn handle_base(&self) -> &str {
        if !self.handle.is_empty() {
            &self.handle
        } else {
            self.effective_local_part()
        }
    }

    fn effective_local_part(&self) -> &str {
        self.email
            .as_deref()
            .and_then(|email| email.split('@').next())
            .unwrap_or(&self.id)
    }
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    sub: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_verified: Option<bool>,
    #[serde(default)]
    picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: i64,
    login: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DiscordUser {
    id: String,
    username: String,
    #[serde(default)]
    global_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    verified: Option<bool>,
    #[serde(default)]
    avatar: Option<String>,
}

/// Map a provider's profile-endpoint response onto a [`ProviderIdentity`].
///
/// Fails with `IdentityFetchFailed` when the required fields (id, handle)
/// are missing or malformed.
pub(crate) fn parse_identity(
    provider: Provider,
    body: serde_json::Value,
) -> AuthResult<ProviderIdentity> {
    let identity = match provider {
        Provider::Google => {
            let user: GoogleUserInfo = serde_json::from_value(body)
                .map_err(|e| AuthError::IdentityFetchFailed(format!("google userinfo: {e}")))?;
            let handle = user
                .email
                .as_deref()
                .and_then(|email| email.split('@').next())
                .unwrap_or(user.sub.as_str())
                .to_string();
            ProviderIdentity {
                provider,
                display_name: user.name.unwrap_or_else(|| handle.clone()),
                id: user.sub,
                handle,
                email: user.email,
                avatar_url: user.picture,
                verified: user.email_verified,
            }
        }
        Provider::GitHub => {
            let user: GitHubUser = serde_json::from_value(body)
                .map_err(|e| AuthError::IdentityFetchFailed(format!("github user: {e}")))?;
            ProviderIdentity {
                provider,
                id: user.id.to_string(),
                display_name: user.name.unwrap_or_else(|| user.login.clone()),
                handle: user.login,
                email: user.email,
                avatar_url: user.avatar_url,
                verified: None,
            }
        }
        Provider::Discord => {
            let user: DiscordUser = serde_json::from_value(body)
                .map_err(|e| AuthError::IdentityFetchFailed(format!("discord user: {e}")))?;
            let avatar_url = user
                .avatar
                .as_ref()
                .map(|hash| format!("https://cdn.discordapp.com/avatars/{}/{}.png", user.id, hash));
            ProviderIdentity {
                provider,
                display_name: user
                    .global_name
                    .unwrap_or_else(|| user.username.clone()),
                handle: user.username,
                id: user.id,
                email: user.email,
                avatar_url,
                verified: user.verified,
            }
        }
    };

    if identity.id.is_empty() || identity.handle.is_empty() {
        return Err(AuthError::IdentityFetchFailed(
            "provider identity missing required fields".to_string(),
        ));
    }

    Ok(identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tags_roundtrip() {
        for provider in Provider::ALL {
            assert_eq!(Provider::from_tag(provider.tag()), Some(provider));
        }
        assert_eq!(Provider::from_tag("facebook"), None);
    }

    #[test]
    fn test_redirect_uri_shape() {
        assert_eq!(Provider::Google.redirect_uri(), "roost://auth/google");
        assert_eq!(Provider::GitHub.redirect_uri(), "roost://auth/github");
        assert_eq!(Provider::Discord.redirect_uri(), "roost://auth/discord");
    }

    #[test]
    fn test_registry_from_config() {
        let mut config = Config::default();
        config.google_client_id = Some("google-id".to_string());
        config.github_client_id = Some("github-id".to_string());
        config.github_client_secret = Some("github-secret".to_string());
        config.discord_client_id = None;

        let registry = ProviderRegistry::from_config(&config);

        assert_eq!(registry.enabled(), vec![Provider::Google, Provider::GitHub]);
        assert_eq!(
            registry.credentials(Provider::GitHub).unwrap().client_secret,
            Some("github-secret".to_string())
        );
        assert!(matches!(
            registry.credentials(Provider::Discord),
            Err(AuthError::Config(_))
        ));
    }

    #[test]
    fn test_parse_github_identity() {
        let identity = parse_identity(
            Provider::GitHub,
            json!({
                "id": 9001,
                "login": "octocat",
                "name": "The Octocat",
                "email": "octo@example.com",
                "avatar_url": "https://avatars.example.com/octocat"
            }),
        )
        .unwrap();

        assert_eq!(identity.id, "9001");
        assert_eq!(identity.handle, "octocat");
        assert_eq!(identity.display_name, "The Octocat");
        assert_eq!(identity.email.as_deref(), Some("octo@example.com"));
    }

    #[test]
    fn test_parse_google_identity_uses_email_local_part_as_handle() {
        let identity = parse_identity(
            Provider::Google,
            json!({
                "sub": "1078901234",
                "name": "Alice Example",
                "email": "alice@example.com",
                "email_verified": true,
                "picture": "https://lh3.example.com/alice"
            }),
        )
        .unwrap();

        assert_eq!(identity.handle, "alice");
        assert_eq!(identity.verified, Some(true));
    }

    #[test]
    fn test_parse_discord_identity_builds_avatar_url() {
        let identity = parse_identity(
            Provider::Discord,
            json!({
                "id": "4242",
                "username": "wumpus",
                "global_name": "Wumpus",
                "email": "wumpus@example.com",
                "verified": true,
                "avatar": "abcdef"
            }),
        )
        .unwrap();

        assert_eq!(
            identity.avatar_url.as_deref(),
            Some("https://cdn.discordapp.com/avatars/4242/abcdef.png")
        );
    }

    #[test]
    fn test_parse_identity_missing_required_fields() {
        let result = parse_identity(Provider::GitHub, json!({"name": "No Id"}));
        assert!(matches!(result, Err(AuthError::IdentityFetchFailed(_))));
    }

    #[test]
    fn test_effective_email_placeholder_is_stable() {
        let identity = ProviderIdentity {
            provider: Provider::Discord,
            id: "4242".to_string(),
            handle: "wumpus".to_string(),
            display_name: "Wumpus".to_string(),
            email: None,
            avatar_url: None,
            verified: None,
        };

        assert_eq!(identity.effective_email(), "discord-4242@users.roost.chat");
        assert_eq!(identity.effective_email(), identity.effective_email());
    }

    #[test]
    fn test_handle_base_prefers_provider_handle() {
        let identity = ProviderIdentity {
            provider: Provider::GitHub,
            id: "1".to_string(),
            handle: "octocat".to_string(),
            display_name: "Octocat".to_string(),
            email: Some("octo@example.com".to_string()),
            avatar_url: None,
            verified: None,
        };
        assert_eq!(identity.handle_base(), "octocat");
    }
}
