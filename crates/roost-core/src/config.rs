//! Configuration management for the identity engine.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default credential authority URL (can be overridden at compile time via ROOST_AUTHORITY_URL).
pub const DEFAULT_AUTHORITY_URL: &str = match option_env!("ROOST_AUTHORITY_URL") {
    Some(url) => url,
    None => "https://roost.supabase.co",
};

/// Default authority publishable key (compile-time override via ROOST_AUTHORITY_PUBLISHABLE_KEY).
pub const DEFAULT_AUTHORITY_PUBLISHABLE_KEY: &str =
    match option_env!("ROOST_AUTHORITY_PUBLISHABLE_KEY") {
        Some(key) => key,
        None => "roost-publishable-key",
    };

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const DEFAULT_GOOGLE_CLIENT_ID: Option<&str> = option_env!("ROOST_GOOGLE_CLIENT_ID");
const DEFAULT_GITHUB_CLIENT_ID: Option<&str> = option_env!("ROOST_GITHUB_CLIENT_ID");
const DEFAULT_GITHUB_CLIENT_SECRET: Option<&str> = option_env!("ROOST_GITHUB_CLIENT_SECRET");
const DEFAULT_DISCORD_CLIENT_ID: Option<&str> = option_env!("ROOST_DISCORD_CLIENT_ID");

/// Main engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Credential authority project URL.
    #[serde(default = "default_authority_url")]
    pub authority_url: String,
    /// Authority publishable API key (public, safe to expose).
    #[serde(default = "default_authority_publishable_key")]
    pub authority_publishable_key: String,
    /// Google OAuth client id, if the deployment enables Google sign-in.
    #[serde(default = "default_google_client_id")]
    pub google_client_id: Option<String>,
    /// GitHub OAuth client id.
    #[serde(default = "default_github_client_id")]
    pub github_client_id: Option<String>,
    /// GitHub OAuth client secret (GitHub requires it even for PKCE clients).
    #[serde(default = "default_github_client_secret")]
    pub github_client_secret: Option<String>,
    /// Discord OAuth client id.
    #[serde(default = "default_discord_client_id")]
    pub discord_client_id: Option<String>,
    /// Migration shim: on a failed password sign-in, also try the per-provider
    /// bridge secrets for accounts that were originally created through a
    /// federated flow. Off unless a deployment still carries such accounts.
    #[serde(default)]
    pub legacy_bridge_sign_in: bool,
}

fn default_authority_url() -> String {
    DEFAULT_AUTHORITY_URL.to_string()
}

fn default_authority_publishable_key() -> String {
    DEFAULT_AUTHORITY_PUBLISHABLE_KEY.to_string()
}

fn default_google_client_id() -> Option<String> {
    DEFAULT_GOOGLE_CLIENT_ID.map(|s| s.to_string())
}

fn default_github_client_id() -> Option<String> {
    DEFAULT_GITHUB_CLIENT_ID.map(|s| s.to_string())
}

fn default_github_client_secret() -> Option<String> {
    DEFAULT_GITHUB_CLIENT_SECRET.map(|s| s.to_string())
}

fn default_discord_client_id() -> Option<String> {
    DEFAULT_DISCORD_CLIENT_ID.map(|s| s.to_string())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            authority_url: DEFAULT_AUTHORITY_URL.to_string(),
            authority_publishable_key: DEFAULT_AUTHORITY_PUBLISHABLE_KEY.to_string(),
            google_client_id: default_google_client_id(),
            github_client_id: default_github_client_id(),
            github_client_secret: default_github_client_secret(),
            discord_client_id: default_discord_client_id(),
            legacy_bridge_sign_in: false,
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults.
    ///
    /// Note: authority_url and authority_publishable_key are compile-time
    /// only and always use the built-in defaults, regardless of what's in
    /// the config file.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        // Force compile-time values (never from config file)
        config.authority_url = DEFAULT_AUTHORITY_URL.to_string();
        config.authority_publishable_key = DEFAULT_AUTHORITY_PUBLISHABLE_KEY.to_string();

        config.load_from_env();

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the config file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let config_path = paths.config_file();
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    /// Override configuration from environment variables.
    /// Only log_level can be overridden at runtime.
    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var("ROOST_LOG_LEVEL") {
            self.log_level = log_level;
        }
    }

    /// Get the authority URL as a parsed URL.
    pub fn authority_url(&self) -> CoreResult<Url> {
        Url::parse(&self.authority_url).map_err(CoreError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.authority_url, DEFAULT_AUTHORITY_URL);
        assert_eq!(
            config.authority_publishable_key,
            DEFAULT_AUTHORITY_PUBLISHABLE_KEY
        );
        assert!(!config.legacy_bridge_sign_in);
    }

    #[test]
    fn test_config_load_from_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        let config_json = r#"{
            "log_level": "debug",
            "legacy_bridge_sign_in": true
        }"#;

        std::fs::write(&config_path, config_json).unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert!(config.legacy_bridge_sign_in);
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let mut config = Config::default();
        config.log_level = "trace".to_string();
        config.legacy_bridge_sign_in = true;

        config.save(&paths).unwrap();

        let loaded = Config::load(&paths).unwrap();
        assert_eq!(loaded.log_level, "trace");
        assert!(loaded.legacy_bridge_sign_in);
    }

    #[test]
    fn test_config_load_nonexistent_uses_defaults() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config::load(&paths).unwrap();
        assert_eq!(config.authority_url, DEFAULT_AUTHORITY_URL);
    }

    #[test]
    fn test_config_authority_url_parse() {
        let config = Config::default();
        let url = config.authority_url().unwrap();
        assert_eq!(url.scheme(), "https");
    }

    #[test]
    fn test_config_invalid_url() {
        let mut config = Config::default();
        config.authority_url = "not a valid url".to_string();

        let result = config.authority_url();
        assert!(result.is_err());
    }

    #[test]
    fn test_default_constants() {
        assert!(!DEFAULT_LOG_LEVEL.is_empty());
        assert!(!DEFAULT_AUTHORITY_URL.is_empty());
        assert!(!DEFAULT_AUTHORITY_PUBLISHABLE_KEY.is_empty());
        assert!(DEFAULT_AUTHORITY_URL.starts_with("https://"));
    }
}
