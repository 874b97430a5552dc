//! Authentication error types.

use thiserror::Error;

/// Authentication error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Invalid email or password
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The provider reported an error on the redirect callback
    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),

    /// Redirect callback state does not match the state issued for this attempt
    #[error("State token mismatch on redirect callback")]
    StateMismatch,

    /// Redirect callback carried neither a code nor an error
    #[error("Redirect callback carried no authorization code")]
    MissingCode,

    /// Redirect callback repeated for an attempt that was already consumed
    #[error("Redirect callback replayed for a consumed attempt")]
    ReplayedCallback,

    /// Provider token endpoint rejected the code exchange
    #[error("Token exchange failed: {0}")]
    TokenExchangeFailed(String),

    /// Provider identity endpoint rejected the profile fetch or returned an
    /// incomplete identity
    #[error("Identity fetch failed: {0}")]
    IdentityFetchFailed(String),

    /// Authority already has a credential for this email (benign signup race)
    #[error("Already registered: {0}")]
    AlreadyRegistered(String),

    /// Both bridge paths failed after the single retry
    #[error("Credential bridge exhausted for {0}")]
    BridgeExhausted(String),

    /// Profile insert failed for a reason the race rules do not cover
    #[error("Profile creation failed: {0}")]
    ProfileCreationFailed(String),

    /// The bounded wait for the redirect callback elapsed
    #[error("Authorization attempt timed out")]
    AuthorizationTimeout,

    /// Network unavailable (transient, can retry)
    #[error("Network unavailable")]
    NetworkUnavailable,

    /// Invalid transition in the session state machine
    #[error("Invalid session state transition: {0}")]
    InvalidStateTransition(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Profile directory error
    #[error("Directory error: {0}")]
    Directory(#[from] roost_directory::DirectoryError),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl AuthError {
    /// Returns true if this error is transient and the operation can be retried.
    ///
    /// Transient errors include network unavailability, connection timeouts,
    /// and 5xx responses.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::NetworkUnavailable => true,
            AuthError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                if let Some(status) = e.status() {
                    return status.is_server_error();
                }
                false
            }
            _ => false,
        }
    }

    /// Stable machine-readable kind tag, surfaced alongside the message for
    /// UI presentation.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials(_) => "invalid_credentials",
            AuthError::AuthorizationDenied(_) => "authorization_denied",
            AuthError::StateMismatch => "state_mismatch",
            AuthError::MissingCode => "missing_code",
            AuthError::ReplayedCallback => "replayed_callback",
            AuthError::TokenExchangeFailed(_) => "token_exchange_failed",
            AuthError::IdentityFetchFailed(_) => "identity_fetch_failed",
            AuthError::AlreadyRegistered(_) => "already_registered",
            AuthError::BridgeExhausted(_) => "bridge_exhausted",
            AuthError::ProfileCreationFailed(_) => "profile_creation_failed",
            AuthError::AuthorizationTimeout => "authorization_timeout",
            AuthError::NetworkUnavailable => "network_unavailable",
            AuthError::InvalidStateTransition(_) => "invalid_state_transition",
            AuthError::Config(_) => "config",
            AuthError::Directory(_) => "directory",
            AuthError::Http(_) => "http",
            AuthError::Json(_) => "json",
            AuthError::InvalidUrl(_) => "invalid_url",
        }
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
