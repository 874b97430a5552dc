//! Inbound redirect-callback routing.
//!
//! The platform shell (desktop deep-link listener, mobile app link) feeds
//! redirect URLs into a single [`RedirectRouter`]. Exactly one handler is
//! registered at a time; installing another replaces the first, and teardown
//! is tied to the owning session tracker's lifecycle.

use crate::provider::REDIRECT_SCHEME;
use crate::{AuthError, AuthResult};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Handler invoked for each matching redirect URL.
pub type RedirectHandler = Box<dyn Fn(&str) -> AuthResult<()> + Send + Sync>;

/// Single-slot router for inbound redirect callbacks.
#[derive(Default)]
pub struct RedirectRouter {
    handler: Mutex<Option<RedirectHandler>>,
}

impl RedirectRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a handler, replacing any existing one.
    pub fn install(&self, handler: RedirectHandler) {
        let mut slot = self.handler.lock().unwrap();
        if slot.is_some() {
            warn!("Replacing installed redirect handler");
        }
        *slot = Some(handler);
    }

    /// Remove the installed handler.
    pub fn teardown(&self) {
        let mut slot = self.handler.lock().unwrap();
        if slot.take().is_some() {
            debug!("Redirect handler removed");
        }
    }

    /// Whether a handler is currently installed.
    pub fn is_installed(&self) -> bool {
        self.handler.lock().unwrap().is_some()
    }

    /// Route an inbound URL to the installed handler.
    ///
    /// URLs outside the `roost://auth/` pattern are refused without invoking
    /// the handler.
    pub fn dispatch(&self, url: &str) -> AuthResult<()> {
        let prefix = format!("{}://auth/", REDIRECT_SCHEME);
        if !url.starts_with(&prefix) {
            warn!(url = %url, "Ignoring URL outside the auth redirect pattern");
            return Err(AuthError::Config(
                "URL does not match the auth redirect pattern".to_string(),
            ));
        }

        let slot = self.handler.lock().unwrap();
        match slot.as_ref() {
            Some(handler) => handler(url),
            None => {
                warn!("Redirect callback received but no handler is installed");
                Err(AuthError::Config(
                    "No redirect handler installed".to_string(),
                ))
            }
        }
    }
}
