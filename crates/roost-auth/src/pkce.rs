//! PKCE challenge material for the federated authorization flow.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Verifier length in characters. RFC 7636 allows 43-128.
const VERIFIER_LEN: usize = 64;

/// Unreserved characters permitted in a code verifier.
const VERIFIER_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// State token length in raw bytes before encoding.
const STATE_BYTES: usize = 16;

/// Correlation material for one authorization attempt.
///
/// Single-use: scoped to one attempt and discarded on completion,
/// cancellation, or timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceContext {
    /// Code verifier sent with the token exchange.
    pub verifier: String,
    /// S256 challenge sent with the authorization request.
    pub challenge: String,
    /// Anti-CSRF state token echoed back on the redirect callback.
    pub state: String,
}

impl PkceContext {
    /// Generate fresh verifier/challenge/state material.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();

        let verifier: String = (0..VERIFIER_LEN)
            .map(|_| VERIFIER_CHARSET[rng.gen_range(0..VERIFIER_CHARSET.len())] as char)
            .collect();

        let mut state_bytes = [0u8; STATE_BYTES];
        rng.fill(&mut state_bytes);

        Self {
            challenge: challenge_for(&verifier),
            verifier,
            state: URL_SAFE_NO_PAD.encode(state_bytes),
        }
    }

    /// Check a verifier against this context's challenge.
    pub fn verifies(&self, verifier: &str) -> bool {
        challenge_for(verifier) == self.challenge
    }
}

/// Compute the S256 challenge for a verifier:
/// base64url(SHA-256(verifier)), no padding.
pub fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}
