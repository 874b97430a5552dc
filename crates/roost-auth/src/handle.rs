//! Handle allocation for new profiles.
//!
//! The allocator only proposes candidates; global uniqueness is enforced by
//! the profile directory's own constraint. An insert that still collides is
//! resolved by the caller retrying with a timestamped candidate.

use crate::AuthResult;
use roost_directory::ProfileDirectory;
use std::sync::Arc;
use tracing::debug;

/// Bounded number of numeric suffixes tried before falling back to a
/// timestamp suffix.
pub const MAX_SUFFIX_ATTEMPTS: u32 = 10;

/// Maximum handle length after normalization.
const MAX_HANDLE_LEN: usize = 30;

/// Fallback base when normalization leaves nothing.
const FALLBACK_BASE: &str = "user";

/// Normalize a base string to the handle character set: lowercase
/// alphanumerics and underscore, separators collapsed, no leading or
/// trailing underscore.
pub fn normalize(base: &str) -> String {
    let mut handle = String::with_capacity(base.len());
    let mut last_was_underscore = true;

    for c in base.chars() {
        if c.is_ascii_alphanumeric() {
            handle.push(c.to_ascii_lowercase());
            last_was_underscore = false;
        } else if matches!(c, '_' | '-' | '.' | ' ') && !last_was_underscore {
            handle.push('_');
            last_was_underscore = true;
        }
    }

    handle.truncate(MAX_HANDLE_LEN);
    while handle.ends_with('_') {
        handle.pop();
    }

    if handle.is_empty() {
        FALLBACK_BASE.to_string()
    } else {
        handle
    }
}

/// A practically-unique candidate: normalized base plus a millisecond
/// timestamp suffix.
pub fn timestamped(base: &str) -> String {
    format!(
        "{}_{}",
        normalize(base),
        chrono::Utc::now().timestamp_millis()
    )
}

/// Proposes unique handles against the profile directory.
pub struct HandleAllocator {
    directory: Arc<dyn ProfileDirectory>,
}

impl HandleAllocator {
    pub fn new(directory: Arc<dyn ProfileDirectory>) -> Self {
        Self { directory }
    }

    /// Allocate a handle from a base string.
    ///
    /// Probes the directory for the normalized base, then `base_1` through
    /// `base_10`, then falls back to a timestamp suffix. Two concurrent
    /// allocations of the same base may both pass the probe; the directory's
    /// constraint settles the tie at insert time.
    pub async fn allocate(&self, base: &str) -> AuthResult<String> {
        let normalized = normalize(base);

        if !self.directory.handle_exists(&normalized).await? {
            return Ok(normalized);
        }

        for suffix in 1..=MAX_SUFFIX_ATTEMPTS {
            let candidate = format!("{}_{}", normalized, suffix);
            if !self.directory.handle_exists(&candidate).await? {
                debug!(base = %normalized, candidate = %candidate, "Handle collision resolved with suffix");
                return Ok(candidate);
            }
        }

        let candidate = timestamped(&normalized);
        debug!(base = %normalized, candidate = %candidate, "Handle suffixes exhausted, using timestamp");
        Ok(candidate)
    }
}
