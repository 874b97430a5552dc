//! Profile directory access for the Roost identity engine.
//!
//! This crate provides:
//! - The canonical `Profile` record and its sub-documents
//! - The `ProfileDirectory` seam the reconciliation engine talks to
//! - A PostgREST-style REST implementation of that seam

mod profile;
mod rest;

pub use profile::{Profile, ProfileSettings, ProfileStats, ProfileUpdate, SocialAccount};
pub use rest::RestProfileDirectory;

use async_trait::async_trait;
use thiserror::Error;

/// Which uniqueness constraint a rejected insert tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    /// The primary identifier (authority user id).
    Identifier,
    /// The human-readable handle.
    Handle,
}

/// Error type for directory operations.
#[derive(Error, Debug)]
pub enum DirectoryError {
    /// Insert rejected by a uniqueness constraint
    #[error("Unique constraint violated on {0:?}")]
    UniqueViolation(UniqueField),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Directory service returned an unexpected response
    #[error("Directory request failed: HTTP {status}: {body}")]
    Unexpected { status: u16, body: String },
}

/// Result type alias using DirectoryError.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// External store of canonical user records.
///
/// Uniqueness of `id` and `handle` is enforced by the store itself; callers
/// resolve `UniqueViolation` per the reconciliation rules rather than
/// locking up front.
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    /// Look up a profile by its primary identifier.
    async fn find_by_id(&self, id: &str) -> DirectoryResult<Option<Profile>>;

    /// Look up a profile by email.
    async fn find_by_email(&self, email: &str) -> DirectoryResult<Option<Profile>>;

    /// Look up a profile by handle.
    async fn find_by_handle(&self, handle: &str) -> DirectoryResult<Option<Profile>>;

    /// Check whether a handle is already taken.
    async fn handle_exists(&self, handle: &str) -> DirectoryResult<bool> {
        Ok(self.find_by_handle(handle).await?.is_some())
    }

    /// Insert a new profile, subject to the uniqueness constraints.
    async fn insert(&self, profile: &Profile) -> DirectoryResult<Profile>;

    /// Apply a partial update to the profile with the given identifier.
    async fn update(&self, id: &str, patch: &ProfileUpdate) -> DirectoryResult<()>;
}
