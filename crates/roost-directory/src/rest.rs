//! PostgREST client for the profile directory.
//!
//! Talks to the directory service's `profiles` table over its REST surface.
//! Uniqueness of `id` and `handle` is enforced by the table's constraints;
//! conflict responses are mapped onto [`DirectoryError::UniqueViolation`] so
//! callers can apply the reconciliation retry rules.

use crate::{DirectoryError, DirectoryResult, Profile, ProfileDirectory, ProfileUpdate, UniqueField};
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

const PROFILE_COLUMNS: &str =
    "id,email,handle,display_name,avatar_url,bio,is_online,last_active_at,settings,stats,social_accounts";

fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

/// Map a conflict response body onto the constraint that rejected the write.
///
/// PostgREST surfaces the violated constraint name in the error body; the
/// `profiles` table carries `profiles_pkey` on `id` and `profiles_handle_key`
/// on `handle`.
fn classify_conflict(body: &str) -> UniqueField {
    if body.contains("profiles_handle_key") || body.contains("handle") {
        UniqueField::Handle
    } else {
        UniqueField::Identifier
    }
}

/// REST API client for the profile directory.
#[derive(Clone)]
pub struct RestProfileDirectory {
    http_client: reqwest::Client,
    api_url: String,
    anon_key: String,
}

impl RestProfileDirectory {
    /// Create a new directory client.
    ///
    /// # Arguments
    /// * `api_url` - The directory project API URL (e.g., `https://xyz.supabase.co`)
    /// * `anon_key` - The publishable API key
    pub fn new(api_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_url: api_url.into(),
            anon_key: anon_key.into(),
        }
    }

    /// Build the REST API URL for a table.
    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.api_url, table)
    }

    async fn find_one(&self, filter: &str, value: &str) -> DirectoryResult<Option<Profile>> {
        let url = format!(
            "{}?{}=eq.{}&select={}&limit=1",
            self.rest_url("profiles"),
            filter,
            value,
            PROFILE_COLUMNS
        );

        tracing::debug!(filter = %filter, "Fetching profile from directory");

        let response = self
            .http_client
            .get(&url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.anon_key))
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let body_summary = summarize_response_body(&body);
            tracing::error!(status = %status, body_summary = %body_summary, "Failed to fetch profile");
            return Err(DirectoryError::Unexpected {
                status: status.as_u16(),
                body: body_summary,
            });
        }

        let profiles: Vec<Profile> = response.json().await?;
        Ok(profiles.into_iter().next())
    }
}

#[async_trait]
impl ProfileDirectory for RestProfileDirectory {
    async fn find_by_id(&self, id: &str) -> DirectoryResult<Option<Profile>> {
        self.find_one("id", id).await
    }

    async fn find_by_email(&self, email: &str) -> DirectoryResult<Option<Profile>> {
        self.find_one("email", email).await
    }

    async fn find_by_handle(&self, handle: &str) -> DirectoryResult<Option<Profile>> {
        self.find_one("handle", handle).await
    }

    async fn insert(&self, profile: &Profile) -> DirectoryResult<Profile> {
        let url = self.rest_url("profiles");

        tracing::debug!(id = %profile.id, handle = %profile.handle, "Inserting profile");

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.anon_key))
            .header("Content-Type", "application/json")
            .header("Prefer", "return=representation")
            .json(profile)
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::CONFLICT {
            let body = response.text().await.unwrap_or_default();
            let field = classify_conflict(&body);
            tracing::debug!(id = %profile.id, field = ?field, "Profile insert hit a uniqueness constraint");
            return Err(DirectoryError::UniqueViolation(field));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body_summary = summarize_response_body(&body);
            tracing::error!(status = %status, body_summary = %body_summary, "Failed to insert profile");
            return Err(DirectoryError::Unexpected {
                status: status.as_u16(),
                body: body_summary,
            });
        }

        let mut inserted: Vec<Profile> = response.json().await?;
        match inserted.pop() {
            Some(profile) => Ok(profile),
            // return=representation always echoes the row on success
            None => Ok(profile.clone()),
        }
    }

    async fn update(&self, id: &str, patch: &ProfileUpdate) -> DirectoryResult<()> {
        if patch.is_empty() {
            return Ok(());
        }

        let url = format!("{}?id=eq.{}", self.rest_url("profiles"), id);

        tracing::debug!(id = %id, "Updating profile");

        let response = self
            .http_client
            .patch(&url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.anon_key))
            .header("Content-Type", "application/json")
            .header("Prefer", "return=minimal")
            .json(patch)
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::CONFLICT {
            let body = response.text().await.unwrap_or_default();
            return Err(DirectoryError::UniqueViolation(classify_conflict(&body)));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body_summary = summarize_response_body(&body);
            tracing::error!(status = %status, body_summary = %body_summary, "Failed to update profile");
            return Err(DirectoryError::Unexpected {
                status: status.as_u16(),
                body: body_summary,
            });
        }

        Ok(())
    }
}
