//! The canonical user record and its sub-documents.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Privacy and notification toggles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileSettings {
    /// Hide the profile from member search.
    pub private_profile: bool,
    /// Deliver push notifications.
    pub notifications_enabled: bool,
    /// Share read receipts with other members.
    pub read_receipts: bool,
}

impl Default for ProfileSettings {
    fn default() -> Self {
        Self {
            private_profile: false,
            notifications_enabled: true,
            read_receipts: true,
        }
    }
}

/// Activity counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileStats {
    /// Messages sent across all rooms.
    pub messages_sent: u64,
    /// Rooms the member has joined.
    pub rooms_joined: u64,
}

/// A linked external-provider identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SocialAccount {
    /// Opaque user id assigned by the provider.
    pub user_id: String,
    /// Username/handle at the provider.
    pub handle: String,
    /// Whether the provider reported the account as verified.
    pub verified: bool,
}

/// Canonical user record.
///
/// `id` is assigned by the credential authority at first successful
/// authentication and is 1:1 with exactly one authority row. `handle` is
/// globally unique; the directory's own constraint is the source of truth.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    /// Stable identifier (credential authority user id).
    pub id: String,
    /// Email the account reconciles under.
    pub email: String,
    /// Unique human-readable handle.
    pub handle: String,
    /// Display name shown in rooms.
    pub display_name: String,
    /// Avatar reference, if set.
    #[serde(default)]
    pub avatar_url: Option<String>,
    /// Free-text bio, if set.
    #[serde(default)]
    pub bio: Option<String>,
    /// Whether the member is currently online.
    pub is_online: bool,
    /// Last activity timestamp (RFC 3339).
    pub last_active_at: String,
    /// Privacy/notification toggles.
    #[serde(default)]
    pub settings: ProfileSettings,
    /// Activity counters.
    #[serde(default)]
    pub stats: ProfileStats,
    /// Linked external-provider identities, keyed by provider tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social_accounts: Option<BTreeMap<String, SocialAccount>>,
}

impl Profile {
    /// Get the linked account for a provider tag, if any.
    pub fn social_account(&self, provider_tag: &str) -> Option<&SocialAccount> {
        self.social_accounts
            .as_ref()
            .and_then(|accounts| accounts.get(provider_tag))
    }

    /// Provider tags currently linked to this profile.
    pub fn linked_providers(&self) -> Vec<&str> {
        self.social_accounts
            .as_ref()
            .map(|accounts| accounts.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

/// Partial update payload for a profile row.
///
/// Only populated fields are serialized, so this maps directly onto a
/// PATCH body.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_online: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_active_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<ProfileSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub social_accounts: Option<BTreeMap<String, SocialAccount>>,
}

impl ProfileUpdate {
    /// Liveness patch applied on every sign-in.
    pub fn liveness(online: bool, last_active_at: impl Into<String>) -> Self {
        Self {
            is_online: Some(online),
            last_active_at: Some(last_active_at.into()),
            ..Default::default()
        }
    }

    /// True when no field is populated.
    pub fn is_empty(&self) -> bool {
        serde_json::to_value(self)
            .map(|v| v.as_object().map(|o| o.is_empty()).unwrap_or(true))
            .unwrap_or(true)
    }
}
