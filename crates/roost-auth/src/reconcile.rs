//! Identity reconciliation engine.
//!
//! Turns a proof of identity (a password sign-in or a completed federated
//! exchange) into exactly one canonical profile and one authority session.
//! Collisions with concurrent sign-ups are resolved through the directory's
//! uniqueness constraints: an identifier conflict means the row already
//! exists (re-fetch it), a handle conflict gets one retry with a timestamped
//! candidate.

use crate::authority::{AuthoritySession, CredentialAuthority, RegistrationMetadata};
use crate::bridge::{bridge_secret, CredentialBridge};
use crate::handle::{timestamped, HandleAllocator};
use crate::provider::{Provider, ProviderIdentity};
use crate::{AuthError, AuthResult};
use roost_directory::{
    DirectoryError, Profile, ProfileDirectory, ProfileSettings, ProfileStats, ProfileUpdate,
    SocialAccount, UniqueField,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A successful reconciliation: the canonical profile and the session that
/// proves it. Never partially populated.
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub profile: Profile,
    pub session: AuthoritySession,
    /// Whether the proof of identity came from a federated provider. The
    /// embedder uses this to trigger its post-sign-in redirect.
    pub federated: bool,
}

/// The orchestrator between the credential authority, the profile directory,
/// and the credential bridge.
pub struct Reconciler {
    authority: Arc<dyn CredentialAuthority>,
    directory: Arc<dyn ProfileDirectory>,
    bridge: CredentialBridge,
    handles: HandleAllocator,
    legacy_bridge_sign_in: bool,
}

impl Reconciler {
    /// Create a reconciler over the two external seams.
    ///
    /// `legacy_bridge_sign_in` enables the migration shim that retries a
    /// failed password sign-in with the per-provider bridge secrets.
    pub fn new(
        authority: Arc<dyn CredentialAuthority>,
        directory: Arc<dyn ProfileDirectory>,
        legacy_bridge_sign_in: bool,
    ) -> Self {
        Self {
            bridge: CredentialBridge::new(authority.clone()),
            handles: HandleAllocator::new(directory.clone()),
            authority,
            directory,
            legacy_bridge_sign_in,
        }
    }

    /// Direct credential sign-in.
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> AuthResult<Reconciled> {
        let session = match self.authority.sign_in(email, password).await {
            Ok(session) => session,
            Err(AuthError::InvalidCredentials(reason)) if self.legacy_bridge_sign_in => {
                self.legacy_bridge_fallback(email, reason).await?
            }
            Err(e) => return Err(e),
        };

        let profile = self.load_or_create(&session, None).await?;
        info!(user_id = %session.user_id, "Password sign-in reconciled");

        Ok(Reconciled {
            profile,
            session,
            federated: false,
        })
    }

    /// Federated sign-in with an identity from a completed redirect exchange.
    pub async fn sign_in_federated(&self, identity: &ProviderIdentity) -> AuthResult<Reconciled> {
        let email = identity.effective_email();
        let metadata = RegistrationMetadata {
            display_name: Some(identity.display_name.clone()),
            provider: Some(identity.provider.tag().to_string()),
        };

        if let Some(profile) = self.directory.find_by_email(&email).await? {
            debug!(
                profile_id = %profile.id,
                provider = %identity.provider,
                "Existing profile found for federated email"
            );
            let (session, _) = self
                .bridge
                .session_for_identity(identity.provider, &email, &metadata)
                .await?;
            let profile = self.touch(profile, Some(identity)).await?;
            info!(
                user_id = %session.user_id,
                provider = %identity.provider,
                "Federated sign-in reconciled to existing profile"
            );
            return Ok(Reconciled {
                profile,
                session,
                federated: true,
            });
        }

        let (session, _) = self
            .bridge
            .sign_in_or_register(&email, &bridge_secret(identity.provider), &metadata)
            .await?;
        let profile = self.load_or_create(&session, Some(identity)).await?;
        info!(
            user_id = %session.user_id,
            provider = %identity.provider,
            handle = %profile.handle,
            "Federated sign-in created or adopted profile"
        );

        Ok(Reconciled {
            profile,
            session,
            federated: true,
        })
    }

    /// Reconcile an already-established authority session (startup check,
    /// session-change notification).
    pub async fn reconcile_session(&self, session: AuthoritySession) -> AuthResult<Reconciled> {
        let profile = self.load_or_create(&session, None).await?;
        Ok(Reconciled {
            profile,
            session,
            federated: false,
        })
    }

    /// Best-effort offline marking, used on sign-out.
    pub async fn mark_offline(&self, profile_id: &str) {
        let patch = ProfileUpdate::liveness(false, chrono::Utc::now().to_rfc3339());
        if let Err(e) = self.directory.update(profile_id, &patch).await {
            warn!(profile_id = %profile_id, error = %e, "Failed to mark profile offline");
        }
    }

    /// Migration shim: try each provider's bridge secret in the fixed order.
    async fn legacy_bridge_fallback(
        &self,
        email: &str,
        original_reason: String,
    ) -> AuthResult<AuthoritySession> {
        warn!(email = %email, "Password rejected, trying legacy bridge fallbacks");
        for provider in Provider::ALL {
            match self
                .authority
                .sign_in(email, &bridge_secret(provider))
                .await
            {
                Ok(session) => {
                    info!(provider = %provider, "Legacy bridge fallback matched");
                    return Ok(session);
                }
                Err(AuthError::InvalidCredentials(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(AuthError::InvalidCredentials(original_reason))
    }

    async fn load_or_create(
        &self,
        session: &AuthoritySession,
        identity: Option<&ProviderIdentity>,
    ) -> AuthResult<Profile> {
        if let Some(profile) = self.directory.find_by_id(&session.user_id).await? {
            return self.touch(profile, identity).await;
        }
        self.create_profile(session, identity).await
    }

    async fn create_profile(
        &self,
        session: &AuthoritySession,
        identity: Option<&ProviderIdentity>,
    ) -> AuthResult<Profile> {
        let base = match identity {
            Some(identity) => identity.handle_base().to_string(),
            None => email_local_part(&session.email).to_string(),
        };
        let handle = self.handles.allocate(&base).await?;
        let profile = self.new_profile(session, identity, handle);

        match self.directory.insert(&profile).await {
            Ok(inserted) => {
                info!(profile_id = %inserted.id, handle = %inserted.handle, "Profile created");
                Ok(inserted)
            }
            Err(DirectoryError::UniqueViolation(UniqueField::Identifier)) => {
                // Benign race: the row was created concurrently.
                debug!(user_id = %session.user_id, "Profile row created concurrently, re-fetching");
                self.refetch_after_race(session, identity).await
            }
            Err(DirectoryError::UniqueViolation(UniqueField::Handle)) => {
                let mut retry = profile.clone();
                retry.handle = timestamped(&base);
                debug!(handle = %retry.handle, "Handle collided at insert, retrying once");
                match self.directory.insert(&retry).await {
                    Ok(inserted) => Ok(inserted),
                    Err(DirectoryError::UniqueViolation(UniqueField::Identifier)) => {
                        self.refetch_after_race(session, identity).await
                    }
                    Err(e) => Err(AuthError::ProfileCreationFailed(e.to_string())),
                }
            }
            Err(e) => Err(AuthError::ProfileCreationFailed(e.to_string())),
        }
    }

    async fn refetch_after_race(
        &self,
        session: &AuthoritySession,
        identity: Option<&ProviderIdentity>,
    ) -> AuthResult<Profile> {
        match self.directory.find_by_id(&session.user_id).await? {
            Some(existing) => self.touch(existing, identity).await,
            None => Err(AuthError::ProfileCreationFailed(
                "identifier conflict reported but row is missing".to_string(),
            )),
        }
    }

    fn new_profile(
        &self,
        session: &AuthoritySession,
        identity: Option<&ProviderIdentity>,
        handle: String,
    ) -> Profile {
        let now = chrono::Utc::now().to_rfc3339();
        let social_accounts = identity.map(|identity| {
            let mut accounts = BTreeMap::new();
            accounts.insert(identity.provider.tag().to_string(), social_entry(identity));
            accounts
        });

        Profile {
            id: session.user_id.clone(),
            email: session.email.clone(),
            handle,
            display_name: match identity {
                Some(identity) => identity.display_name.clone(),
                None => email_local_part(&session.email).to_string(),
            },
            avatar_url: identity.and_then(|i| i.avatar_url.clone()),
            bio: None,
            is_online: true,
            last_active_at: now,
            settings: ProfileSettings::default(),
            stats: ProfileStats::default(),
            social_accounts,
        }
    }

    /// Liveness update on every sign-in, plus the social-accounts entry when
    /// the proof came from a provider. Best-effort: a failed write is logged,
    /// not surfaced.
    async fn touch(
        &self,
        mut profile: Profile,
        identity: Option<&ProviderIdentity>,
    ) -> AuthResult<Profile> {
        let now = chrono::Utc::now().to_rfc3339();
        let mut patch = ProfileUpdate::liveness(true, now.clone());
        profile.is_online = true;
        profile.last_active_at = now;

        if let Some(identity) = identity {
            let mut accounts = profile.social_accounts.take().unwrap_or_default();
            accounts.insert(identity.provider.tag().to_string(), social_entry(identity));
            patch.social_accounts = Some(accounts.clone());
            profile.social_accounts = Some(accounts);
        }

        if let Err(e) = self.directory.update(&profile.id, &patch).await {
            warn!(profile_id = %profile.id, error = %e, "Failed to write liveness update");
        }
        Ok(profile)
    }
}

fn social_entry(identity: &ProviderIdentity) -> SocialAccount {
    SocialAccount {
        user_id: identity.id.clone(),
        handle: identity.handle.clone(),
        verified: identity.verified.unwrap_or(false),
    }
}

fn email_local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or("member")
}
