//! In-memory fakes for the external seams, shared across test modules.

use crate::authority::{AuthoritySession, CredentialAuthority, RegistrationMetadata};
use crate::provider::{Provider, ProviderIdentity};
use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use roost_directory::{
    DirectoryError, DirectoryResult, Profile, ProfileDirectory, ProfileSettings, ProfileStats,
    ProfileUpdate, UniqueField,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

/// Build a provider identity for tests.
pub fn identity(provider: Provider, id: &str, handle: &str, email: &str) -> ProviderIdentity {
    ProviderIdentity {
        provider,
        id: id.to_string(),
        handle: handle.to_string(),
        display_name: handle.to_string(),
        email: Some(email.to_string()),
        avatar_url: None,
        verified: Some(true),
    }
}

/// In-memory credential authority.
///
/// User ids are stable per email, matching the real authority's behavior of
/// keying rows by email.
pub struct MemoryAuthority {
    accounts: Mutex<HashMap<String, String>>,
    user_ids: Mutex<HashMap<String, String>>,
    session: Mutex<Option<AuthoritySession>>,
    sign_in_attempts: AtomicUsize,
    forced_sign_in_failures: AtomicUsize,
    token_counter: AtomicUsize,
}

impl MemoryAuthority {
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            user_ids: Mutex::new(HashMap::new()),
            session: Mutex::new(None),
            sign_in_attempts: AtomicUsize::new(0),
            forced_sign_in_failures: AtomicUsize::new(0),
            token_counter: AtomicUsize::new(0),
        }
    }

    /// Pre-provision a credential.
    pub fn add_account(&self, email: &str, secret: &str) {
        self.accounts
            .lock()
            .unwrap()
            .insert(email.to_string(), secret.to_string());
        self.user_id_for(email);
    }

    /// Force the next `n` sign-in calls to fail with invalid credentials,
    /// regardless of the stored secret. Simulates race windows.
    pub fn fail_next_sign_ins(&self, n: usize) {
        self.forced_sign_in_failures.store(n, Ordering::SeqCst);
    }

    /// Total sign-in calls observed.
    pub fn sign_in_attempts(&self) -> usize {
        self.sign_in_attempts.load(Ordering::SeqCst)
    }

    fn user_id_for(&self, email: &str) -> String {
        let mut ids = self.user_ids.lock().unwrap();
        ids.entry(email.to_string())
            .or_insert_with(|| Uuid::new_v4().to_string())
            .clone()
    }

    fn issue_session(&self, email: &str) -> AuthoritySession {
        let token = self.token_counter.fetch_add(1, Ordering::SeqCst);
        let session = AuthoritySession {
            user_id: self.user_id_for(email),
            email: email.to_string(),
            access_token: format!("token-{token}"),
        };
        *self.session.lock().unwrap() = Some(session.clone());
        session
    }
}

#[async_trait]
impl CredentialAuthority for MemoryAuthority {
    async fn sign_in(&self, email: &str, secret: &str) -> AuthResult<AuthoritySession> {
        self.sign_in_attempts.fetch_add(1, Ordering::SeqCst);

        let forced = self.forced_sign_in_failures.load(Ordering::SeqCst);
        if forced > 0 {
            self.forced_sign_in_failures
                .store(forced - 1, Ordering::SeqCst);
            return Err(AuthError::InvalidCredentials(
                "forced failure".to_string(),
            ));
        }

        let matches = self
            .accounts
            .lock()
            .unwrap()
            .get(email)
            .map(|stored| stored == secret)
            .unwrap_or(false);

        if !matches {
            return Err(AuthError::InvalidCredentials(
                "invalid login credentials".to_string(),
            ));
        }

        Ok(self.issue_session(email))
    }

    async fn register(
        &self,
        email: &str,
        secret: &str,
        _metadata: &RegistrationMetadata,
    ) -> AuthResult<AuthoritySession> {
        {
            let mut accounts = self.accounts.lock().unwrap();
            if accounts.contains_key(email) {
                return Err(AuthError::AlreadyRegistered(email.to_string()));
            }
            accounts.insert(email.to_string(), secret.to_string());
        }
        Ok(self.issue_session(email))
    }

    async fn current_session(&self) -> AuthResult<Option<AuthoritySession>> {
        Ok(self.session.lock().unwrap().clone())
    }

    async fn sign_out(&self, _session: &AuthoritySession) -> AuthResult<()> {
        *self.session.lock().unwrap() = None;
        Ok(())
    }
}

/// In-memory profile directory with the same uniqueness constraints as the
/// real table, plus hooks for injecting race conditions.
pub struct MemoryDirectory {
    profiles: Mutex<HashMap<String, Profile>>,
    inject_before_insert: Mutex<Option<Profile>>,
    fail_insert_status: Mutex<Option<u16>>,
    fail_update_status: Mutex<Option<u16>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self {
            profiles: Mutex::new(HashMap::new()),
            inject_before_insert: Mutex::new(None),
            fail_insert_status: Mutex::new(None),
            fail_update_status: Mutex::new(None),
        }
    }

    /// Occupy a handle with a placeholder profile.
    pub fn seed_handle(&self, handle: &str) {
        let profile = Profile {
            id: format!("seed-{handle}"),
            email: format!("{handle}@seed.example.com"),
            handle: handle.to_string(),
            display_name: handle.to_string(),
            avatar_url: None,
            bio: None,
            is_online: false,
            last_active_at: chrono::Utc::now().to_rfc3339(),
            settings: ProfileSettings::default(),
            stats: ProfileStats::default(),
            social_accounts: None,
        };
        self.profiles
            .lock()
            .unwrap()
            .insert(profile.id.clone(), profile);
    }

    /// Insert this rival row immediately before the next insert runs,
    /// simulating a concurrent writer winning the race.
    pub fn inject_before_next_insert(&self, profile: Profile) {
        *self.inject_before_insert.lock().unwrap() = Some(profile);
    }

    /// Fail the next insert with an unexpected (non-conflict) status.
    pub fn fail_next_insert(&self, status: u16) {
        *self.fail_insert_status.lock().unwrap() = Some(status);
    }

    /// Fail the next update with an unexpected status.
    pub fn fail_next_update(&self, status: u16) {
        *self.fail_update_status.lock().unwrap() = Some(status);
    }

    pub fn profile_count(&self) -> usize {
        self.profiles.lock().unwrap().len()
    }

    fn constrained_insert(
        profiles: &mut HashMap<String, Profile>,
        profile: &Profile,
    ) -> DirectoryResult<Profile> {
        if profiles.contains_key(&profile.id) {
            return Err(DirectoryError::UniqueViolation(UniqueField::Identifier));
        }
        if profiles.values().any(|p| p.handle == profile.handle) {
            return Err(DirectoryError::UniqueViolation(UniqueField::Handle));
        }
        profiles.insert(profile.id.clone(), profile.clone());
        Ok(profile.clone())
    }
}

#[async_trait]
impl ProfileDirectory for MemoryDirectory {
    async fn find_by_id(&self, id: &str) -> DirectoryResult<Option<Profile>> {
        Ok(self.profiles.lock().unwrap().get(id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> DirectoryResult<Option<Profile>> {
        Ok(self
            .profiles
            .lock()
            .unwrap()
            .values()
            .find(|p| p.email == email)
            .cloned())
    }

    async fn find_by_handle(&self, handle: &str) -> DirectoryResult<Option<Profile>> {
        Ok(self
            .profiles
            .lock()
            .unwrap()
            .values()
            .find(|p| p.handle == handle)
            .cloned())
    }

    async fn insert(&self, profile: &Profile) -> DirectoryResult<Profile> {
        if let Some(status) = self.fail_insert_status.lock().unwrap().take() {
            return Err(DirectoryError::Unexpected {
                status,
                body: "injected failure".to_string(),
            });
        }

        let mut profiles = self.profiles.lock().unwrap();

        if let Some(rival) = self.inject_before_insert.lock().unwrap().take() {
            let _ = Self::constrained_insert(&mut profiles, &rival);
        }

        Self::constrained_insert(&mut profiles, profile)
    }

    async fn update(&self, id: &str, patch: &ProfileUpdate) -> DirectoryResult<()> {
        if let Some(status) = self.fail_update_status.lock().unwrap().take() {
            return Err(DirectoryError::Unexpected {
                status,
                body: "injected failure".to_string(),
            });
        }

        let mut profiles = self.profiles.lock().unwrap();
        if let Some(profile) = profiles.get_mut(id) {
            if let Some(display_name) = &patch.display_name {
                profile.display_name = display_name.clone();
            }
            if let Some(handle) = &patch.handle {
                profile.handle = handle.clone();
            }
            if let Some(avatar_url) = &patch.avatar_url {
                profile.avatar_url = Some(avatar_url.clone());
            }
            if let Some(bio) = &patch.bio {
                profile.bio = Some(bio.clone());
            }
            if let Some(is_online) = patch.is_online {
                profile.is_online = is_online;
            }
            if let Some(last_active_at) = &patch.last_active_at {
                profile.last_active_at = last_active_at.clone();
            }
            if let Some(settings) = &patch.settings {
                profile.settings = settings.clone();
            }
            if let Some(social_accounts) = &patch.social_accounts {
                profile.social_accounts = Some(social_accounts.clone());
            }
        }
        Ok(())
    }
}
