//! Reactive snapshot of one authenticated principal.
//!
//! The snapshot mirrors the fields of a provider user handle into a single
//! `watch` cell. Every synchronization writes all fields, the storage path
//! and the retained handle at once; the admin flag follows later from the
//! claims token.

use std::fmt;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use authwatch_core::{ActionCodeSettings, ProfileUpdate, StoragePath, Uid};
use secrecy::SecretString;

use crate::config::SnapshotSettings;
use crate::error::IdentityError;
use crate::operation::Operation;
use crate::provider::UserHandle;

pub const UPDATE_PROFILE: &str = "update_profile";
pub const UPDATE_PASSWORD: &str = "update_password";
pub const UPDATE_EMAIL: &str = "update_email";
pub const SEND_EMAIL_VERIFICATION: &str = "send_email_verification";
pub const DELETE_USER: &str = "delete_user";

/// Observable fields of an [`IdentityUserSnapshot`].
#[derive(Clone)]
pub struct UserFields {
    pub id: Uid,
    pub email: Option<String>,
    pub is_email_verified: bool,
    pub phone_number: Option<String>,
    pub provider_id: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    /// Whether the claims token carries the configured admin claim.
    pub is_admin: bool,
    /// Document path of this user, e.g. `users/{id}`.
    pub path: StoragePath,
    handle: UserHandle,
}

impl UserFields {
    /// Read every field from `handle` in one go.
    ///
    /// `force_email_verified` overrides a stale verification flag, e.g. right
    /// after an action code was applied.
    fn capture(
        handle: UserHandle,
        force_email_verified: bool,
        is_admin: bool,
        settings: &SnapshotSettings,
    ) -> Self {
        let profile = handle.profile();
        let path = StoragePath::for_user(&settings.users_collection, &profile.uid);
        Self {
            id: profile.uid,
            email: profile.email,
            is_email_verified: profile.email_verified || force_email_verified,
            phone_number: profile.phone_number,
            provider_id: profile.provider_id,
            display_name: profile.display_name,
            photo_url: profile.photo_url,
            is_admin,
            path,
            handle,
        }
    }
}

impl PartialEq for UserFields {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.email == other.email
            && self.is_email_verified == other.is_email_verified
            && self.phone_number == other.phone_number
            && self.provider_id == other.provider_id
            && self.display_name == other.display_name
            && self.photo_url == other.photo_url
            && self.is_admin == other.is_admin
            && self.path == other.path
            && Arc::ptr_eq(&self.handle, &other.handle)
    }
}

impl fmt::Debug for UserFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserFields")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("is_email_verified", &self.is_email_verified)
            .field("phone_number", &self.phone_number)
            .field("provider_id", &self.provider_id)
            .field("display_name", &self.display_name)
            .field("photo_url", &self.photo_url)
            .field("is_admin", &self.is_admin)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Reactive view of one signed-in user.
///
/// Owns its own [`Operation`], so user-scoped mutations are single-flight
/// per snapshot and independent from session-level operations.
#[derive(Debug)]
pub struct IdentityUserSnapshot {
    state: Arc<watch::Sender<UserFields>>,
    operation: Operation,
    settings: Arc<SnapshotSettings>,
}

impl IdentityUserSnapshot {
    /// Create a snapshot of `handle` and start its claims refresh.
    #[must_use]
    pub fn new(handle: UserHandle, settings: Arc<SnapshotSettings>) -> Self {
        let fields = UserFields::capture(Arc::clone(&handle), false, false, &settings);
        debug!(uid = %fields.id, path = %fields.path, "user snapshot created");
        let snapshot = Self {
            state: Arc::new(watch::Sender::new(fields)),
            operation: Operation::new(),
            settings,
        };
        snapshot.refresh_admin_claim(handle);
        snapshot
    }

    /// Re-read every field from `handle` and retain it.
    ///
    /// The fields land in one write; the admin flag is refreshed afterwards
    /// in the background and keeps its previous value until then.
    pub fn synchronize(&self, handle: UserHandle, force_email_verified: bool) {
        let settings = &self.settings;
        let fields_handle = Arc::clone(&handle);
        self.state.send_if_modified(|fields| {
            let next =
                UserFields::capture(fields_handle, force_email_verified, fields.is_admin, settings);
            if *fields == next {
                return false;
            }
            debug!(uid = %next.id, "user snapshot synchronized");
            *fields = next;
            true
        });
        self.refresh_admin_claim(handle);
    }

    /// Fetch the claims token and apply the admin flag.
    ///
    /// Needs a tokio runtime; without one the flag is left as is. The result
    /// is dropped if the snapshot has moved on to another uid.
    fn refresh_admin_claim(&self, handle: UserHandle) {
        let Ok(runtime) = Handle::try_current() else {
            debug!("no async runtime, skipping admin claim refresh");
            return;
        };
        let state = Arc::downgrade(&self.state);
        let claim = self.settings.admin_claim.clone();
        let uid = self.state.borrow().id.clone();

        runtime.spawn(async move {
            match handle.id_token_result().await {
                Ok(Some(token)) => {
                    let is_admin = token.flag(&claim);
                    let Some(state) = state.upgrade() else {
                        return;
                    };
                    let applied = state.send_if_modified(|fields| {
                        if fields.id != uid || fields.is_admin == is_admin {
                            return false;
                        }
                        fields.is_admin = is_admin;
                        true
                    });
                    if applied {
                        debug!(uid = %uid, is_admin, "admin claim applied");
                    }
                }
                Ok(None) => {
                    debug!(uid = %uid, "user handle has no claims token");
                }
                Err(err) => {
                    warn!(uid = %uid, error = %err, "failed to refresh admin claim");
                }
            }
        });
    }

    /// Reload the retained handle from the provider, then synchronize.
    ///
    /// # Errors
    ///
    /// Returns the provider's error unchanged if the reload fails.
    pub async fn reload(&self, force_email_verified: bool) -> Result<(), IdentityError> {
        let handle = self.provider_user();
        handle.reload().await?;
        self.synchronize(handle, force_email_verified);
        Ok(())
    }

    /// Update display name and/or photo URL.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::ConcurrentOperation`] while another user
    /// operation runs, or the provider's error.
    #[instrument(skip(self, update), fields(uid = %self.id()))]
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<(), IdentityError> {
        let handle = self.provider_user();
        self.operation
            .start_then(
                UPDATE_PROFILE,
                |_| async {
                    handle.update_profile(&update).await?;
                    Ok(())
                },
                || self.synchronize(Arc::clone(&handle), false),
            )
            .await
    }

    /// # Errors
    ///
    /// Returns [`IdentityError::ConcurrentOperation`] while another user
    /// operation runs, or the provider's error.
    #[instrument(skip(self, new_password), fields(uid = %self.id()))]
    pub async fn update_password(&self, new_password: &SecretString) -> Result<(), IdentityError> {
        let handle = self.provider_user();
        self.operation
            .start(UPDATE_PASSWORD, |_| async move {
                handle.update_password(new_password).await?;
                Ok(())
            })
            .await
    }

    /// Change the email address and re-synchronize on success.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::ConcurrentOperation`] while another user
    /// operation runs, or the provider's error.
    #[instrument(skip(self), fields(uid = %self.id()))]
    pub async fn update_email(&self, new_email: &str) -> Result<(), IdentityError> {
        let handle = self.provider_user();
        self.operation
            .start_then(
                UPDATE_EMAIL,
                |_| async {
                    handle.update_email(new_email).await?;
                    Ok(())
                },
                || self.synchronize(Arc::clone(&handle), false),
            )
            .await
    }

    /// # Errors
    ///
    /// Returns [`IdentityError::ConcurrentOperation`] while another user
    /// operation runs, or the provider's error.
    #[instrument(skip(self, settings), fields(uid = %self.id()))]
    pub async fn send_email_verification(
        &self,
        settings: Option<&ActionCodeSettings>,
    ) -> Result<(), IdentityError> {
        let handle = self.provider_user();
        self.operation
            .start(SEND_EMAIL_VERIFICATION, |_| async move {
                handle.send_email_verification(settings).await?;
                Ok(())
            })
            .await
    }

    /// Delete the account at the provider.
    ///
    /// The snapshot itself is cleared by the session once the provider
    /// reports the sign-out.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::ConcurrentOperation`] while another user
    /// operation runs, or the provider's error.
    #[instrument(skip(self), fields(uid = %self.id()))]
    pub async fn delete(&self) -> Result<(), IdentityError> {
        let handle = self.provider_user();
        self.operation
            .start(DELETE_USER, |_| async move {
                handle.delete().await?;
                Ok(())
            })
            .await
    }

    /// A consistent copy of every field.
    #[must_use]
    pub fn fields(&self) -> UserFields {
        self.state.borrow().clone()
    }

    /// Receiver notified whenever a synchronization or claims refresh lands.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<UserFields> {
        self.state.subscribe()
    }

    /// The retained provider handle.
    #[must_use]
    pub fn provider_user(&self) -> UserHandle {
        Arc::clone(&self.state.borrow().handle)
    }

    #[must_use]
    pub const fn operation(&self) -> &Operation {
        &self.operation
    }

    #[must_use]
    pub fn id(&self) -> Uid {
        self.state.borrow().id.clone()
    }

    #[must_use]
    pub fn email(&self) -> Option<String> {
        self.state.borrow().email.clone()
    }

    #[must_use]
    pub fn is_email_verified(&self) -> bool {
        self.state.borrow().is_email_verified
    }

    #[must_use]
    pub fn phone_number(&self) -> Option<String> {
        self.state.borrow().phone_number.clone()
    }

    #[must_use]
    pub fn provider_id(&self) -> String {
        self.state.borrow().provider_id.clone()
    }

    #[must_use]
    pub fn display_name(&self) -> Option<String> {
        self.state.borrow().display_name.clone()
    }

    #[must_use]
    pub fn photo_url(&self) -> Option<String> {
        self.state.borrow().photo_url.clone()
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.state.borrow().is_admin
    }

    #[must_use]
    pub fn path(&self) -> StoragePath {
        self.state.borrow().path.clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use serde_json::{Map, Value};
    use tokio::time::timeout;

    use super::*;
    use crate::error::ProviderError;
    use crate::provider::memory::{codes, MemoryIdentityProvider};
    use crate::provider::IdentityProvider;

    const WAIT: Duration = Duration::from_secs(2);

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_owned())
    }

    async fn signed_in(provider: &MemoryIdentityProvider) -> UserHandle {
        provider.add_account("u1", "a@x.com", "hunter22").unwrap();
        provider
            .sign_in_with_email_and_password("a@x.com", &secret("hunter22"))
            .await
            .unwrap();
        provider.current_user().unwrap()
    }

    fn snapshot(handle: UserHandle) -> IdentityUserSnapshot {
        IdentityUserSnapshot::new(handle, Arc::new(SnapshotSettings::default()))
    }

    #[tokio::test]
    async fn test_new_captures_all_fields() {
        let provider = MemoryIdentityProvider::new();
        let handle = signed_in(&provider).await;
        let user = snapshot(Arc::clone(&handle));

        let fields = user.fields();
        assert_eq!(fields.id.as_str(), "u1");
        assert_eq!(fields.email.as_deref(), Some("a@x.com"));
        assert!(!fields.is_email_verified);
        assert_eq!(fields.provider_id, "password");
        assert_eq!(fields.path.as_str(), "users/u1");
        assert!(Arc::ptr_eq(&user.provider_user(), &handle));
    }

    #[tokio::test]
    async fn test_path_uses_configured_collection() {
        let provider = MemoryIdentityProvider::new();
        let handle = signed_in(&provider).await;
        let settings = SnapshotSettings {
            users_collection: "members".into(),
            ..SnapshotSettings::default()
        };
        let user = IdentityUserSnapshot::new(handle, Arc::new(settings));
        assert_eq!(user.path().as_str(), "members/u1");
    }

    #[tokio::test]
    async fn test_synchronize_forces_email_verified() {
        let provider = MemoryIdentityProvider::new();
        let handle = signed_in(&provider).await;
        let user = snapshot(Arc::clone(&handle));

        user.synchronize(Arc::clone(&handle), true);
        assert!(user.is_email_verified());

        user.synchronize(handle, false);
        assert!(!user.is_email_verified());
    }

    #[tokio::test]
    async fn test_synchronize_is_one_notification() {
        let provider = MemoryIdentityProvider::new().without_claims_support();
        let handle = signed_in(&provider).await;
        let user = snapshot(Arc::clone(&handle));
        let mut rx = user.subscribe();

        provider.set_phone_number(&user.id(), Some("+15550100".into())).unwrap();
        provider.set_email_verified(&user.id(), true).unwrap();
        handle.reload().await.unwrap();
        user.synchronize(handle, false);

        assert!(rx.has_changed().unwrap());
        let fields = rx.borrow_and_update().clone();
        assert!(fields.is_email_verified);
        assert_eq!(fields.phone_number.as_deref(), Some("+15550100"));
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_reload_picks_up_provider_changes() {
        let provider = MemoryIdentityProvider::new();
        let handle = signed_in(&provider).await;
        let user = snapshot(handle);

        provider.set_email_verified(&user.id(), true).unwrap();
        assert!(!user.is_email_verified());
        user.reload(false).await.unwrap();
        assert!(user.is_email_verified());
    }

    #[tokio::test]
    async fn test_reload_propagates_provider_error() {
        let provider = MemoryIdentityProvider::new();
        let handle = signed_in(&provider).await;
        let user = snapshot(handle);

        provider.fail_next(ProviderError::new("network-request-failed", "offline"));
        let err = user.reload(false).await.unwrap_err();
        assert!(err.as_provider().unwrap().is("network-request-failed"));
    }

    #[tokio::test]
    async fn test_admin_claim_is_applied_after_fields() {
        let provider = MemoryIdentityProvider::new();
        let uid = provider.add_account("u1", "a@x.com", "hunter22").unwrap();
        let mut claims = Map::new();
        claims.insert("admin".into(), Value::Bool(true));
        provider.set_custom_claims(&uid, claims).unwrap();
        provider
            .sign_in_with_email_and_password("a@x.com", &secret("hunter22"))
            .await
            .unwrap();

        let user = snapshot(provider.current_user().unwrap());
        let mut rx = user.subscribe();
        timeout(WAIT, rx.wait_for(|fields| fields.is_admin))
            .await
            .unwrap()
            .unwrap();
        assert!(user.is_admin());
    }

    #[tokio::test]
    async fn test_admin_claim_uses_configured_key() {
        let provider = MemoryIdentityProvider::new();
        let uid = provider.add_account("u1", "a@x.com", "hunter22").unwrap();
        let mut claims = Map::new();
        claims.insert("admin".into(), Value::Bool(false));
        claims.insert("staff".into(), Value::Bool(true));
        provider.set_custom_claims(&uid, claims).unwrap();
        provider
            .sign_in_with_email_and_password("a@x.com", &secret("hunter22"))
            .await
            .unwrap();

        let settings = SnapshotSettings {
            admin_claim: "staff".into(),
            ..SnapshotSettings::default()
        };
        let user = IdentityUserSnapshot::new(provider.current_user().unwrap(), Arc::new(settings));
        let mut rx = user.subscribe();
        timeout(WAIT, rx.wait_for(|fields| fields.is_admin))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_no_claims_support_leaves_admin_false() {
        let provider = MemoryIdentityProvider::new().without_claims_support();
        let handle = signed_in(&provider).await;
        let user = snapshot(handle);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!user.is_admin());
    }

    #[test]
    fn test_new_without_runtime_skips_claims() {
        let provider = MemoryIdentityProvider::new();
        provider.add_account("u1", "a@x.com", "hunter22").unwrap();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        runtime
            .block_on(provider.sign_in_with_email_and_password("a@x.com", &secret("hunter22")))
            .unwrap();
        drop(runtime);

        let user = snapshot(provider.current_user().unwrap());
        assert_eq!(user.id().as_str(), "u1");
        assert!(!user.is_admin());
    }

    #[tokio::test]
    async fn test_update_email_resynchronizes() {
        let provider = MemoryIdentityProvider::new();
        let handle = signed_in(&provider).await;
        let user = snapshot(handle);

        user.update_email("b@x.com").await.unwrap();
        assert_eq!(user.email().as_deref(), Some("b@x.com"));
        assert!(!user.operation().in_progress());
        assert_eq!(user.operation().name(), UPDATE_EMAIL);
    }

    #[tokio::test]
    async fn test_update_email_failure_keeps_fields() {
        let provider = MemoryIdentityProvider::new();
        let handle = signed_in(&provider).await;
        let user = snapshot(handle);

        let err = user.update_email("not-an-email").await.unwrap_err();
        assert!(err.as_provider().unwrap().is(codes::INVALID_EMAIL));
        assert_eq!(user.email().as_deref(), Some("a@x.com"));
        assert_eq!(user.operation().error(), Some(err));
    }

    #[tokio::test]
    async fn test_update_profile_resynchronizes() {
        let provider = MemoryIdentityProvider::new();
        let handle = signed_in(&provider).await;
        let user = snapshot(handle);

        user.update_profile(
            ProfileUpdate::default()
                .display_name("Ada")
                .photo_url("https://img.example/ada.png"),
        )
        .await
        .unwrap();
        assert_eq!(user.display_name().as_deref(), Some("Ada"));
        assert_eq!(user.photo_url().as_deref(), Some("https://img.example/ada.png"));
    }

    #[tokio::test]
    async fn test_update_password() {
        let provider = MemoryIdentityProvider::new();
        let handle = signed_in(&provider).await;
        let user = snapshot(handle);

        let err = user.update_password(&secret("123")).await.unwrap_err();
        assert!(err.as_provider().unwrap().is(codes::WEAK_PASSWORD));

        user.update_password(&secret("correct horse")).await.unwrap();
        assert!(provider.password_matches("a@x.com", "correct horse"));
    }

    #[tokio::test]
    async fn test_send_email_verification_uses_outbox() {
        let provider = MemoryIdentityProvider::new();
        let handle = signed_in(&provider).await;
        let user = snapshot(handle);
        let settings = ActionCodeSettings::continue_to("https://app.example/verified");

        user.send_email_verification(Some(&settings)).await.unwrap();
        let sent = provider.sent_codes();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].email, "a@x.com");
        assert_eq!(sent[0].settings.as_ref(), Some(&settings));
    }

    #[tokio::test]
    async fn test_user_operations_are_single_flight() {
        let provider = MemoryIdentityProvider::new().with_latency(Duration::from_millis(50));
        let handle = signed_in(&provider).await;
        let user = snapshot(handle);

        let (first, second) = tokio::join!(user.update_email("b@x.com"), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            user.delete().await
        });
        first.unwrap();
        assert_eq!(
            second.unwrap_err(),
            IdentityError::ConcurrentOperation {
                running: UPDATE_EMAIL.into()
            }
        );
    }

    #[tokio::test]
    async fn test_delete_signs_out_at_provider() {
        let provider = MemoryIdentityProvider::new();
        let handle = signed_in(&provider).await;
        let user = snapshot(handle);

        user.delete().await.unwrap();
        assert!(provider.current_user().is_none());
    }
}
