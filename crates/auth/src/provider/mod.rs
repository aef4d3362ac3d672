//! Identity provider boundary.
//!
//! The reactive layer talks to a remote identity service only through the
//! two traits defined here:
//! - [`IdentityProvider`] - account-level calls and the auth-state stream
//! - [`ProviderUser`] - calls scoped to one signed-in principal
//!
//! # Implementations
//!
//! - [`memory::MemoryIdentityProvider`] - in-process provider used by tests and the CLI demo

pub mod memory;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;

use authwatch_core::{ActionCodeSettings, IdTokenResult, Persistence, ProfileUpdate, UserProfile};

use crate::error::ProviderResult;

/// Shared handle to a provider-owned user object.
pub type UserHandle = Arc<dyn ProviderUser>;

/// Callback invoked with the signed-in handle, or `None` after sign-out.
pub type AuthStateListener = Arc<dyn Fn(Option<UserHandle>) + Send + Sync>;

/// Account-level operations of a remote identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The principal the provider currently considers signed in.
    fn current_user(&self) -> Option<UserHandle>;

    /// Register `listener` for sign-in, sign-out and session-restore events.
    ///
    /// The listener stays registered until the returned [`Subscription`] is
    /// dropped or explicitly unsubscribed.
    fn on_auth_state_changed(&self, listener: AuthStateListener) -> Subscription;

    async fn sign_in_with_email_and_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> ProviderResult<()>;

    async fn sign_out(&self) -> ProviderResult<()>;

    /// Create an account and sign it in.
    async fn create_user_with_email_and_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> ProviderResult<()>;

    async fn send_password_reset_email(
        &self,
        email: &str,
        settings: Option<&ActionCodeSettings>,
    ) -> ProviderResult<()>;

    async fn verify_password_reset_code(&self, code: &str) -> ProviderResult<()>;

    async fn confirm_password_reset(
        &self,
        code: &str,
        new_password: &SecretString,
    ) -> ProviderResult<()>;

    /// Apply an out-of-band action code (e.g. email verification).
    async fn apply_action_code(&self, code: &str) -> ProviderResult<()>;

    /// Whether [`IdentityProvider::set_persistence`] has any effect.
    fn supports_persistence(&self) -> bool {
        false
    }

    async fn set_persistence(&self, _mode: Persistence) -> ProviderResult<()> {
        Ok(())
    }
}

/// Operations scoped to one provider user.
///
/// Handles are owned by the provider; the reactive layer only keeps a shared
/// reference and re-reads [`ProviderUser::profile`] whenever it synchronizes.
#[async_trait]
pub trait ProviderUser: Send + Sync + fmt::Debug {
    /// The handle's fields as currently cached by the provider client.
    fn profile(&self) -> UserProfile;

    /// Refresh the cached fields from the provider.
    async fn reload(&self) -> ProviderResult<()>;

    async fn update_profile(&self, update: &ProfileUpdate) -> ProviderResult<()>;

    async fn update_password(&self, new_password: &SecretString) -> ProviderResult<()>;

    async fn update_email(&self, new_email: &str) -> ProviderResult<()>;

    async fn send_email_verification(
        &self,
        settings: Option<&ActionCodeSettings>,
    ) -> ProviderResult<()>;

    async fn delete(&self) -> ProviderResult<()>;

    /// Fetch the id token with its claims.
    ///
    /// `Ok(None)` means this handle cannot produce a claims token at all.
    async fn id_token_result(&self) -> ProviderResult<Option<IdTokenResult>> {
        Ok(None)
    }
}

/// Registration of an auth-state listener.
///
/// Unsubscribes when dropped.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Wrap the provider-specific unsubscribe action.
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Remove the listener now.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_subscription_cancels_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let sub = Subscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        sub.unsubscribe();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscription_cancels_on_drop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        drop(Subscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
