//! Reactive identity session.
//!
//! [`IdentitySession`] listens to the provider's auth-state stream and keeps
//! zero or one [`IdentityUserSnapshot`] in sync with it. Session-level
//! mutations (sign-in, sign-up, password reset, ...) run through the
//! session's own [`Operation`].

use std::fmt;
use std::sync::{Arc, Weak};

use secrecy::SecretString;
use tokio::sync::watch;
use tracing::{debug, info, instrument};

use authwatch_core::{ActionCodeSettings, Persistence, Uid};

use crate::config::SnapshotSettings;
use crate::error::IdentityError;
use crate::operation::Operation;
use crate::provider::{IdentityProvider, Subscription, UserHandle};
use crate::user::IdentityUserSnapshot;

pub const SIGN_IN: &str = "sign_in_with_email_and_password";
pub const SIGN_OUT: &str = "sign_out";
pub const SIGN_UP: &str = "sign_up";
pub const VERIFY_PASSWORD_RESET_CODE: &str = "verify_password_reset_code";
pub const SEND_PASSWORD_RESET_EMAIL: &str = "send_password_reset_email";
pub const CONFIRM_PASSWORD_RESET: &str = "confirm_password_reset";
pub const CONFIRM_VERIFY_EMAIL: &str = "confirm_verify_email";

/// Current snapshot, shared with the provider listener.
type UserCell = watch::Sender<Option<Arc<IdentityUserSnapshot>>>;

struct SessionShared {
    user: UserCell,
    settings: Arc<SnapshotSettings>,
}

impl SessionShared {
    /// Reconcile the snapshot with what the provider reports.
    fn on_auth_state_changed(&self, reported: Option<UserHandle>) {
        let reported = reported.map(|handle| {
            let uid = handle.profile().uid;
            (handle, uid)
        });

        self.user.send_if_modified(|current| {
            let live = current.as_ref().map(|snapshot| snapshot.id());
            match (reported, live) {
                (Some((handle, uid)), None) => {
                    info!(uid = %uid, "user signed in");
                    *current = Some(Arc::new(IdentityUserSnapshot::new(
                        handle,
                        Arc::clone(&self.settings),
                    )));
                    true
                }
                (Some((handle, uid)), Some(live)) if uid == live => {
                    if let Some(snapshot) = current.as_ref() {
                        snapshot.synchronize(handle, false);
                    }
                    false
                }
                (Some((handle, uid)), Some(live)) => {
                    info!(uid = %uid, previous = %live, "signed-in user changed");
                    *current = Some(Arc::new(IdentityUserSnapshot::new(
                        handle,
                        Arc::clone(&self.settings),
                    )));
                    true
                }
                (None, Some(live)) => {
                    info!(uid = %live, "user signed out");
                    *current = None;
                    true
                }
                (None, None) => false,
            }
        });
    }
}

/// Reactive view of the provider's authentication state.
pub struct IdentitySession {
    shared: Arc<SessionShared>,
    provider: Arc<dyn IdentityProvider>,
    operation: Operation,
    _subscription: Subscription,
}

impl IdentitySession {
    /// Seed from the provider's current user, then follow its auth-state stream.
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>, settings: SnapshotSettings) -> Self {
        let shared = Arc::new(SessionShared {
            user: watch::Sender::new(None),
            settings: Arc::new(settings),
        });
        shared.on_auth_state_changed(provider.current_user());

        let listener: Weak<SessionShared> = Arc::downgrade(&shared);
        let subscription = provider.on_auth_state_changed(Arc::new(move |handle| {
            if let Some(shared) = listener.upgrade() {
                shared.on_auth_state_changed(handle);
            }
        }));
        debug!("identity session subscribed to provider");

        Self {
            shared,
            provider,
            operation: Operation::new(),
            _subscription: subscription,
        }
    }

    /// # Errors
    ///
    /// Returns [`IdentityError::ConcurrentOperation`] while another session
    /// operation runs, or the provider's error.
    #[instrument(skip(self, password))]
    pub async fn sign_in_with_email_and_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<(), IdentityError> {
        let provider = &self.provider;
        self.operation
            .start(SIGN_IN, |_| async move {
                provider.sign_in_with_email_and_password(email, password).await?;
                Ok(())
            })
            .await
    }

    /// # Errors
    ///
    /// Returns [`IdentityError::ConcurrentOperation`] while another session
    /// operation runs, or the provider's error.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<(), IdentityError> {
        let provider = &self.provider;
        self.operation
            .start(SIGN_OUT, |_| async move {
                provider.sign_out().await?;
                Ok(())
            })
            .await
    }

    /// Check a password-reset code without consuming it.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::ConcurrentOperation`] while another session
    /// operation runs, or the provider's error for an invalid code.
    #[instrument(skip(self, code))]
    pub async fn verify_password_reset_code(&self, code: &str) -> Result<(), IdentityError> {
        let provider = &self.provider;
        self.operation
            .start(VERIFY_PASSWORD_RESET_CODE, |_| async move {
                provider.verify_password_reset_code(code).await?;
                Ok(())
            })
            .await
    }

    /// # Errors
    ///
    /// Returns [`IdentityError::ConcurrentOperation`] while another session
    /// operation runs, or the provider's error.
    #[instrument(skip(self, settings))]
    pub async fn send_password_reset_email(
        &self,
        email: &str,
        settings: Option<&ActionCodeSettings>,
    ) -> Result<(), IdentityError> {
        let provider = &self.provider;
        self.operation
            .start(SEND_PASSWORD_RESET_EMAIL, |_| async move {
                provider.send_password_reset_email(email, settings).await?;
                Ok(())
            })
            .await
    }

    /// # Errors
    ///
    /// Returns [`IdentityError::ConcurrentOperation`] while another session
    /// operation runs, or the provider's error.
    #[instrument(skip(self, code, new_password))]
    pub async fn confirm_password_reset(
        &self,
        code: &str,
        new_password: &SecretString,
    ) -> Result<(), IdentityError> {
        let provider = &self.provider;
        self.operation
            .start(CONFIRM_PASSWORD_RESET, |_| async move {
                provider.confirm_password_reset(code, new_password).await?;
                Ok(())
            })
            .await
    }

    /// Apply an email-verification code, then reload the signed-in user with
    /// its verification flag forced on.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::ConcurrentOperation`] while another session
    /// operation runs, or the provider's error from applying the code or
    /// reloading the user.
    #[instrument(skip(self, code))]
    pub async fn confirm_verify_email(&self, code: &str) -> Result<(), IdentityError> {
        let provider = &self.provider;
        self.operation
            .start(CONFIRM_VERIFY_EMAIL, |_| async move {
                provider.apply_action_code(code).await?;
                if let Some(user) = self.user() {
                    user.reload(true).await?;
                }
                Ok(())
            })
            .await
    }

    /// Create an account and sign it in.
    ///
    /// `persistence` is applied first when the provider supports it.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::ConcurrentOperation`] while another session
    /// operation runs, or the provider's error.
    #[instrument(skip(self, password))]
    pub async fn sign_up(
        &self,
        email: &str,
        password: &SecretString,
        persistence: Persistence,
    ) -> Result<(), IdentityError> {
        let provider = &self.provider;
        self.operation
            .start(SIGN_UP, |_| async move {
                if provider.supports_persistence() {
                    provider.set_persistence(persistence).await?;
                }
                provider
                    .create_user_with_email_and_password(email, password)
                    .await?;
                Ok(())
            })
            .await
    }

    /// Create an account, remembering the session unless `dont_remember`.
    ///
    /// # Errors
    ///
    /// Same as [`IdentitySession::sign_up`].
    #[deprecated(note = "use `sign_up` with an explicit `Persistence`")]
    pub async fn create_user_with_email_and_password(
        &self,
        email: &str,
        password: &SecretString,
        dont_remember: bool,
    ) -> Result<(), IdentityError> {
        self.sign_up(email, password, Persistence::remembered(!dont_remember))
            .await
    }

    /// The signed-in user, if any.
    #[must_use]
    pub fn user(&self) -> Option<Arc<IdentityUserSnapshot>> {
        self.shared.user.borrow().clone()
    }

    #[must_use]
    pub fn user_id(&self) -> Option<Uid> {
        self.shared.user.borrow().as_ref().map(|user| user.id())
    }

    /// Receiver notified when a user signs in, signs out or is replaced.
    ///
    /// Field changes of the same user are published on the snapshot's own
    /// [`IdentityUserSnapshot::subscribe`].
    #[must_use]
    pub fn subscribe_user(&self) -> watch::Receiver<Option<Arc<IdentityUserSnapshot>>> {
        self.shared.user.subscribe()
    }

    #[must_use]
    pub const fn operation(&self) -> &Operation {
        &self.operation
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<dyn IdentityProvider> {
        &self.provider
    }
}

impl fmt::Debug for IdentitySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentitySession")
            .field("user_id", &self.user_id())
            .field("operation", &self.operation)
            .finish_non_exhaustive()
    }
}
