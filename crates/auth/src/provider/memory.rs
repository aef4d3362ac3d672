//! In-process identity provider.
//!
//! Behaves like a hosted email/password provider closely enough to drive the
//! session end to end. Action emails land in an outbox that tests and the
//! CLI read codes from.
//!
//! User handles cache their profile and only refresh it on
//! [`ProviderUser::reload`], the way a remote client would.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use authwatch_core::{
    ActionCodeSettings, Email, IdTokenResult, Persistence, ProfileUpdate, Uid, UserProfile,
};

use super::{AuthStateListener, IdentityProvider, ProviderUser, Subscription, UserHandle};
use crate::error::{ProviderError, ProviderResult};

/// Error codes produced by the memory provider.
pub mod codes {
    pub const INVALID_EMAIL: &str = "invalid-email";
    pub const USER_NOT_FOUND: &str = "user-not-found";
    pub const WRONG_PASSWORD: &str = "wrong-password";
    pub const WEAK_PASSWORD: &str = "weak-password";
    pub const EMAIL_ALREADY_IN_USE: &str = "email-already-in-use";
    pub const INVALID_ACTION_CODE: &str = "invalid-action-code";
    pub const PROVIDER_UNAVAILABLE: &str = "provider-unavailable";
}

/// Minimum password length accepted for new passwords.
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Sign-in method id reported on every memory account.
pub const PASSWORD_PROVIDER_ID: &str = "password";

/// Purpose of an action code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionCodeKind {
    PasswordReset,
    VerifyEmail,
}

/// An action email "sent" by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentCode {
    pub kind: ActionCodeKind,
    pub email: String,
    pub code: String,
    pub settings: Option<ActionCodeSettings>,
}

#[derive(Debug)]
struct Account {
    uid: Uid,
    email: Email,
    password: SecretString,
    email_verified: bool,
    phone_number: Option<String>,
    display_name: Option<String>,
    photo_url: Option<String>,
    claims: Map<String, Value>,
}

impl Account {
    fn profile(&self) -> UserProfile {
        UserProfile {
            uid: self.uid.clone(),
            email: Some(self.email.as_str().to_owned()),
            email_verified: self.email_verified,
            phone_number: self.phone_number.clone(),
            provider_id: PASSWORD_PROVIDER_ID.to_owned(),
            display_name: self.display_name.clone(),
            photo_url: self.photo_url.clone(),
        }
    }
}

#[derive(Default)]
struct Inner {
    accounts: HashMap<Uid, Account>,
    by_email: HashMap<String, Uid>,
    current: Option<Arc<MemoryUser>>,
    listeners: Vec<(u64, AuthStateListener)>,
    next_listener: u64,
    pending_codes: HashMap<String, (ActionCodeKind, Uid)>,
    outbox: Vec<SentCode>,
    persistence: Persistence,
    latency: Duration,
    fail_next: Option<ProviderError>,
    claims_supported: bool,
}

struct Shared {
    inner: Mutex<Inner>,
}

impl Shared {
    /// Simulated network latency.
    async fn delay(&self) {
        let latency = self.inner.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    /// Simulated round trip: latency, then any injected failure.
    async fn round_trip(&self) -> ProviderResult<()> {
        self.delay().await;
        self.inner.lock().fail_next.take().map_or(Ok(()), Err)
    }

    /// Notify every listener of the current user, outside the lock.
    fn emit(&self) {
        let (listeners, current) = {
            let inner = self.inner.lock();
            let listeners: Vec<AuthStateListener> =
                inner.listeners.iter().map(|(_, l)| Arc::clone(l)).collect();
            (listeners, inner.current.clone())
        };
        debug!(
            listeners = listeners.len(),
            signed_in = current.is_some(),
            "memory provider auth state changed"
        );
        for listener in listeners {
            listener(current.clone().map(|user| user as UserHandle));
        }
    }

    fn issue_code(
        inner: &mut Inner,
        kind: ActionCodeKind,
        uid: Uid,
        email: &Email,
        settings: Option<&ActionCodeSettings>,
    ) {
        let code = Uuid::new_v4().simple().to_string();
        inner.pending_codes.insert(code.clone(), (kind, uid));
        inner.outbox.push(SentCode {
            kind,
            email: email.as_str().to_owned(),
            code,
            settings: settings.cloned(),
        });
    }
}

fn parse_email(email: &str) -> ProviderResult<Email> {
    Email::parse(email).map_err(|e| ProviderError::new(codes::INVALID_EMAIL, e.to_string()))
}

fn check_password_strength(password: &SecretString) -> ProviderResult<()> {
    if password.expose_secret().chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ProviderError::new(
            codes::WEAK_PASSWORD,
            format!("password must be at least {MIN_PASSWORD_LENGTH} characters"),
        ));
    }
    Ok(())
}

fn copy_secret(secret: &SecretString) -> SecretString {
    SecretString::from(secret.expose_secret().to_owned())
}

fn user_not_found() -> ProviderError {
    ProviderError::new(codes::USER_NOT_FOUND, "there is no user record for this identifier")
}

fn invalid_code() -> ProviderError {
    ProviderError::new(
        codes::INVALID_ACTION_CODE,
        "the action code is invalid, expired, or already used",
    )
}

/// In-process [`IdentityProvider`].
///
/// Cheap to clone; clones share the same accounts and listeners.
#[derive(Clone)]
pub struct MemoryIdentityProvider {
    shared: Arc<Shared>,
}

impl Default for MemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIdentityProvider {
    /// Create an empty provider with no latency and claims support enabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    claims_supported: true,
                    ..Inner::default()
                }),
            }),
        }
    }

    /// Delay every provider call by `latency`.
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        self.shared.inner.lock().latency = latency;
        self
    }

    /// Make user handles report that they cannot fetch a claims token.
    #[must_use]
    pub fn without_claims_support(self) -> Self {
        self.shared.inner.lock().claims_supported = false;
        self
    }

    /// Seed an account with a fixed uid.
    ///
    /// # Errors
    ///
    /// Returns `invalid-email` or `email-already-in-use`.
    pub fn add_account(
        &self,
        uid: impl Into<Uid>,
        email: &str,
        password: &str,
    ) -> ProviderResult<Uid> {
        let email = parse_email(email)?;
        let uid = uid.into();
        let mut inner = self.shared.inner.lock();
        if inner.by_email.contains_key(&email.lookup_key()) {
            return Err(ProviderError::new(
                codes::EMAIL_ALREADY_IN_USE,
                format!("{email} is already registered"),
            ));
        }
        inner.by_email.insert(email.lookup_key(), uid.clone());
        inner.accounts.insert(
            uid.clone(),
            Account {
                uid: uid.clone(),
                email,
                password: SecretString::from(password.to_owned()),
                email_verified: false,
                phone_number: None,
                display_name: None,
                photo_url: None,
                claims: Map::new(),
            },
        );
        Ok(uid)
    }

    /// Replace an account's custom claims.
    ///
    /// Takes effect on the next id-token fetch.
    ///
    /// # Errors
    ///
    /// Returns `user-not-found` for an unknown uid.
    pub fn set_custom_claims(&self, uid: &Uid, claims: Map<String, Value>) -> ProviderResult<()> {
        let mut inner = self.shared.inner.lock();
        let account = inner.accounts.get_mut(uid).ok_or_else(user_not_found)?;
        account.claims = claims;
        Ok(())
    }

    /// Set an account's verification flag on the provider side only.
    ///
    /// Existing handles keep their cached value until reloaded.
    ///
    /// # Errors
    ///
    /// Returns `user-not-found` for an unknown uid.
    pub fn set_email_verified(&self, uid: &Uid, verified: bool) -> ProviderResult<()> {
        let mut inner = self.shared.inner.lock();
        let account = inner.accounts.get_mut(uid).ok_or_else(user_not_found)?;
        account.email_verified = verified;
        Ok(())
    }

    /// Set an account's phone number on the provider side only.
    ///
    /// # Errors
    ///
    /// Returns `user-not-found` for an unknown uid.
    pub fn set_phone_number(&self, uid: &Uid, phone: Option<String>) -> ProviderResult<()> {
        let mut inner = self.shared.inner.lock();
        let account = inner.accounts.get_mut(uid).ok_or_else(user_not_found)?;
        account.phone_number = phone;
        Ok(())
    }

    /// Refresh the signed-in handle from its account and push it to listeners,
    /// as a provider does after a token refresh.
    pub fn push_current_user(&self) {
        {
            let inner = self.shared.inner.lock();
            if let Some(current) = &inner.current {
                if let Some(account) = inner.accounts.get(&current.uid) {
                    *current.cached.lock() = account.profile();
                }
            }
        }
        self.shared.emit();
    }

    /// Fail the next provider call with `err`.
    ///
    /// Id token fetches are not provider calls for this purpose and leave
    /// the failure armed.
    pub fn fail_next(&self, err: ProviderError) {
        self.shared.inner.lock().fail_next = Some(err);
    }

    /// Every action email sent so far, oldest first.
    #[must_use]
    pub fn sent_codes(&self) -> Vec<SentCode> {
        self.shared.inner.lock().outbox.clone()
    }

    /// The most recent code of `kind` sent to `email`.
    #[must_use]
    pub fn last_code(&self, kind: ActionCodeKind, email: &str) -> Option<String> {
        let key = Email::parse(email).ok()?.lookup_key();
        self.shared
            .inner
            .lock()
            .outbox
            .iter()
            .rev()
            .find(|sent| {
                sent.kind == kind && Email::parse(&sent.email).is_ok_and(|e| e.lookup_key() == key)
            })
            .map(|sent| sent.code.clone())
    }

    /// Persistence mode last set by a client.
    #[must_use]
    pub fn persistence(&self) -> Persistence {
        self.shared.inner.lock().persistence
    }

    /// Number of registered auth-state listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.shared.inner.lock().listeners.len()
    }

    /// Whether `password` is the current password of the account for `email`.
    #[must_use]
    pub fn password_matches(&self, email: &str, password: &str) -> bool {
        let Ok(email) = Email::parse(email) else {
            return false;
        };
        let inner = self.shared.inner.lock();
        inner
            .by_email
            .get(&email.lookup_key())
            .and_then(|uid| inner.accounts.get(uid))
            .is_some_and(|account| account.password.expose_secret() == password)
    }

    fn sign_in_uid(&self, uid: &Uid) {
        {
            let mut inner = self.shared.inner.lock();
            let Some(profile) = inner.accounts.get(uid).map(Account::profile) else {
                return;
            };
            inner.current = Some(Arc::new(MemoryUser {
                uid: uid.clone(),
                provider: Arc::downgrade(&self.shared),
                cached: Mutex::new(profile),
            }));
        }
        debug!(uid = %uid, "memory provider signed in");
        self.shared.emit();
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    fn current_user(&self) -> Option<UserHandle> {
        self.shared
            .inner
            .lock()
            .current
            .clone()
            .map(|user| user as UserHandle)
    }

    fn on_auth_state_changed(&self, listener: AuthStateListener) -> Subscription {
        let (id, current) = {
            let mut inner = self.shared.inner.lock();
            let id = inner.next_listener;
            inner.next_listener += 1;
            inner.listeners.push((id, Arc::clone(&listener)));
            (id, inner.current.clone())
        };

        // New listeners immediately learn the restored session.
        listener(current.map(|user| user as UserHandle));

        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        Subscription::new(move || {
            if let Some(shared) = shared.upgrade() {
                shared.inner.lock().listeners.retain(|(lid, _)| *lid != id);
            }
        })
    }

    async fn sign_in_with_email_and_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> ProviderResult<()> {
        self.shared.round_trip().await?;
        let email = parse_email(email)?;
        let uid = {
            let inner = self.shared.inner.lock();
            let account = inner
                .by_email
                .get(&email.lookup_key())
                .and_then(|uid| inner.accounts.get(uid))
                .ok_or_else(user_not_found)?;
            if account.password.expose_secret() != password.expose_secret() {
                return Err(ProviderError::new(
                    codes::WRONG_PASSWORD,
                    "the password is invalid",
                ));
            }
            account.uid.clone()
        };
        self.sign_in_uid(&uid);
        Ok(())
    }

    async fn sign_out(&self) -> ProviderResult<()> {
        self.shared.round_trip().await?;
        let was_signed_in = self.shared.inner.lock().current.take().is_some();
        if was_signed_in {
            debug!("memory provider signed out");
            self.shared.emit();
        }
        Ok(())
    }

    async fn create_user_with_email_and_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> ProviderResult<()> {
        self.shared.round_trip().await?;
        check_password_strength(password)?;
        let uid = Uid::new(Uuid::new_v4().simple().to_string());
        let uid = self.add_account(uid, email, password.expose_secret())?;
        self.sign_in_uid(&uid);
        Ok(())
    }

    async fn send_password_reset_email(
        &self,
        email: &str,
        settings: Option<&ActionCodeSettings>,
    ) -> ProviderResult<()> {
        self.shared.round_trip().await?;
        let email = parse_email(email)?;
        let mut inner = self.shared.inner.lock();
        let uid = inner
            .by_email
            .get(&email.lookup_key())
            .cloned()
            .ok_or_else(user_not_found)?;
        Shared::issue_code(&mut inner, ActionCodeKind::PasswordReset, uid, &email, settings);
        Ok(())
    }

    async fn verify_password_reset_code(&self, code: &str) -> ProviderResult<()> {
        self.shared.round_trip().await?;
        match self.shared.inner.lock().pending_codes.get(code) {
            Some((ActionCodeKind::PasswordReset, _)) => Ok(()),
            _ => Err(invalid_code()),
        }
    }

    async fn confirm_password_reset(
        &self,
        code: &str,
        new_password: &SecretString,
    ) -> ProviderResult<()> {
        self.shared.round_trip().await?;
        check_password_strength(new_password)?;
        let mut inner = self.shared.inner.lock();
        let uid = match inner.pending_codes.get(code) {
            Some((ActionCodeKind::PasswordReset, uid)) => uid.clone(),
            _ => return Err(invalid_code()),
        };
        inner.pending_codes.remove(code);
        let account = inner.accounts.get_mut(&uid).ok_or_else(user_not_found)?;
        account.password = copy_secret(new_password);
        Ok(())
    }

    async fn apply_action_code(&self, code: &str) -> ProviderResult<()> {
        self.shared.round_trip().await?;
        let mut inner = self.shared.inner.lock();
        let uid = match inner.pending_codes.get(code) {
            Some((ActionCodeKind::VerifyEmail, uid)) => uid.clone(),
            _ => return Err(invalid_code()),
        };
        inner.pending_codes.remove(code);
        let account = inner.accounts.get_mut(&uid).ok_or_else(user_not_found)?;
        account.email_verified = true;
        Ok(())
    }

    fn supports_persistence(&self) -> bool {
        true
    }

    async fn set_persistence(&self, mode: Persistence) -> ProviderResult<()> {
        self.shared.round_trip().await?;
        self.shared.inner.lock().persistence = mode;
        Ok(())
    }
}

/// Handle to a signed-in memory account.
#[derive(Debug)]
pub struct MemoryUser {
    uid: Uid,
    provider: Weak<Shared>,
    cached: Mutex<UserProfile>,
}

impl MemoryUser {
    fn shared(&self) -> ProviderResult<Arc<Shared>> {
        self.provider.upgrade().ok_or_else(|| {
            ProviderError::new(codes::PROVIDER_UNAVAILABLE, "the provider has been shut down")
        })
    }

    /// Run `f` against this handle's account, then refresh the cached profile.
    fn with_account<T>(
        &self,
        shared: &Shared,
        f: impl FnOnce(&mut Inner, &Uid) -> ProviderResult<T>,
    ) -> ProviderResult<T> {
        let mut inner = shared.inner.lock();
        if !inner.accounts.contains_key(&self.uid) {
            return Err(user_not_found());
        }
        let out = f(&mut inner, &self.uid)?;
        if let Some(account) = inner.accounts.get(&self.uid) {
            *self.cached.lock() = account.profile();
        }
        Ok(out)
    }
}

#[async_trait]
impl ProviderUser for MemoryUser {
    fn profile(&self) -> UserProfile {
        self.cached.lock().clone()
    }

    async fn reload(&self) -> ProviderResult<()> {
        let shared = self.shared()?;
        shared.round_trip().await?;
        self.with_account(&shared, |_, _| Ok(()))
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> ProviderResult<()> {
        let shared = self.shared()?;
        shared.round_trip().await?;
        self.with_account(&shared, |inner, uid| {
            if let Some(account) = inner.accounts.get_mut(uid) {
                let mut profile = account.profile();
                update.apply_to(&mut profile);
                account.display_name = profile.display_name;
                account.photo_url = profile.photo_url;
            }
            Ok(())
        })
    }

    async fn update_password(&self, new_password: &SecretString) -> ProviderResult<()> {
        let shared = self.shared()?;
        shared.round_trip().await?;
        check_password_strength(new_password)?;
        self.with_account(&shared, |inner, uid| {
            if let Some(account) = inner.accounts.get_mut(uid) {
                account.password = copy_secret(new_password);
            }
            Ok(())
        })
    }

    async fn update_email(&self, new_email: &str) -> ProviderResult<()> {
        let shared = self.shared()?;
        shared.round_trip().await?;
        let email = parse_email(new_email)?;
        self.with_account(&shared, |inner, uid| {
            let key = email.lookup_key();
            if inner.by_email.get(&key).is_some_and(|owner| owner != uid) {
                return Err(ProviderError::new(
                    codes::EMAIL_ALREADY_IN_USE,
                    format!("{email} is already registered"),
                ));
            }
            let Some(account) = inner.accounts.get_mut(uid) else {
                return Err(user_not_found());
            };
            let old_key = account.email.lookup_key();
            account.email = email.clone();
            account.email_verified = false;
            inner.by_email.remove(&old_key);
            inner.by_email.insert(key, uid.clone());
            Ok(())
        })
    }

    async fn send_email_verification(
        &self,
        settings: Option<&ActionCodeSettings>,
    ) -> ProviderResult<()> {
        let shared = self.shared()?;
        shared.round_trip().await?;
        self.with_account(&shared, |inner, uid| {
            let email = inner
                .accounts
                .get(uid)
                .map(|account| account.email.clone())
                .ok_or_else(user_not_found)?;
            Shared::issue_code(inner, ActionCodeKind::VerifyEmail, uid.clone(), &email, settings);
            Ok(())
        })
    }

    async fn delete(&self) -> ProviderResult<()> {
        let shared = self.shared()?;
        shared.round_trip().await?;
        let signed_out = {
            let mut inner = shared.inner.lock();
            let account = inner.accounts.remove(&self.uid).ok_or_else(user_not_found)?;
            inner.by_email.remove(&account.email.lookup_key());
            inner.pending_codes.retain(|_, (_, uid)| *uid != self.uid);
            let is_current = inner
                .current
                .as_ref()
                .is_some_and(|current| current.uid == self.uid);
            if is_current {
                inner.current = None;
            }
            is_current
        };
        debug!(uid = %self.uid, "memory provider deleted account");
        if signed_out {
            shared.emit();
        }
        Ok(())
    }

    async fn id_token_result(&self) -> ProviderResult<Option<IdTokenResult>> {
        // Background claim fetches never consume an injected failure.
        let shared = self.shared()?;
        shared.delay().await;
        let inner = shared.inner.lock();
        if !inner.claims_supported {
            return Ok(None);
        }
        let account = inner.accounts.get(&self.uid).ok_or_else(user_not_found)?;
        let mut claims = account.claims.clone();
        claims.insert("sub".to_owned(), Value::String(self.uid.to_string()));
        Ok(Some(IdTokenResult {
            token: Uuid::new_v4().simple().to_string(),
            claims,
        }))
    }
}
