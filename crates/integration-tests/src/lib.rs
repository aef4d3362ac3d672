//! Integration tests for Authwatch.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p authwatch-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `session_sync` - Snapshot lifecycle driven by provider pushes
//! - `user_mutations` - User-scoped operations and the admin claim
//! - `single_flight` - Operation guards under concurrent callers
//! - `account_recovery` - Password reset and email verification flows
//!
//! Every scenario runs against the in-memory provider; nothing leaves the
//! process.

use std::sync::Arc;
use std::time::Duration;

use authwatch::provider::memory::MemoryIdentityProvider;
use authwatch::{IdentityConfig, Store};
use secrecy::SecretString;

/// Password used for seeded accounts.
pub const PASSWORD: &str = "hunter22";

/// How long scenarios wait for background claim refreshes.
pub const CLAIMS_WAIT: Duration = Duration::from_secs(2);

/// A store wired to its own memory provider.
pub struct TestContext {
    pub provider: MemoryIdentityProvider,
    pub store: Store,
}

impl TestContext {
    /// Fresh provider with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_provider(MemoryIdentityProvider::new())
    }

    /// Fresh store over `provider` with default configuration.
    #[must_use]
    pub fn with_provider(provider: MemoryIdentityProvider) -> Self {
        let store = Store::new(Arc::new(provider.clone()), IdentityConfig::default());
        Self { provider, store }
    }

    /// Seed `uid` with `email` and [`PASSWORD`], then sign in through the session.
    ///
    /// # Panics
    ///
    /// Panics if the provider rejects the account or the sign-in.
    pub async fn sign_in_seeded(&self, uid: &str, email: &str) {
        self.provider
            .add_account(uid, email, PASSWORD)
            .unwrap_or_else(|e| panic!("seeding {email} failed: {e}"));
        self.store
            .auth()
            .sign_in_with_email_and_password(email, &secret(PASSWORD))
            .await
            .unwrap_or_else(|e| panic!("signing in {email} failed: {e}"));
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Wrap a test password.
#[must_use]
pub fn secret(value: &str) -> SecretString {
    SecretString::from(value.to_owned())
}
