//! Top-level composition of the identity layer.

use std::sync::Arc;

use crate::config::IdentityConfig;
use crate::provider::IdentityProvider;
use crate::session::IdentitySession;

/// Root object an application holds on to.
///
/// Cheaply cloneable via `Arc`; clones share one session and therefore one
/// provider subscription.
#[derive(Clone, Debug)]
pub struct Store {
    inner: Arc<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    config: IdentityConfig,
    auth: IdentitySession,
}

impl Store {
    /// Create the store and its session.
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>, config: IdentityConfig) -> Self {
        let auth = IdentitySession::new(provider, config.snapshot_settings());
        Self {
            inner: Arc::new(StoreInner { config, auth }),
        }
    }

    /// Get a reference to the identity session.
    #[must_use]
    pub fn auth(&self) -> &IdentitySession {
        &self.inner.auth
    }

    /// Get a reference to the identity configuration.
    #[must_use]
    pub fn config(&self) -> &IdentityConfig {
        &self.inner.config
    }
}
