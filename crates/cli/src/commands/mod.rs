//! CLI subcommands.
//!
//! Each command builds a fresh [`Store`](authwatch::Store) over an in-memory
//! provider, so runs are self-contained.

pub mod demo;
pub mod reset;

use std::sync::Arc;
use std::time::Duration;

use authwatch::provider::memory::MemoryIdentityProvider;
use authwatch::{ConfigError, IdentityConfig, IdentityError, ProviderError, Store};
use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// An identity operation failed.
    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    /// The provider rejected a direct call.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The provider did not deliver an expected action email.
    #[error("No {0} email was sent")]
    MissingCode(&'static str),

    /// The session has no signed-in user when one is required.
    #[error("No user is signed in")]
    NotSignedIn,
}

/// Build a store over a fresh memory provider.
fn memory_store(latency: Duration) -> Result<(MemoryIdentityProvider, Store), CommandError> {
    let config = IdentityConfig::from_env()?;
    let provider = MemoryIdentityProvider::new().with_latency(latency);
    let store = Store::new(Arc::new(provider.clone()), config);
    Ok((provider, store))
}
