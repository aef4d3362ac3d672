//! Identity configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Optional
//! - `AUTHWATCH_USERS_COLLECTION` - Storage collection holding user documents (default: users)
//! - `AUTHWATCH_ADMIN_CLAIM` - Custom claim that marks a user as admin (default: admin)
//! - `AUTHWATCH_PERSISTENCE` - Default session persistence for sign-up: local, session or none (default: local)

use authwatch_core::{Persistence, DEFAULT_USERS_COLLECTION};
use thiserror::Error;

const USERS_COLLECTION_VAR: &str = "AUTHWATCH_USERS_COLLECTION";
const ADMIN_CLAIM_VAR: &str = "AUTHWATCH_ADMIN_CLAIM";
const PERSISTENCE_VAR: &str = "AUTHWATCH_PERSISTENCE";

/// Claim key read for the admin flag unless configured otherwise.
pub const DEFAULT_ADMIN_CLAIM: &str = "admin";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Identity layer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityConfig {
    /// Prefix of every user's storage path
    pub users_collection: String,
    /// Claim key mapped to `is_admin`
    pub admin_claim: String,
    /// Persistence applied by sign-up when the caller has no preference
    pub persistence: Persistence,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            users_collection: DEFAULT_USERS_COLLECTION.to_string(),
            admin_claim: DEFAULT_ADMIN_CLAIM.to_string(),
            persistence: Persistence::default(),
        }
    }
}

impl IdentityConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an empty or unparseable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Same as [`IdentityConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let users_collection =
            get_non_empty_or_default(&lookup, USERS_COLLECTION_VAR, DEFAULT_USERS_COLLECTION)?;
        let admin_claim = get_non_empty_or_default(&lookup, ADMIN_CLAIM_VAR, DEFAULT_ADMIN_CLAIM)?;
        let persistence = lookup(PERSISTENCE_VAR)
            .map(|raw| {
                raw.parse::<Persistence>().map_err(|e| {
                    ConfigError::InvalidEnvVar(PERSISTENCE_VAR.to_string(), e.to_string())
                })
            })
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            users_collection,
            admin_claim,
            persistence,
        })
    }

    /// The part of the configuration every user snapshot needs.
    #[must_use]
    pub fn snapshot_settings(&self) -> SnapshotSettings {
        SnapshotSettings {
            users_collection: self.users_collection.clone(),
            admin_claim: self.admin_claim.clone(),
        }
    }
}

/// Settings shared by all snapshots of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotSettings {
    pub users_collection: String,
    pub admin_claim: String,
}

impl Default for SnapshotSettings {
    fn default() -> Self {
        IdentityConfig::default().snapshot_settings()
    }
}

fn get_non_empty_or_default(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: &str,
) -> Result<String, ConfigError> {
    match lookup(key) {
        None => Ok(default.to_string()),
        Some(value) if value.trim().is_empty() => Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "value must not be empty".to_string(),
        )),
        Some(value) => Ok(value.trim().to_string()),
    }
}
