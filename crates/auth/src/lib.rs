//! Authwatch - reactive identity state over a remote identity provider.
//!
//! # Architecture
//!
//! - [`Store`] composes the layer and owns one [`IdentitySession`]
//! - [`IdentitySession`] follows the provider's auth-state stream and holds
//!   zero or one [`IdentityUserSnapshot`]
//! - [`IdentityUserSnapshot`] mirrors one provider user handle
//! - [`Operation`] runs one named async action at a time for its owner
//!
//! State lives in `tokio::sync::watch` cells, one per entity, so every
//! update is observed as a single consistent batch.
//!
//! # Modules
//!
//! - [`provider`] - provider traits and the in-memory provider
//! - [`config`] - environment configuration

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod error;
pub mod operation;
pub mod provider;
pub mod session;
pub mod store;
pub mod user;

pub use config::{ConfigError, IdentityConfig, SnapshotSettings};
pub use error::{IdentityError, ProviderError, ProviderResult};
pub use operation::{Operation, OperationState, ProgressReporter};
pub use provider::{IdentityProvider, ProviderUser, Subscription, UserHandle};
pub use session::IdentitySession;
pub use store::Store;
pub use user::{IdentityUserSnapshot, UserFields};
