//! Core types for Authwatch.
//!
//! This module provides type-safe wrappers for identity concepts.

pub mod action_code;
pub mod email;
pub mod id;
pub mod persistence;
pub mod profile;
pub mod token;

pub use action_code::ActionCodeSettings;
pub use email::{Email, EmailError};
pub use id::{StoragePath, Uid, DEFAULT_USERS_COLLECTION};
pub use persistence::{Persistence, PersistenceParseError};
pub use profile::{ProfileUpdate, UserProfile};
pub use token::IdTokenResult;
