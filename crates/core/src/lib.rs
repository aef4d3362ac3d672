//! Authwatch Core - Shared identity types.
//!
//! This crate provides the value types exchanged between the reactive
//! identity layer (`authwatch`) and an identity provider implementation:
//! - user ids and the storage paths derived from them
//! - email addresses
//! - profile data read from and written to provider user handles
//! - action-code settings, session persistence modes, and id-token claims
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no async, no provider
//! clients. This keeps it lightweight and allows provider implementations
//! to depend on it without pulling in the runtime.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers and plain data carried across the provider boundary

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
