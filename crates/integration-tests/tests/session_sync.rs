//! Integration tests for the session's snapshot lifecycle.
//!
//! The provider pushes auth-state changes; the session creates, re-syncs,
//! replaces or clears its user snapshot in response.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use authwatch::provider::IdentityProvider;
use authwatch_integration_tests::{secret, TestContext, PASSWORD};

// =============================================================================
// Creation
// =============================================================================

#[tokio::test]
async fn test_first_push_creates_snapshot() {
    let ctx = TestContext::new();
    ctx.sign_in_seeded("u1", "a@x.com").await;

    let user = ctx.store.auth().user().unwrap();
    let fields = user.fields();
    assert_eq!(fields.id.as_str(), "u1");
    assert_eq!(fields.email.as_deref(), Some("a@x.com"));
    assert!(!fields.is_email_verified);
    assert_eq!(fields.path.as_str(), "users/u1");
    assert_eq!(fields.provider_id, "password");
}

#[tokio::test]
async fn test_restored_session_is_seeded_on_construction() {
    let ctx = TestContext::new();
    ctx.provider.add_account("u1", "a@x.com", PASSWORD).unwrap();
    ctx.provider
        .sign_in_with_email_and_password("a@x.com", &secret(PASSWORD))
        .await
        .unwrap();

    let late = TestContext::with_provider(ctx.provider.clone());
    assert_eq!(late.store.auth().user_id().unwrap().as_str(), "u1");
}

// =============================================================================
// Re-synchronization
// =============================================================================

#[tokio::test]
async fn test_same_uid_push_updates_in_place() {
    let ctx = TestContext::new();
    ctx.sign_in_seeded("u1", "a@x.com").await;
    let before = ctx.store.auth().user().unwrap();
    let mut rx = before.subscribe();

    let uid = before.id();
    ctx.provider.set_email_verified(&uid, true).unwrap();
    ctx.provider
        .set_phone_number(&uid, Some("+15550100".into()))
        .unwrap();
    ctx.provider.push_current_user();

    let after = ctx.store.auth().user().unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert!(rx.has_changed().unwrap());
    let fields = rx.borrow_and_update().clone();
    assert!(fields.is_email_verified);
    assert_eq!(fields.phone_number.as_deref(), Some("+15550100"));
}

#[tokio::test]
async fn test_same_uid_push_does_not_notify_session_subscribers() {
    let ctx = TestContext::new();
    ctx.sign_in_seeded("u1", "a@x.com").await;
    let mut rx = ctx.store.auth().subscribe_user();

    ctx.provider.push_current_user();
    assert!(!rx.has_changed().unwrap());
}

#[tokio::test]
async fn test_different_uid_push_replaces_snapshot() {
    let ctx = TestContext::new();
    ctx.sign_in_seeded("u1", "a@x.com").await;
    let first = ctx.store.auth().user().unwrap();

    ctx.sign_in_seeded("u2", "b@x.com").await;
    let second = ctx.store.auth().user().unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(second.path().as_str(), "users/u2");
    // The old snapshot keeps describing its own principal.
    assert_eq!(first.id().as_str(), "u1");
}

// =============================================================================
// Clearing
// =============================================================================

#[tokio::test]
async fn test_sign_out_clears_snapshot() {
    let ctx = TestContext::new();
    ctx.sign_in_seeded("u1", "a@x.com").await;
    let mut rx = ctx.store.auth().subscribe_user();

    ctx.store.auth().sign_out().await.unwrap();
    assert!(ctx.store.auth().user().is_none());
    assert!(ctx.store.auth().user_id().is_none());
    assert!(rx.has_changed().unwrap());
    assert!(rx.borrow_and_update().is_none());
}

#[tokio::test]
async fn test_sign_out_while_signed_out_is_noop() {
    let ctx = TestContext::new();
    let mut rx = ctx.store.auth().subscribe_user();

    ctx.store.auth().sign_out().await.unwrap();
    assert!(!rx.has_changed().unwrap());
}

#[tokio::test]
async fn test_deleting_user_clears_snapshot() {
    let ctx = TestContext::new();
    ctx.sign_in_seeded("u1", "a@x.com").await;

    let user = ctx.store.auth().user().unwrap();
    user.delete().await.unwrap();
    assert!(ctx.store.auth().user().is_none());

    let err = ctx
        .store
        .auth()
        .sign_in_with_email_and_password("a@x.com", &secret(PASSWORD))
        .await
        .unwrap_err();
    assert!(err.as_provider().unwrap().is("user-not-found"));
}

#[tokio::test]
async fn test_dropping_store_unsubscribes() {
    let ctx = TestContext::new();
    assert_eq!(ctx.provider.listener_count(), 1);
    let TestContext { provider, store } = ctx;
    drop(store);
    assert_eq!(provider.listener_count(), 0);
}
