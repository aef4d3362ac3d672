//! Integration tests for sign-up, password reset and email verification.

#![allow(clippy::unwrap_used)]

use authwatch::provider::memory::ActionCodeKind;
use authwatch_core::{ActionCodeSettings, Persistence};
use authwatch_integration_tests::{secret, TestContext, PASSWORD};

// =============================================================================
// Sign-up
// =============================================================================

#[tokio::test]
async fn test_sign_up_signs_in_new_account() {
    let ctx = TestContext::new();
    let auth = ctx.store.auth();

    auth.sign_up("new@x.com", &secret(PASSWORD), Persistence::Local)
        .await
        .unwrap();
    let user = auth.user().unwrap();
    assert_eq!(user.email().as_deref(), Some("new@x.com"));
    assert!(!user.id().is_empty());
    assert_eq!(user.path().as_str(), format!("users/{}", user.id()));
    assert_eq!(ctx.provider.persistence(), Persistence::Local);
}

#[tokio::test]
async fn test_sign_up_rejects_weak_password() {
    let ctx = TestContext::new();
    let err = ctx
        .store
        .auth()
        .sign_up("new@x.com", &secret("abc"), Persistence::Local)
        .await
        .unwrap_err();
    assert!(err.as_provider().unwrap().is("weak-password"));
    assert!(ctx.store.auth().user().is_none());
}

#[tokio::test]
#[allow(deprecated)]
async fn test_deprecated_sign_up_forgets_session() {
    let ctx = TestContext::new();
    ctx.store
        .auth()
        .create_user_with_email_and_password("new@x.com", &secret(PASSWORD), true)
        .await
        .unwrap();
    assert_eq!(ctx.provider.persistence(), Persistence::None);
    assert!(ctx.store.auth().user().is_some());
}

// =============================================================================
// Password Reset
// =============================================================================

#[tokio::test]
async fn test_password_reset_flow() {
    let ctx = TestContext::new();
    ctx.provider.add_account("u1", "a@x.com", PASSWORD).unwrap();
    let auth = ctx.store.auth();
    let settings = ActionCodeSettings::continue_to("https://app.example/login");

    auth.send_password_reset_email("a@x.com", Some(&settings))
        .await
        .unwrap();
    let sent = ctx.provider.sent_codes();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].settings.as_ref(), Some(&settings));

    let code = sent[0].code.clone();
    auth.verify_password_reset_code(&code).await.unwrap();
    auth.confirm_password_reset(&code, &secret("fresh-password"))
        .await
        .unwrap();

    let err = auth
        .sign_in_with_email_and_password("a@x.com", &secret(PASSWORD))
        .await
        .unwrap_err();
    assert!(err.as_provider().unwrap().is("wrong-password"));
    auth.sign_in_with_email_and_password("a@x.com", &secret("fresh-password"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_reset_code_is_single_use() {
    let ctx = TestContext::new();
    ctx.provider.add_account("u1", "a@x.com", PASSWORD).unwrap();
    let auth = ctx.store.auth();

    auth.send_password_reset_email("a@x.com", None).await.unwrap();
    let code = ctx
        .provider
        .last_code(ActionCodeKind::PasswordReset, "a@x.com")
        .unwrap();
    auth.confirm_password_reset(&code, &secret("fresh-password"))
        .await
        .unwrap();

    let err = auth.verify_password_reset_code(&code).await.unwrap_err();
    assert!(err.as_provider().unwrap().is("invalid-action-code"));
    assert_eq!(auth.operation().error(), Some(err));
}

#[tokio::test]
async fn test_reset_for_unknown_email() {
    let ctx = TestContext::new();
    let err = ctx
        .store
        .auth()
        .send_password_reset_email("ghost@x.com", None)
        .await
        .unwrap_err();
    assert!(err.as_provider().unwrap().is("user-not-found"));
}

// =============================================================================
// Email Verification
// =============================================================================

#[tokio::test]
async fn test_confirm_verify_email_marks_user_verified() {
    let ctx = TestContext::new();
    ctx.sign_in_seeded("u1", "a@x.com").await;
    let auth = ctx.store.auth();
    let user = auth.user().unwrap();
    assert!(!user.is_email_verified());

    user.send_email_verification(None).await.unwrap();
    let code = ctx
        .provider
        .last_code(ActionCodeKind::VerifyEmail, "a@x.com")
        .unwrap();
    auth.confirm_verify_email(&code).await.unwrap();

    assert!(user.is_email_verified());
    assert!(std::sync::Arc::ptr_eq(&user, &auth.user().unwrap()));
}

#[tokio::test]
async fn test_confirm_verify_email_while_signed_out() {
    let ctx = TestContext::new();
    ctx.sign_in_seeded("u1", "a@x.com").await;
    let auth = ctx.store.auth();
    auth.user()
        .unwrap()
        .send_email_verification(None)
        .await
        .unwrap();
    let code = ctx
        .provider
        .last_code(ActionCodeKind::VerifyEmail, "a@x.com")
        .unwrap();
    auth.sign_out().await.unwrap();

    auth.confirm_verify_email(&code).await.unwrap();
    assert!(auth.user().is_none());

    auth.sign_in_with_email_and_password("a@x.com", &secret(PASSWORD))
        .await
        .unwrap();
    assert!(auth.user().unwrap().is_email_verified());
}
