//! Password reset walkthrough.

use std::time::Duration;

use authwatch::provider::memory::ActionCodeKind;
use secrecy::SecretString;
use tracing::{info, instrument};

use super::{memory_store, CommandError};

/// Seed an account, reset its password by code, then sign in with the new one.
///
/// # Errors
///
/// Returns the first failing step.
#[instrument(skip(password, new_password))]
pub async fn run(
    latency: Duration,
    email: &str,
    password: &str,
    new_password: &SecretString,
) -> Result<(), CommandError> {
    let (provider, store) = memory_store(latency)?;
    let auth = store.auth();

    let uid = provider.add_account("seeded", email, password)?;
    info!(uid = %uid, "account seeded");

    auth.send_password_reset_email(email, None).await?;
    let code = provider
        .last_code(ActionCodeKind::PasswordReset, email)
        .ok_or(CommandError::MissingCode("password reset"))?;
    auth.verify_password_reset_code(&code).await?;
    auth.confirm_password_reset(&code, new_password).await?;
    info!("password reset confirmed");

    auth.sign_in_with_email_and_password(email, new_password)
        .await?;
    info!(
        uid = ?auth.user_id(),
        operation = %auth.operation().name(),
        "signed in with new password"
    );
    Ok(())
}
