//! Session walkthrough.
//!
//! # Usage
//!
//! ```bash
//! authwatch demo -e ada@example.com -p "correct horse" --admin
//! ```

use std::time::Duration;

use authwatch::provider::memory::{ActionCodeKind, MemoryIdentityProvider};
use authwatch::{IdentityUserSnapshot, UserFields};
use secrecy::SecretString;
use serde_json::{Map, Value};
use tokio::time::timeout;
use tracing::{info, instrument, warn};

use super::{memory_store, CommandError};

/// Upper bound for background claim refreshes to land.
const CLAIMS_WAIT: Duration = Duration::from_secs(5);

/// Arguments of the `demo` command.
pub struct DemoArgs {
    pub email: String,
    pub password: SecretString,
    pub admin: bool,
    pub new_email: Option<String>,
}

/// Sign up, verify the email, optionally grant admin and change email, then
/// sign out.
///
/// # Errors
///
/// Returns the first failing step.
#[instrument(skip(args), fields(email = %args.email))]
pub async fn run(latency: Duration, args: &DemoArgs) -> Result<(), CommandError> {
    let (provider, store) = memory_store(latency)?;
    let auth = store.auth();

    auth.sign_up(&args.email, &args.password, store.config().persistence)
        .await?;
    let user = auth.user().ok_or(CommandError::NotSignedIn)?;
    log_fields("signed up", &user.fields());

    user.send_email_verification(None).await?;
    let code = provider
        .last_code(ActionCodeKind::VerifyEmail, &args.email)
        .ok_or(CommandError::MissingCode("verification"))?;
    auth.confirm_verify_email(&code).await?;
    log_fields("email verified", &user.fields());

    if args.admin {
        grant_admin(&provider, &user, &store.config().admin_claim).await?;
        log_fields("admin granted", &user.fields());
    }

    if let Some(new_email) = &args.new_email {
        user.update_email(new_email).await?;
        log_fields("email changed", &user.fields());
    }

    auth.sign_out().await?;
    info!(signed_in = auth.user().is_some(), "signed out");
    Ok(())
}

async fn grant_admin(
    provider: &MemoryIdentityProvider,
    user: &IdentityUserSnapshot,
    claim: &str,
) -> Result<(), CommandError> {
    let mut claims = Map::new();
    claims.insert(claim.to_string(), Value::Bool(true));
    provider.set_custom_claims(&user.id(), claims)?;

    // Reloading re-synchronizes, which refreshes the claims in the background.
    let mut rx = user.subscribe();
    user.reload(false).await?;
    if timeout(CLAIMS_WAIT, rx.wait_for(|fields| fields.is_admin))
        .await
        .is_err()
    {
        warn!(uid = %user.id(), "admin claim did not arrive in time");
    }
    Ok(())
}

fn log_fields(step: &str, fields: &UserFields) {
    info!(
        step,
        uid = %fields.id,
        email = fields.email.as_deref().unwrap_or_default(),
        email_verified = fields.is_email_verified,
        admin = fields.is_admin,
        path = %fields.path,
        "user snapshot"
    );
}
