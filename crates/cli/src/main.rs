//! Authwatch CLI - drive the identity layer against the in-memory provider.
//!
//! # Usage
//!
//! ```bash
//! # Sign up, verify, promote to admin, change email, sign out
//! authwatch demo -e ada@example.com -p "correct horse" --admin --new-email ada@example.org
//!
//! # Walk through the password reset flow
//! authwatch reset -e ada@example.com -p "old password" -n "new password"
//! ```
//!
//! # Commands
//!
//! - `demo` - Full session walkthrough
//! - `reset` - Password reset walkthrough
//!
//! # Environment Variables
//!
//! - `RUST_LOG` - Log filter (default: `authwatch=info,authwatch_cli=info`)
//! - `SENTRY_DSN` - Report warnings and errors to Sentry
//! - `AUTHWATCH_*` - Identity configuration, see `authwatch::config`

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "authwatch")]
#[command(author, version, about = "Authwatch identity CLI")]
struct Cli {
    /// Simulated provider latency in milliseconds
    #[arg(long, global = true, default_value_t = 0)]
    latency_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign up and exercise the signed-in user
    Demo {
        /// Account email address
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(short, long)]
        password: String,

        /// Grant the admin claim after sign-up
        #[arg(long)]
        admin: bool,

        /// Change the email address before signing out
        #[arg(long)]
        new_email: Option<String>,
    },
    /// Reset the password of a seeded account
    Reset {
        /// Account email address
        #[arg(short, long)]
        email: String,

        /// Current password
        #[arg(short, long)]
        password: String,

        /// Password to set through the reset flow
        #[arg(short, long)]
        new_password: String,
    },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry() -> Option<sentry::ClientInitGuard> {
    let dsn = std::env::var("SENTRY_DSN").ok()?;

    let guard = sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Warnings and errors become Sentry events, info and debug become breadcrumbs.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    // Load .env before reading SENTRY_DSN
    let _ = dotenvy::dotenv();
    let _sentry_guard = init_sentry();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "authwatch=info,authwatch_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let latency = std::time::Duration::from_millis(cli.latency_ms);
    match cli.command {
        Commands::Demo {
            email,
            password,
            admin,
            new_email,
        } => {
            commands::demo::run(
                latency,
                &commands::demo::DemoArgs {
                    email,
                    password: password.into(),
                    admin,
                    new_email,
                },
            )
            .await?;
        }
        Commands::Reset {
            email,
            password,
            new_password,
        } => {
            commands::reset::run(latency, &email, &password, &new_password.into()).await?;
        }
    }
    Ok(())
}
