//! authctl
//!
//! Command-line client for the identity backend:
//! 1. Email/password login, registration and email verification
//! 2. Google and GitHub sign-in through the authorization-code redirect
//! 3. Persisted sessions with transparent access token refresh

mod app;
mod cli;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::App;
use crate::cli::Cli;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let (config_path, explicit) = Config::resolve_path(cli.config.as_deref());
    let config = Config::load(&config_path, explicit)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        base_url = %config.api.base_url,
        frontend_url = %config.oauth.frontend_url,
        storage = %config.storage.dir.display(),
        "configuration loaded"
    );

    let app = App::build(&config).await?;
    app.run(cli.command).await
}

/// Logs go to stderr so command output on stdout stays machine-readable.
///
/// Filter from LOG_LEVEL, then RUST_LOG, defaulting to `info`; JSON lines
/// when LOG_FORMAT=json.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json") {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
