/// Track Time - driver check-in scheduling service
///
/// Drivers register and log in with one-time email codes, reserve time
/// slots, and confirm or cancel them inside the confirmation window.
/// Administrators approve registrations and manage accounts and check-ins.

mod account;
mod api;
mod auth;
mod checkin;
mod config;
mod context;
mod db;
mod error;
mod mailer;
mod notifier;
mod otp;
mod server;
mod weather;

use config::ServerConfig;
use context::AppContext;
use error::AppResult;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> AppResult<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tracktime=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    print_banner();

    // Load configuration
    let config = ServerConfig::from_env()?;

    // Create application context
    let ctx = AppContext::new(config).await?;

    // Start server
    server::serve(ctx).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
  ______                __      _______
 /_  __/______ _ ____  / /__   /_  __(_)___ _  ___
  / / / ___/ _ `// __/ /  '_/   / / / //  ' \/ -_)
 /_/ /_/   \_,_/ \__/ /_/\_\   /_/ /_//_/_/_/\__/

        Driver Check-In Service v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
