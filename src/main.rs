use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use mafia_nights::AppContext;
use mafia_nights::cli::{self, Cli};
use mafia_nights::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize structured logging
    init_tracing(&config.log_level);

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.environment,
        sync_mode = ?config.sync_mode,
        "Starting Mafia Nights"
    );

    let ctx = AppContext::new(config)?;

    // Restore the previous session; a network failure here should not block offline commands
    if let Err(e) = ctx.initialize().await {
        tracing::warn!(error = %e, "could not restore session");
    }

    cli::run(cli, &ctx).await
}

/// Initialize the `tracing` subscriber with an environment-based filter, writing to stderr.
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("mafia_nights={log_level},warn").into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
