use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pizzeria::config::Config;
use pizzeria::store::{DocumentStore, FileStore};
use pizzeria::AppState;

#[derive(Parser, Debug)]
#[command(name = "pizzeria")]
#[command(author, version, about = "Pizza ordering API backed by a file document store", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "pizzeria.toml", env = "PIZZERIA_CONFIG")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;

    // Initialize logging
    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Pizzeria v{}", env!("CARGO_PKG_VERSION"));

    if config.auth.uses_dev_secret() {
        tracing::warn!("Using the built-in development hashing secret; set auth.hashing_secret");
    }

    // Ensure data directory exists
    pizzeria::utils::ensure_dir(&config.server.data_dir)?;

    let store: Arc<dyn DocumentStore> = Arc::new(
        FileStore::open(&config.server.data_dir)
            .await
            .context("Failed to open document store")?,
    );
    pizzeria::api::ensure_menu(store.as_ref())
        .await
        .context("Failed to seed the menu")?;

    let payments = pizzeria::payments::from_config(&config.payments);
    let notifier = pizzeria::notifications::from_config(&config.email);

    let state = Arc::new(AppState::new(config.clone(), store, payments, notifier));
    let router = pizzeria::api::create_router(state);

    pizzeria::server::run(&config, router).await
}
