//! Order Notifier - Headless Server
//!
//! Polls predict.fun for each registered wallet and relays fills, new orders
//! and price alerts to Telegram.

mod config;

use clap::Parser;
use config::{AppConfig, SeedUser};
use notifier_alerts::{
    explorer_tx_base, CommandProcessor, Database, DbError, Messenger, Notifier, NotifierConfig,
    TelegramBot,
};
use notifier_venue::{MarketCache, PredictClient, VenueClient, VenueConfig, VenueError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Order Notifier CLI
#[derive(Parser, Debug)]
#[command(name = "order-notifier")]
#[command(about = "Telegram notifications for predict.fun orders", long_about = None)]
struct Args {
    /// Load environment variables from this file instead of `.env`
    #[arg(short, long)]
    env_file: Option<String>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// SQLite database URL (overrides DATABASE_URL)
    #[arg(long)]
    database_url: Option<String>,
}

#[derive(Error, Debug)]
enum StartupError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Venue(#[from] VenueError),
}

fn init_logging(level: &str) {
    // RUST_LOG wins over --log-level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Register the configured single user unless the chat is already registered
/// with the same wallet. Returns true when a registration was written.
async fn seed_registration(db: &Database, seed: &SeedUser) -> Result<bool, DbError> {
    if let Some(existing) = db.get_user(&seed.chat_id).await? {
        if existing.wallet_address == seed.wallet_address {
            return Ok(false);
        }
    }
    db.register(&seed.chat_id, &seed.wallet_address, None)
        .await?;
    Ok(true)
}

async fn run(config: AppConfig) -> Result<(), StartupError> {
    let db = Database::connect(&config.database_url).await?;
    info!(url = config.database_url, "Database ready");

    let venue: Arc<dyn VenueClient> = Arc::new(PredictClient::new(VenueConfig::new(
        config.predict_api_key.clone(),
        config.testnet,
    ))?);
    let markets = Arc::new(MarketCache::new(Arc::clone(&venue)));

    let bot = TelegramBot::new(&config.telegram_bot_token);
    let messenger: Arc<dyn Messenger> = Arc::new(bot.clone());

    if let Some(seed) = &config.seed_user {
        if seed_registration(&db, seed).await? {
            info!(
                chat_id = seed.chat_id,
                wallet = %seed.wallet_address.short(),
                "Registered configured user"
            );
        }
    }

    let notifier = Arc::new(Notifier::new(
        db.clone(),
        Arc::clone(&venue),
        Arc::clone(&markets),
        Arc::clone(&messenger),
        NotifierConfig {
            poll_interval: config.poll_interval,
            explorer_base: explorer_tx_base(config.testnet).to_string(),
            ..NotifierConfig::default()
        },
    ));
    let processor = Arc::new(CommandProcessor::new(
        db.clone(),
        Arc::clone(&venue),
        markets,
        messenger,
    ));

    if let Err(e) = notifier.initialize().await {
        warn!(error = %e, "Startup initialization failed; existing activity may be notified");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let poller_handle = tokio::spawn(Arc::clone(&notifier).run(shutdown_rx.clone()));
    let commands_handle = tokio::spawn(bot.run(processor, shutdown_rx));

    info!("Press Ctrl+C to stop...");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
    }

    warn!("Shutdown signal received");
    let _ = shutdown_tx.send(true);

    if tokio::time::timeout(Duration::from_secs(5), poller_handle)
        .await
        .is_err()
    {
        warn!("Notifier did not stop in time");
    }
    if tokio::time::timeout(Duration::from_secs(5), commands_handle)
        .await
        .is_err()
    {
        warn!("Command loop did not stop in time");
    }

    db.close().await;
    info!("👋 Goodbye!");
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match &args.env_file {
        Some(path) => {
            if let Err(e) = dotenvy::from_filename(path) {
                eprintln!("Failed to load env file {}: {}", path, e);
                std::process::exit(1);
            }
        }
        None => {
            let _ = dotenvy::dotenv();
        }
    }

    init_logging(&args.log_level);

    let mut config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };
    if let Some(url) = args.database_url {
        config.database_url = url;
    }

    info!("🚀 Order Notifier starting...");
    info!("  Network: {}", if config.testnet { "testnet" } else { "mainnet" });
    info!("  Poll Interval: {}s", config.poll_interval.as_secs());

    if let Err(e) = run(config).await {
        error!(error = %e, "Fatal error");
        std::process::exit(1);
    }
}
