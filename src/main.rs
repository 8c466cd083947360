use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use nitter_digest::accounts::load_account_lists;
use nitter_digest::config::Config;
use nitter_digest::pipeline::{Pipeline, RunOptions};

/// Email digests of Nitter account feeds.
#[derive(Debug, Parser)]
#[command(name = "nitter-digest", version, about)]
struct Args {
    /// Render digests and print them instead of sending mail
    #[arg(long)]
    dry_run: bool,

    /// Lookback window in hours (overrides WINDOW_HOURS)
    #[arg(long)]
    window_hours: Option<u32>,

    /// Treat every post as new and do not touch the database
    #[arg(long)]
    no_db: bool,

    /// Account list file (overrides ACCOUNTS_FILE)
    #[arg(long)]
    accounts: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();

    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing()?;

    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(hours) = args.window_hours {
        config.window_hours = hours;
    }
    if let Some(path) = args.accounts {
        config.accounts_file = path;
    }
    config.validate().context("Invalid configuration")?;

    info!(
        mirror = %config.mirror.base_url,
        window_hours = config.window_hours,
        dry_run = args.dry_run,
        no_db = args.no_db,
        "Configuration loaded"
    );

    let lists = load_account_lists(&config.accounts_file)?;

    let options = RunOptions {
        dry_run: args.dry_run,
        no_db: args.no_db,
    };
    let pipeline = Pipeline::new(config, options).await?;
    let digests = pipeline.run(&lists).await;

    info!(digests = digests.len(), "All account lists processed");
    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,nitter_digest=debug"));

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}
