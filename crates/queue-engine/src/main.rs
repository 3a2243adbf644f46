//! DigiQueue server binary

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use digiqueue_engine::config::LoggingConfig;
use digiqueue_engine::{QueueEngineConfig, QueueServer};

/// Ticket queue server
#[derive(Parser, Debug)]
#[command(name = "digiqueue-server", version, about)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP listen address, overrides the configuration
    #[arg(short, long)]
    bind: Option<String>,

    /// SQLite database URL, overrides the configuration
    #[arg(long)]
    database_url: Option<String>,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,
}

fn setup_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;

    let builder = fmt::Subscriber::builder().with_env_filter(filter).with_target(false);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("failed to install log subscriber: {}", e))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = QueueEngineConfig::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(bind) = args.bind {
        config.general.bind_address = bind;
    }
    if let Some(url) = args.database_url {
        config.database.url = url;
    }
    if args.json_logs {
        config.logging.json = true;
    }
    config.validate()?;

    setup_logging(&config.logging)?;
    info!("🏢 Starting DigiQueue v{}", env!("CARGO_PKG_VERSION"));

    let server = QueueServer::new(config).await.context("creating queue server")?;
    server.run().await?;

    info!("👋 Goodbye");
    Ok(())
}
