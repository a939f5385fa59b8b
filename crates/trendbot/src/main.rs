//! Moving-average trend bot - entry point.
//!
//! One batch per invocation: fetch daily history, derive LONG/FLAT per
//! instrument, trade the difference against held positions, disconnect.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Moving-average trend bot
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via TRENDBOT_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Must run before any TLS connection
    trendbot_gateway::init_crypto();

    let args = Args::parse();

    // CLI arg > TRENDBOT_CONFIG > default
    let config_path = args
        .config
        .or_else(|| std::env::var("TRENDBOT_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    let config = trendbot::AppConfig::from_file(&config_path)?;

    trendbot_telemetry::init_logging(&config.telemetry)?;

    info!("Starting trendbot v{}", env!("CARGO_PKG_VERSION"));
    info!(
        config_path = %config_path,
        instruments = config.instruments.len(),
        "Configuration loaded"
    );

    let app = trendbot::Application::new(config)?;
    let report = app.run().await?;

    info!(
        submitted = report.dispatch.submitted_count(),
        failed = report.dispatch.failed_count(),
        "Batch finished"
    );
    Ok(())
}
