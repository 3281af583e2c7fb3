//! aero sensor telemetry server - Entry Point

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Sensor telemetry relay and live dashboard.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via AERO_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    aero_telemetry::init_logging()?;

    info!("Starting aero-server v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > AERO_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("AERO_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = aero_server::AppConfig::from_file(&config_path)?;
    info!(
        port = config.dashboard.port,
        backend = ?config.persistence.backend,
        "Configuration loaded"
    );

    let mut app = aero_server::Application::new(config)?;
    app.run().await?;

    Ok(())
}
