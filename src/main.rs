//! sercast — serial telemetry fan-out bridge
//!
//! Loads the TOML configuration, opens the serial device, performs the
//! startup subscriptions and then republishes device notifications to every
//! connected TCP subscriber until the link fails or ctrl-c is pressed.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use sercast_core::config::DEFAULT_CONFIG_PATH;
use sercast_core::{Config, Service};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(
    name = "sercast",
    version,
    about = "Bridge serial device telemetry to TCP subscribers"
)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, env = "SERCAST_CONFIG")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    tracing::info!(
        "Starting sercast v{} on {}:{}",
        env!("CARGO_PKG_VERSION"),
        config.server.host,
        config.server.port
    );

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
            signal_cancel.cancel();
        }
    });

    Service::new(config).run(cancel).await?;
    Ok(())
}
