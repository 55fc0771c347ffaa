//! Hedging reverse proxy (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌───────────────────────────────────────────────────────┐
//!                      │                    HEDGING PROXY                      │
//!                      │                                                       │
//!   Client Request     │  ┌─────────┐   ┌──────────────┐   ┌───────────────┐   │
//!   ───────────────────┼─▶│  http   │──▶│ key + group  │──▶│   upstream    │───┼──▶ Target URL
//!   (X-Target-Url)     │  │ server  │   │   registry   │   │ attempt (1 per│   │    (per attempt)
//!                      │  └─────────┘   └──────┬───────┘   │   request)    │   │
//!                      │       ▲               │           └───────┬───────┘   │
//!                      │       │        first success or           │           │
//!   Client Response    │       │        all attempts failed        │           │
//!   ◀──────────────────┼───────┴───────────────┴───────────────────┘           │
//!                      │                                                       │
//!                      │  config · observability · lifecycle                   │
//!                      └───────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use hedging_proxy::config::{load_config, validate_config, ConfigError, ProxyConfig};
use hedging_proxy::lifecycle::{startup, Shutdown};
use hedging_proxy::observability::logging;

#[derive(Parser)]
#[command(name = "hedging-proxy")]
#[command(about = "Reverse proxy that hedges identical concurrent requests", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
        validate_config(&config).map_err(ConfigError::Validation)?;
    }

    logging::init_logging(&config.observability);

    tracing::info!("hedging-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        config_file = ?cli.config,
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.upstream.request_timeout_secs,
        metrics_enabled = config.observability.metrics_enabled,
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();
    startup::start(config, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
