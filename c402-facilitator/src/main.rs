//! x402 order facilitator HTTP server.
//!
//! # Usage
//!
//! ```bash
//! # Run with default config (config.toml in current directory)
//! cargo run -p c402-facilitator --release
//!
//! # Run with custom config path
//! c402-facilitator --config /path/to/config.toml
//!
//! # Configure logging level
//! RUST_LOG=c402=debug,info cargo run -p c402-facilitator
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` — Path to TOML configuration file (default: `config.toml`)
//! - `HOST` — Override bind address (default: `0.0.0.0`)
//! - `PORT` — Override port (default: `4021`)
//! - `RUST_LOG` — Log level filter (default: `info`)
//!
//! Variables from a `.env` file in the working directory are loaded first.

use std::sync::Arc;

use axum::http::Method;
use c402_evm::executor_for;
use c402_http::{PlatformClient, WalletClient};
use clap::Parser;
use tower_http::cors;
use tracing_subscriber::EnvFilter;

use c402_facilitator::config::FacilitatorConfig;
use c402_facilitator::{OrderService, facilitator_router};

#[derive(Debug, Parser)]
#[command(version, about = "x402 order facilitator")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, env = "CONFIG", default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(&cli).await {
        tracing::error!("Facilitator failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = FacilitatorConfig::load_from(&cli.config)?.validate()?;
    tracing::info!(
        addr = %config.addr,
        fee_percent = %config.fee_percent,
        default_network = %config.default_network,
        default_currency = %config.default_currency,
        pay_to = %config.pay_to,
        call_shape = ?config.call_shape,
        "Loaded configuration"
    );
    if config.expose_upstream_errors {
        tracing::warn!("Upstream error bodies will be returned to clients");
    }

    let platform =
        PlatformClient::try_new(config.platform_url.clone(), config.platform_api_key.clone())?
            .with_timeout(config.timeout());
    let wallet = WalletClient::try_new(
        config.wallet_url.clone(),
        config.wallet_api_key.clone(),
        &config.wallet_locator,
    )?
    .with_timeout(config.timeout())
    .with_deadline(config.timeout());
    let executor = executor_for(config.call_shape, Arc::new(wallet));
    let service = OrderService::new(Arc::new(platform), executor, config.service_settings());

    let app = facilitator_router(Arc::new(service)).layer(
        cors::CorsLayer::new()
            .allow_origin(cors::Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(cors::Any)
            .expose_headers(cors::Any),
    );

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!("Facilitator listening on http://{}", config.addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Facilitator shut down gracefully");
    Ok(())
}

/// Waits for Ctrl-C or SIGTERM (Unix) to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => tracing::info!("Received Ctrl-C, shutting down..."),
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down..."),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for Ctrl-C");
        tracing::info!("Received Ctrl-C, shutting down...");
    }
}
