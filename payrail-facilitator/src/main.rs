//! payrail facilitator HTTP server.
//!
//! # Usage
//!
//! ```bash
//! # Run with default config (config.toml in current directory)
//! cargo run -p payrail-facilitator --release
//!
//! # Run with custom config path
//! CONFIG=/path/to/config.toml cargo run -p payrail-facilitator
//!
//! # Configure logging level
//! RUST_LOG=payrail=debug cargo run -p payrail-facilitator
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG`: path to the TOML configuration file (default: `config.toml`)
//! - `HOST`: override bind address (default: `0.0.0.0`)
//! - `PORT`: override port (default: `4021`)
//! - `RUST_LOG`: log level filter (default: `info`)
//!
//! A `.env` file in the working directory is loaded first.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::Method;
use clap::Parser;
use tower_http::cors;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use payrail_facilitator::cli::Cli;
use payrail_facilitator::shutdown::ShutdownSignal;
use payrail_facilitator::{Facilitator, facilitator_router};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(Cli::parse()).await {
        tracing::error!("Facilitator failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = cli.into_config()?;
    let facilitator = Facilitator::from_config(&config)?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        networks = facilitator.registry().len(),
        secret_store = config.secret_store.is_some(),
        operator_endpoints = facilitator.admin_token().is_some(),
        "Loaded configuration"
    );

    let app = facilitator_router(Arc::new(facilitator))
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        );

    let shutdown = ShutdownSignal::install()?;
    let token = shutdown.token();

    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Facilitator listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;

    shutdown.wait().await;
    tracing::info!("Facilitator shut down gracefully");
    Ok(())
}
