mod auth;
mod config;
mod core;
mod error;
mod proxy;
mod routing;
mod webhook;

use tokio::signal;
use tracing_subscriber::EnvFilter;

use crate::config::GatewayConfig;
use crate::core::gateway::{ApiGateway, Gateway};
use crate::error::GatewayError;

#[tokio::main]
async fn main() -> Result<(), GatewayError> {
    // Load configuration before logging so the configured level applies
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "gateway.json".to_string());

    let config = match GatewayConfig::load_from_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load {}: {}", config_path, e);
            return Err(e.into());
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone())),
        )
        .init();

    tracing::info!(
        targets = config.targets.len(),
        routes = config.routes.len(),
        mock_mode = config.fallback.mock_mode,
        optional_dependency = config.fallback.optional_dependency,
        "configuration loaded from {}",
        config_path
    );

    // An ambiguous route table fails here and the process refuses to start.
    let gateway = ApiGateway::from_config(config)?;

    gateway.start().await?;

    signal::ctrl_c()
        .await
        .map_err(|e| GatewayError::InternalError(format!("signal handler: {}", e)))?;

    tracing::info!("Ctrl-C received, shutting down");
    gateway.stop().await?;

    Ok(())
}
