//! Symbion Healer entry point
//!
//! Loads the configuration and fleet once, wires the production backends
//! (Prometheus over HTTP, OpenSSH for remote repair) and runs the control
//! loop until Ctrl+C. On shutdown the in-flight targets finish and no new
//! cycle is started.

use anyhow::{Context, Result};
use std::sync::Arc;
use symbion_healer::{
    ControlLoop, FleetLoader, HealerConfig, OpenSshConnector, PrometheusBackend, SystemClock,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("symbion_healer=info")),
        )
        .init();

    info!("🩺 Symbion Healer starting...");

    let config = HealerConfig::load().await.context("Failed to load healer config")?;
    let fleet = FleetLoader::load(&config.fleet_file)
        .await
        .context("Failed to load fleet")?;

    let backend = PrometheusBackend::new(&config.prometheus_url, config.query_timeout())
        .context("Failed to build Prometheus client")?;
    let connector = OpenSshConnector::new(
        config.remediation.connect_timeout(),
        config.remediation.command_timeout(),
    );

    let control = ControlLoop::new(
        &config,
        fleet,
        Arc::new(backend),
        Arc::new(connector),
        Arc::new(SystemClock),
    );

    let token = CancellationToken::new();
    let shutdown = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Shutdown requested, finishing in-flight targets");
            shutdown.cancel();
        }
    });

    control.run(token).await;
    info!("Symbion Healer stopped");
    Ok(())
}
