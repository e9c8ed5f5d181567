//! Consumer binary: one logical consumer per priority destination, each
//! handled per its own prefetch/concurrency/retry policy (spec §4.4).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use tracing::info;
use triage_core::broker::connect_with_backoff;
use triage_core::config::AppConfig;
use triage_core::consumer::{ConsumerPool, TaskHandler};
use triage_core::destinations::Destination;
use triage_core::metrics::MetricsRegistry;
use triage_core::platform::telemetry::telemetry_service;
use triage_core::platform::Platform;
use triage_core::publisher::declare_topology;
use triage_core::task::Task;
use triage_core::training::TrainingReporter;

#[derive(Parser)]
#[command(author, version, about = "AI-optimized task queue consumer", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "configs/triage.toml")]
    config: String,
}

/// Demo handler: logs and succeeds unconditionally. A real deployment
/// substitutes a per-task-type handler registry — the task-type catalog
/// and its handlers are an external collaborator (spec §1), out of scope
/// here.
struct LoggingHandler;

#[async_trait]
impl TaskHandler for LoggingHandler {
    async fn handle(&self, task: &Task) -> Result<(), String> {
        info!(task_id = %task.id, task_type = task.task_type.as_str(), "processing task");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config_path = Path::new(&args.config).exists().then(|| args.config.clone());
    let config = AppConfig::load_from_path(config_path)?;

    let metrics = Arc::new(MetricsRegistry::new()?);

    let connection = connect_with_backoff(
        &config.broker.amqp_url(),
        std::time::Duration::from_secs(30),
    )
    .await?;

    // Declared idempotently by both the Publisher and the Consumer Pool
    // (spec §6) so a consumer can start up against a broker the producer
    // hasn't touched yet.
    let topology_channel = connection.create_channel().await?;
    declare_topology(&topology_channel).await?;
    drop(topology_channel);

    let training = TrainingReporter::spawn({
        let base_url = config.prediction.base_url.clone();
        let http = reqwest::Client::new();
        move |observation| {
            let url = format!("{base_url}/training/record");
            let http = http.clone();
            async move {
                let response = http
                    .post(&url)
                    .json(&observation)
                    .send()
                    .await
                    .map_err(|err| err.to_string())?;
                if response.status().is_success() {
                    Ok(())
                } else {
                    Err(format!("training service returned {}", response.status()))
                }
            }
        }
    });

    let mut handlers: HashMap<Destination, Arc<dyn TaskHandler>> = HashMap::new();
    for destination in Destination::all() {
        handlers.insert(destination, Arc::new(LoggingHandler));
    }

    let pool = ConsumerPool::new(
        connection,
        config.consumer.clone(),
        handlers,
        Arc::clone(&metrics),
        training,
    );

    let mut platform = Platform::new(config.clone(), Arc::clone(&metrics));
    platform.register_service(telemetry_service(Arc::clone(&metrics), config.exporter.clone()));

    let runtime = platform.start()?;
    let shutdown = runtime.shutdown_token();

    info!("triage consumer running");
    let pool_handle = tokio::spawn(async move { pool.run(shutdown).await.map_err(anyhow::Error::from) });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    runtime.shutdown().await?;
    pool_handle.await??;

    Ok(())
}
