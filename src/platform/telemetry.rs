//! Prometheus `/metrics` exposition, served from the real `MetricsRegistry`
//! (spec §6) rather than a hand-rolled exporter. Registered as a service on
//! both the producer and consumer binaries so each exposes its own metrics
//! endpoint per spec §6 "exposed at `/metrics` on each service".

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::ExporterSettings;
use crate::metrics::MetricsRegistry;
use crate::platform::service::ServiceRegistration;

pub fn telemetry_service(metrics: Arc<MetricsRegistry>, settings: ExporterSettings) -> ServiceRegistration {
    ServiceRegistration::new(
        "telemetry",
        Arc::new(move |_ctx, token: CancellationToken| {
            let metrics = Arc::clone(&metrics);
            let settings = settings.clone();
            tokio::spawn(async move {
                if !settings.enable_metrics {
                    return Ok(());
                }

                let app = Router::new()
                    .route(&settings.metrics_path, get(metrics_handler))
                    .route("/health", get(health_handler))
                    .with_state(metrics);

                let addr = SocketAddr::from(([0, 0, 0, 0], settings.metrics_port));
                let listener = TcpListener::bind(addr).await?;
                info!(port = settings.metrics_port, path = %settings.metrics_path, "telemetry server started");

                axum::serve(listener, app)
                    .with_graceful_shutdown(async move {
                        token.cancelled().await;
                        info!("shutting down telemetry server");
                    })
                    .await?;

                Ok(())
            })
        }),
    )
}

async fn metrics_handler(State(metrics): State<Arc<MetricsRegistry>>) -> String {
    metrics.render().unwrap_or_else(|err| {
        error!(error = %err, "failed to render metrics");
        String::new()
    })
}

async fn health_handler() -> &'static str {
    "ok"
}
