//! Process bootstrap: wires the shared context, spawns registered
//! services, and owns the root shutdown token. Replaces "module-level
//! singletons" (spec §9) with one `Platform` value per process instead of
//! statics — each binary constructs one, registers its services, and gets
//! back a `PlatformRuntime` handle it can shut down gracefully.

use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::AppConfig;
use crate::metrics::MetricsRegistry;
use crate::platform::context::PlatformContext;
use crate::platform::service::ServiceRegistration;

pub struct Platform {
    config: AppConfig,
    metrics: Arc<MetricsRegistry>,
    services: Vec<ServiceRegistration>,
}

impl Platform {
    pub fn new(config: AppConfig, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            config,
            metrics,
            services: Vec::new(),
        }
    }

    pub fn register_service(&mut self, service: ServiceRegistration) {
        self.services.push(service);
    }

    pub fn start(self) -> Result<PlatformRuntime> {
        initialize_logging(&self.config.exporter.log_level);

        let root_token = CancellationToken::new();
        let context = PlatformContext::new(self.config, Arc::clone(&self.metrics), root_token.child_token());

        let mut tasks = Vec::new();
        for service in self.services {
            let handle = service.spawn(context.clone(), root_token.child_token());
            tasks.push((service.name().to_string(), handle));
        }

        info!("platform boot completed");

        Ok(PlatformRuntime {
            context,
            cancel_token: root_token,
            tasks,
        })
    }
}

pub struct PlatformRuntime {
    context: PlatformContext,
    cancel_token: CancellationToken,
    tasks: Vec<(String, JoinHandle<Result<()>>)>,
}

impl PlatformRuntime {
    pub fn context(&self) -> PlatformContext {
        self.context.clone()
    }

    /// A child token of the root shutdown token, handed to long-running
    /// work a binary spawns itself (outside the `ServiceRegistration`
    /// mechanism) so it still observes the same shutdown signal.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }

    pub async fn shutdown(self) -> Result<()> {
        self.cancel_token.cancel();

        for (name, handle) in self.tasks {
            match handle.await {
                Ok(Ok(())) => info!(service = %name, "service shutdown cleanly"),
                Ok(Err(err)) => return Err(err),
                Err(err) => return Err(err.into()),
            }
        }

        Ok(())
    }
}

fn initialize_logging(log_level: &str) {
    let _ = tracing_subscriber::fmt().with_env_filter(log_level).try_init();
}
