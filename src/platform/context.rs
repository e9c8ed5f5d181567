use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::metrics::MetricsRegistry;

/// Shared, cheaply-cloneable handle to process-wide state: configuration,
/// the metrics registry, and the root shutdown token. Replaces "module-level
/// singletons" (spec §9) with a value every service receives explicitly.
#[derive(Clone)]
pub struct PlatformContext {
    shared: Arc<SharedState>,
    shutdown: CancellationToken,
}

struct SharedState {
    config: AppConfig,
    metrics: Arc<MetricsRegistry>,
}

impl PlatformContext {
    pub(crate) fn new(
        config: AppConfig,
        metrics: Arc<MetricsRegistry>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            shared: Arc::new(SharedState { config, metrics }),
            shutdown,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.shared.config
    }

    pub fn metrics(&self) -> Arc<MetricsRegistry> {
        Arc::clone(&self.shared.metrics)
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}
