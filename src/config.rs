//! Configuration surface (spec §6 "Configuration"), loaded the way the
//! teacher's `PlatformConfig` does: a TOML file layered under env vars with
//! a `__`-separated prefix, via the `config` crate.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::destinations::Destination;

const DEFAULT_CONFIG_PATH: &str = "configs/triage.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub broker: BrokerSettings,
    pub prediction: PredictionSettings,
    pub consumer: ConsumerSettings,
    pub application: ApplicationSettings,
    pub exporter: ExporterSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            broker: BrokerSettings::default(),
            prediction: PredictionSettings::default(),
            consumer: ConsumerSettings::default(),
            application: ApplicationSettings::default(),
            exporter: ExporterSettings::default(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        Self::load_from_path(None::<PathBuf>)
    }

    pub fn load_from_path<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut builder = Config::builder().add_source(
            File::from(PathBuf::from(DEFAULT_CONFIG_PATH))
                .format(FileFormat::Toml)
                .required(false),
        );

        if let Some(path) = path {
            builder = builder.add_source(
                File::from(path.as_ref())
                    .format(FileFormat::Toml)
                    .required(true),
            );
        }

        builder = builder.add_source(Environment::with_prefix("TRIAGE").separator("__"));

        let config = builder.build()?;
        config.try_deserialize().context("invalid triage configuration")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
    pub vhost: String,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5672,
            user: "guest".to_string(),
            pass: "guest".to_string(),
            vhost: "/".to_string(),
        }
    }
}

impl BrokerSettings {
    pub fn amqp_url(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}{}",
            self.user, self.pass, self.host, self.port, self.vhost
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionSettings {
    pub base_url: String,
    pub timeout_ms: u64,
    pub health_cache_window_ms: u64,
    pub batch_enabled: bool,
    pub batch_size: usize,
    pub fallback: FallbackSettings,
}

impl Default for PredictionSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_ms: 10_000,
            health_cache_window_ms: 30_000,
            batch_enabled: true,
            batch_size: 100,
            fallback: FallbackSettings::default(),
        }
    }
}

/// Spec §9 Open Question: fallback duration jitter is deterministic by
/// default, toggled on explicitly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackSettings {
    pub jitter: bool,
}

impl Default for FallbackSettings {
    fn default() -> Self {
        Self { jitter: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DestinationPolicy {
    pub concurrency: usize,
    pub prefetch: u16,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerSettings {
    pub per_destination: HashMap<String, DestinationPolicy>,
    /// Whether a dead-lettered delivery also reports `was_successful =
    /// false` training feedback (spec §4.5 "policy flag").
    pub report_dead_letters: bool,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            per_destination: HashMap::new(),
            report_dead_letters: true,
        }
    }
}

impl ConsumerSettings {
    /// Resolves the effective policy for a destination: an override from
    /// config if present, else the spec §4.4 table default.
    pub fn policy_for(&self, destination: Destination) -> DestinationPolicy {
        self.per_destination
            .get(destination.queue_name())
            .cloned()
            .unwrap_or_else(|| default_policy(destination))
    }
}

fn default_policy(destination: Destination) -> DestinationPolicy {
    let (concurrency, prefetch, max_retries, retry_delay_ms) = match destination {
        Destination::Critical => (5, 1, 2, 1_000),
        Destination::High => (3, 2, 3, 2_000),
        Destination::Normal => (2, 5, 3, 5_000),
        Destination::Low => (1, 10, 3, 5_000),
        Destination::Batch => (1, 20, 5, 10_000),
        Destination::Anomaly => (2, 1, 1, 5_000),
    };
    DestinationPolicy {
        concurrency,
        prefetch,
        max_retries,
        retry_delay_ms,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSettings {
    pub listen_port: u16,
    pub auto_send_enabled: bool,
    pub auto_send_interval_ms: u64,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            listen_port: 8080,
            auto_send_enabled: false,
            auto_send_interval_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExporterSettings {
    pub trace_collector_endpoint: String,
    pub metrics_path: String,
    pub metrics_port: u16,
    pub enable_metrics: bool,
    pub log_level: String,
}

impl Default for ExporterSettings {
    fn default() -> Self {
        Self {
            trace_collector_endpoint: "http://localhost:14268/api/traces".to_string(),
            metrics_path: "/metrics".to_string(),
            metrics_port: 9090,
            enable_metrics: true,
            log_level: "info".to_string(),
        }
    }
}
