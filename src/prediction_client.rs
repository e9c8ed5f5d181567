//! Synchronous request/response client to the Prediction Service (spec
//! §4.1). Never throws: failures collapse to `None`/`PredictionOutcome`, so
//! a caller cannot accidentally propagate a prediction error through `?`
//! (spec §9 "exception-for-control-flow" redesign flag).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::config::PredictionSettings;
use crate::features::Features;
use crate::metrics::MetricsRegistry;
use crate::predictions::{PredictionKind, Predictions};
use crate::task::Task;

/// The result of asking the Prediction Service for a verdict. Callers
/// branch on this discriminant instead of on a thrown exception (spec §9).
#[derive(Debug, Clone)]
pub enum PredictionOutcome {
    Ok(Predictions),
    Unavailable(UnavailableReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    Timeout,
    NonSuccessStatus,
    UnparseableBody,
    HealthNegative,
}

impl PredictionOutcome {
    pub fn ok(self) -> Option<Predictions> {
        match self {
            PredictionOutcome::Ok(p) => Some(p),
            PredictionOutcome::Unavailable(_) => None,
        }
    }
}

/// Abstracted so tests (and the Publisher's unit tests) can substitute a
/// fake implementation instead of a live HTTP dependency.
#[async_trait]
pub trait PredictionClient: Send + Sync {
    async fn predict(&self, task: &Task, requested_kinds: &[PredictionKind])
        -> PredictionOutcome;

    async fn predict_batch(
        &self,
        tasks: &[Task],
    ) -> HashMap<String, Option<Predictions>>;

    async fn health(&self) -> bool;
}

/// Requests larger than this are split into chunks before being sent (spec
/// §4.1 "batch size is bounded (<= 100)").
pub const MAX_BATCH_SIZE: usize = 100;

pub struct HttpPredictionClient {
    http: reqwest::Client,
    base_url: String,
    per_call_timeout: Duration,
    health_cache_window: Duration,
    last_success_unix_ms: AtomicU64,
    metrics: Arc<MetricsRegistry>,
}

impl HttpPredictionClient {
    pub fn new(settings: &PredictionSettings, metrics: Arc<MetricsRegistry>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .expect("reqwest client with rustls TLS is constructible");

        Self {
            http,
            base_url: settings.base_url.clone(),
            per_call_timeout: Duration::from_millis(settings.timeout_ms),
            health_cache_window: Duration::from_millis(settings.health_cache_window_ms),
            last_success_unix_ms: AtomicU64::new(0),
            metrics,
        }
    }

    fn mark_success(&self) {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        self.last_success_unix_ms.store(now, Ordering::Relaxed);
    }

    fn last_success_is_stale(&self) -> bool {
        let last = self.last_success_unix_ms.load(Ordering::Relaxed);
        if last == 0 {
            return true;
        }
        let now = Utc::now().timestamp_millis().max(0) as u64;
        Duration::from_millis(now.saturating_sub(last)) > self.health_cache_window
    }

    async fn do_predict(&self, body: &PredictRequest) -> Result<PredictResponse, UnavailableReason> {
        let url = format!("{}/predict", self.base_url);
        let response = tokio::time::timeout(
            self.per_call_timeout,
            self.http.post(&url).json(body).send(),
        )
        .await
        .map_err(|_| UnavailableReason::Timeout)?
        .map_err(|_| UnavailableReason::NonSuccessStatus)?;

        if !response.status().is_success() {
            return Err(UnavailableReason::NonSuccessStatus);
        }

        response
            .json::<PredictResponse>()
            .await
            .map_err(|_| UnavailableReason::UnparseableBody)
    }
}

#[async_trait]
impl PredictionClient for HttpPredictionClient {
    #[instrument(name = "ai_get_predictions", skip(self, task), fields(task.id = %task.id))]
    async fn predict(
        &self,
        task: &Task,
        requested_kinds: &[PredictionKind],
    ) -> PredictionOutcome {
        if self.last_success_is_stale() && !self.health().await {
            self.metrics
                .record_prediction("http", "predict", "health_negative");
            return PredictionOutcome::Unavailable(UnavailableReason::HealthNegative);
        }

        let features = impute(task.features.clone().unwrap_or_default());
        let body = PredictRequest {
            task_id: task.id.clone(),
            task_type: task.task_type.as_str().to_string(),
            requested_kinds: requested_kinds.to_vec(),
            features,
        };

        let started = std::time::Instant::now();
        match self.do_predict(&body).await {
            Ok(response) => {
                self.mark_success();
                self.metrics.record_prediction_latency("http", started.elapsed());
                self.metrics.record_prediction("http", "predict", "ok");
                PredictionOutcome::Ok(response.predictions)
            }
            Err(reason) => {
                warn!(?reason, task_id = %task.id, "prediction call failed, falling back");
                self.metrics.record_prediction_latency("http", started.elapsed());
                self.metrics
                    .record_prediction("http", "predict", outcome_label(reason));
                PredictionOutcome::Unavailable(reason)
            }
        }
    }

    #[instrument(name = "ai_get_predictions_batch", skip(self, tasks))]
    async fn predict_batch(&self, tasks: &[Task]) -> HashMap<String, Option<Predictions>> {
        let mut results = HashMap::with_capacity(tasks.len());
        for chunk in tasks.chunks(MAX_BATCH_SIZE) {
            let body = PredictBatchRequest {
                items: chunk
                    .iter()
                    .map(|t| PredictRequest {
                        task_id: t.id.clone(),
                        task_type: t.task_type.as_str().to_string(),
                        requested_kinds: crate::predictions::ALL_KINDS.to_vec(),
                        features: impute(t.features.clone().unwrap_or_default()),
                    })
                    .collect(),
            };

            let url = format!("{}/predict-batch", self.base_url);
            let outcome = tokio::time::timeout(
                self.per_call_timeout,
                self.http.post(&url).json(&body).send(),
            )
            .await;

            let parsed: Option<PredictBatchResponse> = match outcome {
                Ok(Ok(response)) if response.status().is_success() => {
                    response.json().await.ok()
                }
                _ => None,
            };

            match parsed {
                Some(batch) => {
                    for item in batch.items {
                        let value = if item.success {
                            item.predictions
                        } else {
                            None
                        };
                        results.insert(item.task_id, value);
                    }
                }
                None => {
                    for task in chunk {
                        results.insert(task.id.clone(), None);
                    }
                }
            }
        }

        for task in tasks {
            results.entry(task.id.clone()).or_insert(None);
        }
        results
    }

    async fn health(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        let result = tokio::time::timeout(self.per_call_timeout, self.http.get(&url).send()).await;
        matches!(result, Ok(Ok(response)) if response.status().is_success())
    }
}

fn outcome_label(reason: UnavailableReason) -> &'static str {
    match reason {
        UnavailableReason::Timeout => "timeout",
        UnavailableReason::NonSuccessStatus => "non_success",
        UnavailableReason::UnparseableBody => "unparseable",
        UnavailableReason::HealthNegative => "health_negative",
    }
}

/// Fills deterministic fields the client is responsible for populating
/// before sending (spec §4.1 "feature pre-population"): clock-derived
/// temporal fields, a task-type baseline input size, and a placeholder
/// user id. `system_load` is intentionally left absent rather than
/// randomized (spec §9 Open Question, resolved in SPEC_FULL.md).
pub fn impute(mut features: Features) -> Features {
    let now = Utc::now();

    if features.hour_of_day.is_none() {
        features.hour_of_day = Some(now.hour() as u8);
    }
    if features.day_of_week.is_none() {
        features.day_of_week = Some(now.weekday().num_days_from_monday() as u8);
    }
    if features.is_weekend.is_none() {
        let day = now.weekday().num_days_from_monday();
        features.is_weekend = Some(day >= 5);
    }
    if features.is_peak_hour.is_none() {
        let hour = now.hour();
        features.is_peak_hour = Some((9..=17).contains(&hour));
    }
    if features.input_size_bytes.is_none() {
        features.input_size_bytes = Some(DEFAULT_INPUT_SIZE_BYTES);
    }
    if features.user_id.is_none() {
        features.user_id = Some("anonymous".to_string());
    }

    features
}

const DEFAULT_INPUT_SIZE_BYTES: u64 = 4_096;

#[derive(Debug, Serialize)]
struct PredictRequest {
    task_id: String,
    task_type: String,
    requested_kinds: Vec<PredictionKind>,
    features: Features,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    predictions: Predictions,
}

#[derive(Debug, Serialize)]
struct PredictBatchRequest {
    items: Vec<PredictRequest>,
}

#[derive(Debug, Deserialize)]
struct PredictBatchResponse {
    items: Vec<PredictBatchItem>,
}

#[derive(Debug, Deserialize)]
struct PredictBatchItem {
    task_id: String,
    success: bool,
    predictions: Option<Predictions>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn impute_leaves_system_load_absent() {
        let features = impute(Features::default());
        assert!(features.system_load.is_none());
    }

    #[test]
    fn impute_fills_temporal_and_user_defaults_once() {
        let features = impute(Features::default());
        assert!(features.hour_of_day.is_some());
        assert!(features.day_of_week.is_some());
        assert!(features.is_weekend.is_some());
        assert!(features.is_peak_hour.is_some());
        assert_eq!(features.user_id.as_deref(), Some("anonymous"));
        assert_eq!(features.input_size_bytes, Some(DEFAULT_INPUT_SIZE_BYTES));
    }

    #[test]
    fn impute_does_not_override_caller_supplied_values() {
        let mut features = Features::default();
        features.user_id = Some("user-42".to_string());
        features.input_size_bytes = Some(128);
        let imputed = impute(features);
        assert_eq!(imputed.user_id.as_deref(), Some("user-42"));
        assert_eq!(imputed.input_size_bytes, Some(128));
    }
}
