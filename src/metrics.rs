//! Process-wide metrics registry (spec §6 metric names, §9 "module-level
//! singletons" redesign flag). A single `prometheus::Registry` behind an
//! `Arc`, handed out by value as cloneable handles rather than a global
//! static, so tests can construct a fresh one per case (spec §9: "tests
//! must be able to reset it").

use std::time::Duration;

use anyhow::Result;
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramVec, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    producer_tasks_sent_total: CounterVec,
    producer_task_send_duration_seconds: HistogramVec,
    consumer_tasks_processed_total: CounterVec,
    consumer_task_processing_duration_seconds: HistogramVec,
    consumer_queue_wait_time_seconds: HistogramVec,
    ai_predictions_total: CounterVec,
    ai_prediction_latency_seconds: HistogramVec,
    ai_model_ready: GaugeVec,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let producer_tasks_sent_total = CounterVec::new(
            Opts::new(
                "producer_tasks_sent_total",
                "Total tasks published by the producer",
            ),
            &["task_type", "queue_name"],
        )?;
        let producer_task_send_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "producer_task_send_duration_seconds",
                "Time to enrich, serialize, and publish a task",
            ),
            &["task_type"],
        )?;
        let consumer_tasks_processed_total = CounterVec::new(
            Opts::new(
                "consumer_tasks_processed_total",
                "Total deliveries handled by the consumer pool",
            ),
            &["task_type", "queue_name", "status"],
        )?;
        let consumer_task_processing_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "consumer_task_processing_duration_seconds",
                "Handler execution time",
            ),
            &["task_type"],
        )?;
        let consumer_queue_wait_time_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "consumer_queue_wait_time_seconds",
                "Time between task creation and delivery pickup",
            ),
            &["queue_name"],
        )?;
        let ai_predictions_total = CounterVec::new(
            Opts::new("ai_predictions_total", "Total prediction client calls"),
            &["backend", "type", "status"],
        )?;
        let ai_prediction_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "ai_prediction_latency_seconds",
                "Prediction Service RPC latency",
            ),
            &["backend"],
        )?;
        let ai_model_ready = GaugeVec::new(
            Opts::new("ai_model_ready", "1 when a model backend is ready to serve"),
            &["model"],
        )?;

        registry.register(Box::new(producer_tasks_sent_total.clone()))?;
        registry.register(Box::new(producer_task_send_duration_seconds.clone()))?;
        registry.register(Box::new(consumer_tasks_processed_total.clone()))?;
        registry.register(Box::new(consumer_task_processing_duration_seconds.clone()))?;
        registry.register(Box::new(consumer_queue_wait_time_seconds.clone()))?;
        registry.register(Box::new(ai_predictions_total.clone()))?;
        registry.register(Box::new(ai_prediction_latency_seconds.clone()))?;
        registry.register(Box::new(ai_model_ready.clone()))?;

        Ok(Self {
            registry,
            producer_tasks_sent_total,
            producer_task_send_duration_seconds,
            consumer_tasks_processed_total,
            consumer_task_processing_duration_seconds,
            consumer_queue_wait_time_seconds,
            ai_predictions_total,
            ai_prediction_latency_seconds,
            ai_model_ready,
        })
    }

    pub fn record_publish(&self, task_type: &str, queue_name: &str, elapsed: Duration) {
        self.producer_tasks_sent_total
            .with_label_values(&[task_type, queue_name])
            .inc();
        self.producer_task_send_duration_seconds
            .with_label_values(&[task_type])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_delivery(
        &self,
        task_type: &str,
        queue_name: &str,
        status: &str,
        processing_time: Duration,
    ) {
        self.consumer_tasks_processed_total
            .with_label_values(&[task_type, queue_name, status])
            .inc();
        self.consumer_task_processing_duration_seconds
            .with_label_values(&[task_type])
            .observe(processing_time.as_secs_f64());
    }

    pub fn record_queue_wait(&self, queue_name: &str, wait: Duration) {
        self.consumer_queue_wait_time_seconds
            .with_label_values(&[queue_name])
            .observe(wait.as_secs_f64());
    }

    pub fn record_prediction(&self, backend: &str, kind: &str, status: &str) {
        self.ai_predictions_total
            .with_label_values(&[backend, kind, status])
            .inc();
    }

    pub fn record_prediction_latency(&self, backend: &str, elapsed: Duration) {
        self.ai_prediction_latency_seconds
            .with_label_values(&[backend])
            .observe(elapsed.as_secs_f64());
    }

    pub fn set_model_ready(&self, model: &str, ready: bool) {
        self.ai_model_ready
            .with_label_values(&[model])
            .set(if ready { 1.0 } else { 0.0 });
    }

    /// Renders the registry in the Prometheus text exposition format, for
    /// the `/metrics` endpoint (spec §6).
    pub fn render(&self) -> Result<String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
