//! One logical consumer per priority destination (spec §4.4).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::config::ConsumerSettings;
use crate::consumer::handler::{DestinationHandler, TaskHandler};
use crate::consumer::state::DeliveryState;
use crate::destinations::Destination;
use crate::error::BrokerError;
use crate::metrics::MetricsRegistry;
use crate::task::Task;
use crate::trace::extract_traceparent;
use crate::training::TrainingReporter;

/// Per-destination running counters for the periodic introspection loop
/// (spec §4.4 "Every 10s, the pool logs per-destination throughput and
/// rolling average latency").
#[derive(Default)]
struct DestinationStats {
    processed: AtomicU64,
    total_latency_ms: AtomicU64,
}

pub struct ConsumerPool {
    connection: Connection,
    settings: ConsumerSettings,
    handlers: HashMap<Destination, Arc<DestinationHandler>>,
    metrics: Arc<MetricsRegistry>,
    training: Arc<TrainingReporter>,
    stats: Arc<HashMap<Destination, DestinationStats>>,
}

impl ConsumerPool {
    pub fn new(
        connection: Connection,
        settings: ConsumerSettings,
        handlers: HashMap<Destination, Arc<dyn TaskHandler>>,
        metrics: Arc<MetricsRegistry>,
        training: Arc<TrainingReporter>,
    ) -> Self {
        let handlers = handlers
            .into_iter()
            .map(|(d, h)| (d, Arc::new(DestinationHandler::new(d, h))))
            .collect();

        let stats = Arc::new(
            Destination::all()
                .into_iter()
                .map(|d| (d, DestinationStats::default()))
                .collect(),
        );

        Self {
            connection,
            settings,
            handlers,
            metrics,
            training,
            stats,
        }
    }

    /// Spawns one worker group per destination plus the periodic
    /// introspection loop, returning their join handles so the caller can
    /// await graceful shutdown.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), BrokerError> {
        let mut tasks = Vec::new();

        for destination in Destination::all() {
            let Some(handler) = self.handlers.get(&destination).cloned() else {
                continue;
            };
            let channel = self.connection.create_channel().await?;
            let policy = self.settings.policy_for(destination);
            let metrics = Arc::clone(&self.metrics);
            let training = Arc::clone(&self.training);
            let stats = Arc::clone(&self.stats);
            let report_dead_letters = self.settings.report_dead_letters;
            let token = shutdown.child_token();

            tasks.push(tokio::spawn(async move {
                run_destination_consumer(
                    channel,
                    destination,
                    policy,
                    handler,
                    metrics,
                    training,
                    stats,
                    report_dead_letters,
                    token,
                )
                .await
            }));
        }

        tasks.push(tokio::spawn(introspection_loop(
            Arc::clone(&self.stats),
            shutdown.child_token(),
        )));

        for task in tasks {
            let _ = task.await;
        }

        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_destination_consumer(
    channel: Channel,
    destination: Destination,
    policy: crate::config::DestinationPolicy,
    handler: Arc<DestinationHandler>,
    metrics: Arc<MetricsRegistry>,
    training: Arc<TrainingReporter>,
    stats: Arc<HashMap<Destination, DestinationStats>>,
    report_dead_letters: bool,
    shutdown: CancellationToken,
) -> Result<(), BrokerError> {
    channel
        .basic_qos(policy.prefetch, BasicQosOptions::default())
        .await?;

    let mut consumer = channel
        .basic_consume(
            destination.queue_name(),
            &format!("consumer-{}", destination.queue_name()),
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;

    // Bounds in-flight handler executions to the destination's configured
    // concurrency; deliveries beyond that wait for a permit before their
    // handler starts (spec §5 "independent worker group sized by its
    // concurrency setting").
    let semaphore = Arc::new(Semaphore::new(policy.concurrency.max(1)));

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!(destination = destination.queue_name(), "consumer shutting down gracefully");
                break;
            }
            next = consumer.next() => {
                let Some(delivery) = next else { break };
                let delivery = match delivery {
                    Ok(delivery) => delivery,
                    Err(err) => {
                        warn!(destination = destination.queue_name(), error = %err, "delivery stream error");
                        continue;
                    }
                };

                let permit = Arc::clone(&semaphore).acquire_owned().await.expect("semaphore not closed");
                let handler = Arc::clone(&handler);
                let metrics = Arc::clone(&metrics);
                let training = Arc::clone(&training);
                let stats = Arc::clone(&stats);
                let policy = policy.clone();
                let worker_shutdown = shutdown.child_token();
                let retry_channel = channel.clone();

                tokio::spawn(async move {
                    let _permit = permit;
                    handle_delivery(
                        delivery,
                        retry_channel,
                        destination,
                        &policy,
                        handler,
                        metrics,
                        training,
                        stats,
                        report_dead_letters,
                        worker_shutdown,
                    )
                    .instrument(info_span!("consume_priority_task", destination = destination.queue_name()))
                    .await;
                });
            }
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn handle_delivery(
    delivery: lapin::message::Delivery,
    channel: Channel,
    destination: Destination,
    policy: &crate::config::DestinationPolicy,
    handler: Arc<DestinationHandler>,
    metrics: Arc<MetricsRegistry>,
    training: Arc<TrainingReporter>,
    stats: Arc<HashMap<Destination, DestinationStats>>,
    report_dead_letters: bool,
    shutdown: CancellationToken,
) {
    let mut state = DeliveryState::Received;

    let parent_trace = extract_traceparent(delivery.properties.headers().as_ref());
    let delivery_span = info_span!(
        "consume_ai_optimized_task",
        destination = destination.queue_name(),
        trace_id = parent_trace.as_ref().map(|t| t.trace_id.as_str()).unwrap_or_default(),
        parent_span_id = parent_trace.as_ref().map(|t| t.parent_span_id.as_str()).unwrap_or_default(),
    );
    async move {

    let mut task: Task = match serde_json::from_slice(&delivery.data) {
        Ok(task) => {
            state = DeliveryState::Parsed;
            task
        }
        Err(err) => {
            warn!(destination = destination.queue_name(), error = %err, "failed to parse delivery body");
            let _ = delivery
                .nack(BasicNackOptions {
                    requeue: false,
                    ..Default::default()
                })
                .await;
            metrics.record_delivery(
                "unknown",
                destination.queue_name(),
                DeliveryState::DeadLettered.metric_status_label(),
                Duration::ZERO,
            );
            return;
        }
    };

    let now_ms = chrono::Utc::now().timestamp_millis();
    let queue_wait = Duration::from_millis((now_ms - task.created_at_unix_ms).max(0) as u64);
    metrics.record_queue_wait(destination.queue_name(), queue_wait);

    task.started_at_unix_ms = Some(now_ms);
    state = DeliveryState::InFlight;

    let handler_started = std::time::Instant::now();
    let outcome = tokio::select! {
        result = handler.invoke(&task) => result,
        _ = shutdown.cancelled() => Err("shutdown requested mid-handler".to_string()),
    };
    let processing_time = handler_started.elapsed();

    match outcome {
        Ok(()) => {
            let now_ms = chrono::Utc::now().timestamp_millis();
            task.record_completion(now_ms);
            state = DeliveryState::Acked;

            let _ = delivery.ack(BasicAckOptions::default()).await;

            if let Some(destination_stats) = stats.get(&destination) {
                destination_stats.processed.fetch_add(1, Ordering::Relaxed);
                destination_stats
                    .total_latency_ms
                    .fetch_add(processing_time.as_millis() as u64, Ordering::Relaxed);
            }

            metrics.record_delivery(
                task.task_type.as_str(),
                destination.queue_name(),
                state.metric_status_label(),
                processing_time,
            );

            if state.emits_training_data() {
                training.report_success(&task, destination).await;
            }
        }
        Err(error) => {
            let now_ms = chrono::Utc::now().timestamp_millis();
            task.record_retry(error, now_ms);

            if is_within_retry_budget(task.retry_count, policy.max_retries) {
                state = DeliveryState::Requeued;
                tokio::time::sleep(Duration::from_millis(policy.retry_delay_ms)).await;

                // Plain `nack(requeue: true)` redelivers the *original*
                // unchanged body, so `retry_count` would reset to whatever
                // it was before `record_retry` on every redelivery and the
                // budget would never exhaust (testable properties 2 & 3,
                // scenario S4). Republishing the mutated task carries the
                // incremented count across redeliveries; acking the
                // original then removes it from the queue exactly once.
                match republish_for_retry(&channel, destination, &task, &delivery.properties).await
                {
                    Ok(()) => {
                        let _ = delivery.ack(BasicAckOptions::default()).await;
                    }
                    Err(err) => {
                        warn!(
                            destination = destination.queue_name(),
                            task_id = %task.id,
                            error = %err,
                            "failed to republish task for retry, falling back to plain requeue"
                        );
                        let _ = delivery
                            .nack(BasicNackOptions {
                                requeue: true,
                                ..Default::default()
                            })
                            .await;
                    }
                }
            } else {
                state = DeliveryState::DeadLettered;
                let _ = delivery
                    .nack(BasicNackOptions {
                        requeue: false,
                        ..Default::default()
                    })
                    .await;

                if report_dead_letters {
                    training.report_failure(&task, destination).await;
                }
            }

            metrics.record_delivery(
                task.task_type.as_str(),
                destination.queue_name(),
                state.metric_status_label(),
                processing_time,
            );
        }
    }

    }
    .instrument(delivery_span)
    .await
}

/// Republishes `task` (with its already-incremented `retry_count`) onto
/// `destination`'s own exchange/routing key, carrying forward the
/// original delivery's properties apart from the `retry-count` header.
/// This is what makes the retry budget stick across redeliveries instead
/// of resetting every time RabbitMQ hands the unchanged original body back
/// (spec §4.4, §8 testable properties 2 & 3).
/// The retry budget is `max_retries + 1` attempts inclusive of the original
/// (spec §8 "Retry budget"/GLOSSARY): after `record_retry` increments,
/// counts `1..=max_retries` are still within budget and get another
/// attempt; anything past that is dead-lettered.
fn is_within_retry_budget(retry_count: u32, max_retries: u32) -> bool {
    retry_count <= max_retries
}

async fn republish_for_retry(
    channel: &Channel,
    destination: Destination,
    task: &Task,
    original_properties: &BasicProperties,
) -> Result<(), crate::error::RetryPublishError> {
    let profile = destination.profile();
    let body = serde_json::to_vec(task)?;

    let mut headers = original_properties.headers().clone().unwrap_or_default();
    headers.insert(
        "retry-count".into(),
        AMQPValue::LongLongInt(task.retry_count as i64),
    );
    let properties = original_properties.clone().with_headers(headers);

    channel
        .basic_publish(
            profile.exchange.name(),
            profile.routing_key,
            BasicPublishOptions::default(),
            &body,
            properties,
        )
        .await
        .map_err(BrokerError::from)?
        .await
        .map_err(BrokerError::from)?;

    Ok(())
}

async fn introspection_loop(
    stats: Arc<HashMap<Destination, DestinationStats>>,
    shutdown: CancellationToken,
) -> Result<(), BrokerError> {
    let mut interval = tokio::time::interval(Duration::from_secs(10));
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            _ = interval.tick() => {
                for (destination, destination_stats) in stats.iter() {
                    let processed = destination_stats.processed.swap(0, Ordering::Relaxed);
                    let total_latency_ms = destination_stats.total_latency_ms.swap(0, Ordering::Relaxed);
                    let avg_latency_ms = if processed > 0 { total_latency_ms / processed } else { 0 };
                    info!(
                        destination = destination.queue_name(),
                        throughput_per_10s = processed,
                        avg_latency_ms,
                        "consumer pool introspection tick"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// S4 boundary (spec §8, max_retries=3): deliveries 1-3 stay within
    /// budget, delivery 4 (retry_count already incremented to 4) does not.
    #[test]
    fn retry_budget_allows_max_retries_attempts_after_the_original() {
        assert!(is_within_retry_budget(1, 3));
        assert!(is_within_retry_budget(2, 3));
        assert!(is_within_retry_budget(3, 3));
        assert!(!is_within_retry_budget(4, 3));
    }

    #[test]
    fn retry_budget_of_zero_dead_letters_immediately() {
        assert!(!is_within_retry_budget(1, 0));
    }
}
