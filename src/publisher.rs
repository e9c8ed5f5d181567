//! Enriches, serializes, and publishes one task (spec §4.3).

use std::sync::Arc;
use std::time::Duration;

use lapin::options::{
    BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::publisher_confirm::Confirmation;
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection};
use tracing::{info_span, instrument, Instrument};
use uuid::Uuid;

use crate::broker::connect_with_backoff;
use crate::destinations::{Destination, Exchange, DLQ_QUEUE, DLQ_ROUTING_KEY};
use crate::error::{BrokerError, PublishError};
use crate::metrics::MetricsRegistry;
use crate::prediction_client::PredictionClient;
use crate::predictions::ALL_KINDS;
use crate::routing::{RoutingDecision, RoutingEngine};
use crate::task::Task;

pub struct Publisher {
    channel: Channel,
    prediction_client: Arc<dyn PredictionClient>,
    routing_engine: RoutingEngine,
    metrics: Arc<MetricsRegistry>,
}

impl Publisher {
    /// Opens a connection and declares the broker topology idempotently
    /// (spec §6): three exchanges, the six priority queues plus the DLQ
    /// queue, and their bindings. Running this N times yields the same
    /// broker state as running it once (testable property 9) because
    /// `declare` with identical arguments is itself idempotent in AMQP.
    pub async fn connect(
        amqp_url: &str,
        prediction_client: Arc<dyn PredictionClient>,
        metrics: Arc<MetricsRegistry>,
    ) -> Result<(Self, Connection), BrokerError> {
        let connection = connect_with_backoff(amqp_url, Duration::from_secs(30)).await?;
        let channel = connection.create_channel().await?;
        declare_topology(&channel).await?;
        // Publisher confirms are how a `reject-publish` overflow on a
        // priority queue reaches us at all: RabbitMQ naks the confirm
        // instead of erroring the publish call itself (spec §7 "Overflow").
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;

        Ok((
            Self {
                channel,
                prediction_client,
                routing_engine: RoutingEngine::new(),
                metrics,
            },
            connection,
        ))
    }

    /// Publish operation (spec §4.3 steps 1-6).
    #[instrument(name = "send_ai_optimized_task", skip(self, task), fields(task.id = %task.id, task.type = %task.task_type.as_str()))]
    pub async fn publish(&self, task: &mut Task) -> Result<(), PublishError> {
        let started = std::time::Instant::now();

        task.trace_id = task.trace_id.clone().or_else(|| Some(Uuid::new_v4().simple().to_string()));
        task.span_id = task.span_id.clone().or_else(|| Some(random_span_id()));

        let outcome = self.prediction_client.predict(task, &ALL_KINDS).await;
        if let Some(predictions) = outcome.ok() {
            task.predictions = Some(predictions);
            task.ai_processed = true;
            task.ai_processed_at_unix_ms = Some(chrono::Utc::now().timestamp_millis());
        }

        let decision = self
            .routing_engine
            .route(task, task.predictions.as_ref());

        let result = self.publish_with_decision(task, &decision).await;

        self.metrics.record_publish(
            task.task_type.as_str(),
            decision.destination.queue_name(),
            started.elapsed(),
        );

        result
    }

    async fn publish_with_decision(
        &self,
        task: &Task,
        decision: &RoutingDecision,
    ) -> Result<(), PublishError> {
        let body = serde_json::to_vec(task)?;
        let properties = build_properties(task, decision);

        let confirmation = self
            .channel
            .basic_publish(
                decision.exchange.name(),
                decision.routing_key,
                BasicPublishOptions::default(),
                &body,
                properties,
            )
            .instrument(info_span!("basic_publish", exchange = decision.exchange.name()))
            .await
            .map_err(BrokerError::from)?
            .await
            .map_err(BrokerError::from)?;

        match confirmation {
            Confirmation::Nack(_) => Err(PublishError::Overflow),
            Confirmation::Ack(_) | Confirmation::NotRequested => Ok(()),
        }
    }

    /// Batch publish (spec §4.3 "Batch publish"): batch-predict first, then
    /// publish sequentially with bounded parallelism, returning the success
    /// count.
    pub async fn publish_batch(&self, tasks: &mut [Task]) -> usize {
        const PARALLELISM: usize = 8;

        let predictions = self.prediction_client.predict_batch(tasks).await;
        for task in tasks.iter_mut() {
            if let Some(Some(p)) = predictions.get(&task.id).cloned() {
                task.predictions = Some(p);
                task.ai_processed = true;
                task.ai_processed_at_unix_ms = Some(chrono::Utc::now().timestamp_millis());
            }
        }

        let mut success = 0usize;
        for chunk in tasks.chunks_mut(PARALLELISM) {
            let results = futures::future::join_all(chunk.iter_mut().map(|task| async {
                let decision = self
                    .routing_engine
                    .route(task, task.predictions.as_ref());
                self.publish_with_decision(task, &decision).await
            }))
            .await;
            success += results.iter().filter(|r| r.is_ok()).count();
        }
        success
    }
}

/// Declares the broker topology idempotently (spec §6): three exchanges,
/// the six priority queues plus the DLQ queue, and their bindings. Called
/// from both `Publisher::connect` and the consumer binary's startup path
/// (spec §6 "declared idempotently at startup by both Publisher and
/// Consumer Pool") — repeated `declare` calls with identical arguments are
/// themselves idempotent in AMQP (testable property 9).
pub async fn declare_topology(channel: &Channel) -> Result<(), BrokerError> {
    for exchange in [Exchange::Priority, Exchange::Anomaly, Exchange::Dlq] {
        channel
            .exchange_declare(
                exchange.name(),
                exchange.kind(),
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
    }

    for destination in Destination::all() {
        let profile = destination.profile();
        let mut args = FieldTable::default();
        args.insert("x-max-priority".into(), AMQPValue::ShortShortUInt(255));
        args.insert(
            "x-dead-letter-exchange".into(),
            AMQPValue::LongString(Exchange::Dlq.name().into()),
        );
        args.insert(
            "x-dead-letter-routing-key".into(),
            AMQPValue::LongString(DLQ_ROUTING_KEY.into()),
        );
        args.insert(
            "x-message-ttl".into(),
            AMQPValue::LongLongInt(profile.ttl.as_millis() as i64),
        );
        args.insert(
            "x-max-length".into(),
            AMQPValue::LongLongInt(profile.max_depth as i64),
        );
        args.insert(
            "x-overflow".into(),
            AMQPValue::LongString("reject-publish".into()),
        );

        channel
            .queue_declare(
                destination.queue_name(),
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                args,
            )
            .await?;

        channel
            .queue_bind(
                destination.queue_name(),
                profile.exchange.name(),
                profile.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
    }

    channel
        .queue_declare(
            DLQ_QUEUE,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;

    channel
        .queue_bind(
            DLQ_QUEUE,
            Exchange::Dlq.name(),
            DLQ_ROUTING_KEY,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    Ok(())
}

/// Builds broker message properties including the W3C trace headers and
/// the AI-derived headers (spec §4.3 step 5, §6 "Message headers").
fn build_properties(task: &Task, decision: &RoutingDecision) -> BasicProperties {
    let mut headers = FieldTable::default();

    if let (Some(trace_id), Some(span_id)) = (&task.trace_id, &task.span_id) {
        headers.insert(
            "traceparent".into(),
            AMQPValue::LongString(format!("00-{trace_id}-{span_id}-01").into()),
        );
        headers.insert("tracestate".into(), AMQPValue::LongString("".into()));
    }

    headers.insert(
        "task-type".into(),
        AMQPValue::LongString(task.task_type.as_str().into()),
    );
    headers.insert("task-id".into(), AMQPValue::LongString(task.id.clone().into()));
    headers.insert(
        "retry-count".into(),
        AMQPValue::LongLongInt(task.retry_count as i64),
    );
    headers.insert(
        "max-retries".into(),
        AMQPValue::LongLongInt(task.max_retries as i64),
    );
    headers.insert(
        "ai-processed".into(),
        AMQPValue::Boolean(task.ai_processed),
    );
    headers.insert(
        "routing-reason".into(),
        AMQPValue::LongString(decision.reason.clone().into()),
    );
    headers.insert(
        "queue-recommendation".into(),
        AMQPValue::LongString(decision.destination.queue_name().into()),
    );

    if let Some(predictions) = &task.predictions {
        headers.insert(
            "ai-priority".into(),
            AMQPValue::LongLongInt(predictions.calculated_priority as i64),
        );
        headers.insert(
            "ai-duration-ms".into(),
            AMQPValue::LongLongInt(predictions.predicted_duration_ms as i64),
        );
        headers.insert(
            "ai-is-anomaly".into(),
            AMQPValue::Boolean(predictions.is_anomaly),
        );
        headers.insert(
            "ai-success-probability".into(),
            AMQPValue::LongString(predictions.success_probability.to_string().into()),
        );
        headers.insert(
            "ai-service-version".into(),
            AMQPValue::LongString(predictions.model_version.clone().into()),
        );
    }

    BasicProperties::default()
        .with_delivery_mode(2) // persistent
        .with_priority(decision.wire_priority.min(255))
        .with_expiration(decision.ttl_ms.to_string().into())
        .with_headers(headers)
        .with_content_type("application/json".into())
}

fn random_span_id() -> String {
    Uuid::new_v4().simple().to_string()[..16].to_string()
}
