//! End-to-end scenarios from spec §8, exercised at the component boundary
//! (Routing Engine, Training Reporter) since the broker hop itself needs a
//! live AMQP server and is out of scope for these tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use triage_core::destinations::Destination;
use triage_core::predictions::ResourceEstimate;
use triage_core::training::TrainingReporter;
use triage_core::{Predictions, RoutingEngine, Task, TaskType};

fn sample_predictions(calculated_priority: u8, destination: &str, duration_ms: u64) -> Predictions {
    Predictions {
        predicted_duration_ms: duration_ms,
        duration_confidence: 0.8,
        calculated_priority,
        priority_score: 0.8,
        priority_reason: "deadline imminent".to_string(),
        priority_factors: HashMap::new(),
        recommended_destination: destination.to_string(),
        destination_confidence: 0.9,
        is_anomaly: false,
        anomaly_score: 0.0,
        anomaly_tags: vec![],
        success_probability: 0.8,
        risk_tags: vec![],
        recommended_action: "proceed".to_string(),
        resource_estimate: ResourceEstimate::default(),
        optimization_hints: vec![],
        model_version: "v1".to_string(),
        prediction_time_ms: 5,
    }
}

/// S1. AI-optimized critical: manual=3, prediction calculated_priority=9,
/// recommended=critical, duration=45000. Expected routing key
/// `priority.critical`, wire priority >= 200, effective priority
/// round(0.7*9 + 0.3*3) = 7.
#[test]
fn s1_ai_optimized_critical() {
    let mut task = Task::new(TaskType::ReportGeneration, "report", "gen", 3, 3, 0);
    let predictions = sample_predictions(9, "critical", 45_000);
    task.predictions = Some(predictions.clone());
    task.ai_processed = true;

    let engine = RoutingEngine::new();
    let decision = engine.route(&task, Some(&predictions));

    assert_eq!(decision.destination, Destination::Critical);
    assert_eq!(decision.routing_key, "priority.critical");
    assert!(decision.wire_priority >= 200);
    assert!(decision.reason.starts_with("ai-optimized:"));
    assert_eq!(task.effective_priority(), 7);
    assert!(task.ai_processed);
}

/// S2. Fallback normal: manual=4, empty features, prediction service times
/// out (so the publisher passes `None` to the Routing Engine). Expected
/// destination `normal`, routing key `priority.normal`, reason starting with
/// "fallback:".
#[test]
fn s2_fallback_normal_on_prediction_timeout() {
    let task = Task::new(TaskType::EmailNotification, "email", "send", 4, 3, 0);

    let engine = RoutingEngine::new();
    let decision = engine.route(&task, None);

    assert_eq!(decision.destination, Destination::Normal);
    assert_eq!(decision.routing_key, "priority.normal");
    assert!(decision.reason.starts_with("fallback:"));
}

/// S3. Anomaly flag: prediction returns is_anomaly=true, recommended=
/// anomaly. Expected destination `anomaly`, routing key `anomaly.detected`.
#[test]
fn s3_anomaly_flagged_prediction_routes_to_anomaly_destination() {
    let mut task = Task::new(TaskType::DataExport, "export", "run", 5, 3, 0);
    let mut predictions = sample_predictions(6, "anomaly", 5_000);
    predictions.is_anomaly = true;
    predictions.anomaly_score = 0.95;
    task.predictions = Some(predictions.clone());

    let engine = RoutingEngine::new();
    let decision = engine.route(&task, Some(&predictions));

    assert_eq!(decision.destination, Destination::Anomaly);
    assert_eq!(decision.routing_key, "anomaly.detected");
}

/// S6. Training feedback: a successful ACK on an EmailNotification task with
/// duration 1800ms results in exactly one observation reported with
/// `was_successful=true` and the matching duration.
#[tokio::test]
async fn s6_successful_completion_reports_one_training_observation() {
    let seen = Arc::new(AtomicUsize::new(0));
    let seen_clone = Arc::clone(&seen);

    let reporter = TrainingReporter::spawn(move |observation| {
        let seen = Arc::clone(&seen_clone);
        async move {
            assert!(observation.was_successful);
            assert_eq!(observation.actual_duration_ms, 1_800);
            assert_eq!(observation.task_type, "EmailNotification");
            assert_eq!(observation.queue_name, "normal");
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });

    let mut task = Task::new(TaskType::EmailNotification, "email", "send", 4, 3, 0);
    task.started_at_unix_ms = Some(0);
    task.record_completion(1_800);

    reporter.report_success(&task, Destination::Normal).await;
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;

    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

/// Testable property 11: manual priority 0 and 10 map to `low` and
/// `critical` respectively in fallback routing (no predictions).
#[test]
fn manual_priority_boundaries_in_fallback() {
    let engine = RoutingEngine::new();

    let low = Task::new(TaskType::EmailNotification, "t", "d", 0, 3, 0);
    assert_eq!(engine.route(&low, None).destination, Destination::Low);

    let critical = Task::new(TaskType::EmailNotification, "t", "d", 10, 3, 0);
    assert_eq!(engine.route(&critical, None).destination, Destination::Critical);
}

/// Testable property 10: an empty feature object still lets routing proceed
/// using fallback when there's no prediction, rather than erroring.
#[test]
fn empty_features_predict_without_error_and_routes_via_fallback() {
    let mut task = Task::new(TaskType::EmailNotification, "t", "d", 4, 3, 0);
    task.features = Some(triage_core::Features::default());

    let engine = RoutingEngine::new();
    let decision = engine.route(&task, None);
    assert!(decision.reason.starts_with("fallback:"));
}
