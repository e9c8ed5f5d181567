//! Property-based coverage of the Routing Engine (spec §8 testable
//! properties 1, 2, 4): wire priority stays in bounds, and routing is a
//! pure, deterministic function of its inputs regardless of what those
//! inputs happen to be.

use proptest::prelude::*;
use std::collections::HashMap;
use triage_core::destinations::Destination;
use triage_core::predictions::ResourceEstimate;
use triage_core::{Predictions, RoutingEngine, Task, TaskType};

fn arb_task_type() -> impl Strategy<Value = TaskType> {
    prop_oneof![
        Just(TaskType::ReportGeneration),
        Just(TaskType::EmailNotification),
        Just(TaskType::DataExport),
        Just(TaskType::ImageProcessing),
    ]
}

fn arb_task() -> impl Strategy<Value = Task> {
    (arb_task_type(), 0u8..=10, 0u32..=10).prop_map(|(task_type, manual_priority, max_retries)| {
        Task::new(task_type, "t", "d", manual_priority, max_retries, 0)
    })
}

fn arb_destination_name() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("critical".to_string()),
        Just("high".to_string()),
        Just("normal".to_string()),
        Just("low".to_string()),
        Just("batch".to_string()),
        Just("anomaly".to_string()),
        "[a-z-]{1,12}".prop_map(|s| s),
    ]
}

fn arb_predictions() -> impl Strategy<Value = Predictions> {
    (0u8..=10, arb_destination_name()).prop_map(|(calculated_priority, recommended_destination)| {
        Predictions {
            predicted_duration_ms: 1_000,
            duration_confidence: 0.5,
            calculated_priority,
            priority_score: 0.5,
            priority_reason: "generated".to_string(),
            priority_factors: HashMap::new(),
            recommended_destination,
            destination_confidence: 0.5,
            is_anomaly: false,
            anomaly_score: 0.0,
            anomaly_tags: vec![],
            success_probability: 0.5,
            risk_tags: vec![],
            recommended_action: "proceed".to_string(),
            resource_estimate: ResourceEstimate::default(),
            optimization_hints: vec![],
            model_version: "v1".to_string(),
            prediction_time_ms: 1,
        }
    })
}

proptest! {
    /// Testable property 1: wire priority always lands in [0, 255], with or
    /// without predictions.
    #[test]
    fn wire_priority_always_in_bounds(task in arb_task(), predictions in proptest::option::of(arb_predictions())) {
        let engine = RoutingEngine::new();
        let decision = engine.route(&task, predictions.as_ref());
        prop_assert!(decision.wire_priority as u32 <= 255);
    }

    /// Testable property 4: routing is pure — identical inputs yield an
    /// identical decision every time, across any number of calls.
    #[test]
    fn routing_is_deterministic_across_repeated_calls(
        task in arb_task(),
        predictions in proptest::option::of(arb_predictions()),
    ) {
        let engine = RoutingEngine::new();
        let a = engine.route(&task, predictions.as_ref());
        let b = engine.route(&task, predictions.as_ref());
        prop_assert_eq!(a.destination, b.destination);
        prop_assert_eq!(a.wire_priority, b.wire_priority);
        prop_assert_eq!(a.ttl_ms, b.ttl_ms);
        prop_assert_eq!(a.reason, b.reason);
    }

    /// Testable property 7: an unrecognized `recommended_destination`
    /// always lands on `normal`, never panics, never picks another
    /// destination.
    #[test]
    fn unknown_recommended_destination_never_escapes_normal(
        task in arb_task(),
        predictions in arb_predictions(),
    ) {
        let engine = RoutingEngine::new();
        let decision = engine.route(&task, Some(&predictions));
        if Destination::parse(&predictions.recommended_destination).is_none() {
            prop_assert_eq!(decision.destination, Destination::Normal);
        }
    }
}
