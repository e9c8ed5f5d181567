//! Pure mapping from (task, predictions|null) to a Routing Decision
//! (spec §4.2). No I/O, no shared state — every branch is unit-tested here.

use crate::destinations::Destination;
use crate::predictions::Predictions;
use crate::task::Task;

#[derive(Debug, Clone)]
pub struct RoutingDecision {
    pub destination: Destination,
    pub routing_key: &'static str,
    pub exchange: crate::destinations::Exchange,
    pub wire_priority: u8,
    pub ttl_ms: u64,
    pub reason: String,
}

/// Pure, stateless: constructing it carries no behavior beyond namespacing
/// the `route` function (spec §4.2 "no I/O and no shared state").
#[derive(Debug, Default, Clone, Copy)]
pub struct RoutingEngine;

impl RoutingEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn route(&self, task: &Task, predictions: Option<&Predictions>) -> RoutingDecision {
        match predictions {
            Some(p) => self.route_with_predictions(task, p),
            None => self.route_fallback(task),
        }
    }

    fn route_with_predictions(&self, task: &Task, p: &Predictions) -> RoutingDecision {
        let (destination, note) = match p.recommended_destination() {
            Some(d) => (d, String::new()),
            None => (
                Destination::Normal,
                " (validation: unknown recommended_destination, defaulted to normal)".to_string(),
            ),
        };
        let profile = destination.profile();

        // Wire priority comes from the destination's catalog entry, not
        // `calculated_priority` directly — the catalog column is what S1/S3
        // (spec §8) assert against ("wire priority >= 200" for `critical`),
        // and `calculated_priority` is still carried separately in the
        // `ai-priority` header (spec §6, publisher.rs::build_properties).
        RoutingDecision {
            destination,
            routing_key: profile.routing_key,
            exchange: profile.exchange,
            wire_priority: profile.wire_priority,
            ttl_ms: profile.ttl.as_millis() as u64,
            reason: format!("ai-optimized: {}{}", p.priority_reason, note),
        }
    }

    fn route_fallback(&self, task: &Task) -> RoutingDecision {
        let destination = if self.is_anomaly_flagged(task) {
            Destination::Anomaly
        } else if self.is_batch_suitable(task, None) {
            Destination::Batch
        } else {
            fallback_destination_by_priority(task.effective_priority())
        };

        let profile = destination.profile();
        RoutingDecision {
            destination,
            routing_key: profile.routing_key,
            exchange: profile.exchange,
            wire_priority: profile.wire_priority,
            ttl_ms: profile.ttl.as_millis() as u64,
            reason: "fallback: predictions unavailable".to_string(),
        }
    }

    /// No explicit anomaly signal is available without predictions; the
    /// fallback table (spec §4.2 step 2) only forces `anomaly`/`batch` when
    /// those flags are already known. Without an AI verdict there is no
    /// anomaly flag to read, so this is always `false` in pure fallback
    /// mode — kept as a named branch so a future caller-supplied signal
    /// (e.g. an upstream rule engine) has a single place to plug in.
    fn is_anomaly_flagged(&self, _task: &Task) -> bool {
        false
    }

    /// A task is batch-suitable iff `effective_priority <= 2` and predicted
    /// duration > 30s and the scheduled flag was not explicitly `false`
    /// (spec §4.2 step 4, testable property 12 — all three conditions
    /// required). The duration signal is taken only from the explicit
    /// parameter, never from a stale cached prediction on the task, so
    /// fallback routing (no predictions available this call) stays driven
    /// by the manual-priority table alone when no duration is supplied
    /// (testable property 6).
    pub fn is_batch_suitable(&self, task: &Task, predicted_duration_ms: Option<u64>) -> bool {
        if task.effective_priority() > 2 {
            return false;
        }
        let long_running = matches!(predicted_duration_ms, Some(ms) if ms > 30_000);
        if !long_running {
            return false;
        }
        let explicitly_unscheduled = task
            .features
            .as_ref()
            .and_then(|f| f.is_scheduled)
            .is_some_and(|scheduled| !scheduled);
        !explicitly_unscheduled
    }
}

/// `priority >= 8 -> critical`, `>= 5 -> high`, `>= 2 -> normal`,
/// `>= 0 -> low`, else `batch` (spec §4.2 step 2). Effective priority is
/// always in 0..=10, so the `_ => batch` arm is unreachable in practice but
/// required for exhaustiveness over `u8`.
fn fallback_destination_by_priority(priority: u8) -> Destination {
    match priority {
        8..=10 => Destination::Critical,
        5..=7 => Destination::High,
        2..=4 => Destination::Normal,
        0..=1 => Destination::Low,
        _ => Destination::Batch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Features;
    use crate::predictions::{Predictions, ResourceEstimate};
    use crate::task::TaskType;

    fn task_with_priority(priority: u8) -> Task {
        Task::new(TaskType::EmailNotification, "t", "d", priority, 3, 0)
    }

    fn sample_predictions(calculated_priority: u8, destination: &str) -> Predictions {
        Predictions {
            predicted_duration_ms: 1_000,
            duration_confidence: 0.5,
            calculated_priority,
            priority_score: 0.5,
            priority_reason: "because".into(),
            priority_factors: Default::default(),
            recommended_destination: destination.into(),
            destination_confidence: 0.5,
            is_anomaly: false,
            anomaly_score: 0.0,
            anomaly_tags: vec![],
            success_probability: 0.5,
            risk_tags: vec![],
            recommended_action: "proceed".into(),
            resource_estimate: ResourceEstimate::default(),
            optimization_hints: vec![],
            model_version: "v1".into(),
            prediction_time_ms: 1,
        }
    }

    #[test]
    fn ai_optimized_destination_honored_when_recognized() {
        let engine = RoutingEngine::new();
        let task = task_with_priority(3);
        let predictions = sample_predictions(9, "critical");
        let decision = engine.route(&task, Some(&predictions));
        assert_eq!(decision.destination, Destination::Critical);
        assert_eq!(decision.routing_key, "priority.critical");
        assert_eq!(decision.wire_priority, 255);
        assert!(decision.reason.starts_with("ai-optimized:"));
    }

    #[test]
    fn unknown_recommended_destination_falls_back_to_normal_with_note() {
        let engine = RoutingEngine::new();
        let task = task_with_priority(3);
        let predictions = sample_predictions(9, "urgent-bucket");
        let decision = engine.route(&task, Some(&predictions));
        assert_eq!(decision.destination, Destination::Normal);
        assert!(decision.reason.contains("validation"));
    }

    #[test]
    fn fallback_without_predictions_uses_manual_priority_table() {
        let engine = RoutingEngine::new();
        for (priority, expected) in [
            (10u8, Destination::Critical),
            (8, Destination::Critical),
            (5, Destination::High),
            (2, Destination::Normal),
            (1, Destination::Low),
            (0, Destination::Low),
        ] {
            let task = task_with_priority(priority);
            let decision = engine.route(&task, None);
            assert_eq!(decision.destination, expected, "priority {priority}");
            assert!(decision.reason.starts_with("fallback:"));
        }
    }

    #[test]
    fn is_batch_suitable_requires_all_three_conditions() {
        let engine = RoutingEngine::new();
        let mut task = task_with_priority(1);
        // Missing duration signal: not suitable.
        assert!(!engine.is_batch_suitable(&task, None));
        // Duration present but priority too high: not suitable.
        let high_priority_task = task_with_priority(5);
        assert!(!engine.is_batch_suitable(&high_priority_task, Some(40_000)));
        // Priority and duration fine, but explicitly unscheduled.
        task.features = Some(Features {
            is_scheduled: Some(false),
            ..Default::default()
        });
        assert!(!engine.is_batch_suitable(&task, Some(40_000)));
        // All three satisfied.
        task.features = Some(Features {
            is_scheduled: Some(true),
            ..Default::default()
        });
        assert!(engine.is_batch_suitable(&task, Some(40_000)));
        // Scheduled flag simply absent (not explicitly false) also counts.
        task.features = None;
        assert!(engine.is_batch_suitable(&task, Some(40_000)));
    }

    #[test]
    fn manual_priority_boundaries_map_per_testable_property_11() {
        let engine = RoutingEngine::new();
        assert_eq!(
            engine.route(&task_with_priority(0), None).destination,
            Destination::Low
        );
        assert_eq!(
            engine.route(&task_with_priority(10), None).destination,
            Destination::Critical
        );
    }

    #[test]
    fn routing_is_pure_and_deterministic() {
        let engine = RoutingEngine::new();
        let task = task_with_priority(6);
        let a = engine.route(&task, None);
        let b = engine.route(&task, None);
        assert_eq!(a.destination, b.destination);
        assert_eq!(a.wire_priority, b.wire_priority);
        assert_eq!(a.reason, b.reason);
    }
}
