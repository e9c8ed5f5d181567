//! The unit of work (spec §3 "Task").

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::features::Features;
use crate::predictions::Predictions;

/// Closed catalog of task types. The real catalog is out of scope (spec §1
/// "static task-type catalog") — we keep the handful of spec-cited variants
/// plus an escape hatch for anything a real catalog service would add.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    ReportGeneration,
    EmailNotification,
    DataExport,
    ImageProcessing,
    Other(String),
}

impl TaskType {
    pub fn as_str(&self) -> &str {
        match self {
            TaskType::ReportGeneration => "ReportGeneration",
            TaskType::EmailNotification => "EmailNotification",
            TaskType::DataExport => "DataExport",
            TaskType::ImageProcessing => "ImageProcessing",
            TaskType::Other(s) => s.as_str(),
        }
    }

    /// Parses a task-type name from the (out-of-scope) catalog surface.
    /// Unrecognized names round-trip through `Other` rather than being
    /// rejected — the real catalog is an external collaborator (spec §1).
    pub fn parse(name: &str) -> Self {
        match name {
            "ReportGeneration" => TaskType::ReportGeneration,
            "EmailNotification" => TaskType::EmailNotification,
            "DataExport" => TaskType::DataExport,
            "ImageProcessing" => TaskType::ImageProcessing,
            other => TaskType::Other(other.to_string()),
        }
    }
}

/// Fixed-capacity ring of the most recent handler errors (SPEC_FULL
/// addition grounding the "unbounded error_history" concern in §3): a task
/// retried many times cannot grow its JSON body without bound.
const ERROR_HISTORY_CAPACITY: usize = 10;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorHistory {
    entries: std::collections::VecDeque<String>,
}

impl ErrorHistory {
    pub fn push(&mut self, error: impl Into<String>) {
        if self.entries.len() == ERROR_HISTORY_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(error.into());
    }

    pub fn as_slice(&self) -> Vec<&str> {
        self.entries.iter().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub title: String,
    pub description: String,

    pub created_at_unix_ms: i64,
    pub started_at_unix_ms: Option<i64>,
    pub completed_at_unix_ms: Option<i64>,
    pub duration_ms: Option<u64>,

    pub manual_priority: u8,
    pub routing_key: Option<String>,

    pub retry_count: u32,
    pub max_retries: u32,
    pub last_retry_at_unix_ms: Option<i64>,
    pub last_error: Option<String>,
    pub error_history: ErrorHistory,

    /// Trace linkage for the *publishing* span, per spec §3 invariant —
    /// never the originating submitter's span.
    pub trace_id: Option<String>,
    pub span_id: Option<String>,

    pub features: Option<Features>,
    pub predictions: Option<Predictions>,
    pub ai_processed: bool,
    pub ai_processed_at_unix_ms: Option<i64>,
    pub ai_error: Option<String>,
}

impl Task {
    /// Creates a new task with a fresh id and default retry/control state.
    /// `now_unix_ms` is supplied by the caller (no hidden clock reads here,
    /// matching the deterministic-by-default posture of this crate).
    pub fn new(
        task_type: TaskType,
        title: impl Into<String>,
        description: impl Into<String>,
        manual_priority: u8,
        max_retries: u32,
        now_unix_ms: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task_type,
            title: title.into(),
            description: description.into(),
            created_at_unix_ms: now_unix_ms,
            started_at_unix_ms: None,
            completed_at_unix_ms: None,
            duration_ms: None,
            manual_priority: manual_priority.min(10),
            routing_key: None,
            retry_count: 0,
            max_retries,
            last_retry_at_unix_ms: None,
            last_error: None,
            error_history: ErrorHistory::default(),
            trace_id: None,
            span_id: None,
            features: None,
            predictions: None,
            ai_processed: false,
            ai_processed_at_unix_ms: None,
            ai_error: None,
        }
    }

    /// `round(0.7 * calculated_priority + 0.3 * manual_priority)` when
    /// predictions are present, else `manual_priority` (spec §3).
    pub fn effective_priority(&self) -> u8 {
        match &self.predictions {
            Some(p) => {
                let blended =
                    0.7_f64 * p.calculated_priority as f64 + 0.3_f64 * self.manual_priority as f64;
                blended.round().clamp(0.0, 10.0) as u8
            }
            None => self.manual_priority,
        }
    }

    /// True once a terminal outcome has been recorded; per the invariant in
    /// spec §3, no further retries are permitted past this point.
    pub fn is_completed(&self) -> bool {
        self.completed_at_unix_ms.is_some()
    }

    pub fn record_retry(&mut self, error: impl Into<String>, now_unix_ms: i64) {
        let error = error.into();
        self.last_error = Some(error.clone());
        self.error_history.push(error);
        self.retry_count += 1;
        self.last_retry_at_unix_ms = Some(now_unix_ms);
    }

    pub fn record_completion(&mut self, now_unix_ms: i64) {
        self.completed_at_unix_ms = Some(now_unix_ms);
        if let Some(started) = self.started_at_unix_ms {
            self.duration_ms = Some((now_unix_ms - started).max(0) as u64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_task() -> Task {
        Task::new(TaskType::ReportGeneration, "t", "d", 3, 3, 0)
    }

    #[test]
    fn effective_priority_without_predictions_is_manual() {
        let task = base_task();
        assert_eq!(task.effective_priority(), 3);
    }

    #[test]
    fn effective_priority_blends_per_spec_s1_scenario() {
        let mut task = base_task();
        task.predictions = Some(crate::predictions::Predictions {
            predicted_duration_ms: 45_000,
            duration_confidence: 0.9,
            calculated_priority: 9,
            priority_score: 0.9,
            priority_reason: "deadline imminent".into(),
            priority_factors: Default::default(),
            recommended_destination: "critical".into(),
            destination_confidence: 0.9,
            is_anomaly: false,
            anomaly_score: 0.0,
            anomaly_tags: vec![],
            success_probability: 0.8,
            risk_tags: vec![],
            recommended_action: "proceed".into(),
            resource_estimate: Default::default(),
            optimization_hints: vec![],
            model_version: "v1".into(),
            prediction_time_ms: 5,
        });
        // round(0.7*9 + 0.3*3) = round(6.3 + 0.9) = round(7.2) = 7
        assert_eq!(task.effective_priority(), 7);
    }

    #[test]
    fn error_history_is_bounded() {
        let mut task = base_task();
        for i in 0..(ERROR_HISTORY_CAPACITY + 5) {
            task.record_retry(format!("err-{i}"), i as i64);
        }
        assert_eq!(task.error_history.len(), ERROR_HISTORY_CAPACITY);
        assert_eq!(task.error_history.as_slice()[0], "err-5");
    }

    #[test]
    fn completion_computes_duration_from_started_at() {
        let mut task = base_task();
        task.started_at_unix_ms = Some(100);
        task.record_completion(1_900);
        assert_eq!(task.duration_ms, Some(1_800));
        assert!(task.is_completed());
    }

    #[test]
    fn json_round_trip_preserves_all_fields() {
        let mut task = base_task();
        task.retry_count = 2;
        task.record_retry("boom".to_string(), 42);
        task.trace_id = Some("abc".into());
        task.span_id = Some("def".into());
        task.features = Some(crate::features::Features::default());

        let encoded = serde_json::to_string(&task).unwrap();
        let decoded: Task = serde_json::from_str(&encoded).unwrap();

        assert_eq!(task.id, decoded.id);
        assert_eq!(task.task_type.as_str(), decoded.task_type.as_str());
        assert_eq!(task.retry_count, decoded.retry_count);
        assert_eq!(task.error_history.as_slice(), decoded.error_history.as_slice());
        assert_eq!(task.trace_id, decoded.trace_id);
        assert_eq!(task.span_id, decoded.span_id);
        assert_eq!(task.manual_priority, decoded.manual_priority);
        assert_eq!(serde_json::to_string(&decoded).unwrap(), encoded);
    }
}
