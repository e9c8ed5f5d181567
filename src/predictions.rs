//! Outputs from the Prediction Service (spec §3 "Predictions").
//!
//! The task owns its `Predictions` by value; there is no back-reference from
//! predictions to the task beyond the `task_id` the client sent (spec §9
//! "cyclic references" redesign flag — ownership stays one-way).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::destinations::Destination;

/// The six independently requestable prediction axes (spec §4.1, §GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionKind {
    Duration,
    Priority,
    Destination,
    Anomaly,
    Success,
    Resource,
}

/// Convenience bundle for "all six kinds", the set the Publisher always
/// requests (spec §4.3 step 2).
pub const ALL_KINDS: [PredictionKind; 6] = [
    PredictionKind::Duration,
    PredictionKind::Priority,
    PredictionKind::Destination,
    PredictionKind::Anomaly,
    PredictionKind::Success,
    PredictionKind::Resource,
];

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ResourceEstimate {
    pub cpu_percent: f32,
    pub memory_mb: f32,
    pub network_kbps: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Predictions {
    pub predicted_duration_ms: u64,
    pub duration_confidence: f32,

    pub calculated_priority: u8,
    pub priority_score: f32,
    pub priority_reason: String,
    pub priority_factors: HashMap<String, f32>,

    /// Raw string as returned by the service; validated against the closed
    /// catalog by the Routing Engine, not here (spec §4.2 step 1).
    pub recommended_destination: String,
    pub destination_confidence: f32,

    pub is_anomaly: bool,
    pub anomaly_score: f32,
    pub anomaly_tags: Vec<String>,

    pub success_probability: f32,
    pub risk_tags: Vec<String>,
    pub recommended_action: String,

    pub resource_estimate: ResourceEstimate,

    pub optimization_hints: Vec<String>,
    pub model_version: String,
    pub prediction_time_ms: u64,
}

impl Predictions {
    /// The recommended destination parsed against the closed catalog, or
    /// `None` when the service returned an unrecognized name (spec §4.2
    /// step 1, testable property 7).
    pub fn recommended_destination(&self) -> Option<Destination> {
        Destination::parse(&self.recommended_destination)
    }
}

/// One observation record sent back by the Training Reporter (spec §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingObservation {
    pub task_id: String,
    pub task_type: String,
    pub features: crate::features::Features,
    pub actual_duration_ms: u64,
    pub actual_priority: u8,
    pub was_successful: bool,
    pub queue_name: String,
    pub created_at_unix_ms: i64,
    pub processed_at_unix_ms: i64,
}
