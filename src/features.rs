//! Inputs to prediction (spec §3 "Features").
//!
//! All fields are optional; the Prediction Client imputes a handful of them
//! before sending (`impute`, see `prediction_client.rs`). Counting populated
//! fields — needed by the client to estimate payload richness — is done
//! through an explicit enumerated list of accessors rather than reflection
//! over the struct (spec §9 redesign flag).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Premium,
    Enterprise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessPriority {
    Low,
    Normal,
    High,
    Critical,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Features {
    // Input characteristics
    pub input_size_bytes: Option<u64>,
    pub record_count: Option<u64>,
    pub input_format: Option<String>,
    pub input_complexity: Option<f32>,

    // User context
    pub user_id: Option<String>,
    pub tenant_id: Option<String>,
    pub tier: Option<Tier>,
    pub recent_task_count: Option<u32>,

    // Temporal
    pub hour_of_day: Option<u8>,
    pub day_of_week: Option<u8>,
    pub is_peak_hour: Option<bool>,
    pub is_weekend: Option<bool>,
    pub is_holiday: Option<bool>,

    // System state
    pub queue_depth: Option<u32>,
    pub cpu_percent: Option<f32>,
    pub memory_mb: Option<f32>,
    pub active_consumer_count: Option<u32>,
    pub system_load: Option<f32>,

    // Business context
    pub department: Option<String>,
    pub business_priority: Option<BusinessPriority>,
    pub deadline_unix_ms: Option<i64>,
    pub is_scheduled: Option<bool>,
    pub source: Option<String>,

    // Dependency flags
    pub depends_on_external_api: Option<bool>,
    pub depends_on_file: Option<bool>,
    pub depends_on_database: Option<bool>,

    // Quality
    pub data_quality_score: Option<f32>,
    pub complexity_score: Option<f32>,
}

impl Features {
    /// Explicit, compile-time-closed list of every optional field, as a
    /// presence check. Unknown/new fields cannot silently change this
    /// count without someone also adding them here.
    fn presence_flags(&self) -> [bool; 28] {
        [
            self.input_size_bytes.is_some(),
            self.record_count.is_some(),
            self.input_format.is_some(),
            self.input_complexity.is_some(),
            self.user_id.is_some(),
            self.tenant_id.is_some(),
            self.tier.is_some(),
            self.recent_task_count.is_some(),
            self.hour_of_day.is_some(),
            self.day_of_week.is_some(),
            self.is_peak_hour.is_some(),
            self.is_weekend.is_some(),
            self.is_holiday.is_some(),
            self.queue_depth.is_some(),
            self.cpu_percent.is_some(),
            self.memory_mb.is_some(),
            self.active_consumer_count.is_some(),
            self.system_load.is_some(),
            self.department.is_some(),
            self.business_priority.is_some(),
            self.deadline_unix_ms.is_some(),
            self.is_scheduled.is_some(),
            self.source.is_some(),
            self.depends_on_external_api.is_some(),
            self.depends_on_file.is_some(),
            self.depends_on_database.is_some(),
            self.data_quality_score.is_some(),
            self.complexity_score.is_some(),
        ]
    }

    /// Number of populated fields, used as a crude richness signal when
    /// deciding whether a feature set is worth sending at all.
    pub fn populated_field_count(&self) -> usize {
        self.presence_flags().iter().filter(|p| **p).count()
    }

    pub fn is_empty(&self) -> bool {
        self.populated_field_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_features_has_zero_populated_fields() {
        let f = Features::default();
        assert!(f.is_empty());
        assert_eq!(f.populated_field_count(), 0);
    }

    #[test]
    fn populated_field_count_tracks_set_fields() {
        let mut f = Features::default();
        f.tier = Some(Tier::Enterprise);
        f.business_priority = Some(BusinessPriority::Critical);
        assert_eq!(f.populated_field_count(), 2);
        assert!(!f.is_empty());
    }
}
