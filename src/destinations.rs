//! The closed catalog of priority destinations (spec §3).
//!
//! Destination is a fixed enum, not a runtime string, so an unknown value
//! arriving from the Prediction Service is a typed validation outcome
//! rather than something that can silently drift at a call site.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    Critical,
    High,
    Normal,
    Low,
    Batch,
    Anomaly,
}

/// Static properties for a destination, per the spec §3 table.
#[derive(Debug, Clone, Copy)]
pub struct DestinationProfile {
    pub destination: Destination,
    pub wire_priority: u8,
    pub ttl: Duration,
    pub max_depth: u32,
    pub routing_key: &'static str,
    pub exchange: Exchange,
}

/// The three broker exchanges declared at startup (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exchange {
    Priority,
    Anomaly,
    Dlq,
}

impl Exchange {
    pub fn name(&self) -> &'static str {
        match self {
            Exchange::Priority => "priority-exchange",
            Exchange::Anomaly => "anomaly-exchange",
            Exchange::Dlq => "dlq-exchange",
        }
    }

    pub fn kind(&self) -> lapin::ExchangeKind {
        match self {
            Exchange::Priority => lapin::ExchangeKind::Topic,
            Exchange::Anomaly | Exchange::Dlq => lapin::ExchangeKind::Direct,
        }
    }
}

const CATALOG: [DestinationProfile; 6] = [
    DestinationProfile {
        destination: Destination::Critical,
        wire_priority: 255,
        ttl: Duration::from_millis(60_000),
        max_depth: 1_000,
        routing_key: "priority.critical",
        exchange: Exchange::Priority,
    },
    DestinationProfile {
        destination: Destination::High,
        wire_priority: 200,
        ttl: Duration::from_millis(300_000),
        max_depth: 5_000,
        routing_key: "priority.high",
        exchange: Exchange::Priority,
    },
    DestinationProfile {
        destination: Destination::Normal,
        wire_priority: 100,
        ttl: Duration::from_millis(600_000),
        max_depth: 10_000,
        routing_key: "priority.normal",
        exchange: Exchange::Priority,
    },
    DestinationProfile {
        destination: Destination::Low,
        wire_priority: 50,
        ttl: Duration::from_millis(1_800_000),
        max_depth: 20_000,
        routing_key: "priority.low",
        exchange: Exchange::Priority,
    },
    DestinationProfile {
        destination: Destination::Batch,
        wire_priority: 10,
        ttl: Duration::from_millis(3_600_000),
        max_depth: 50_000,
        routing_key: "priority.batch",
        exchange: Exchange::Priority,
    },
    DestinationProfile {
        destination: Destination::Anomaly,
        wire_priority: 150,
        ttl: Duration::from_millis(300_000),
        max_depth: 2_000,
        routing_key: "anomaly.detected",
        exchange: Exchange::Anomaly,
    },
];

/// Dead-letter queue binding (spec §6): `dlq-queue` on `dlq-exchange`,
/// routing key `failed`.
pub const DLQ_QUEUE: &str = "dlq-queue";
pub const DLQ_ROUTING_KEY: &str = "failed";

impl Destination {
    pub fn profile(&self) -> DestinationProfile {
        CATALOG
            .iter()
            .find(|p| p.destination == *self)
            .copied()
            .expect("every Destination variant has a catalog entry")
    }

    /// Queue name on the broker; the destination's own lowercase name.
    pub fn queue_name(&self) -> &'static str {
        match self {
            Destination::Critical => "critical",
            Destination::High => "high",
            Destination::Normal => "normal",
            Destination::Low => "low",
            Destination::Batch => "batch",
            Destination::Anomaly => "anomaly",
        }
    }

    pub fn all() -> [Destination; 6] {
        [
            Destination::Critical,
            Destination::High,
            Destination::Normal,
            Destination::Low,
            Destination::Batch,
            Destination::Anomaly,
        ]
    }

    /// Parses a destination name as returned by the Prediction Service's
    /// `recommended_destination` field. Unknown names are the caller's
    /// problem to fall back on (spec §4.2 step 1), not a panic here.
    pub fn parse(name: &str) -> Option<Destination> {
        match name {
            "critical" => Some(Destination::Critical),
            "high" => Some(Destination::High),
            "normal" => Some(Destination::Normal),
            "low" => Some(Destination::Low),
            "batch" => Some(Destination::Batch),
            "anomaly" => Some(Destination::Anomaly),
            _ => None,
        }
    }
}
