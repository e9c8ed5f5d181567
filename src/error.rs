//! Error taxonomy for the core pipeline.
//!
//! Each component boundary gets its own `thiserror` enum; binaries and
//! services compose these with `anyhow::Error` at their edges, the way
//! `platform::runtime` wraps service failures.

use thiserror::Error;

/// Failures the Publisher surfaces to its caller.
///
/// Prediction failures never appear here — they degrade routing silently
/// and are absorbed before the publish step (spec §7 propagation policy).
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("broker rejected publish: destination at max depth")]
    Overflow,

    #[error("broker transport error: {0}")]
    Broker(#[from] BrokerError),

    #[error("failed to serialize task body: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Broker-layer failures, shared by the Publisher and Consumer Pool.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("broker connection not established")]
    NotConnected,
}

/// Failures republishing a task back onto its destination to persist a
/// retry's incremented count across redeliveries (spec §4.4, §8 testable
/// properties 2 & 3). Same shape as `PublishError` minus `Overflow` — a
/// retry republish competing for the same destination's capacity falls
/// back to a plain requeue rather than surfacing overflow to anyone.
#[derive(Debug, Error)]
pub enum RetryPublishError {
    #[error("broker transport error: {0}")]
    Broker(#[from] BrokerError),

    #[error("failed to serialize task body: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failures while handling a single delivery, used internally by the
/// Consumer Pool to decide retry vs. dead-letter and to tag metrics/
/// error_history. Never propagated to the broker client directly.
#[derive(Debug, Error, Clone)]
pub enum DeliveryError {
    #[error("could not parse message body: {0}")]
    Parse(String),

    #[error("handler failed: {0}")]
    Handler(String),

    #[error("shutdown requested mid-handler")]
    Shutdown,
}

impl DeliveryError {
    /// Parse failures are always terminal for the delivery (spec §7); every
    /// other kind is subject to the destination's retry budget.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryError::Parse(_))
    }
}
