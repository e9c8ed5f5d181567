//! Broker connection helper shared by the Publisher and the Consumer Pool
//! binary (spec §4.3, §7 "Transient broker failure ... recovered by
//! reconnect on next operation"). `lapin::Connection::connect` either
//! succeeds or fails outright; retrying it with exponential backoff is how
//! that reconnect-on-next-operation contract is actually met at the one
//! point in this crate where a connection is established.

use lapin::{Connection, ConnectionProperties};
use std::time::Duration;

use crate::error::BrokerError;

/// Connects to the broker, retrying with exponential backoff on transport
/// errors. Gives up once `max_elapsed` has passed, surfacing the last
/// error — callers treat that the same as any other `BrokerError`.
pub async fn connect_with_backoff(
    amqp_url: &str,
    max_elapsed: Duration,
) -> Result<Connection, BrokerError> {
    let policy = backoff::ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(200))
        .with_max_interval(Duration::from_secs(10))
        .with_max_elapsed_time(Some(max_elapsed))
        .build();

    backoff::future::retry(policy, || async {
        Connection::connect(amqp_url, ConnectionProperties::default())
            .await
            .map_err(|err| {
                tracing::warn!(error = %err, "broker connect attempt failed, retrying");
                backoff::Error::transient(BrokerError::Amqp(err))
            })
    })
    .await
}
