//! The business-logic seam: a handler processes one task's payload. The
//! pool never looks inside a handler's error string — it only needs to
//! know success/failure to drive the retry/DLQ state machine.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::destinations::Destination;
use crate::task::Task;

pub type HandlerOutcome = Result<(), String>;

#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &Task) -> HandlerOutcome;
}

/// Destination-specific wrapper adding logging and policy annotations
/// (spec §4.4): critical gets a low-latency path, anomaly gets extra
/// diagnostics around the invocation, batch permits longer execution.
/// None of this changes the retry contract — it only changes what gets
/// logged and how long the wrapper is willing to wait before warning.
pub struct DestinationHandler {
    destination: Destination,
    inner: Arc<dyn TaskHandler>,
}

impl DestinationHandler {
    pub fn new(destination: Destination, inner: Arc<dyn TaskHandler>) -> Self {
        Self { destination, inner }
    }

    pub async fn invoke(&self, task: &Task) -> HandlerOutcome {
        match self.destination {
            Destination::Critical => self.invoke_low_latency(task).await,
            Destination::Anomaly => self.invoke_with_diagnostics(task).await,
            Destination::Batch => self.invoke_long_running(task).await,
            _ => self.inner.handle(task).await,
        }
    }

    async fn invoke_low_latency(&self, task: &Task) -> HandlerOutcome {
        const WARN_THRESHOLD: Duration = Duration::from_millis(200);
        let started = std::time::Instant::now();
        let result = self.inner.handle(task).await;
        let elapsed = started.elapsed();
        if elapsed > WARN_THRESHOLD {
            warn!(task_id = %task.id, elapsed_ms = elapsed.as_millis(), "critical handler exceeded low-latency budget");
        }
        result
    }

    async fn invoke_with_diagnostics(&self, task: &Task) -> HandlerOutcome {
        info!(
            task_id = %task.id,
            anomaly_score = task.predictions.as_ref().map(|p| p.anomaly_score).unwrap_or_default(),
            anomaly_tags = ?task.predictions.as_ref().map(|p| p.anomaly_tags.clone()).unwrap_or_default(),
            "processing anomaly-flagged task"
        );
        let result = self.inner.handle(task).await;
        match &result {
            Ok(()) => info!(task_id = %task.id, "anomaly task handled successfully"),
            Err(err) => warn!(task_id = %task.id, error = %err, "anomaly task handler failed"),
        }
        result
    }

    async fn invoke_long_running(&self, task: &Task) -> HandlerOutcome {
        // Batch handlers are permitted to run long; no warn threshold, just
        // a start/finish log pair so slow batch work is still visible.
        info!(task_id = %task.id, "starting batch handler");
        let result = self.inner.handle(task).await;
        info!(task_id = %task.id, ok = result.is_ok(), "batch handler finished");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskType;

    struct AlwaysOk;

    #[async_trait]
    impl TaskHandler for AlwaysOk {
        async fn handle(&self, _task: &Task) -> HandlerOutcome {
            Ok(())
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl TaskHandler for AlwaysFails {
        async fn handle(&self, _task: &Task) -> HandlerOutcome {
            Err("boom".to_string())
        }
    }

    #[tokio::test]
    async fn wrappers_preserve_the_inner_result() {
        let task = Task::new(TaskType::EmailNotification, "t", "d", 5, 3, 0);

        let ok = DestinationHandler::new(Destination::Critical, Arc::new(AlwaysOk));
        assert!(ok.invoke(&task).await.is_ok());

        let failing = DestinationHandler::new(Destination::Anomaly, Arc::new(AlwaysFails));
        assert!(failing.invoke(&task).await.is_err());

        let batch = DestinationHandler::new(Destination::Batch, Arc::new(AlwaysOk));
        assert!(batch.invoke(&task).await.is_ok());
    }
}
