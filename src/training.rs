//! Reports observed outcomes back to the Prediction Service for retraining
//! (spec §4.5). Best-effort: the core data path never depends on this
//! succeeding. The reporter's own outbound queue is a bounded channel
//! distinct from the Prediction Service's server-side training buffer,
//! which is external and out of scope.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::destinations::Destination;
use crate::predictions::TrainingObservation;
use crate::task::Task;

const CHANNEL_CAPACITY: usize = 1_024;

pub struct TrainingReporter {
    sender: mpsc::Sender<TrainingObservation>,
}

impl TrainingReporter {
    /// Spawns the background drain task and returns a reporter handle.
    /// `post` is the transport call (a real implementation POSTs to
    /// `/training/record`); injected so tests can substitute a fake.
    pub fn spawn<F, Fut>(post: F) -> Arc<Self>
    where
        F: Fn(TrainingObservation) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), String>> + Send + 'static,
    {
        let (sender, mut receiver) = mpsc::channel(CHANNEL_CAPACITY);

        tokio::spawn(async move {
            while let Some(observation) = receiver.recv().await {
                if let Err(err) = post(observation).await {
                    warn!(error = %err, "training report POST failed, dropping observation");
                }
            }
        });

        Arc::new(Self { sender })
    }

    pub async fn report_success(&self, task: &Task, destination: Destination) {
        self.try_send(observation_for(task, destination, true));
    }

    /// On DEAD-LETTERED, reporting is policy-gated by `report_dead_letters`
    /// (spec §4.5) — the caller decides whether to call this at all.
    pub async fn report_failure(&self, task: &Task, destination: Destination) {
        self.try_send(observation_for(task, destination, false));
    }

    fn try_send(&self, observation: TrainingObservation) {
        match self.sender.try_send(observation) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("training report channel full, dropping observation");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("training reporter channel closed, dropping observation");
            }
        }
    }
}

fn observation_for(task: &Task, destination: Destination, was_successful: bool) -> TrainingObservation {
    TrainingObservation {
        task_id: task.id.clone(),
        task_type: task.task_type.as_str().to_string(),
        features: task.features.clone().unwrap_or_default(),
        actual_duration_ms: task.duration_ms.unwrap_or(0),
        actual_priority: task.effective_priority(),
        was_successful,
        queue_name: destination.queue_name().to_string(),
        created_at_unix_ms: task.created_at_unix_ms,
        processed_at_unix_ms: task.completed_at_unix_ms.unwrap_or(task.created_at_unix_ms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn successful_ack_enqueues_one_observation_with_matching_duration() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        let reporter = TrainingReporter::spawn(move |observation| {
            let seen = Arc::clone(&seen_clone);
            async move {
                assert!(observation.was_successful);
                assert_eq!(observation.actual_duration_ms, 1_800);
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let mut task = Task::new(TaskType::EmailNotification, "t", "d", 4, 3, 0);
        task.started_at_unix_ms = Some(0);
        task.record_completion(1_800);

        reporter.report_success(&task, Destination::Normal).await;

        // Give the background drain task a moment to run.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
