use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use emitter_types::{EmissionRequest, ValidationError};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::emitter::{emit, EmissionSummary, EmitError};
use crate::payload::{load_payload, PayloadError};
use crate::queue::QueueClient;

pub const SUCCESS_BODY: &str = "Caliper Emitter Worker successfully triggered";

/// Shared application state
pub struct AppState<Q> {
    pub queue: Q,
    pub num_workers: usize,
    pub payload_path: PathBuf,
}

impl<Q: QueueClient> AppState<Q> {
    pub fn new(queue: Q, config: &Config) -> Self {
        Self {
            queue,
            num_workers: config.num_workers,
            payload_path: config.payload_path.clone(),
        }
    }
}

/// Everything that can end an invocation early.
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Payload(#[from] PayloadError),
    #[error(transparent)]
    Emit(#[from] EmitError),
}

impl InvocationError {
    fn status(&self) -> StatusCode {
        match self {
            InvocationError::Validation(_) => StatusCode::BAD_REQUEST,
            InvocationError::Payload(_) | InvocationError::Emit(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for InvocationError {
    fn into_response(self) -> Response {
        html_response(self.status(), format!("Error: {}", self))
    }
}

fn html_response(status: StatusCode, body: impl Into<String>) -> Response {
    (status, [(header::CONTENT_TYPE, "text/html")], body.into()).into_response()
}

/// Parse the request, load the payload and run every worker to completion.
async fn trigger<Q: QueueClient>(
    state: &AppState<Q>,
    body: &[u8],
) -> Result<EmissionSummary, InvocationError> {
    let request = EmissionRequest::parse(body)?;
    let payload = load_payload(&state.payload_path).await?;

    info!(
        "Emission triggered: secondsToRun={}, workers={}, payload={} bytes",
        request.seconds_to_run,
        state.num_workers,
        payload.len()
    );

    let summary = emit(&state.queue, payload, request.duration(), state.num_workers).await?;
    Ok(summary)
}

/// / and /emit - Flood the queue for `secondsToRun` seconds.
/// Also the fallback: API Gateway forwards stage-prefixed paths and any method.
async fn emit_handler<Q: QueueClient>(
    State(state): State<Arc<AppState<Q>>>,
    body: Bytes,
) -> Response {
    match trigger(&state, &body).await {
        Ok(summary) => {
            info!(
                "Emission complete: {} batches sent by {} workers",
                summary.batches_sent, summary.workers
            );
            html_response(StatusCode::OK, SUCCESS_BODY)
        }
        Err(e) => {
            warn!("Emission failed: {:#}", e);
            e.into_response()
        }
    }
}

/// Health check endpoint
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "emitter-service"
    }))
}

pub fn router<Q: QueueClient>(state: AppState<Q>) -> Router {
    Router::new()
        .route("/", any(emit_handler::<Q>))
        .route("/emit", any(emit_handler::<Q>))
        .route("/health", get(health_handler))
        .fallback(emit_handler::<Q>)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::stub::RecordingQueue;
    use axum::body::Body;
    use axum::http::Request;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;
    use tower::ServiceExt;

    fn payload_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn app(queue: RecordingQueue, payload_path: PathBuf, num_workers: usize) -> Router {
        router(AppState {
            queue,
            num_workers,
            payload_path,
        })
    }

    async fn post_body(app: Router, uri: &str, body: &str) -> (StatusCode, String, String) {
        send(app, "POST", uri, Body::from(body.to_string())).await
    }

    async fn send(
        app: Router,
        method: &str,
        uri: &str,
        body: Body,
    ) -> (StatusCode, String, String) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(body)
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, content_type, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_successful_trigger() {
        let file = payload_file(r#"{"generated":true}"#);
        let queue = RecordingQueue::with_latency(Duration::from_millis(1));

        let (status, content_type, body) = post_body(
            app(queue.clone(), file.path().to_path_buf(), 2),
            "/",
            r#"{ "secondsToRun": 0.05 }"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, "text/html");
        assert_eq!(body, SUCCESS_BODY);

        let batches = queue.batches();
        assert!(batches.len() >= 2);
        assert!(batches
            .iter()
            .flat_map(|b| b.entries())
            .all(|e| e.body == r#"{"generated":true}"#));
    }

    #[tokio::test]
    async fn test_emit_path_with_zero_seconds() {
        let file = payload_file("p");
        let queue = RecordingQueue::default();

        let (status, _, body) = post_body(
            app(queue.clone(), file.path().to_path_buf(), 3),
            "/emit",
            r#"{"secondsToRun": 0}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, SUCCESS_BODY);
        assert_eq!(queue.attempts(), 0);
    }

    #[tokio::test]
    async fn test_malformed_request() {
        let file = payload_file("p");
        let queue = RecordingQueue::default();

        let (status, content_type, body) =
            post_body(app(queue.clone(), file.path().to_path_buf(), 1), "/", "hello").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(content_type, "text/html");
        assert_eq!(body, "Error: required parameter secondsToRun not found");
        assert_eq!(queue.attempts(), 0);
    }

    #[tokio::test]
    async fn test_invalid_utf8_body() {
        let file = payload_file("p");
        let queue = RecordingQueue::default();

        let (status, content_type, body) = send(
            app(queue.clone(), file.path().to_path_buf(), 1),
            "POST",
            "/",
            Body::from(vec![0xffu8, 0xfe]),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(content_type, "text/html");
        assert_eq!(body, "Error: required parameter secondsToRun not found");
        assert_eq!(queue.attempts(), 0);
    }

    #[tokio::test]
    async fn test_stage_prefixed_path_triggers_emission() {
        let file = payload_file("p");
        let queue = RecordingQueue::with_latency(Duration::from_millis(1));

        let (status, content_type, body) = post_body(
            app(queue.clone(), file.path().to_path_buf(), 1),
            "/prod/",
            r#"{"secondsToRun": 0.02}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, "text/html");
        assert_eq!(body, SUCCESS_BODY);
        assert!(queue.attempts() >= 1);
    }

    #[tokio::test]
    async fn test_any_method_reaches_emission() {
        let file = payload_file("p");
        let queue = RecordingQueue::default();

        let (status, content_type, body) = send(
            app(queue.clone(), file.path().to_path_buf(), 1),
            "GET",
            "/",
            Body::empty(),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(content_type, "text/html");
        assert_eq!(body, "Error: required parameter secondsToRun not found");
    }

    #[tokio::test]
    async fn test_non_numeric_seconds() {
        let file = payload_file("p");
        let queue = RecordingQueue::default();

        let (status, _, body) = post_body(
            app(queue.clone(), file.path().to_path_buf(), 1),
            "/",
            r#"{"secondsToRun": "two"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.starts_with("Error: parameter secondsToRun must be a number"));
        assert_eq!(queue.attempts(), 0);
    }

    #[tokio::test]
    async fn test_missing_payload_file() {
        let queue = RecordingQueue::default();

        let (status, content_type, body) = post_body(
            app(queue.clone(), PathBuf::from("/nonexistent/generated.json"), 1),
            "/",
            r#"{"secondsToRun": 1}"#,
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(content_type, "text/html");
        assert!(body.starts_with("Error: failed to read payload file"));
        assert_eq!(queue.attempts(), 0);
    }

    #[tokio::test]
    async fn test_send_failure() {
        let file = payload_file("p");
        let queue = RecordingQueue::default().failing(1);

        let (status, _, body) = post_body(
            app(queue.clone(), file.path().to_path_buf(), 1),
            "/",
            r#"{"secondsToRun": 30}"#,
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            "Error: worker 0 stopped: stub queue rejected batch: injected failure"
        );
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(RecordingQueue::default(), PathBuf::from("unused"), 1)
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], "healthy");
    }
}
