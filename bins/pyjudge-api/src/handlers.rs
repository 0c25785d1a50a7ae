// HTTP route handlers for the pyjudge API

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use pyjudge_common::types::{ExecutionRequest, ExecutionResponse, Language, TestCase};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::metrics;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct PlaygroundRequest {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub tests: Option<Vec<TestCase>>,
}

/// Request rejected before any code runs
#[derive(Debug)]
pub struct BadRequest {
    reason: &'static str,
    message: String,
}

impl BadRequest {
    fn new(reason: &'static str, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

impl IntoResponse for BadRequest {
    fn into_response(self) -> Response {
        metrics::record_rejection(self.reason);
        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

/// Validate a playground request into an executable one
pub fn validate(request: PlaygroundRequest) -> Result<ExecutionRequest, BadRequest> {
    let code = match request.code {
        Some(code) if !code.is_empty() => code,
        _ => return Err(BadRequest::new("missing_code", "Code payload is required.")),
    };

    let tests = match request.tests {
        Some(tests) if !tests.is_empty() => tests,
        _ => return Err(BadRequest::new("missing_tests", "No tests were provided.")),
    };

    let language = request.language.as_deref().unwrap_or("python");
    if Language::from_str(language) != Some(Language::Python) {
        return Err(BadRequest::new(
            "unsupported_language",
            "Only Python exercises are supported right now.",
        ));
    }

    Ok(ExecutionRequest { code, tests })
}

/// POST /playground - Run a submission against its tests
pub async fn run_playground(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PlaygroundRequest>, JsonRejection>,
) -> Result<Json<ExecutionResponse>, BadRequest> {
    let request_id = Uuid::new_v4();

    let Json(request) = payload.map_err(|rejection| {
        warn!(request_id = %request_id, error = %rejection.body_text(), "Malformed playground request");
        BadRequest::new("malformed_body", rejection.body_text())
    })?;

    let ExecutionRequest { code, tests } = validate(request).map_err(|rejection| {
        warn!(request_id = %request_id, reason = rejection.reason, "Playground request rejected");
        rejection
    })?;

    info!(
        request_id = %request_id,
        test_cases = tests.len(),
        source_size = code.len(),
        "Running playground submission"
    );

    let start = Instant::now();
    let results = state.runner.run(&code, &tests).await;
    let elapsed = start.elapsed();

    metrics::record_run(&results, elapsed.as_secs_f64());

    let passed = results.iter().filter(|r| r.is_passed()).count();
    info!(
        request_id = %request_id,
        passed,
        total = results.len(),
        execution_ms = elapsed.as_millis() as u64,
        "Playground submission finished"
    );

    Ok(Json(ExecutionResponse { results }))
}

/// GET /status - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /metrics - Prometheus exposition
pub async fn metrics_endpoint() -> Response {
    match metrics::render() {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to render metrics").into_response()
        }
    }
}
