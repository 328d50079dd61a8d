//! Thin JSON-in/JSON-out `axum` façade over [`judge_pool::JudgeService`].
//!
//! Submission failures (timeout, OOM, compile error, sandbox error) are not
//! HTTP errors: they come back as HTTP 200 with a `reason` field. HTTP 4xx
//! is reserved for requests that never reach the worker pool at all.

use std::sync::Arc;

use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use judge_core::{BatchRequest, BatchResult, StatusResponse, Submission, Verdict, VerdictForm};
use judge_pool::JudgeService;
use serde::Serialize;
use tower_http::trace::TraceLayer;

pub fn router(service: Arc<JudgeService>) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/judge", post(judge_one))
        .route("/run", post(run_one))
        .route("/judge/batch", post(judge_batch))
        .route("/run/batch", post(run_batch))
        .route("/judge/long-batch", post(judge_long_batch))
        .route("/run/long-batch", post(run_long_batch))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

async fn status(State(service): State<Arc<JudgeService>>) -> Json<StatusResponse> {
    Json(service.status())
}

async fn judge_one(
    State(service): State<Arc<JudgeService>>,
    body: Result<Json<Submission>, axum::extract::rejection::JsonRejection>,
) -> Result<Json<Verdict>, ApiError> {
    let Json(submission) = body?;
    Ok(Json(service.judge_one(submission, VerdictForm::Judge).await))
}

async fn run_one(
    State(service): State<Arc<JudgeService>>,
    body: Result<Json<Submission>, axum::extract::rejection::JsonRejection>,
) -> Result<Json<Verdict>, ApiError> {
    let Json(submission) = body?;
    Ok(Json(service.judge_one(submission, VerdictForm::Run).await))
}

async fn judge_batch(
    State(service): State<Arc<JudgeService>>,
    body: Result<Json<BatchRequest>, axum::extract::rejection::JsonRejection>,
) -> Result<Json<BatchResult>, ApiError> {
    let Json(batch) = body?;
    let results = service.judge_batch(batch.submissions, VerdictForm::Judge).await;
    Ok(Json(BatchResult { results }))
}

async fn run_batch(
    State(service): State<Arc<JudgeService>>,
    body: Result<Json<BatchRequest>, axum::extract::rejection::JsonRejection>,
) -> Result<Json<BatchResult>, ApiError> {
    let Json(batch) = body?;
    let results = service.judge_batch(batch.submissions, VerdictForm::Run).await;
    Ok(Json(BatchResult { results }))
}

async fn judge_long_batch(
    State(service): State<Arc<JudgeService>>,
    body: Result<Json<BatchRequest>, axum::extract::rejection::JsonRejection>,
) -> Result<Json<BatchResult>, ApiError> {
    let Json(batch) = body?;
    let results = service.judge_long_batch(batch.submissions, VerdictForm::Judge).await;
    Ok(Json(BatchResult { results }))
}

async fn run_long_batch(
    State(service): State<Arc<JudgeService>>,
    body: Result<Json<BatchRequest>, axum::extract::rejection::JsonRejection>,
) -> Result<Json<BatchResult>, ApiError> {
    let Json(batch) = body?;
    let results = service.judge_long_batch(batch.submissions, VerdictForm::Run).await;
    Ok(Json(BatchResult { results }))
}

/// A request that never reached the worker pool: malformed JSON or a
/// missing required field. Distinct from a submission's own `Verdict`,
/// which is always HTTP 200 regardless of outcome.
struct ApiError {
    status: StatusCode,
    message: String,
}

#[derive(Serialize)]
struct ApiErrorBody {
    error: String,
}

impl From<axum::extract::rejection::JsonRejection> for ApiError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiErrorBody { error: self.message })).into_response()
    }
}
