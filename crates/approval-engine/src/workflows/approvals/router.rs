use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::dispatch::SideEffectStep;
use super::domain::{
    ActorId, DecisionOutcome, DecisionRequest, NewSubmission, SubmissionId, SubmissionKind,
    SubmissionStatus,
};
use super::machine::DecisionError;
use super::projection::{QueueCursor, StatusFilter};
use super::repository::{SinkError, StoreError, SubmissionStore};
use super::service::{ReviewError, ReviewService};

const MAX_PAGE_SIZE: usize = 200;

/// Router builder exposing intake, decision, and queue endpoints.
pub fn review_router<S>(service: Arc<ReviewService<S>>) -> Router
where
    S: SubmissionStore + 'static,
{
    Router::new()
        .route("/api/v1/submissions", post(submit_handler::<S>))
        .route("/api/v1/submissions/:submission_id", get(fetch_handler::<S>))
        .route(
            "/api/v1/submissions/:submission_id/window",
            get(window_handler::<S>),
        )
        .route(
            "/api/v1/submissions/:submission_id/decision",
            post(decision_handler::<S>),
        )
        .route(
            "/api/v1/submissions/:submission_id/dispatch/retry",
            post(retry_handler::<S>),
        )
        .route("/api/v1/queues/:kind", get(queue_handler::<S>))
        .route("/api/v1/queues/:kind/counts", get(counts_handler::<S>))
        .route("/api/v1/queues/:kind/sweep", post(sweep_handler::<S>))
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct DecisionBody {
    pub(crate) outcome: DecisionOutcome,
    pub(crate) actor_id: String,
    #[serde(default)]
    pub(crate) reason: Option<String>,
    #[serde(default)]
    pub(crate) feature: bool,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RetryBody {
    #[serde(default)]
    pub(crate) steps: Option<Vec<SideEffectStep>>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct QueueQuery {
    #[serde(default)]
    pub(crate) status: Option<SubmissionStatus>,
    #[serde(default)]
    pub(crate) limit: Option<usize>,
    #[serde(default)]
    pub(crate) after_id: Option<String>,
    #[serde(default)]
    pub(crate) after_submitted_at: Option<chrono::DateTime<Utc>>,
}

pub(crate) async fn submit_handler<S>(
    State(service): State<Arc<ReviewService<S>>>,
    axum::Json(submission): axum::Json<NewSubmission>,
) -> Response
where
    S: SubmissionStore + 'static,
{
    match service.submit(submission, Utc::now()) {
        Ok(record) => (StatusCode::CREATED, axum::Json(record)).into_response(),
        Err(err) => review_error_response(err),
    }
}

pub(crate) async fn fetch_handler<S>(
    State(service): State<Arc<ReviewService<S>>>,
    Path(submission_id): Path<String>,
) -> Response
where
    S: SubmissionStore + 'static,
{
    match service.get(&SubmissionId(submission_id)) {
        Ok(record) => (StatusCode::OK, axum::Json(record)).into_response(),
        Err(err) => review_error_response(err),
    }
}

pub(crate) async fn window_handler<S>(
    State(service): State<Arc<ReviewService<S>>>,
    Path(submission_id): Path<String>,
) -> Response
where
    S: SubmissionStore + 'static,
{
    match service.window(&SubmissionId(submission_id), Utc::now()) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(err) => review_error_response(err),
    }
}

pub(crate) async fn decision_handler<S>(
    State(service): State<Arc<ReviewService<S>>>,
    Path(submission_id): Path<String>,
    axum::Json(body): axum::Json<DecisionBody>,
) -> Response
where
    S: SubmissionStore + 'static,
{
    let request = DecisionRequest {
        submission_id: SubmissionId(submission_id),
        outcome: body.outcome,
        actor_id: ActorId(body.actor_id),
        reason: body.reason,
        feature: body.feature,
    };

    match service.decide(request, Utc::now()) {
        Ok(receipt) => {
            let payload = json!({
                "submission": receipt.submission,
                "dispatch": {
                    "complete": receipt.dispatch.is_complete(),
                    "failed": receipt.dispatch.failed_steps(),
                    "steps": receipt.dispatch.steps,
                },
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => review_error_response(err),
    }
}

pub(crate) async fn retry_handler<S>(
    State(service): State<Arc<ReviewService<S>>>,
    Path(submission_id): Path<String>,
    body: Option<axum::Json<RetryBody>>,
) -> Response
where
    S: SubmissionStore + 'static,
{
    let body = body.map(|axum::Json(body)| body).unwrap_or_default();
    let id = SubmissionId(submission_id);
    match service.retry_dispatch(&id, body.steps.as_deref()) {
        Ok(report) => {
            let payload = json!({
                "complete": report.is_complete(),
                "failed": report.failed_steps(),
                "steps": report.steps,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => review_error_response(err),
    }
}

pub(crate) async fn queue_handler<S>(
    State(service): State<Arc<ReviewService<S>>>,
    Path(kind): Path<String>,
    Query(query): Query<QueueQuery>,
) -> Response
where
    S: SubmissionStore + 'static,
{
    let kind = match parse_kind(&kind) {
        Ok(kind) => kind,
        Err(response) => return response,
    };
    let filter = StatusFilter::from(query.status);
    let cursor = match (query.after_submitted_at, query.after_id) {
        (Some(submitted_at), Some(id)) => Some(QueueCursor {
            submitted_at,
            id: SubmissionId(id),
        }),
        _ => None,
    };
    let limit = query.limit.unwrap_or(MAX_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

    match service.queue_page(kind, filter, cursor.as_ref(), limit) {
        Ok(page) => (StatusCode::OK, axum::Json(page)).into_response(),
        Err(err) => review_error_response(err),
    }
}

pub(crate) async fn counts_handler<S>(
    State(service): State<Arc<ReviewService<S>>>,
    Path(kind): Path<String>,
) -> Response
where
    S: SubmissionStore + 'static,
{
    let kind = match parse_kind(&kind) {
        Ok(kind) => kind,
        Err(response) => return response,
    };
    match service.counts(kind) {
        Ok(counts) => (StatusCode::OK, axum::Json(counts)).into_response(),
        Err(err) => review_error_response(err),
    }
}

pub(crate) async fn sweep_handler<S>(
    State(service): State<Arc<ReviewService<S>>>,
    Path(kind): Path<String>,
) -> Response
where
    S: SubmissionStore + 'static,
{
    let kind = match parse_kind(&kind) {
        Ok(kind) => kind,
        Err(response) => return response,
    };
    match service.sweep(kind, Utc::now()) {
        Ok(summary) => (StatusCode::OK, axum::Json(summary)).into_response(),
        Err(err) => review_error_response(err),
    }
}

fn parse_kind(raw: &str) -> Result<SubmissionKind, Response> {
    SubmissionKind::parse(raw).ok_or_else(|| {
        let payload = json!({
            "code": "unknown_kind",
            "error": format!("unknown submission kind `{raw}`"),
        });
        (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
    })
}

/// Map service failures onto reviewer-facing responses.
pub fn review_error_response(err: ReviewError) -> Response {
    let (status, payload) = match &err {
        ReviewError::Validation(error)
        | ReviewError::Decision(DecisionError::Validation(error)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "code": "validation_failed", "error": error.to_string() }),
        ),
        ReviewError::Decision(DecisionError::WindowExpired { deadline, .. }) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({
                "code": "window_expired",
                "error": err.to_string(),
                "deadline": deadline,
            }),
        ),
        ReviewError::Decision(DecisionError::AlreadyDecided { current, .. }) => (
            StatusCode::CONFLICT,
            json!({
                "code": "already_decided",
                "error": err.to_string(),
                "status": current,
            }),
        ),
        ReviewError::NotFound(_)
        | ReviewError::Decision(DecisionError::NotFound(_))
        | ReviewError::Store(StoreError::NotFound) => (
            StatusCode::NOT_FOUND,
            json!({ "code": "not_found", "error": err.to_string() }),
        ),
        ReviewError::Store(StoreError::Conflict) => (
            StatusCode::CONFLICT,
            json!({ "code": "conflict", "error": err.to_string() }),
        ),
        ReviewError::Linked(SinkError::Missing(_)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "code": "linked_record_missing", "error": err.to_string() }),
        ),
        ReviewError::Linked(SinkError::Conflict(_)) => (
            StatusCode::CONFLICT,
            json!({ "code": "linked_record_conflict", "error": err.to_string() }),
        ),
        ReviewError::Dispatch(_) => (
            StatusCode::CONFLICT,
            json!({ "code": "not_decided", "error": err.to_string() }),
        ),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "code": "internal", "error": err.to_string() }),
        ),
    };

    (status, axum::Json(payload)).into_response()
}
