use super::common::*;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use crate::workflows::approvals::domain::{SubmissionId, SubmissionStatus};
use crate::workflows::approvals::expiry::ExpiryPolicy;
use crate::workflows::approvals::memory::InMemoryTargets;
use crate::workflows::approvals::{review_router, ReviewService};

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body).expect("encode body")))
        .expect("request")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

fn router(harness: Harness) -> (axum::Router, InMemoryTargets) {
    let Harness {
        targets, service, ..
    } = harness;
    (review_router(Arc::new(service)), targets)
}

#[tokio::test]
async fn submit_route_creates_pending_submission() {
    let (router, _) = router(harness());

    let response = router
        .oneshot(json_request(
            "POST",
            "/api/v1/submissions",
            json!({
                "submitter_id": "employer-7",
                "payload": {
                    "kind": "job_posting",
                    "title": "Barista",
                    "description": "Weekend mornings",
                    "company": "Kape Co"
                }
            }),
        ))
        .await
        .expect("route responds");

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json_body(response).await;
    assert_eq!(body["status"], "pending");
    assert_eq!(body["payload"]["kind"], "job_posting");
    assert!(body["id"].as_str().expect("id").starts_with("job-"));
}

#[tokio::test]
async fn submit_route_rejects_invalid_payload() {
    let (router, _) = router(harness());

    let response = router
        .oneshot(json_request(
            "POST",
            "/api/v1/submissions",
            json!({
                "submitter_id": "candidate-3",
                "payload": { "kind": "video", "video_url": " ", "duration_secs": 30 }
            }),
        ))
        .await
        .expect("route responds");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json_body(response).await;
    assert_eq!(body["code"], "validation_failed");
}

#[tokio::test]
async fn decision_route_commits_and_reports_dispatch() {
    let harness = harness();
    let now = chrono::Utc::now();
    harness.seed(payment("pay-1", now));
    let (router, targets) = router(harness);

    let response = router
        .oneshot(json_request(
            "POST",
            "/api/v1/submissions/pay-1/decision",
            json!({ "outcome": "approved", "actor_id": "admin42" }),
        ))
        .await
        .expect("route responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["submission"]["status"], "approved");
    assert_eq!(body["submission"]["decider_id"], "admin42");
    assert_eq!(body["dispatch"]["complete"], true);
    assert_eq!(body["dispatch"]["steps"][0]["step"], "credit_account");
    assert_eq!(targets.notifications.records().len(), 1);
}

#[tokio::test]
async fn decision_route_requires_rejection_reason() {
    let harness = harness();
    harness.seed(job_posting("job-1", chrono::Utc::now()));
    let (router, _) = router(harness);

    let response = router
        .oneshot(json_request(
            "POST",
            "/api/v1/submissions/job-1/decision",
            json!({ "outcome": "rejected", "actor_id": "admin42", "reason": "" }),
        ))
        .await
        .expect("route responds");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn late_approval_returns_window_expired() {
    let harness = harness();
    harness.seed(payment("pay-1", chrono::Utc::now() - minutes(31)));
    let (router, _) = router(harness);

    let response = router
        .oneshot(json_request(
            "POST",
            "/api/v1/submissions/pay-1/decision",
            json!({ "outcome": "approved", "actor_id": "admin42" }),
        ))
        .await
        .expect("route responds");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json_body(response).await;
    assert_eq!(body["code"], "window_expired");
    assert!(body["deadline"].is_string());
}

#[tokio::test]
async fn second_decision_returns_conflict() {
    let harness = harness();
    harness.seed(video("vid-1", "candidate-3", chrono::Utc::now()));
    let (router, _) = router(harness);

    let first = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/submissions/vid-1/decision",
            json!({ "outcome": "approved", "actor_id": "admin42" }),
        ))
        .await
        .expect("route responds");
    assert_eq!(first.status(), StatusCode::OK);

    let second = router
        .oneshot(json_request(
            "POST",
            "/api/v1/submissions/vid-1/decision",
            json!({ "outcome": "rejected", "actor_id": "admin-9", "reason": "too late" }),
        ))
        .await
        .expect("route responds");
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let body = read_json_body(second).await;
    assert_eq!(body["code"], "already_decided");
    assert_eq!(body["status"], "approved");
}

#[tokio::test]
async fn unknown_submission_returns_not_found() {
    let (router, _) = router(harness());
    let response = router
        .oneshot(get("/api/v1/submissions/pay-404"))
        .await
        .expect("route responds");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn window_route_reports_countdown() {
    let harness = harness();
    harness.seed(payment("pay-1", chrono::Utc::now()));
    let (router, _) = router(harness);

    let response = router
        .oneshot(get("/api/v1/submissions/pay-1/window"))
        .await
        .expect("route responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["window_seconds"], 1800);
    assert_eq!(body["expired"], false);
    let remaining = body["remaining_seconds"].as_i64().expect("remaining");
    assert!(remaining > 0 && remaining <= 1800);
}

#[tokio::test]
async fn queue_route_filters_and_pages() {
    let harness = harness();
    let now = chrono::Utc::now();
    harness.seed(payment("pay-1", now - minutes(3)));
    harness.seed(payment("pay-2", now - minutes(2)));
    harness.seed(payment("pay-3", now - minutes(1)));
    let (router, _) = router(harness);

    let response = router
        .clone()
        .oneshot(get("/api/v1/queues/payment?status=pending&limit=2"))
        .await
        .expect("route responds");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    let items = body["items"].as_array().expect("items");
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["id"], "pay-3");
    assert_eq!(body["next"]["id"], "pay-2");

    let counts = router
        .oneshot(get("/api/v1/queues/payment/counts"))
        .await
        .expect("route responds");
    let counts = read_json_body(counts).await;
    assert_eq!(counts["total"], 3);
    assert_eq!(counts["by_status"]["pending"], 3);
    assert_eq!(counts["by_status"]["approved"], 0);
}

#[tokio::test]
async fn unknown_queue_kind_is_not_found() {
    let (router, _) = router(harness());
    let response = router
        .oneshot(get("/api/v1/queues/invoices"))
        .await
        .expect("route responds");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = read_json_body(response).await;
    assert_eq!(body["code"], "unknown_kind");
}

#[tokio::test]
async fn sweep_route_expires_overdue_payments() {
    let harness = harness();
    harness.seed(payment("pay-1", chrono::Utc::now() - minutes(45)));
    let store = harness.store.clone();
    let (router, _) = router(harness);

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/queues/payment/sweep")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("route responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["expired"], json!(["pay-1"]));
    let stored = crate::workflows::approvals::repository::SubmissionStore::fetch(
        store.as_ref(),
        &SubmissionId::new("pay-1"),
    )
    .expect("fetch")
    .expect("present");
    assert_eq!(stored.status, SubmissionStatus::Expired);
}

#[tokio::test]
async fn retry_handler_accepts_missing_body() {
    let harness = harness();
    harness.seed(video("vid-1", "candidate-3", t0()));
    harness
        .service
        .decide(
            crate::workflows::approvals::domain::DecisionRequest::approve(
                SubmissionId::new("vid-1"),
                reviewer(),
            ),
            t0(),
        )
        .expect("decision commits");
    let service = Arc::new(harness.service);

    let response = crate::workflows::approvals::router::retry_handler(
        State(service),
        Path("vid-1".to_string()),
        None,
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["complete"], true);
}

#[tokio::test]
async fn store_outage_maps_to_internal_error() {
    let service = Arc::new(ReviewService::new(
        Arc::new(UnavailableStore),
        InMemoryTargets::default().targets(false),
        ExpiryPolicy::default(),
    ));

    let response = crate::workflows::approvals::router::fetch_handler(
        State(service),
        Path("pay-1".to_string()),
    )
    .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn reveal_request_then_payment_round_trips_over_http() {
    let (router, targets) = router(harness());
    let submit = |payload: Value| {
        json_request(
            "POST",
            "/api/v1/submissions",
            json!({ "submitter_id": "employer-7", "payload": payload }),
        )
    };

    let request = router
        .clone()
        .oneshot(submit(json!({
            "kind": "connection",
            "connection_id": "conn-9",
            "employer_id": "employer-7",
            "candidate_id": "candidate-3"
        })))
        .await
        .expect("route responds");
    assert_eq!(request.status(), StatusCode::CREATED);

    let payment_body = json!({
        "kind": "payment",
        "amount_cents": 4900,
        "currency": "PHP",
        "transaction_reference": "GCASH-1",
        "screenshot_url": "https://cdn.example.test/p.png",
        "connection_id": "conn-9"
    });
    let payment = router
        .clone()
        .oneshot(submit(payment_body.clone()))
        .await
        .expect("route responds");
    assert_eq!(payment.status(), StatusCode::CREATED);

    let duplicate = router
        .oneshot(submit(payment_body))
        .await
        .expect("route responds");
    assert_eq!(duplicate.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(read_json_body(duplicate).await["code"], "validation_failed");

    let connection = targets
        .entities
        .connection(&crate::workflows::approvals::domain::ConnectionId::new("conn-9"))
        .expect("connection registered");
    assert!(connection.payment_submission_id.is_some());
}
