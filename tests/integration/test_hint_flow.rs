//! End-to-end tests for the hint lifecycle
//!
//! These tests run the real client against an in-process mock of the
//! orchestration backend, exercising the full request -> reflection ->
//! poll -> resolve path plus quota enforcement, cancellation, and history
//! reconciliation over the wire.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};

use hintloop_client::{drive_to_resolution, HintClient};
use hintloop_core::{
    merge, BlockReason, Config, HintError, HintSession, HintType, HistoryKind, PollDisposition,
    PollOutcome, RatingOutcome, RequestDecision,
};

/// The request id the mock backend hands out.
const REQUEST_ID: u64 = 101;

/// Configurable behavior and recorded traffic for the mock backend.
#[derive(Default)]
struct MockBackend {
    /// Polls answered with `job_finished: false` before the hint finishes.
    pending_polls: u32,
    /// The hint text returned once finished.
    hint: Option<String>,
    /// The `successful` flag returned once finished.
    successful: Option<bool>,
    /// Reject hint creation with 429 (quota exhausted).
    reject_hints: bool,
    /// Answer the status poll with a non-JSON body.
    malformed_poll: bool,

    poll_count: AtomicU32,
    reflections: Mutex<Vec<Value>>,
    cancelled: Mutex<Vec<u64>>,
    feedback_ratings: Mutex<Vec<Value>>,
}

type Shared = Arc<MockBackend>;

fn mock_router(backend: Shared) -> Router {
    Router::new()
        .route("/problems/programming_problems/", get(programming_problems))
        .route("/ai_hint/quota_left/", get(quota_left))
        .route("/ai_hint/has_ever_requested/", get(has_ever_requested))
        .route("/ai_hint/add_request/", post(add_request))
        .route("/ai_hint/add_reflection/", post(add_reflection))
        .route("/ai_hint/query_hint/", get(query_hint))
        .route("/ai_hint/cancel_request/", post(cancel_request))
        .route("/ai_hint/save_hint_rating/", post(ok_empty))
        .route("/ai_hint/query_all_hint/", get(query_all_hint))
        .route(
            "/instructor_feedback/query_all_feedback/",
            get(query_all_feedback),
        )
        .route(
            "/instructor_feedback/save_feedback_rating/",
            post(save_feedback_rating),
        )
        .with_state(backend)
}

async fn programming_problems(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    // With a problem_id the endpoint returns one problem with its
    // description; without one, the bare listing.
    if let Some(problem_id) = params.get("problem_id") {
        return Json(json!({
            "problem_id": problem_id,
            "name": "Two Sum",
            "task_description": "Return the indices of the two numbers that add up to the target.",
            "template_code": "def two_sum(nums, target):\n    ...\n",
        }));
    }
    Json(json!([
        { "problem_id": "two_sum", "name": "Two Sum" },
        { "problem_id": "fizzbuzz" },
    ]))
}

async fn quota_left(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    Json(json!({
        "student_id": params.get("student_id"),
        "problem_id": params.get("problem_id"),
        "limits": { "overall": 10, "plan": 2, "debug": 2, "optimize": 2 },
        "used": { "overall": 0, "plan": 0, "debug": 0, "optimize": 0 },
        "left": { "overall": 10, "plan": 2, "debug": 2, "optimize": 2 },
    }))
}

async fn has_ever_requested(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    Json(json!({
        "student_id": params.get("student_id"),
        "ever_requested": false,
    }))
}

async fn add_request(State(backend): State<Shared>, Json(_body): Json<Value>) -> Response {
    if backend.reject_hints {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "detail": "quota exhausted" })),
        )
            .into_response();
    }
    Json(json!({ "request_id": REQUEST_ID })).into_response()
}

async fn add_reflection(State(backend): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    backend.reflections.lock().unwrap().push(body);
    Json(json!({}))
}

async fn query_hint(
    State(backend): State<Shared>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if backend.malformed_poll {
        return (StatusCode::OK, "this is not json").into_response();
    }

    let request_id: u64 = params
        .get("request_id")
        .and_then(|id| id.parse().ok())
        .unwrap_or_default();
    let tick = backend.poll_count.fetch_add(1, Ordering::SeqCst);
    if tick < backend.pending_polls {
        return Json(json!({ "request_id": request_id, "job_finished": false })).into_response();
    }
    Json(json!({
        "request_id": request_id,
        "job_finished": true,
        "successful": backend.successful,
        "hint": backend.hint,
    }))
    .into_response()
}

async fn cancel_request(State(backend): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    if let Some(id) = body.get("request_id").and_then(Value::as_u64) {
        backend.cancelled.lock().unwrap().push(id);
    }
    Json(json!({}))
}

async fn ok_empty() -> Json<Value> {
    Json(json!({}))
}

async fn save_feedback_rating(
    State(backend): State<Shared>,
    Json(body): Json<Value>,
) -> Json<Value> {
    backend.feedback_ratings.lock().unwrap().push(body);
    Json(json!({}))
}

async fn query_all_hint() -> Json<Value> {
    // Alias field names, as older backends spell them.
    Json(json!([{
        "id": 5,
        "type": "plan",
        "hint": "Sketch the steps before coding.",
        "helpful": false,
        "returned_time": "2026-02-03T10:00:00Z",
    }]))
}

async fn query_all_feedback() -> Json<Value> {
    Json(json!([{
        "id": 2,
        "request_id": 5,
        "feedback": "Walk through an example input by hand first.",
        "created_at": "2026-02-03T11:00:00Z",
    }]))
}

/// Serves the mock backend on an ephemeral port and returns its base URL.
async fn spawn_backend(backend: Shared) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind mock backend");
    let addr = listener.local_addr().expect("Failed to read local addr");
    tokio::spawn(async move {
        axum::serve(listener, mock_router(backend))
            .await
            .expect("Mock backend crashed");
    });
    format!("http://{addr}")
}

/// Test configuration with fast polling against the given backend.
fn test_config(base_url: &str) -> Config {
    Config {
        base_url: base_url.to_string(),
        student_id: Some("s1".to_string()),
        hint_poll_interval_ms: 10,
        execution_poll_interval_ms: 10,
        poll_timeout_secs: 5,
        ..Config::default()
    }
}

/// Tests the full planning-hint scenario: consent gate for a first-time
/// student, reflection, polling, and resolution into an unrated AI item.
#[tokio::test]
async fn test_planning_hint_end_to_end() {
    let backend = Arc::new(MockBackend {
        pending_polls: 2,
        hint: Some("Break two_sum into lookup and iteration steps.".to_string()),
        successful: Some(true),
        ..MockBackend::default()
    });
    let base_url = spawn_backend(Arc::clone(&backend)).await;
    let client = HintClient::new(&test_config(&base_url));

    // Assemble the session from server truth.
    let quota = client
        .quota_left("s1", "two_sum")
        .await
        .expect("quota_left failed");
    let ever = client
        .has_ever_requested("s1")
        .await
        .expect("has_ever_requested failed");
    assert!(!ever, "Mock backend reports a first-time student");

    let mut session = HintSession::new("s1", "two_sum", quota, !ever);

    // First-time students pass through the consent gate.
    assert_eq!(
        session.request_hint(HintType::Plan),
        RequestDecision::ConsentRequired
    );
    let resumed = session.grant_consent().expect("Consent should resume");
    assert_eq!(resumed, HintType::Plan);
    assert_eq!(session.request_hint(HintType::Plan), RequestDecision::Proceed);

    // Create the request and answer the reflection.
    let request_id = client
        .add_hint_request("s1", "two_sum", HintType::Plan, "def two_sum(nums): ...")
        .await
        .expect("add_hint_request failed");
    assert_eq!(request_id, REQUEST_ID);
    session
        .request_created(request_id, HintType::Plan, Utc::now())
        .expect("request_created failed");
    assert_eq!(session.quota().left.plan, Some(1), "Quota consumed up front");

    let question = HintType::Plan.reflection_question();
    client
        .add_reflection(request_id, question, "I may be missing the lookup step.")
        .await
        .expect("add_reflection failed");
    session.submit_reflection().expect("submit_reflection failed");

    // Poll until the backend finishes (two pending ticks first).
    drive_to_resolution(&client, &mut session)
        .await
        .expect("drive_to_resolution failed");

    let item = session.active_item().expect("Expected an active item");
    assert_eq!(item.kind, HistoryKind::Ai);
    assert_eq!(item.label(), "Planning Hint");
    assert!(!item.is_rated(), "Fresh hints start unrated");
    assert_eq!(
        item.content.as_deref(),
        Some("Break two_sum into lookup and iteration steps.")
    );

    // Success keeps the consumed unit; the reflection reached the backend.
    assert_eq!(session.quota().left.plan, Some(1));
    let reflections = backend.reflections.lock().unwrap();
    assert_eq!(reflections.len(), 1);
    assert_eq!(
        reflections[0]["reflection_question"].as_str(),
        Some(question)
    );
}

/// Tests that a backend 429 surfaces as the quota error with the exact
/// user-facing message.
#[tokio::test]
async fn test_quota_rejection_is_normalized() {
    let backend = Arc::new(MockBackend {
        reject_hints: true,
        ..MockBackend::default()
    });
    let base_url = spawn_backend(backend).await;
    let client = HintClient::new(&test_config(&base_url));

    let err = client
        .add_hint_request("s1", "two_sum", HintType::Plan, "")
        .await
        .expect_err("Expected a quota error");

    assert!(err.is_quota_exceeded());
    assert_eq!(
        err.to_string(),
        "Hint request failed: You have reached your hint request limit."
    );
}

/// Tests that a non-JSON poll body is reported as a malformed response,
/// not a panic or a silent success.
#[tokio::test]
async fn test_malformed_poll_body_is_rejected() {
    let backend = Arc::new(MockBackend {
        malformed_poll: true,
        ..MockBackend::default()
    });
    let base_url = spawn_backend(backend).await;
    let client = HintClient::new(&test_config(&base_url));

    let err = client
        .query_hint(REQUEST_ID)
        .await
        .expect_err("Expected a malformed-response error");
    assert!(matches!(err, HintError::MalformedResponse { .. }));
}

/// Tests that a result arriving after cancellation is discarded: no
/// history item, no quota movement, and the backend saw the cancel.
#[tokio::test]
async fn test_cancelled_request_ignores_late_result() {
    let backend = Arc::new(MockBackend {
        hint: Some("too late".to_string()),
        successful: Some(true),
        ..MockBackend::default()
    });
    let base_url = spawn_backend(Arc::clone(&backend)).await;
    let client = HintClient::new(&test_config(&base_url));

    let quota = client.quota_left("s1", "two_sum").await.expect("quota_left");
    let mut session = HintSession::new("s1", "two_sum", quota, false);
    assert_eq!(session.request_hint(HintType::Plan), RequestDecision::Proceed);
    session
        .request_created(REQUEST_ID, HintType::Plan, Utc::now())
        .expect("request_created");
    session.submit_reflection().expect("submit_reflection");

    // The student cancels while the request is in flight.
    let cancelled = session.cancel_all();
    assert_eq!(cancelled, vec![REQUEST_ID]);
    for id in cancelled {
        client.cancel_request_best_effort(id).await;
    }
    assert_eq!(*backend.cancelled.lock().unwrap(), vec![REQUEST_ID]);

    // The backend still answers; the session must ignore the result.
    let status = client.query_hint(REQUEST_ID).await.expect("query_hint");
    assert!(status.job_finished);
    let disposition = session.apply_poll(
        REQUEST_ID,
        PollOutcome::Finished {
            successful: status.successful,
            hint: status.returned_hint,
        },
        Utc::now(),
    );
    assert_eq!(disposition, PollDisposition::Ignored);
    assert!(session.history().is_empty());
    // Cancellation does not refund the consumed unit.
    assert_eq!(session.quota().left.plan, Some(1));
}

/// Tests that a generation failure refunds the consumed quota unit.
#[tokio::test]
async fn test_failed_generation_refunds_quota() {
    let backend = Arc::new(MockBackend {
        successful: Some(false),
        hint: None,
        ..MockBackend::default()
    });
    let base_url = spawn_backend(backend).await;
    let client = HintClient::new(&test_config(&base_url));

    let quota = client.quota_left("s1", "two_sum").await.expect("quota_left");
    let mut session = HintSession::new("s1", "two_sum", quota, false);
    assert_eq!(session.request_hint(HintType::Plan), RequestDecision::Proceed);
    session
        .request_created(REQUEST_ID, HintType::Plan, Utc::now())
        .expect("request_created");
    session.submit_reflection().expect("submit_reflection");
    assert_eq!(session.quota().left.plan, Some(1));

    drive_to_resolution(&client, &mut session)
        .await
        .expect("drive_to_resolution failed");

    // Back to the pre-request balance.
    assert_eq!(session.quota().left.plan, Some(2));
    let item = session.active_item().expect("Failure still lands in history");
    assert_eq!(item.content.as_deref(), Some("(Hint generation failed)"));
}

/// Tests that an unrated instructor item left over from an earlier run
/// blocks new requests until its rating is saved through the
/// feedback-rating endpoint, after which the gate opens again.
#[tokio::test]
async fn test_rating_leftover_feedback_unblocks_requests() {
    let backend = Arc::new(MockBackend::default());
    let base_url = spawn_backend(Arc::clone(&backend)).await;
    let client = HintClient::new(&test_config(&base_url));

    let quota = client.quota_left("s1", "two_sum").await.expect("quota_left");
    let mut session = HintSession::new("s1", "two_sum", quota, false);
    let hints = client
        .query_all_hints("s1", "two_sum")
        .await
        .expect("query_all_hints failed");
    let feedback = client
        .query_all_feedback("s1", "two_sum")
        .await
        .expect("query_all_feedback failed");
    session.load_history(merge(hints, feedback, Utc::now()));

    // The backend's feedback record carries no rating, so it blocks.
    assert_eq!(
        session.request_hint(HintType::Debug),
        RequestDecision::Blocked(BlockReason::UnratedActiveItem)
    );
    let item = session.active_item().expect("Expected a blocking item");
    assert_eq!(item.kind, HistoryKind::Instructor);
    let feedback_id = item.id;

    // Rating it clears the block; instructor items never offer escalation.
    client
        .save_feedback_rating(feedback_id, true)
        .await
        .expect("save_feedback_rating failed");
    assert_eq!(
        session.rate_active(true).expect("rate_active failed"),
        RatingOutcome::Dismissed
    );
    assert_eq!(
        session.request_hint(HintType::Debug),
        RequestDecision::Proceed
    );

    let ratings = backend.feedback_ratings.lock().unwrap();
    assert_eq!(ratings.len(), 1);
    assert_eq!(ratings[0]["instructor_request_id"].as_u64(), Some(2));
    assert_eq!(ratings[0]["is_feedback_helpful"].as_bool(), Some(true));
}

/// Tests the single-problem detail fetch used by the problem view.
#[tokio::test]
async fn test_problem_detail_fetch() {
    let backend = Arc::new(MockBackend::default());
    let base_url = spawn_backend(backend).await;
    let client = HintClient::new(&test_config(&base_url));

    let listing = client.fetch_problems().await.expect("fetch_problems failed");
    assert_eq!(listing.len(), 2);
    assert_eq!(listing[0].display_name(), "Two Sum");
    assert_eq!(listing[1].display_name(), "fizzbuzz");

    let problem = client
        .fetch_problem("two_sum")
        .await
        .expect("fetch_problem failed");
    assert_eq!(problem.problem_id, "two_sum");
    assert_eq!(problem.display_name(), "Two Sum");
    assert!(problem
        .task_description
        .as_deref()
        .is_some_and(|d| d.contains("indices")));
    assert!(problem.template_code.is_some());
}

/// Tests history reconciliation over the wire: alias field names parse,
/// and feedback sorts directly after the hint it escalated.
#[tokio::test]
async fn test_history_reconciliation_over_the_wire() {
    let backend = Arc::new(MockBackend::default());
    let base_url = spawn_backend(backend).await;
    let client = HintClient::new(&test_config(&base_url));

    let hints = client
        .query_all_hints("s1", "two_sum")
        .await
        .expect("query_all_hints failed");
    let feedback = client
        .query_all_feedback("s1", "two_sum")
        .await
        .expect("query_all_feedback failed");

    let items = merge(hints, feedback, Utc::now());
    assert_eq!(items.len(), 2);

    // The AI hint precedes its escalation under the shared ordering key.
    assert_eq!(items[0].kind, HistoryKind::Ai);
    assert_eq!(items[0].id, 5);
    assert_eq!(items[0].helpful, Some(false));
    assert_eq!(items[1].kind, HistoryKind::Instructor);
    assert_eq!(items[1].ai_request_id, Some(5));
    assert_eq!(
        items[1].content.as_deref(),
        Some("Walk through an example input by hand first.")
    );
}
