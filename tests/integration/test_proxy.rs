//! Integration tests for the notebook proxy
//!
//! The proxy router is driven directly with `oneshot` requests while a mock
//! orchestration backend listens on a real socket, validating the full
//! notebook -> proxy -> backend translation.

use std::sync::{Arc, Mutex};

use axum::body::{to_bytes, Body};
use axum::extract::State;
use axum::http::{Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower::util::ServiceExt;

use hintloop_client::HintClient;
use hintloop_core::Config;
use hintloop_proxy::{create_router, AppState};

/// Configurable behavior and recorded traffic for the mock backend.
#[derive(Default)]
struct MockBackend {
    /// Reject hint creation with 429.
    reject_hints: bool,
    /// Bodies received by `add_request`.
    hint_requests: Mutex<Vec<Value>>,
}

type Shared = Arc<MockBackend>;

fn mock_router(backend: Shared) -> Router {
    Router::new()
        .route("/ai_hint/add_request/", post(add_request))
        .route("/ai_hint/quota_left/", get(quota_left))
        .route(
            "/instructor_feedback/query_all_feedback/",
            get(query_all_feedback),
        )
        .with_state(backend)
}

async fn add_request(State(backend): State<Shared>, Json(body): Json<Value>) -> Response {
    if backend.reject_hints {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "detail": "quota exhausted" })),
        )
            .into_response();
    }
    backend.hint_requests.lock().unwrap().push(body);
    Json(json!({ "request_id": 77 })).into_response()
}

async fn quota_left() -> Json<Value> {
    Json(json!({
        "student_id": "s1",
        "problem_id": "two_sum",
        "limits": { "overall": 10, "plan": 2, "debug": 2, "optimize": 2 },
        "used": { "overall": 1, "plan": 1, "debug": 0, "optimize": 0 },
        "left": { "overall": 9, "plan": 1, "debug": 2, "optimize": 2 },
    }))
}

async fn query_all_feedback() -> Json<Value> {
    Json(json!([{
        "id": 2,
        "request_id": 5,
        "feedback": "Try a worked example.",
    }]))
}

/// Serves the mock backend and returns proxy state pointing at it.
async fn proxy_state(backend: Shared) -> AppState {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind mock backend");
    let addr = listener.local_addr().expect("Failed to read local addr");
    tokio::spawn(async move {
        axum::serve(listener, mock_router(backend))
            .await
            .expect("Mock backend crashed");
    });

    let config = Config {
        base_url: format!("http://{addr}"),
        student_id: Some("s1".to_string()),
        student_email: Some("s1@example.edu".to_string()),
        ..Config::default()
    };
    AppState::new(HintClient::new(&config), &config)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("Failed to build request")
}

async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&bytes).expect("Body is not JSON")
}

/// Tests that a notebook hint request is forwarded with the configured
/// student identity and the notebook's `-ing` type spelling normalized.
#[tokio::test]
async fn test_hint_route_forwards_with_configured_student() {
    let backend = Arc::new(MockBackend::default());
    let router = create_router(proxy_state(Arc::clone(&backend)).await);

    let response = router
        .oneshot(post_json(
            "/hintbot/hint",
            json!({
                "problem_id": "two_sum",
                "hint_type": "planning",
                "program": "def two_sum(nums): ...",
            }),
        ))
        .await
        .expect("Request failed");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["request_id"].as_u64(), Some(77));

    let seen = backend.hint_requests.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0]["student_id"].as_str(), Some("s1"));
    assert_eq!(seen[0]["hint_type"].as_str(), Some("plan"));
    assert_eq!(
        seen[0]["student_program"].as_str(),
        Some("def two_sum(nums): ...")
    );
}

/// Tests that an upstream 429 passes through as 429 with the normalized
/// quota message.
#[tokio::test]
async fn test_upstream_quota_rejection_passes_through() {
    let backend = Arc::new(MockBackend {
        reject_hints: true,
        ..MockBackend::default()
    });
    let router = create_router(proxy_state(backend).await);

    let response = router
        .oneshot(post_json(
            "/hintbot/hint",
            json!({
                "problem_id": "two_sum",
                "hint_type": "plan",
                "program": "",
            }),
        ))
        .await
        .expect("Request failed");

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = body_json(response).await;
    assert_eq!(
        body["error"].as_str(),
        Some("Hint request failed: You have reached your hint request limit.")
    );
}

/// Tests that `quota_left` relays the backend's snake_case quota snapshot.
#[tokio::test]
async fn test_quota_left_relays_snapshot() {
    let backend = Arc::new(MockBackend::default());
    let router = create_router(proxy_state(backend).await);

    let response = router
        .oneshot(
            Request::builder()
                .method(Method::GET)
                .uri("/hintbot/quota_left?problem_id=two_sum")
                .body(Body::empty())
                .expect("Failed to build request"),
        )
        .await
        .expect("Request failed");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["student_id"].as_str(), Some("s1"));
    assert_eq!(body["left"]["plan"].as_u64(), Some(1));
    assert_eq!(body["used"]["overall"].as_u64(), Some(1));
}

/// Tests `check_ta`: feedback is ready only for the AI request that was
/// actually escalated.
#[tokio::test]
async fn test_check_ta_scans_feedback_records() {
    let backend = Arc::new(MockBackend::default());
    let router = create_router(proxy_state(backend).await);

    // The escalated request has feedback.
    let response = router
        .clone()
        .oneshot(post_json(
            "/hintbot/check_ta",
            json!({ "problem_id": "two_sum", "request_id": 5 }),
        ))
        .await
        .expect("Request failed");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["feedback_ready"].as_bool(), Some(true));
    assert_eq!(body["feedback"].as_str(), Some("Try a worked example."));

    // A different request id has none.
    let response = router
        .oneshot(post_json(
            "/hintbot/check_ta",
            json!({ "problem_id": "two_sum", "request_id": 99 }),
        ))
        .await
        .expect("Request failed");
    let body = body_json(response).await;
    assert_eq!(body["feedback_ready"].as_bool(), Some(false));
    assert!(body["feedback"].is_null());
}

/// Tests that a request with no resolvable student identity fails locally
/// with 400, before anything reaches the backend.
#[tokio::test]
async fn test_missing_student_identity_is_local_400() {
    let config = Config::default();
    let router = create_router(AppState::new(HintClient::new(&config), &config));

    let response = router
        .oneshot(
            Request::builder()
                .method(Method::GET)
                .uri("/hintbot/quota_left?problem_id=two_sum")
                .body(Body::empty())
                .expect("Failed to build request"),
        )
        .await
        .expect("Request failed");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"]
        .as_str()
        .expect("error field")
        .contains("no student identity available"));
}
