//! HTTP routes for the notebook-facing proxy.
//!
//! Notebook frontends talk to `/hintbot/*` on localhost; each route is
//! translated onto the orchestration backend through the shared client. The
//! proxy owns the student identity, so notebook requests only carry the
//! problem and request ids.
//!
//! # Endpoints
//!
//! - `POST /hintbot/hint` - Create a hint request
//! - `POST /hintbot/reflection` - Submit the reflection answer
//! - `GET /hintbot/check` - Poll hint status
//! - `POST /hintbot/cancel` - Cancel an in-flight request
//! - `POST /hintbot/ta` - Escalate to an instructor
//! - `POST /hintbot/check_ta` - Check whether instructor feedback arrived
//! - `POST /hintbot/save_rating` - Rate an AI hint
//! - `POST /hintbot/save_feedback_rating` - Rate instructor feedback
//! - `GET /hintbot/quota_left` - Remaining hint allowance
//! - `GET /hintbot/has_ever_requested` - First-time-student check
//! - `GET /hintbot/query_all_hint` - Historical AI hints
//! - `GET /hintbot/query_all_feedback` - Historical instructor feedback

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use hintloop_client::HintClient;
use hintloop_core::{validate, Config, HintError, HintType};

// ============================================================================
// Application State
// ============================================================================

/// Shared state for the proxy server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Client for the orchestration backend.
    pub client: HintClient,
    /// Default student identity, from configuration.
    pub student_id: Option<String>,
    /// Default student email, attached to escalations.
    pub student_email: Option<String>,
}

impl AppState {
    /// Creates proxy state from a backend client and the loaded
    /// configuration.
    #[must_use]
    pub fn new(client: HintClient, config: &Config) -> Self {
        Self {
            client,
            student_id: config.student_id.clone(),
            student_email: config.student_email.clone(),
        }
    }

    /// The student identity for a request: the request's own, falling back
    /// to the configured default.
    fn resolve_student(&self, from_request: Option<String>) -> Result<String, ProxyError> {
        from_request
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.student_id.clone())
            .ok_or_else(|| {
                ProxyError(HintError::config_validation(
                    "no student identity available",
                    "Set studentId in hintloop.json or pass student_id in the request",
                ))
            })
    }
}

// ============================================================================
// Error mapping
// ============================================================================

/// Error response body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Description of the error.
    pub error: String,
}

/// Wraps backend and validation errors for response mapping: quota 429
/// passes through, local validation is the caller's fault (400), everything
/// else is an upstream failure (502).
#[derive(Debug)]
struct ProxyError(HintError);

impl From<HintError> for ProxyError {
    fn from(err: HintError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = if self.0.is_quota_exceeded() {
            StatusCode::TOO_MANY_REQUESTS
        } else if self.0.is_local() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::BAD_GATEWAY
        };
        let body = Json(ErrorResponse {
            error: self.0.to_string(),
        });
        (status, body).into_response()
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for `POST /hintbot/hint`.
#[derive(Debug, Clone, Deserialize)]
pub struct HintRequestBody {
    /// Student override; the configured identity is used when absent.
    #[serde(default)]
    pub student_id: Option<String>,
    /// The problem the student is working on.
    pub problem_id: String,
    /// Hint category (`plan`, `debug`, `optimize`; the notebook's `-ing`
    /// spellings are accepted).
    pub hint_type: String,
    /// The student's current program.
    #[serde(default, alias = "program")]
    pub student_program: Option<String>,
}

/// Request body for `POST /hintbot/reflection`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReflectionBody {
    /// The hint request being answered.
    pub request_id: u64,
    /// The question that was shown.
    pub reflection_question: String,
    /// The student's answer.
    pub reflection_answer: String,
}

/// Query for `GET /hintbot/check`.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckQuery {
    /// The hint request to poll.
    pub request_id: u64,
}

/// Request body for `POST /hintbot/cancel`.
#[derive(Debug, Clone, Deserialize)]
pub struct CancelBody {
    /// The hint request to cancel.
    pub request_id: u64,
}

/// Request body for `POST /hintbot/ta`.
#[derive(Debug, Clone, Deserialize)]
pub struct EscalateBody {
    /// The AI hint request being escalated.
    pub request_id: u64,
    /// Email for the reply notification; the configured default applies
    /// when absent.
    #[serde(default)]
    pub student_email: Option<String>,
    /// Note to the instructor.
    #[serde(default)]
    pub student_notes: Option<String>,
}

/// Request body for `POST /hintbot/check_ta`.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckTaBody {
    /// Student override.
    #[serde(default)]
    pub student_id: Option<String>,
    /// The problem whose feedback records are scanned.
    pub problem_id: String,
    /// The originating AI hint request.
    pub request_id: u64,
}

/// Request body for `POST /hintbot/save_rating`.
#[derive(Debug, Clone, Deserialize)]
pub struct SaveRatingBody {
    /// The AI hint request being rated.
    pub request_id: u64,
    /// The rating.
    pub is_hint_helpful: bool,
}

/// Request body for `POST /hintbot/save_feedback_rating`.
#[derive(Debug, Clone, Deserialize)]
pub struct SaveFeedbackRatingBody {
    /// The instructor feedback being rated.
    pub instructor_request_id: u64,
    /// The rating.
    pub is_feedback_helpful: bool,
}

/// Query for the per-problem GET routes.
#[derive(Debug, Clone, Deserialize)]
pub struct ProblemQuery {
    /// Student override.
    #[serde(default)]
    pub student_id: Option<String>,
    /// The problem in question.
    pub problem_id: String,
}

/// Query for `GET /hintbot/has_ever_requested`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct StudentQuery {
    /// Student override.
    #[serde(default)]
    pub student_id: Option<String>,
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the proxy router with all `/hintbot` routes, CORS for the
/// notebook origin, and request tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let hintbot_routes = Router::new()
        .route("/hint", post(handle_hint))
        .route("/reflection", post(handle_reflection))
        .route("/check", get(handle_check))
        .route("/cancel", post(handle_cancel))
        .route("/ta", post(handle_escalate))
        .route("/check_ta", post(handle_check_ta))
        .route("/save_rating", post(handle_save_rating))
        .route("/save_feedback_rating", post(handle_save_feedback_rating))
        .route("/quota_left", get(handle_quota_left))
        .route("/has_ever_requested", get(handle_has_ever_requested))
        .route("/query_all_hint", get(handle_query_all_hints))
        .route("/query_all_feedback", get(handle_query_all_feedback));

    Router::new()
        .nest("/hintbot", hintbot_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

// ============================================================================
// Handlers
// ============================================================================

/// Handler for `POST /hintbot/hint`.
async fn handle_hint(
    State(state): State<Arc<AppState>>,
    Json(body): Json<HintRequestBody>,
) -> Result<Json<serde_json::Value>, ProxyError> {
    let student_id = state.resolve_student(body.student_id)?;
    let hint_type: HintType = body.hint_type.parse().map_err(|message: String| {
        HintError::config_validation(message, "Use plan, debug, or optimize")
    })?;

    info!(problem_id = %body.problem_id, hint_type = %hint_type, "hint request");
    let request_id = state
        .client
        .add_hint_request(
            &student_id,
            &body.problem_id,
            hint_type,
            body.student_program.as_deref().unwrap_or(""),
        )
        .await?;

    Ok(Json(json!({ "request_id": request_id })))
}

/// Handler for `POST /hintbot/reflection`.
async fn handle_reflection(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ReflectionBody>,
) -> Result<Json<serde_json::Value>, ProxyError> {
    state
        .client
        .add_reflection(body.request_id, &body.reflection_question, &body.reflection_answer)
        .await?;
    Ok(Json(json!({ "request_id": body.request_id })))
}

/// Handler for `GET /hintbot/check`.
async fn handle_check(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CheckQuery>,
) -> Result<Json<hintloop_client::HintStatusResponse>, ProxyError> {
    let status = state.client.query_hint(query.request_id).await?;
    Ok(Json(status))
}

/// Handler for `POST /hintbot/cancel`.
async fn handle_cancel(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CancelBody>,
) -> Result<Json<serde_json::Value>, ProxyError> {
    state.client.cancel_request(body.request_id).await?;
    Ok(Json(json!({ "cancelled": true })))
}

/// Handler for `POST /hintbot/ta`.
async fn handle_escalate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<EscalateBody>,
) -> Result<Json<serde_json::Value>, ProxyError> {
    let email = body
        .student_email
        .filter(|e| !e.trim().is_empty())
        .or_else(|| state.student_email.clone());
    if let Some(email) = email.as_deref() {
        validate::validate_email(email.trim())?;
    }

    state
        .client
        .request_instructor_feedback(body.request_id, email.as_deref(), body.student_notes.as_deref())
        .await?;
    Ok(Json(json!({ "submitted": true })))
}

/// Handler for `POST /hintbot/check_ta`.
///
/// The backend has no direct "is my feedback ready" endpoint, so the
/// student's feedback records are scanned for the originating AI request.
async fn handle_check_ta(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CheckTaBody>,
) -> Result<Json<serde_json::Value>, ProxyError> {
    let student_id = state.resolve_student(body.student_id)?;
    let records = state
        .client
        .query_all_feedback(&student_id, &body.problem_id)
        .await?;

    let feedback = records
        .into_iter()
        .filter(|r| r.ai_hint_request_id == Some(body.request_id))
        .find_map(|r| r.instructor_feedback);

    Ok(Json(json!({
        "feedback_ready": feedback.is_some(),
        "feedback": feedback,
    })))
}

/// Handler for `POST /hintbot/save_rating`.
async fn handle_save_rating(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SaveRatingBody>,
) -> Result<Json<serde_json::Value>, ProxyError> {
    state
        .client
        .save_hint_rating(body.request_id, body.is_hint_helpful)
        .await?;
    Ok(Json(json!({ "saved": true })))
}

/// Handler for `POST /hintbot/save_feedback_rating`.
async fn handle_save_feedback_rating(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SaveFeedbackRatingBody>,
) -> Result<Json<serde_json::Value>, ProxyError> {
    state
        .client
        .save_feedback_rating(body.instructor_request_id, body.is_feedback_helpful)
        .await?;
    Ok(Json(json!({ "saved": true })))
}

/// Handler for `GET /hintbot/quota_left`.
async fn handle_quota_left(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProblemQuery>,
) -> Result<Json<hintloop_core::QuotaInfo>, ProxyError> {
    let student_id = state.resolve_student(query.student_id)?;
    let quota = state.client.quota_left(&student_id, &query.problem_id).await?;
    Ok(Json(quota))
}

/// Handler for `GET /hintbot/has_ever_requested`.
async fn handle_has_ever_requested(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StudentQuery>,
) -> Result<Json<serde_json::Value>, ProxyError> {
    let student_id = state.resolve_student(query.student_id)?;
    let ever_requested = state.client.has_ever_requested(&student_id).await?;
    Ok(Json(json!({
        "student_id": student_id,
        "ever_requested": ever_requested,
    })))
}

/// Handler for `GET /hintbot/query_all_hint`.
async fn handle_query_all_hints(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProblemQuery>,
) -> Result<Json<Vec<hintloop_core::AiHintRecord>>, ProxyError> {
    let student_id = state.resolve_student(query.student_id)?;
    let records = state
        .client
        .query_all_hints(&student_id, &query.problem_id)
        .await?;
    Ok(Json(records))
}

/// Handler for `GET /hintbot/query_all_feedback`.
async fn handle_query_all_feedback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProblemQuery>,
) -> Result<Json<Vec<hintloop_core::FeedbackRecord>>, ProxyError> {
    let student_id = state.resolve_student(query.student_id)?;
    let records = state
        .client
        .query_all_feedback(&student_id, &query.problem_id)
        .await?;
    Ok(Json(records))
}

// ============================================================================
// Tests
// ============================================================================
