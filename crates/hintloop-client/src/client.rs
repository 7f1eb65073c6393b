//! The orchestration backend client.
//!
//! Thin typed wrapper over the backend's REST endpoints. Every failure is
//! normalized into `HintError::Api` (or `QuotaExceeded` for 429) and
//! reported once through the optional error hook before being returned.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, error, warn};

use hintloop_core::error::{HintError, Result, QUOTA_EXCEEDED_MESSAGE};
use hintloop_core::quota::QuotaInfo;
use hintloop_core::types::{AiHintRecord, FeedbackRecord, HintType};
use hintloop_core::Config;

use crate::types::{ExecutionResult, HintStatusResponse, InstructorAssignment, ProgrammingProblem};

/// What went wrong with one request, as delivered to the error hook.
#[derive(Debug, Clone)]
pub struct ApiFailure {
    /// HTTP status, when a response was received.
    pub status: Option<u16>,
    /// Normalized failure message.
    pub message: String,
    /// The URL that failed.
    pub url: String,
}

/// Observer invoked once per failed request. The hook cannot change the
/// request outcome.
pub type ErrorHook = Arc<dyn Fn(&ApiFailure) + Send + Sync>;

/// Client for the hint orchestration backend.
#[derive(Clone)]
pub struct HintClient {
    http: reqwest::Client,
    base_url: String,
    hint_poll_interval: Duration,
    execution_poll_interval: Duration,
    poll_timeout: Duration,
    error_hook: Option<ErrorHook>,
}

impl std::fmt::Debug for HintClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HintClient")
            .field("base_url", &self.base_url)
            .field("hint_poll_interval", &self.hint_poll_interval)
            .field("execution_poll_interval", &self.execution_poll_interval)
            .field("poll_timeout", &self.poll_timeout)
            .field("error_hook", &self.error_hook.is_some())
            .finish_non_exhaustive()
    }
}

impl HintClient {
    /// Creates a client from the loaded configuration.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            hint_poll_interval: Duration::from_millis(config.hint_poll_interval_ms),
            execution_poll_interval: Duration::from_millis(config.execution_poll_interval_ms),
            poll_timeout: Duration::from_secs(config.poll_timeout_secs),
            error_hook: None,
        }
    }

    /// Attaches an observer invoked once per failed request.
    #[must_use]
    pub fn with_error_hook(mut self, hook: ErrorHook) -> Self {
        self.error_hook = Some(hook);
        self
    }

    /// Interval between hint-status polls.
    #[must_use]
    pub const fn hint_poll_interval(&self) -> Duration {
        self.hint_poll_interval
    }

    /// Upper bound on any single polling wait.
    #[must_use]
    pub const fn poll_timeout(&self) -> Duration {
        self.poll_timeout
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Normalizes a failure, logs it, and reports it to the hook. The hook
    /// runs outside the request path and cannot affect the outcome.
    fn fail(&self, status: Option<u16>, message: impl Into<String>, url: &str) -> HintError {
        let message = if status == Some(429) {
            QUOTA_EXCEEDED_MESSAGE.to_string()
        } else {
            message.into()
        };
        error!(target: "hintloop::http", url, ?status, %message, "request failed");
        if let Some(hook) = &self.error_hook {
            hook(&ApiFailure {
                status,
                message: message.clone(),
                url: url.to_string(),
            });
        }
        HintError::api(status, message, url)
    }

    /// Sends a prepared request and returns the JSON body. An empty 2xx
    /// body becomes `Value::Null`.
    async fn send(&self, request: reqwest::RequestBuilder, url: &str) -> Result<Value> {
        debug!(target: "hintloop::http", url, "request");
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return Err(self.fail(e.status().map(|s| s.as_u16()), e.to_string(), url)),
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => return Err(self.fail(Some(status.as_u16()), e.to_string(), url)),
        };

        if !status.is_success() {
            let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
            // The server's own description wins over the bare status line.
            let server_message = ["detail", "error", "message"]
                .iter()
                .find_map(|key| body.get(*key).and_then(Value::as_str));
            let message = server_message
                .map(ToString::to_string)
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(self.fail(Some(status.as_u16()), message, url));
        }

        debug!(target: "hintloop::http", url, status = status.as_u16(), "response");
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| HintError::malformed(url, e.to_string()))
    }

    async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<Value> {
        self.send(self.http.get(url).query(query), url).await
    }

    async fn post(&self, url: &str, body: Value) -> Result<Value> {
        self.send(self.http.post(url).json(&body), url).await
    }

    // ------------------------------------------------------------------------
    // Problems and execution
    // ------------------------------------------------------------------------

    /// Lists all programming problems.
    pub async fn fetch_problems(&self) -> Result<Vec<ProgrammingProblem>> {
        let url = self.url("/problems/programming_problems/");
        let body = self.get(&url, &[]).await?;
        if !body.is_array() {
            return Err(HintError::malformed(
                &url,
                "problems endpoint did not return an array",
            ));
        }
        serde_json::from_value(body).map_err(|e| HintError::malformed(&url, e.to_string()))
    }

    /// Fetches one problem with its description and template code.
    pub async fn fetch_problem(&self, problem_id: &str) -> Result<ProgrammingProblem> {
        let url = self.url("/problems/programming_problems/");
        let body = self
            .get(
                &url,
                &[("problem_id", problem_id), ("include_description", "true")],
            )
            .await?;
        serde_json::from_value(body).map_err(|e| HintError::malformed(&url, e.to_string()))
    }

    /// Runs a student program against a problem's tests and waits for the
    /// result, polling every `executionPollIntervalMs` up to
    /// `pollTimeoutSecs`.
    pub async fn execute_program(
        &self,
        problem_id: &str,
        student_program: &str,
        student_id: Option<&str>,
    ) -> Result<ExecutionResult> {
        let post_url = self.url("/problems/execute_program/");
        let mut payload = json!({
            "problem_id": problem_id,
            "student_program": student_program,
        });
        if let (Some(id), Some(map)) = (student_id, payload.as_object_mut()) {
            map.insert("student_id".to_string(), Value::String(id.to_string()));
        }

        let created = self.post(&post_url, payload).await?;
        let execution_id = created
            .get("execution_id")
            .and_then(value_as_id_string)
            .ok_or_else(|| {
                HintError::malformed(&post_url, "execution request did not return an execution_id")
            })?;
        debug!(target: "hintloop::http", %execution_id, "execution started");

        let poll_url = self.url("/problems/get_execution_result/");
        let deadline = tokio::time::Instant::now() + self.poll_timeout;
        loop {
            let tick = self
                .get(&poll_url, &[("execution_id", execution_id.as_str())])
                .await?;

            if tick.get("job_finished").and_then(Value::as_bool) == Some(true) {
                if let Some(message) = tick.get("error").and_then(Value::as_str) {
                    return Err(HintError::job_failed(message));
                }
                return Ok(ExecutionResult {
                    problem_id: problem_id.to_string(),
                    correctness: tick.get("correctness").and_then(Value::as_bool)
                        == Some(true),
                    buggy_output: tick
                        .get("buggy_output")
                        .and_then(Value::as_str)
                        .map(ToString::to_string),
                    elapsed_time: tick.get("elapsed_time").and_then(Value::as_f64).unwrap_or(0.0),
                });
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(HintError::poll_timeout(
                    "execution result",
                    self.poll_timeout.as_secs(),
                ));
            }
            tokio::time::sleep(self.execution_poll_interval).await;
        }
    }

    // ------------------------------------------------------------------------
    // Hints
    // ------------------------------------------------------------------------

    /// Creates a hint request and returns its id.
    pub async fn add_hint_request(
        &self,
        student_id: &str,
        problem_id: &str,
        hint_type: HintType,
        student_program: &str,
    ) -> Result<u64> {
        let url = self.url("/ai_hint/add_request/");
        let body = self
            .post(
                &url,
                json!({
                    "student_id": student_id,
                    "problem_id": problem_id,
                    "hint_type": hint_type.as_str(),
                    "student_program": student_program,
                }),
            )
            .await?;
        body.get("request_id").and_then(Value::as_u64).ok_or_else(|| {
            HintError::malformed(&url, "hint request did not return a request_id")
        })
    }

    /// Records the student's reflection answer for a request.
    pub async fn add_reflection(
        &self,
        request_id: u64,
        reflection_question: &str,
        reflection_answer: &str,
    ) -> Result<()> {
        let url = self.url("/ai_hint/add_reflection/");
        self.post(
            &url,
            json!({
                "request_id": request_id,
                "reflection_question": reflection_question,
                "reflection_answer": reflection_answer,
            }),
        )
        .await?;
        Ok(())
    }

    /// One tick of the hint-status poll.
    pub async fn query_hint(&self, request_id: u64) -> Result<HintStatusResponse> {
        let url = self.url("/ai_hint/query_hint/");
        let id = request_id.to_string();
        let body = self.get(&url, &[("request_id", id.as_str())]).await?;
        serde_json::from_value(body).map_err(|e| HintError::malformed(&url, e.to_string()))
    }

    /// Whether the student has ever requested a hint (any problem). Gates
    /// the first-time AI-use notice.
    pub async fn has_ever_requested(&self, student_id: &str) -> Result<bool> {
        let url = self.url("/ai_hint/has_ever_requested/");
        let body = self.get(&url, &[("student_id", student_id)]).await?;
        body.get("ever_requested").and_then(Value::as_bool).ok_or_else(|| {
            HintError::malformed(&url, "missing ever_requested field")
        })
    }

    /// All historical AI hints for one student on one problem.
    pub async fn query_all_hints(
        &self,
        student_id: &str,
        problem_id: &str,
    ) -> Result<Vec<AiHintRecord>> {
        let url = self.url("/ai_hint/query_all_hint/");
        let body = self
            .get(&url, &[("student_id", student_id), ("problem_id", problem_id)])
            .await?;
        serde_json::from_value(body).map_err(|e| HintError::malformed(&url, e.to_string()))
    }

    /// Cancels an in-flight hint request.
    pub async fn cancel_request(&self, request_id: u64) -> Result<()> {
        let url = self.url("/ai_hint/cancel_request/");
        self.post(&url, json!({ "request_id": request_id })).await?;
        Ok(())
    }

    /// Cancellation is advisory: a failure here must not disturb the
    /// caller's already-cleared local state, so it is logged and swallowed.
    pub async fn cancel_request_best_effort(&self, request_id: u64) {
        if let Err(e) = self.cancel_request(request_id).await {
            warn!(target: "hintloop::http", request_id, error = %e, "cancel failed; ignoring");
        }
    }

    /// Saves the student's rating of an AI hint.
    pub async fn save_hint_rating(&self, request_id: u64, is_hint_helpful: bool) -> Result<()> {
        let url = self.url("/ai_hint/save_hint_rating/");
        self.post(
            &url,
            json!({ "request_id": request_id, "is_hint_helpful": is_hint_helpful }),
        )
        .await?;
        Ok(())
    }

    /// The student's remaining hint allowance on one problem.
    pub async fn quota_left(&self, student_id: &str, problem_id: &str) -> Result<QuotaInfo> {
        let url = self.url("/ai_hint/quota_left/");
        let body = self
            .get(&url, &[("student_id", student_id), ("problem_id", problem_id)])
            .await?;
        serde_json::from_value(body).map_err(|e| HintError::malformed(&url, e.to_string()))
    }

    // ------------------------------------------------------------------------
    // Instructor feedback
    // ------------------------------------------------------------------------

    /// Escalates an unhelpful AI hint to an instructor.
    pub async fn request_instructor_feedback(
        &self,
        ai_request_id: u64,
        student_email: Option<&str>,
        student_notes: Option<&str>,
    ) -> Result<()> {
        let url = self.url("/instructor_feedback/add_request/");
        let mut payload = json!({ "request_id": ai_request_id });
        if let Some(map) = payload.as_object_mut() {
            if let Some(email) = student_email.filter(|e| !e.is_empty()) {
                map.insert("student_email".to_string(), Value::String(email.to_string()));
            }
            if let Some(notes) = student_notes.filter(|n| !n.is_empty()) {
                map.insert("student_notes".to_string(), Value::String(notes.to_string()));
            }
        }
        self.post(&url, payload).await?;
        Ok(())
    }

    /// All instructor feedback for one student on one problem.
    pub async fn query_all_feedback(
        &self,
        student_id: &str,
        problem_id: &str,
    ) -> Result<Vec<FeedbackRecord>> {
        let url = self.url("/instructor_feedback/query_all_feedback/");
        let body = self
            .get(&url, &[("student_id", student_id), ("problem_id", problem_id)])
            .await?;
        serde_json::from_value(body).map_err(|e| HintError::malformed(&url, e.to_string()))
    }

    /// Saves the student's rating of instructor feedback.
    pub async fn save_feedback_rating(
        &self,
        instructor_request_id: u64,
        is_feedback_helpful: bool,
    ) -> Result<()> {
        let url = self.url("/instructor_feedback/save_feedback_rating/");
        self.post(
            &url,
            json!({
                "instructor_request_id": instructor_request_id,
                "is_feedback_helpful": is_feedback_helpful,
            }),
        )
        .await?;
        Ok(())
    }

    /// Pops the next escalation assigned to an instructor. An empty body
    /// or empty object means no work is queued.
    pub async fn fetch_instructor_request(
        &self,
        instructor_id: &str,
    ) -> Result<Option<InstructorAssignment>> {
        let url = self.url("/instructor_feedback/fetch_request/");
        let body = self.get(&url, &[("instructor_id", instructor_id)]).await?;
        let empty = match &body {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            _ => false,
        };
        if empty {
            return Ok(None);
        }
        serde_json::from_value(body)
            .map(Some)
            .map_err(|e| HintError::malformed(&url, e.to_string()))
    }

    /// Saves an instructor's written feedback for an escalation.
    pub async fn save_instructor_feedback(
        &self,
        instructor_request_id: u64,
        instructor_id: &str,
        feedback: &str,
    ) -> Result<()> {
        hintloop_core::validate::validate_feedback(feedback)?;
        let url = self.url("/instructor_feedback/save_feedback/");
        self.post(
            &url,
            json!({
                "instructor_request_id": instructor_request_id,
                "instructor_id": instructor_id,
                "feedback": feedback,
            }),
        )
        .await?;
        Ok(())
    }
}

/// Execution ids arrive as either a JSON string or a number.
fn value_as_id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
