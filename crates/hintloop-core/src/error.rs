//! Error types for HintLoop.
//!
//! This module defines the error hierarchy shared by every crate in the
//! workspace: configuration loading, API failures, polling, local input
//! validation, and session state-machine misuse.

use std::path::PathBuf;

/// A specialized `Result` type for HintLoop operations.
pub type Result<T> = std::result::Result<T, HintError>;

/// The user-facing message shown when the backend rejects a request with
/// HTTP 429 (quota exhausted).
pub const QUOTA_EXCEEDED_MESSAGE: &str =
    "Hint request failed: You have reached your hint request limit.";

/// Errors that can occur while talking to the hint backend or driving the
/// hint lifecycle.
///
/// Variants are organized by subsystem and include actionable suggestions
/// where possible to help users resolve issues.
#[derive(Debug, thiserror::Error)]
pub enum HintError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your hintloop.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // API Errors
    // ========================================================================
    /// A request to the orchestration backend failed.
    ///
    /// Covers both transport failures (no status) and HTTP error statuses.
    /// The message prefers the server-provided `detail`/`error`/`message`
    /// field over the raw transport error.
    #[error("Request failed: {message}")]
    Api {
        /// HTTP status code, when a response was received.
        status: Option<u16>,
        /// Normalized, human-readable failure description.
        message: String,
        /// The URL that failed, when known.
        url: Option<String>,
    },

    /// The backend returned HTTP 429: the student's hint quota is spent.
    #[error("{QUOTA_EXCEEDED_MESSAGE}")]
    QuotaExceeded,

    /// A 2xx response did not carry the fields the endpoint promises.
    #[error("Malformed response from '{url}': {message}")]
    MalformedResponse {
        /// The endpoint that produced the bad payload.
        url: String,
        /// What was missing or wrong.
        message: String,
    },

    // ========================================================================
    // Polling Errors
    // ========================================================================
    /// The backend declared the asynchronous job failed (an `error` field on
    /// an otherwise-successful poll response).
    #[error("Job failed: {message}")]
    JobFailed {
        /// The backend-reported failure reason.
        message: String,
    },

    /// A polling loop exceeded its overall time budget.
    #[error("Timed out after {seconds}s waiting for {what}\n\nSuggestion: Check backend health or raise pollTimeoutSecs in hintloop.json")]
    PollTimeout {
        /// What was being waited on (e.g. "execution result").
        what: String,
        /// The configured budget in seconds.
        seconds: u64,
    },

    // ========================================================================
    // Local Validation Errors
    // ========================================================================
    /// The supplied email address is not well-formed. Checked locally; no
    /// request is issued.
    #[error("Your email is invalid. Please correct it.")]
    InvalidEmail {
        /// The rejected address.
        email: String,
    },

    /// Instructor feedback must not be blank.
    #[error("Feedback must not be empty")]
    EmptyFeedback,

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // State Machine Errors
    // ========================================================================
    /// Invalid session transition attempted.
    #[error("Invalid session transition: cannot go from {from} to {to}")]
    InvalidStateTransition {
        /// The current phase.
        from: String,
        /// The attempted target phase.
        to: String,
    },
}

impl HintError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `Api` error. A status of 429 is promoted to
    /// [`HintError::QuotaExceeded`].
    #[must_use]
    pub fn api(status: Option<u16>, message: impl Into<String>, url: impl Into<String>) -> Self {
        if status == Some(429) {
            return Self::QuotaExceeded;
        }
        Self::Api {
            status,
            message: message.into(),
            url: Some(url.into()),
        }
    }

    /// Creates a new `MalformedResponse` error.
    #[must_use]
    pub fn malformed(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a new `JobFailed` error.
    #[must_use]
    pub fn job_failed(message: impl Into<String>) -> Self {
        Self::JobFailed {
            message: message.into(),
        }
    }

    /// Creates a new `PollTimeout` error.
    #[must_use]
    pub fn poll_timeout(what: impl Into<String>, seconds: u64) -> Self {
        Self::PollTimeout {
            what: what.into(),
            seconds,
        }
    }

    /// Creates a new `InvalidEmail` error.
    #[must_use]
    pub fn invalid_email(email: impl Into<String>) -> Self {
        Self::InvalidEmail {
            email: email.into(),
        }
    }

    /// Creates a new `InvalidStateTransition` error.
    #[must_use]
    pub fn invalid_transition(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        Self::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Returns `true` if this error means the student's quota is spent.
    #[must_use]
    pub const fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded)
    }

    /// Returns `true` if this error is transient and the operation may be
    /// retried (network failures, 5xx statuses, poll timeouts).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Api { status, .. } => status.is_none() || status.is_some_and(|s| s >= 500),
            Self::PollTimeout { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if this error was produced by local validation and
    /// never reached the network.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(
            self,
            Self::InvalidEmail { .. }
                | Self::EmptyFeedback
                | Self::ConfigParseError { .. }
                | Self::ConfigValidationError { .. }
        )
    }
}
