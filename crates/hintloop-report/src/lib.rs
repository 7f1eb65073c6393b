//! HintLoop report generation
//!
//! This crate renders the reconciled hint-and-feedback timeline to Markdown
//! for human review and handles the instructor-side notebook download,
//! where the pretty-printed JSON must survive a parse/print round trip
//! byte-identically.
//!
//! # Types
//!
//! - [`TimelineGenerator`] - Renders a sorted history slice to Markdown
//! - [`notebook::pretty_notebook`] - Normalizes a student notebook payload
//! - [`notebook::notebook_filename`] - Download filename for a problem

pub mod notebook;
mod timeline;

pub use timeline::TimelineGenerator;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while producing report artifacts.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// Failed to parse or serialize notebook JSON.
    #[error("notebook JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failed to read or write report files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The payload was not a notebook in any recognized form.
    #[error("invalid notebook payload: {0}")]
    InvalidPayload(String),
}

/// Result type for report operations.
pub type Result<T> = std::result::Result<T, ReportError>;
