//! Instructor-side notebook download.
//!
//! Backends deliver the `student_notebook` field either as a JSON string or
//! as an embedded object. Both forms are normalized to 2-space
//! pretty-printed JSON. Key order is preserved end to end, so parsing the
//! output and printing it again reproduces the same bytes; graders diff
//! these files, and an unstable rendering would show phantom changes.

use serde_json::Value;

use crate::{ReportError, Result};

/// The default download filename when no problem id is known.
const DEFAULT_FILENAME: &str = "student_notebook.ipynb";

/// Normalizes a student notebook payload to pretty-printed JSON.
///
/// # Errors
///
/// Returns `ReportError::Json` when a string payload is not valid JSON, and
/// `ReportError::InvalidPayload` for scalar payloads that cannot be a
/// notebook.
pub fn pretty_notebook(payload: &Value) -> Result<String> {
    let notebook: Value = match payload {
        Value::String(raw) => serde_json::from_str(raw)?,
        Value::Object(_) | Value::Array(_) => payload.clone(),
        other => {
            return Err(ReportError::InvalidPayload(format!(
                "expected a JSON string or object, got {other}"
            )));
        }
    };
    Ok(serde_json::to_string_pretty(&notebook)?)
}

/// The download filename for a problem's notebook:
/// `{problem_id}_student_notebook.ipynb`, or the bare default when the
/// problem id is blank.
#[must_use]
pub fn notebook_filename(problem_id: &str) -> String {
    let problem_id = problem_id.trim();
    if problem_id.is_empty() {
        DEFAULT_FILENAME.to_string()
    } else {
        format!("{problem_id}_{DEFAULT_FILENAME}")
    }
}
