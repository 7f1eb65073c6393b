//! Wire types for the orchestration backend.

use serde::{Deserialize, Serialize};

/// A programming problem as listed by the backend.
///
/// The listing endpoint returns only ids and names; fetching a single
/// problem with `include_description=true` fills in the description and
/// template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgrammingProblem {
    /// Stable problem identifier.
    pub problem_id: String,
    /// Human-friendly name, when the backend provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Markdown task description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_description: Option<String>,
    /// Starter code shown to the student.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_code: Option<String>,
}

impl ProgrammingProblem {
    /// The name to display: the human-friendly name when present, the id
    /// otherwise.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.problem_id)
    }
}

/// Terminal result of running a student program against a problem's tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// The problem the program was run against.
    pub problem_id: String,
    /// Whether the program passed.
    pub correctness: bool,
    /// Output of the failing run, when incorrect.
    #[serde(default)]
    pub buggy_output: Option<String>,
    /// Wall-clock execution time in seconds.
    #[serde(default)]
    pub elapsed_time: f64,
}

/// One tick of the hint-status poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HintStatusResponse {
    /// The request being polled.
    pub request_id: u64,
    /// Whether generation has finished.
    #[serde(default)]
    pub job_finished: bool,
    /// Backend success flag; absent on older backends, which report success
    /// implicitly through a non-empty hint.
    #[serde(default)]
    pub successful: Option<bool>,
    /// The generated hint. Some backend variants name the field `hint`.
    #[serde(default, alias = "hint")]
    pub returned_hint: Option<String>,
}

/// A queued escalation assigned to an instructor.
#[derive(Debug, Clone, Deserialize)]
pub struct InstructorAssignment {
    /// The escalation's own id.
    pub instructor_request_id: u64,
    /// The originating AI hint request.
    pub request_id: u64,
    /// The problem the student was working on.
    pub problem_id: String,
    /// Human-friendly problem name, when available.
    #[serde(default)]
    pub name: Option<String>,
    /// The category of the escalated hint.
    #[serde(default)]
    pub hint_type: Option<String>,
    /// The student's program at request time.
    #[serde(default)]
    pub student_program: String,
    /// The student's notebook, as a JSON string or an embedded object.
    #[serde(default)]
    pub student_notebook: Option<serde_json::Value>,
    /// The reflection question the student answered.
    #[serde(default)]
    pub reflection_question: Option<String>,
    /// The student's reflection answer.
    #[serde(default)]
    pub reflection_answer: Option<String>,
    /// The AI hint the student found unhelpful.
    #[serde(default)]
    pub ai_hint: Option<String>,
    /// The student's note to the instructor.
    #[serde(default)]
    pub student_notes: Option<String>,
    /// Problem description, when the backend provides it.
    #[serde(default)]
    pub problem_description: Option<String>,
}
