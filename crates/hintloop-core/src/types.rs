//! Domain types for the hint lifecycle.
//!
//! This module defines the hint categories, the unified history view used
//! for display and rating, and the wire records the backend returns for
//! historical hints and instructor feedback.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// HintType
// ============================================================================

/// The pedagogical category of an AI-generated hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HintType {
    /// A hint aimed at identifying the steps needed to solve the question.
    Plan,
    /// A hint aimed at identifying and fixing a bug in the current program.
    Debug,
    /// A hint aimed at improving performance and readability.
    Optimize,
}

impl HintType {
    /// All hint types, in display order.
    pub const ALL: [Self; 3] = [Self::Plan, Self::Debug, Self::Optimize];

    /// The display label used in buttons and history headings.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Plan => "Planning Hint",
            Self::Debug => "Debugging Hint",
            Self::Optimize => "Optimization Hint",
        }
    }

    /// The wire name (`plan`, `debug`, `optimize`).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Debug => "debug",
            Self::Optimize => "optimize",
        }
    }

    /// The metacognition prompt the student must answer before the request
    /// is dispatched.
    #[must_use]
    pub const fn reflection_question(&self) -> &'static str {
        match self {
            Self::Plan => {
                "Considering the program you wrote and the feedback you have received from the system so far, what do you think is a possible issue with the program plan and problem-solving steps?"
            }
            Self::Debug => {
                "Considering the program you wrote and the feedback you have received from the system so far, what do you think is a possible bug in the program?"
            }
            Self::Optimize => {
                "Considering the program you wrote and the feedback you have received from the system so far, what do you think is a possible issue with the program in terms of performance and readability?"
            }
        }
    }
}

impl std::fmt::Display for HintType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HintType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "plan" | "planning" => Ok(Self::Plan),
            "debug" | "debugging" => Ok(Self::Debug),
            "optimize" | "optimizing" => Ok(Self::Optimize),
            other => Err(format!(
                "unknown hint type '{other}' (expected plan, debug, or optimize)"
            )),
        }
    }
}

// ============================================================================
// HistoryKind and HistoryItem
// ============================================================================

/// Which side of the system produced a history item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryKind {
    /// An AI-generated hint.
    Ai,
    /// A human instructor's feedback, created by escalating an AI hint.
    Instructor,
}

impl HistoryKind {
    /// Tie-break rank for equal ordering keys: the hint always precedes its
    /// escalation.
    #[must_use]
    pub const fn rank(&self) -> u8 {
        match self {
            Self::Ai => 0,
            Self::Instructor => 1,
        }
    }
}

/// A pointer to the single item currently awaiting a rating.
///
/// AI hint ids and instructor-feedback ids are independent numeric
/// sequences, so the kind is needed to disambiguate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveRef {
    /// The kind of the referenced item.
    pub kind: HistoryKind,
    /// The item's id within its kind's sequence.
    pub id: u64,
}

/// One entry in the unified hint-and-feedback timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    /// AI hint request id, or instructor-feedback request id.
    pub id: u64,

    /// The underlying AI request id, used as the shared ordering key.
    /// Instructor feedback is always tied to a prior AI hint; when the
    /// backend omits the linkage this is `None` and `id` is used instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_request_id: Option<u64>,

    /// Whether this is an AI hint or instructor feedback.
    pub kind: HistoryKind,

    /// The hint category, for AI items.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<HintType>,

    /// When the item was created.
    pub created_at: DateTime<Utc>,

    /// Hint or feedback text. `None` when the instructor has not responded
    /// yet or generation produced nothing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Tri-state helpfulness rating: unset, helpful, or unhelpful.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub helpful: Option<bool>,
}

impl HistoryItem {
    /// The key items are primarily ordered by.
    #[must_use]
    pub fn ordering_key(&self) -> u64 {
        self.ai_request_id.unwrap_or(self.id)
    }

    /// Returns `true` once the student has rated this item either way.
    #[must_use]
    pub const fn is_rated(&self) -> bool {
        self.helpful.is_some()
    }

    /// The display label for this item.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self.kind {
            HistoryKind::Instructor => "Instructor Feedback",
            HistoryKind::Ai => self.subtype.map_or("AI Hint", |t| t.label()),
        }
    }

    /// A reference suitable for marking this item active.
    #[must_use]
    pub const fn active_ref(&self) -> ActiveRef {
        ActiveRef {
            kind: self.kind,
            id: self.id,
        }
    }
}

// ============================================================================
// PendingRequest
// ============================================================================

/// An in-flight hint request awaiting asynchronous completion.
///
/// The set of currently pending ids is the authority for discarding stale
/// poll responses after cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRequest {
    /// Server-assigned request id.
    pub request_id: u64,
    /// The category that was requested.
    pub hint_type: HintType,
    /// When the request was created client-side.
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Wire records
// ============================================================================

/// A historical AI hint record as returned by `query_all_hint`.
///
/// Field names vary across backend versions; aliases absorb the variants.
/// Serialization always uses the canonical names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiHintRecord {
    /// The hint request id.
    #[serde(alias = "id")]
    pub request_id: u64,

    /// The hint category.
    #[serde(default, alias = "type")]
    pub hint_type: Option<HintType>,

    /// The generated hint text.
    #[serde(default, alias = "hint")]
    pub returned_hint: Option<String>,

    /// The student's rating, if any.
    #[serde(default, alias = "helpful")]
    pub is_hint_helpful: Option<bool>,

    /// When the hint was returned (preferred timestamp).
    #[serde(default)]
    pub returned_time: Option<DateTime<Utc>>,

    /// When the request was created (fallback timestamp).
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl AiHintRecord {
    /// Converts the record into the unified history view, stamping `now`
    /// when the backend supplied no timestamp.
    #[must_use]
    pub fn into_history_item(self, now: DateTime<Utc>) -> HistoryItem {
        HistoryItem {
            id: self.request_id,
            ai_request_id: Some(self.request_id),
            kind: HistoryKind::Ai,
            subtype: self.hint_type,
            created_at: self.returned_time.or(self.created_at).unwrap_or(now),
            content: self.returned_hint,
            helpful: self.is_hint_helpful,
        }
    }
}

/// A historical instructor-feedback record as returned by
/// `query_all_feedback`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    /// The instructor-feedback request id.
    #[serde(alias = "id")]
    pub instructor_request_id: u64,

    /// The originating AI hint request id, when the backend records it.
    #[serde(default, alias = "request_id")]
    pub ai_hint_request_id: Option<u64>,

    /// The instructor's response, absent until one is written.
    #[serde(default, alias = "feedback")]
    pub instructor_feedback: Option<String>,

    /// The student's rating, if any.
    #[serde(default, alias = "helpful")]
    pub is_feedback_helpful: Option<bool>,

    /// When the escalation was created.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl FeedbackRecord {
    /// Converts the record into the unified history view.
    #[must_use]
    pub fn into_history_item(self, now: DateTime<Utc>) -> HistoryItem {
        HistoryItem {
            id: self.instructor_request_id,
            ai_request_id: self.ai_hint_request_id,
            kind: HistoryKind::Instructor,
            subtype: None,
            created_at: self.created_at.unwrap_or(now),
            content: self.instructor_feedback,
            helpful: self.is_feedback_helpful,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
