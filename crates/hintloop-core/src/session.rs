//! The hint lifecycle state machine.
//!
//! `HintSession` tracks one student working on one problem: consent gating,
//! the reflection step, the set of in-flight hint requests, the unified
//! history, and the single item currently awaiting a rating. It is pure
//! state; all network effects are performed by the caller, which feeds
//! results back in through `request_created`, `apply_poll`, and
//! `load_history`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{HintError, Result, QUOTA_EXCEEDED_MESSAGE};
use crate::history::{next_active, sort_items};
use crate::quota::QuotaInfo;
use crate::types::{ActiveRef, HintType, HistoryItem, HistoryKind, PendingRequest};
use crate::validate;

/// Placeholder content recorded when generation succeeded but produced no
/// text.
pub const EMPTY_HINT_PLACEHOLDER: &str = "(empty hint)";
/// Placeholder content recorded when the backend reported generation
/// failure.
pub const GENERATION_FAILED_PLACEHOLDER: &str = "(Hint generation failed)";
/// Placeholder content recorded when polling itself errored.
pub const FETCH_ERROR_PLACEHOLDER: &str = "(Error fetching hint)";

// ============================================================================
// SessionPhase
// ============================================================================

/// Where the session is in the request lifecycle.
///
/// The phase transitions through these states:
/// - `Idle` -> `AwaitingConsent` (first-time student) -> `Idle`
/// - `Idle` -> `Reflecting` (request created) -> `Polling` -> `Idle`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No request in flight.
    #[default]
    Idle,
    /// A first-time student must acknowledge the AI-use notice before the
    /// request proceeds.
    AwaitingConsent,
    /// A request exists server-side; the student is answering the
    /// reflection question.
    Reflecting,
    /// One or more requests are being polled for completion.
    Polling,
}

impl SessionPhase {
    /// Returns `true` when a hint request is somewhere in flight.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        matches!(self, Self::AwaitingConsent | Self::Reflecting | Self::Polling)
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::AwaitingConsent => "awaiting_consent",
            Self::Reflecting => "reflecting",
            Self::Polling => "polling",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Gate decisions and poll outcomes
// ============================================================================

/// Why a hint request was refused locally, before any network call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// Student or problem id is blank.
    MissingIdentity,
    /// An earlier hint or feedback item still awaits a rating.
    UnratedActiveItem,
    /// A request is already in flight.
    RequestInFlight,
    /// The local quota for this type (or overall) is exhausted.
    QuotaExhausted,
}

impl BlockReason {
    /// The message shown to the student.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::MissingIdentity => "Student and problem must be set before requesting a hint",
            Self::UnratedActiveItem => {
                "Please rate the current hint or feedback before requesting another"
            }
            Self::RequestInFlight => "A hint request is already in progress",
            Self::QuotaExhausted => QUOTA_EXCEEDED_MESSAGE,
        }
    }
}

/// Outcome of the local request gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestDecision {
    /// The caller should create the request on the backend.
    Proceed,
    /// A first-time student must consent first; the request is parked and
    /// resumes if they do.
    ConsentRequired,
    /// Refused locally; nothing was sent.
    Blocked(BlockReason),
}

/// One poll result for one request id, as reported by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The backend has not finished yet.
    Pending,
    /// Generation finished. Success is judged locally: `successful` not
    /// explicitly false and non-empty text.
    Finished {
        /// Backend success flag, absent on older backends.
        successful: Option<bool>,
        /// The generated hint text.
        hint: Option<String>,
    },
    /// The poll request itself failed, or the backend reported an error.
    Error {
        /// The failure description.
        message: String,
    },
}

/// What the session did with a poll result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollDisposition {
    /// The id was not in the pending set (cancelled or already resolved);
    /// the result was discarded with no effect.
    Ignored,
    /// Still pending; keep polling.
    StillPending,
    /// Resolved into a history item. `success` is false for failures and
    /// empty hints, which also refund one quota unit.
    Resolved {
        /// Whether the hint counts as successfully generated.
        success: bool,
    },
}

/// Where a rating left the active item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingOutcome {
    /// The item is rated and no longer active.
    Dismissed,
    /// The student found an AI hint unhelpful; offer escalation to an
    /// instructor for the given AI request id.
    OfferEscalation {
        /// The AI request the escalation would reference.
        ai_request_id: u64,
    },
}

// ============================================================================
// EscalationForm
// ============================================================================

/// Draft of an instructor escalation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EscalationForm {
    /// The unhelpful AI hint being escalated.
    pub ai_request_id: u64,
    /// Optional note to the instructor describing what is still unclear.
    pub notes: String,
    /// Optional email for the reply notification.
    pub email: Option<String>,
}

impl EscalationForm {
    /// Validates the form locally. Notes may be empty; the email, when
    /// given, must be well-formed.
    ///
    /// # Errors
    ///
    /// Returns `HintError::InvalidEmail` for a malformed address.
    pub fn validate(&self) -> Result<()> {
        if let Some(email) = self.email.as_deref() {
            if !email.trim().is_empty() {
                validate::validate_email(email.trim())?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// HintSession
// ============================================================================

/// Per-(student, problem) hint lifecycle state.
#[derive(Debug, Clone)]
pub struct HintSession {
    student_id: String,
    problem_id: String,
    phase: SessionPhase,

    /// Whether this student must see the AI-use notice before their first
    /// request. Cleared for the session once they consent.
    requires_consent: bool,
    consent_given: bool,
    /// The request parked while waiting for consent.
    parked_request: Option<HintType>,

    quota: QuotaInfo,
    /// The request awaiting its reflection answer.
    reflecting: Option<PendingRequest>,
    /// In-flight requests by id. Authority for discarding stale poll
    /// responses after cancellation.
    pending: BTreeMap<u64, PendingRequest>,

    history: Vec<HistoryItem>,
    active: Option<ActiveRef>,
}

impl HintSession {
    /// Creates a session for one student on one problem.
    ///
    /// `requires_consent` should be `true` when the backend reports the
    /// student has never requested a hint before.
    #[must_use]
    pub fn new(
        student_id: impl Into<String>,
        problem_id: impl Into<String>,
        quota: QuotaInfo,
        requires_consent: bool,
    ) -> Self {
        Self {
            student_id: student_id.into(),
            problem_id: problem_id.into(),
            phase: SessionPhase::Idle,
            requires_consent,
            consent_given: false,
            parked_request: None,
            quota,
            reflecting: None,
            pending: BTreeMap::new(),
            history: Vec::new(),
            active: None,
        }
    }

    /// The current lifecycle phase.
    #[must_use]
    pub const fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// The current local quota snapshot.
    #[must_use]
    pub const fn quota(&self) -> &QuotaInfo {
        &self.quota
    }

    /// Replaces the local quota snapshot with a fresh backend fetch.
    pub fn set_quota(&mut self, quota: QuotaInfo) {
        self.quota = quota;
    }

    /// The reconciled history, oldest ordering key first.
    #[must_use]
    pub fn history(&self) -> &[HistoryItem] {
        &self.history
    }

    /// The item currently awaiting a rating, if any.
    #[must_use]
    pub fn active_item(&self) -> Option<&HistoryItem> {
        let active = self.active?;
        self.history
            .iter()
            .find(|item| item.kind == active.kind && item.id == active.id)
    }

    /// Ids still being polled, in ascending order.
    #[must_use]
    pub fn pending_ids(&self) -> Vec<u64> {
        self.pending.keys().copied().collect()
    }

    // ------------------------------------------------------------------------
    // Requesting
    // ------------------------------------------------------------------------

    /// The local request gate, evaluated without any network call.
    ///
    /// On `Proceed` the caller creates the request on the backend and feeds
    /// the new id back through [`Self::request_created`]. On
    /// `ConsentRequired` the request is parked until
    /// [`Self::grant_consent`] or [`Self::decline_consent`].
    pub fn request_hint(&mut self, hint_type: HintType) -> RequestDecision {
        if self.student_id.trim().is_empty() || self.problem_id.trim().is_empty() {
            return RequestDecision::Blocked(BlockReason::MissingIdentity);
        }
        if self.active.is_some() {
            return RequestDecision::Blocked(BlockReason::UnratedActiveItem);
        }
        if self.phase.is_busy() {
            return RequestDecision::Blocked(BlockReason::RequestInFlight);
        }
        if !self.quota.has_remaining(hint_type) {
            return RequestDecision::Blocked(BlockReason::QuotaExhausted);
        }

        if self.requires_consent && !self.consent_given {
            self.phase = SessionPhase::AwaitingConsent;
            self.parked_request = Some(hint_type);
            return RequestDecision::ConsentRequired;
        }

        RequestDecision::Proceed
    }

    /// Records the student's consent and returns the parked request to
    /// resume. Consent is remembered for the rest of the session.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` when no consent is pending.
    pub fn grant_consent(&mut self) -> Result<HintType> {
        if self.phase != SessionPhase::AwaitingConsent {
            return Err(HintError::invalid_transition(self.phase, "consented"));
        }
        self.consent_given = true;
        self.phase = SessionPhase::Idle;
        self.parked_request
            .take()
            .ok_or_else(|| HintError::invalid_transition(self.phase, "consented"))
    }

    /// Declines the AI-use notice: back to idle with no side effects. The
    /// notice will be shown again on the next request.
    pub fn decline_consent(&mut self) {
        if self.phase == SessionPhase::AwaitingConsent {
            self.phase = SessionPhase::Idle;
            self.parked_request = None;
        }
    }

    /// The request now exists server-side. Quota is optimistically consumed
    /// and the session enters `Reflecting`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` when called outside `Idle`.
    pub fn request_created(
        &mut self,
        request_id: u64,
        hint_type: HintType,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if self.phase != SessionPhase::Idle {
            return Err(HintError::invalid_transition(self.phase, "reflecting"));
        }
        debug!(request_id, hint_type = %hint_type, "hint request created");
        self.quota.consume(hint_type);
        self.reflecting = Some(PendingRequest {
            request_id,
            hint_type,
            created_at: now,
        });
        self.phase = SessionPhase::Reflecting;
        Ok(())
    }

    /// The reflection answer was submitted: the request joins the polling
    /// set.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` when no reflection is open.
    pub fn submit_reflection(&mut self) -> Result<u64> {
        let request = self
            .reflecting
            .take()
            .ok_or_else(|| HintError::invalid_transition(self.phase, "polling"))?;
        let id = request.request_id;
        self.pending.insert(id, request);
        self.phase = SessionPhase::Polling;
        Ok(id)
    }

    /// Abandons the open reflection. The consumed quota unit is NOT
    /// refunded; only generation failure refunds.
    pub fn cancel_reflection(&mut self) {
        if self.reflecting.take().is_some() {
            self.phase = if self.pending.is_empty() {
                SessionPhase::Idle
            } else {
                SessionPhase::Polling
            };
        }
    }

    // ------------------------------------------------------------------------
    // Polling
    // ------------------------------------------------------------------------

    /// Feeds one poll result into the session.
    ///
    /// Results for ids no longer pending are discarded: this is the guard
    /// that makes a late response after cancellation harmless. A resolved
    /// request leaves the pending set, lands in history, and becomes the
    /// active (unrated) item; failures and poll errors refund one quota
    /// unit. An error is terminal for that request only.
    pub fn apply_poll(
        &mut self,
        request_id: u64,
        outcome: PollOutcome,
        now: DateTime<Utc>,
    ) -> PollDisposition {
        if !self.pending.contains_key(&request_id) {
            debug!(request_id, "discarding stale poll result");
            return PollDisposition::Ignored;
        }

        let (success, content) = match outcome {
            PollOutcome::Pending => return PollDisposition::StillPending,
            PollOutcome::Finished { successful, hint } => {
                let text = hint.unwrap_or_default();
                if successful == Some(false) {
                    (false, GENERATION_FAILED_PLACEHOLDER.to_string())
                } else if text.trim().is_empty() {
                    (false, EMPTY_HINT_PLACEHOLDER.to_string())
                } else {
                    (true, text)
                }
            }
            PollOutcome::Error { message } => {
                debug!(request_id, %message, "hint poll failed");
                (false, FETCH_ERROR_PLACEHOLDER.to_string())
            }
        };

        // contains_key above guarantees the entry exists.
        let Some(request) = self.pending.remove(&request_id) else {
            return PollDisposition::Ignored;
        };

        if !success {
            self.quota.refund(request.hint_type);
        }

        let item = HistoryItem {
            id: request.request_id,
            ai_request_id: Some(request.request_id),
            kind: HistoryKind::Ai,
            subtype: Some(request.hint_type),
            created_at: now,
            content: Some(content),
            helpful: None,
        };
        self.active = Some(item.active_ref());
        self.history.push(item);
        sort_items(&mut self.history);

        if self.pending.is_empty() && self.phase == SessionPhase::Polling {
            self.phase = SessionPhase::Idle;
        }
        PollDisposition::Resolved { success }
    }

    /// Abandons every in-flight request and returns their ids for
    /// best-effort backend cancellation. Local state clears immediately;
    /// quota stays as already consumed.
    pub fn cancel_all(&mut self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.pending.keys().copied().collect();
        if let Some(request) = self.reflecting.take() {
            ids.push(request.request_id);
        }
        self.pending.clear();
        if self.phase == SessionPhase::Reflecting || self.phase == SessionPhase::Polling {
            self.phase = SessionPhase::Idle;
        }
        ids
    }

    /// A one-line progress description while a request is in flight.
    #[must_use]
    pub fn status_line(&self) -> Option<String> {
        let hint_type = self
            .reflecting
            .as_ref()
            .or_else(|| self.pending.values().next_back())
            .map(|r| r.hint_type)?;
        Some(format!("Requesting for {}", hint_type.label()))
    }

    // ------------------------------------------------------------------------
    // Rating and escalation
    // ------------------------------------------------------------------------

    /// Rates the active item.
    ///
    /// Helpful, or any rating of an instructor item, dismisses it.
    /// Unhelpful on an AI hint keeps it in focus and opens the escalation
    /// flow.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` when nothing is awaiting a rating.
    pub fn rate_active(&mut self, helpful: bool) -> Result<RatingOutcome> {
        let active = self
            .active
            .ok_or_else(|| HintError::invalid_transition(self.phase, "rated"))?;
        let item = self
            .history
            .iter_mut()
            .find(|item| item.kind == active.kind && item.id == active.id)
            .ok_or_else(|| HintError::invalid_transition(self.phase, "rated"))?;

        item.helpful = Some(helpful);

        if !helpful && active.kind == HistoryKind::Ai {
            let ai_request_id = item.ordering_key();
            return Ok(RatingOutcome::OfferEscalation { ai_request_id });
        }

        self.active = next_active(&self.history);
        Ok(RatingOutcome::Dismissed)
    }

    /// The escalation was delivered to an instructor: the active item is
    /// dismissed.
    pub fn escalation_sent(&mut self) {
        self.active = next_active(&self.history);
    }

    /// Closes the escalation offer without sending. The unhelpful rating
    /// stands and the item is dismissed.
    pub fn dismiss_active(&mut self) {
        self.active = next_active(&self.history);
    }

    // ------------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------------

    /// Replaces the history cache with server truth and recomputes the
    /// active item.
    pub fn load_history(&mut self, mut items: Vec<HistoryItem>) {
        sort_items(&mut items);
        self.history = items;
        self.active = next_active(&self.history);
    }
}

// ============================================================================
// Tests
// ============================================================================
