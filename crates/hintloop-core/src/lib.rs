//! HintLoop core
//!
//! Environment-agnostic hint lifecycle: domain types, quota accounting,
//! history reconciliation, and the per-(student, problem) session state
//! machine. No I/O lives here; the client, proxy, and CLI crates drive
//! these types.

pub mod config;
pub mod error;
pub mod history;
pub mod quota;
pub mod session;
pub mod types;
pub mod validate;

pub use config::Config;
pub use error::{HintError, Result, QUOTA_EXCEEDED_MESSAGE};
pub use history::{merge, next_active, sort_items};
pub use quota::{QuotaBuckets, QuotaInfo, QuotaUsed};
pub use session::{
    BlockReason, EscalationForm, HintSession, PollDisposition, PollOutcome, RatingOutcome,
    RequestDecision, SessionPhase, EMPTY_HINT_PLACEHOLDER, FETCH_ERROR_PLACEHOLDER,
    GENERATION_FAILED_PLACEHOLDER,
};
pub use types::{
    ActiveRef, AiHintRecord, FeedbackRecord, HintType, HistoryItem, HistoryKind, PendingRequest,
};
pub use validate::{is_valid_email, validate_email, validate_feedback};
