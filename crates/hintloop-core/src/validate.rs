//! Local input validation.
//!
//! Checks performed before anything touches the network, so the user gets
//! immediate feedback and no quota or request is wasted.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{HintError, Result};

/// Pattern: something, an `@`, something, a dot, something, with no
/// whitespace anywhere. Deliberately loose; the backend does its own check.
const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // The pattern is a literal; compilation cannot fail.
    RE.get_or_init(|| {
        #[allow(clippy::unwrap_used)]
        Regex::new(EMAIL_PATTERN).unwrap()
    })
}

/// Returns `true` if the address looks like an email.
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email)
}

/// Validates an email address, rejecting malformed input before any
/// request is issued.
///
/// # Errors
///
/// Returns `HintError::InvalidEmail` when the address is not well-formed.
pub fn validate_email(email: &str) -> Result<()> {
    if is_valid_email(email) {
        Ok(())
    } else {
        Err(HintError::invalid_email(email))
    }
}

/// Validates instructor feedback text.
///
/// # Errors
///
/// Returns `HintError::EmptyFeedback` when the text is blank.
pub fn validate_feedback(feedback: &str) -> Result<()> {
    if feedback.trim().is_empty() {
        Err(HintError::EmptyFeedback)
    } else {
        Ok(())
    }
}
