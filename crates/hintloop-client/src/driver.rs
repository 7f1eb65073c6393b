//! Poll driver for in-flight hint requests.
//!
//! Bridges the pure session state machine and the network: queries every
//! pending id, translates responses and transport failures into poll
//! outcomes, and feeds them back into the session.

use chrono::Utc;
use tracing::debug;

use hintloop_core::error::{HintError, Result};
use hintloop_core::session::{HintSession, PollDisposition, PollOutcome};

use crate::client::HintClient;

/// Queries every currently pending request once and applies the results.
///
/// Transport and HTTP failures become `PollOutcome::Error` for that request
/// only; other pending requests are unaffected. Returns the dispositions in
/// pending-id order.
pub async fn poll_pending_once(
    client: &HintClient,
    session: &mut HintSession,
) -> Vec<(u64, PollDisposition)> {
    let mut dispositions = Vec::new();
    for request_id in session.pending_ids() {
        let outcome = match client.query_hint(request_id).await {
            Ok(status) if !status.job_finished => PollOutcome::Pending,
            Ok(status) => PollOutcome::Finished {
                successful: status.successful,
                hint: status.returned_hint,
            },
            Err(e) => PollOutcome::Error {
                message: e.to_string(),
            },
        };
        let disposition = session.apply_poll(request_id, outcome, Utc::now());
        debug!(request_id, ?disposition, "poll tick");
        dispositions.push((request_id, disposition));
    }
    dispositions
}

/// Polls at the configured hint interval until the pending set drains.
///
/// Bounded by `pollTimeoutSecs`; on timeout the remaining requests are
/// abandoned locally and their ids cancelled best-effort on the backend.
/// For cooperative cancellation, race this future against a signal and call
/// [`HintSession::cancel_all`] when the signal wins.
pub async fn drive_to_resolution(client: &HintClient, session: &mut HintSession) -> Result<()> {
    let deadline = tokio::time::Instant::now() + client.poll_timeout();
    loop {
        if session.pending_ids().is_empty() {
            return Ok(());
        }
        poll_pending_once(client, session).await;
        if session.pending_ids().is_empty() {
            return Ok(());
        }

        if tokio::time::Instant::now() >= deadline {
            for request_id in session.cancel_all() {
                client.cancel_request_best_effort(request_id).await;
            }
            return Err(HintError::poll_timeout(
                "hint generation",
                client.poll_timeout().as_secs(),
            ));
        }
        tokio::time::sleep(client.hint_poll_interval()).await;
    }
}
