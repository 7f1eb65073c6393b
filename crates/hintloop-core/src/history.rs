//! History reconciliation.
//!
//! AI hints and instructor feedback arrive from two separate endpoints with
//! independent id sequences. This module merges them into one timeline,
//! orders it deterministically, and selects the single item the student
//! still owes a rating on.

use chrono::{DateTime, Utc};

use crate::types::{ActiveRef, AiHintRecord, FeedbackRecord, HistoryItem};

/// Converts both record kinds into the unified view and sorts the result.
///
/// `now` stamps records the backend returned without a timestamp.
#[must_use]
pub fn merge(
    ai: Vec<AiHintRecord>,
    feedback: Vec<FeedbackRecord>,
    now: DateTime<Utc>,
) -> Vec<HistoryItem> {
    let mut items: Vec<HistoryItem> = ai
        .into_iter()
        .map(|r| r.into_history_item(now))
        .chain(feedback.into_iter().map(|r| r.into_history_item(now)))
        .collect();
    sort_items(&mut items);
    items
}

/// Orders items by `(ordering_key, kind)`: feedback sorts next to the hint
/// it escalated, with the hint first. Stable and idempotent.
pub fn sort_items(items: &mut [HistoryItem]) {
    items.sort_by_key(|item| (item.ordering_key(), item.kind.rank()));
}

/// The earliest-created unrated item, or `None` when everything is rated.
///
/// Deterministic: re-running on unchanged input yields the same answer.
#[must_use]
pub fn next_active(items: &[HistoryItem]) -> Option<ActiveRef> {
    items
        .iter()
        .filter(|item| !item.is_rated())
        .min_by_key(|item| (item.created_at, item.ordering_key(), item.kind.rank()))
        .map(HistoryItem::active_ref)
}
