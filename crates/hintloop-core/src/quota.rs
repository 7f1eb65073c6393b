//! Hint quota accounting.
//!
//! The backend enforces the real limits; this module mirrors them locally so
//! the UI can show remaining counts and refuse doomed requests without a
//! round trip. A limit of `None` means unlimited. Local counts are
//! approximations only; a fresh `quota_left` fetch is authoritative and
//! simply replaces the snapshot.

use serde::{Deserialize, Serialize};

use crate::types::HintType;

// ============================================================================
// Buckets
// ============================================================================

/// One count per hint-type pool plus the overall pool, where `None` means
/// the pool is unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaBuckets {
    /// Count across all hint types.
    pub overall: Option<u32>,
    /// Count for planning hints.
    pub plan: Option<u32>,
    /// Count for debugging hints.
    pub debug: Option<u32>,
    /// Count for optimization hints.
    pub optimize: Option<u32>,
}

impl QuotaBuckets {
    /// Every pool unlimited.
    pub const UNLIMITED: Self = Self {
        overall: None,
        plan: None,
        debug: None,
        optimize: None,
    };

    /// The pool for the given hint type.
    #[must_use]
    pub const fn get(&self, hint_type: HintType) -> Option<u32> {
        match hint_type {
            HintType::Plan => self.plan,
            HintType::Debug => self.debug,
            HintType::Optimize => self.optimize,
        }
    }

    fn pool_mut(&mut self, hint_type: HintType) -> &mut Option<u32> {
        match hint_type {
            HintType::Plan => &mut self.plan,
            HintType::Debug => &mut self.debug,
            HintType::Optimize => &mut self.optimize,
        }
    }

    fn dec(pool: &mut Option<u32>) {
        if let Some(n) = pool {
            *n = n.saturating_sub(1);
        }
    }

    fn inc(pool: &mut Option<u32>) {
        if let Some(n) = pool {
            *n = n.saturating_add(1);
        }
    }
}

/// Requests already spent, per pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaUsed {
    /// Total requests spent.
    pub overall: u32,
    /// Planning hints spent.
    pub plan: u32,
    /// Debugging hints spent.
    pub debug: u32,
    /// Optimization hints spent.
    pub optimize: u32,
}

impl QuotaUsed {
    fn counter_mut(&mut self, hint_type: HintType) -> &mut u32 {
        match hint_type {
            HintType::Plan => &mut self.plan,
            HintType::Debug => &mut self.debug,
            HintType::Optimize => &mut self.optimize,
        }
    }
}

// ============================================================================
// QuotaInfo
// ============================================================================

/// Hint allowance snapshot for one student on one problem.
///
/// Both the overall pool and the per-type pool must have headroom for a
/// request of that type to proceed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaInfo {
    /// The student this snapshot belongs to.
    #[serde(default)]
    pub student_id: String,
    /// The problem this snapshot belongs to.
    #[serde(default)]
    pub problem_id: String,
    /// Configured limits, `None` = unlimited.
    #[serde(default)]
    pub limits: QuotaBuckets,
    /// Requests already spent.
    #[serde(default)]
    pub used: QuotaUsed,
    /// Requests still available, `None` = unlimited.
    #[serde(default = "unlimited")]
    pub left: QuotaBuckets,
}

const fn unlimited() -> QuotaBuckets {
    QuotaBuckets::UNLIMITED
}

impl QuotaInfo {
    /// A snapshot with every pool unlimited.
    #[must_use]
    pub fn unlimited(student_id: impl Into<String>, problem_id: impl Into<String>) -> Self {
        Self {
            student_id: student_id.into(),
            problem_id: problem_id.into(),
            limits: QuotaBuckets::UNLIMITED,
            used: QuotaUsed::default(),
            left: QuotaBuckets::UNLIMITED,
        }
    }

    /// Remaining requests of the given type, bounded by the overall pool.
    /// `None` means unlimited.
    #[must_use]
    pub const fn remaining(&self, hint_type: HintType) -> Option<u32> {
        match (self.left.get(hint_type), self.left.overall) {
            (None, None) => None,
            (Some(n), None) | (None, Some(n)) => Some(n),
            (Some(a), Some(b)) => Some(if a < b { a } else { b }),
        }
    }

    /// Returns `true` when a request of the given type would be accepted,
    /// as far as local accounting knows.
    #[must_use]
    pub const fn has_remaining(&self, hint_type: HintType) -> bool {
        match self.remaining(hint_type) {
            None => true,
            Some(n) => n > 0,
        }
    }

    /// Optimistic local decrement of the type pool and the overall pool,
    /// saturating at zero. Unlimited pools are untouched; `used` always
    /// advances.
    pub fn consume(&mut self, hint_type: HintType) {
        QuotaBuckets::dec(&mut self.left.overall);
        QuotaBuckets::dec(self.left.pool_mut(hint_type));
        self.used.overall = self.used.overall.saturating_add(1);
        let counter = self.used.counter_mut(hint_type);
        *counter = counter.saturating_add(1);
    }

    /// Restores one request to the pools after a dispatched request fails.
    /// Cancellation does not refund.
    pub fn refund(&mut self, hint_type: HintType) {
        QuotaBuckets::inc(&mut self.left.overall);
        QuotaBuckets::inc(self.left.pool_mut(hint_type));
        self.used.overall = self.used.overall.saturating_sub(1);
        let counter = self.used.counter_mut(hint_type);
        *counter = counter.saturating_sub(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn quota(overall: Option<u32>, plan: Option<u32>) -> QuotaInfo {
        QuotaInfo {
            student_id: "s1".to_string(),
            problem_id: "two_sum".to_string(),
            limits: QuotaBuckets {
                overall: Some(10),
                plan: Some(5),
                debug: Some(5),
                optimize: None,
            },
            used: QuotaUsed::default(),
            left: QuotaBuckets {
                overall,
                plan,
                debug: Some(2),
                optimize: None,
            },
        }
    }

    #[test]
    fn test_remaining_is_min_of_pools() {
        let q = quota(Some(1), Some(5));
        assert_eq!(q.remaining(HintType::Plan), Some(1));
        assert_eq!(q.remaining(HintType::Debug), Some(1));

        let q = quota(Some(10), Some(3));
        assert_eq!(q.remaining(HintType::Plan), Some(3));
    }

    #[test]
    fn test_unlimited_pools() {
        let q = QuotaInfo::unlimited("s1", "two_sum");
        assert_eq!(q.remaining(HintType::Optimize), None);
        assert!(q.has_remaining(HintType::Optimize));

        // Per-type limit still binds when overall is unlimited.
        let q = quota(None, Some(0));
        assert_eq!(q.remaining(HintType::Plan), Some(0));
        assert!(!q.has_remaining(HintType::Plan));
        assert!(q.has_remaining(HintType::Optimize));
    }

    #[test]
    fn test_consume_saturates_at_zero() {
        let mut q = quota(Some(1), Some(1));
        q.consume(HintType::Plan);
        assert_eq!(q.left.overall, Some(0));
        assert_eq!(q.left.plan, Some(0));
        assert_eq!(q.used.plan, 1);

        q.consume(HintType::Plan);
        assert_eq!(q.left.overall, Some(0));
        assert_eq!(q.left.plan, Some(0));
        assert_eq!(q.used.plan, 2);
    }

    #[test]
    fn test_consume_leaves_other_pools() {
        let mut q = quota(Some(5), Some(5));
        q.consume(HintType::Debug);
        assert_eq!(q.left.plan, Some(5));
        assert_eq!(q.left.debug, Some(1));
        assert_eq!(q.left.overall, Some(4));
        assert_eq!(q.left.optimize, None);
        assert_eq!(q.used.debug, 1);
        assert_eq!(q.used.overall, 1);
    }

    #[test]
    fn test_refund_restores_pools() {
        let mut q = quota(Some(5), Some(5));
        let before = q.clone();
        q.consume(HintType::Plan);
        q.refund(HintType::Plan);
        assert_eq!(q, before);

        // Unlimited pools stay unlimited through a refund.
        let mut q = QuotaInfo::unlimited("s1", "two_sum");
        q.refund(HintType::Debug);
        assert_eq!(q.left, QuotaBuckets::UNLIMITED);
    }

    #[test]
    fn test_wire_format_matches_backend() {
        let q = quota(Some(3), None);
        let json = serde_json::to_value(&q).unwrap();
        assert_eq!(json["student_id"], "s1");
        assert_eq!(json["left"]["overall"], 3);
        assert_eq!(json["left"]["plan"], serde_json::Value::Null);
        assert_eq!(json["left"]["debug"], 2);
    }

    #[test]
    fn test_deserialize_partial_snapshot() {
        // A backend that only reports `left` still parses.
        let q: QuotaInfo = serde_json::from_str(
            r#"{"student_id":"s1","problem_id":"two_sum","left":{"overall":4}}"#,
        )
        .unwrap();
        assert_eq!(q.remaining(HintType::Plan), Some(4));
        assert_eq!(q.used.overall, 0);
    }
}
