//! Usage history
//!
//! Percentage readings accumulate into a bounded trailing window that feeds
//! the burn-rate calculator and the analytics summarizer. Points are appended
//! only for snapshots that carry a percentage; token-count-only readings are
//! not percentage-comparable and never enter history.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::snapshot::SnapshotSource;

/// How far back history points are retained
pub const HISTORY_RETENTION_HOURS: i64 = 24;

/// One percentage reading in the usage history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    /// When the reading was captured
    pub timestamp: DateTime<Utc>,
    /// Primary utilization percentage (always >= 0 in history)
    pub percent: f64,
    /// Secondary 7-day utilization, when the source reported one
    pub seven_day_percent: Option<f64>,
    /// Which source produced the reading
    pub source: SnapshotSource,
}

impl HistoryPoint {
    pub fn new(timestamp: DateTime<Utc>, percent: f64, source: SnapshotSource) -> Self {
        Self {
            timestamp,
            percent,
            seven_day_percent: None,
            source,
        }
    }

    pub fn with_seven_day(mut self, percent: f64) -> Self {
        self.seven_day_percent = Some(percent);
        self
    }
}

/// Drop points older than the retention window, preserving order.
///
/// Called on every append; `now` is passed in so the cutoff is stable within
/// a cycle and tests stay deterministic.
pub fn prune_history(history: &mut Vec<HistoryPoint>, now: DateTime<Utc>) {
    let cutoff = now - Duration::hours(HISTORY_RETENTION_HOURS);
    history.retain(|point| point.timestamp >= cutoff);
}

// ============================================================================
// Tests
// ============================================================================
