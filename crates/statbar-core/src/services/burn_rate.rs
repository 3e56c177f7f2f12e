//! Burn-rate calculation
//!
//! Pure projections over the percentage history: how fast utilization is
//! moving and how long until it crosses a threshold. Called on demand by
//! consumers, never by the monitor itself.

use serde::Serialize;

use crate::models::HistoryPoint;

/// |rate| below this is considered normal, in percent per hour
const NORMAL_RATE_CEILING: f64 = 5.0;

/// |rate| below this is considered elevated, in percent per hour
const ELEVATED_RATE_CEILING: f64 = 15.0;

/// Coarse classification of the current burn rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BurnLevel {
    Normal,
    Elevated,
    Critical,
    /// Not enough history to compute a rate
    Unknown,
}

impl BurnLevel {
    /// Classify a rate by magnitude; `None` maps to `Unknown`
    pub fn from_rate(rate_per_hour: Option<f64>) -> Self {
        match rate_per_hour {
            None => BurnLevel::Unknown,
            Some(rate) => {
                let magnitude = rate.abs();
                if magnitude < NORMAL_RATE_CEILING {
                    BurnLevel::Normal
                } else if magnitude < ELEVATED_RATE_CEILING {
                    BurnLevel::Elevated
                } else {
                    BurnLevel::Critical
                }
            }
        }
    }
}

/// Utilization change rate in percent per hour over the supplied window.
///
/// Uses the oldest and newest point; returns `None` for fewer than two
/// points or a zero time span. Negative rates are valid - utilization falls
/// when a window rolls over.
pub fn burn_rate(history: &[HistoryPoint]) -> Option<f64> {
    if history.len() < 2 {
        return None;
    }

    let oldest = history.first()?;
    let newest = history.last()?;

    let span = newest.timestamp - oldest.timestamp;
    let hours = span.num_milliseconds() as f64 / 3_600_000.0;
    if hours <= 0.0 {
        return None;
    }

    Some((newest.percent - oldest.percent) / hours)
}

/// Hours until `current` reaches `threshold` at the given rate.
///
/// `None` when the rate is zero or negative (the threshold is never
/// reached); `Some(0.0)` when already at or past the threshold.
pub fn time_to_threshold(current: f64, rate_per_hour: f64, threshold: f64) -> Option<f64> {
    if current >= threshold {
        return Some(0.0);
    }
    if rate_per_hour <= 0.0 {
        return None;
    }
    Some((threshold - current) / rate_per_hour)
}

// ============================================================================
// Tests
// ============================================================================
