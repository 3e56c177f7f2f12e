//! Periodic usage analytics
//!
//! Buckets the percentage history into calendar-aligned windows and reports
//! average/peak utilization per window. Summaries are computed on demand and
//! never persisted; empty buckets are omitted rather than zero-filled.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;

use crate::models::HistoryPoint;

/// Calendar granularity for summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// ISO weeks (Monday-aligned)
    Weekly,
    /// Calendar months
    Monthly,
}

/// Aggregated utilization over one calendar bucket
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodSummary {
    /// Bucket label: `2026-W32` for weeks, `2026-08` for months
    pub period: String,
    /// Mean primary percentage over the bucket
    pub average_percent: f64,
    /// Maximum primary percentage over the bucket
    pub peak_percent: f64,
    /// Number of history points in the bucket
    pub point_count: usize,
}

/// Bucket history points into calendar windows ending `now`.
///
/// Points after `now` are ignored (they cannot belong to a window "ending
/// now"). Non-empty buckets are returned most-recent first.
pub fn summaries(
    history: &[HistoryPoint],
    granularity: Granularity,
    now: DateTime<Utc>,
) -> Vec<PeriodSummary> {
    // BTreeMap keyed by (year, ordinal) so iteration is chronological
    let mut buckets: BTreeMap<(i32, u32), Vec<f64>> = BTreeMap::new();

    for point in history {
        if point.timestamp > now {
            continue;
        }
        buckets
            .entry(bucket_key(point.timestamp, granularity))
            .or_default()
            .push(point.percent);
    }

    buckets
        .into_iter()
        .rev()
        .map(|((year, ordinal), percents)| {
            let sum: f64 = percents.iter().sum();
            let peak = percents.iter().cloned().fold(f64::MIN, f64::max);
            PeriodSummary {
                period: bucket_label(year, ordinal, granularity),
                average_percent: sum / percents.len() as f64,
                peak_percent: peak,
                point_count: percents.len(),
            }
        })
        .collect()
}

fn bucket_key(timestamp: DateTime<Utc>, granularity: Granularity) -> (i32, u32) {
    match granularity {
        Granularity::Weekly => {
            let week = timestamp.iso_week();
            (week.year(), week.week())
        }
        Granularity::Monthly => (timestamp.year(), timestamp.month()),
    }
}

fn bucket_label(year: i32, ordinal: u32, granularity: Granularity) -> String {
    match granularity {
        Granularity::Weekly => format!("{}-W{:02}", year, ordinal),
        Granularity::Monthly => format!("{}-{:02}", year, ordinal),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SnapshotSource;
    use chrono::TimeZone;

    fn point(timestamp: &str, percent: f64) -> HistoryPoint {
        HistoryPoint::new(
            DateTime::parse_from_rfc3339(timestamp)
                .unwrap()
                .with_timezone(&Utc),
            percent,
            SnapshotSource::Oauth,
        )
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_empty_history() {
        assert!(summaries(&[], Granularity::Weekly, Utc::now()).is_empty());
        assert!(summaries(&[], Granularity::Monthly, Utc::now()).is_empty());
    }

    #[test]
    fn test_single_week_average_and_peak() {
        // All three points fall in ISO week 2026-W32 (Aug 3-9)
        let history = vec![
            point("2026-08-03T08:00:00Z", 40.0),
            point("2026-08-05T08:00:00Z", 60.0),
            point("2026-08-07T08:00:00Z", 80.0),
        ];

        let result = summaries(&history, Granularity::Weekly, at(2026, 8, 7));
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].period, "2026-W32");
        assert!((result[0].average_percent - 60.0).abs() < 1e-9);
        assert!((result[0].peak_percent - 80.0).abs() < 1e-9);
        assert_eq!(result[0].point_count, 3);
    }

    #[test]
    fn test_multiple_weeks_most_recent_first() {
        let history = vec![
            point("2026-07-20T08:00:00Z", 10.0), // W30
            point("2026-07-28T08:00:00Z", 30.0), // W31
            point("2026-08-04T08:00:00Z", 50.0), // W32
        ];

        let result = summaries(&history, Granularity::Weekly, at(2026, 8, 7));
        assert_eq!(result.len(), 3);
        assert_eq!(result[0].period, "2026-W32");
        assert_eq!(result[1].period, "2026-W31");
        assert_eq!(result[2].period, "2026-W30");
    }

    #[test]
    fn test_empty_buckets_are_omitted() {
        // W30 and W32 have points; W31 does not and must not appear
        let history = vec![
            point("2026-07-20T08:00:00Z", 10.0),
            point("2026-08-04T08:00:00Z", 50.0),
        ];

        let result = summaries(&history, Granularity::Weekly, at(2026, 8, 7));
        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|s| s.period != "2026-W31"));
    }

    #[test]
    fn test_monthly_buckets() {
        let history = vec![
            point("2026-06-15T08:00:00Z", 20.0),
            point("2026-07-01T08:00:00Z", 40.0),
            point("2026-07-31T08:00:00Z", 60.0),
            point("2026-08-02T08:00:00Z", 90.0),
        ];

        let result = summaries(&history, Granularity::Monthly, at(2026, 8, 7));
        assert_eq!(result.len(), 3);
        assert_eq!(result[0].period, "2026-08");
        assert_eq!(result[1].period, "2026-07");
        assert!((result[1].average_percent - 50.0).abs() < 1e-9);
        assert!((result[1].peak_percent - 60.0).abs() < 1e-9);
        assert_eq!(result[2].period, "2026-06");
    }

    #[test]
    fn test_points_after_now_are_ignored() {
        let history = vec![
            point("2026-08-04T08:00:00Z", 50.0),
            point("2026-09-01T08:00:00Z", 99.0),
        ];

        let result = summaries(&history, Granularity::Monthly, at(2026, 8, 7));
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].period, "2026-08");
    }

    #[test]
    fn test_iso_week_year_boundary() {
        // 2025-12-29 belongs to ISO week 2026-W01
        let history = vec![point("2025-12-29T08:00:00Z", 42.0)];
        let result = summaries(&history, Granularity::Weekly, at(2026, 1, 5));
        assert_eq!(result[0].period, "2026-W01");
    }

    #[test]
    fn test_week_label_padding() {
        let history = vec![point("2026-02-03T08:00:00Z", 10.0)];
        let result = summaries(&history, Granularity::Weekly, at(2026, 2, 7));
        // Week 6 renders as W06
        assert_eq!(result[0].period, "2026-W06");
    }
}
