//! Usage snapshot types
//!
//! A [`UsageSnapshot`] is one fused reading of the monitored resource,
//! canonical for a polling cycle. It is immutable and replaced wholesale
//! every cycle; consumers only ever hold copies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel primary percentage meaning "no percentage available".
///
/// Session-log readings carry token counts but no utilization percentage;
/// they use this value. `has_percentage() ⇔ primary_percent >= 0`.
pub const NO_PERCENTAGE: f64 = -1.0;

// ============================================================================
// Source Tagging
// ============================================================================

/// Which source produced a snapshot (or history point)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSource {
    /// Remote OAuth usage API
    Oauth,
    /// Local session-log aggregation
    SessionLogs,
    /// No source succeeded this cycle
    None,
}

impl std::fmt::Display for SnapshotSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotSource::Oauth => write!(f, "oauth"),
            SnapshotSource::SessionLogs => write!(f, "session_logs"),
            SnapshotSource::None => write!(f, "none"),
        }
    }
}

/// Identifies one of the two configured sources when querying per-source state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Oauth,
    SessionLogs,
}

// ============================================================================
// Per-Source State
// ============================================================================

/// Health of a single source, written only by the monitor after each attempt
///
/// Persists across cycles until the next attempt overwrites it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "detail")]
pub enum SourceState {
    /// Last attempt succeeded
    Available,
    /// Last attempt failed with the given message
    Failed(String),
    /// Source is disabled in settings; no attempts are made
    Disabled,
    /// Source has never been configured (no credentials / no root path)
    NotConfigured,
}

// ============================================================================
// Snapshot
// ============================================================================

/// One fused usage reading, canonical for a polling cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    /// Primary utilization percentage (0-100), or [`NO_PERCENTAGE`]
    pub primary_percent: f64,
    /// 5-hour rolling window utilization
    pub five_hour_percent: Option<f64>,
    /// 7-day rolling window utilization (all models)
    pub seven_day_percent: Option<f64>,
    /// 7-day utilization for the dominant model specifically
    pub model_percent: Option<f64>,
    /// When the 5-hour window resets
    pub five_hour_resets_at: Option<DateTime<Utc>>,
    /// When the 7-day window resets
    pub seven_day_resets_at: Option<DateTime<Utc>>,
    /// Which source produced this reading
    pub source: SnapshotSource,
    /// Input tokens consumed (session-log readings only)
    pub input_tokens: Option<i64>,
    /// Output tokens produced
    pub output_tokens: Option<i64>,
    /// Cache-creation tokens
    pub cache_creation_tokens: Option<i64>,
    /// Cache-read tokens
    pub cache_read_tokens: Option<i64>,
    /// Model name, when the source reports one
    pub model: Option<String>,
    /// Monthly billing limit in account currency
    pub monthly_limit: Option<f64>,
    /// Spend so far in the current billing month
    pub monthly_spent: Option<f64>,
    /// Billing utilization percentage (spent / limit)
    pub monthly_percent: Option<f64>,
    /// When this reading was captured
    pub captured_at: DateTime<Utc>,
}

impl UsageSnapshot {
    /// Create a snapshot with a primary percentage from the given source
    pub fn new(source: SnapshotSource, primary_percent: f64) -> Self {
        Self {
            primary_percent,
            five_hour_percent: None,
            seven_day_percent: None,
            model_percent: None,
            five_hour_resets_at: None,
            seven_day_resets_at: None,
            source,
            input_tokens: None,
            output_tokens: None,
            cache_creation_tokens: None,
            cache_read_tokens: None,
            model: None,
            monthly_limit: None,
            monthly_spent: None,
            monthly_percent: None,
            captured_at: Utc::now(),
        }
    }

    /// The empty snapshot produced when no source succeeds
    pub fn empty() -> Self {
        Self::new(SnapshotSource::None, NO_PERCENTAGE)
    }

    /// Whether this reading carries a utilization percentage
    pub fn has_percentage(&self) -> bool {
        self.primary_percent >= 0.0
    }

    /// Sum of all present token fields; absent fields contribute 0
    pub fn total_tokens(&self) -> i64 {
        self.input_tokens.unwrap_or(0)
            + self.output_tokens.unwrap_or(0)
            + self.cache_creation_tokens.unwrap_or(0)
            + self.cache_read_tokens.unwrap_or(0)
    }

    /// Set the model name
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the token-count fields
    pub fn with_tokens(
        mut self,
        input: Option<i64>,
        output: Option<i64>,
        cache_creation: Option<i64>,
        cache_read: Option<i64>,
    ) -> Self {
        self.input_tokens = input;
        self.output_tokens = output;
        self.cache_creation_tokens = cache_creation;
        self.cache_read_tokens = cache_read;
        self
    }

    /// Set the billing fields, deriving the utilization percentage
    pub fn with_billing(mut self, spent: f64, limit: f64) -> Self {
        self.monthly_spent = Some(spent);
        self.monthly_limit = Some(limit);
        if limit > 0.0 {
            self.monthly_percent = Some(spent / limit * 100.0);
        }
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
