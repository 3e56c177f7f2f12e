//! # statbar-core
//!
//! Core monitoring logic for Statbar - shared between the tray indicator and
//! any other consumer.
//!
//! This crate provides:
//! - Usage acquisition with source fallback (`services::monitor`)
//! - The OAuth usage client and session-log aggregator (`services::oauth`,
//!   `services::sessions`)
//! - Pure derived metrics: burn rate, forecasting, periodic analytics
//! - Data models (`models` module)
//! - Unified error handling (`error` module)

pub mod error;
pub mod models;
pub mod services;
pub mod utils;

// Re-exports for convenience
pub use error::{MonitorError, SourceError};

// Re-export commonly used types from models
pub use models::{
    HistoryPoint, MonitorSettings, SnapshotSource, SourceKind, SourceState, UsageSnapshot,
    NO_PERCENTAGE, REFRESH_INTERVAL_PRESETS,
};

// Re-export commonly used types from services
pub use services::{
    burn_rate, daily_spend_rate, fetch_combined_usage, forecast, pace, predicted_monthly_spend,
    summaries, time_to_limit, time_to_threshold, AggregateUsage, BurnLevel, CombinedUsage,
    CredentialStore, Credentials, FileCredentialStore, ForecastResult, Granularity,
    MemoryCredentialStore, MonitorEvent, OAuthConfig, OAuthUsageSource, Pace, PeriodSummary,
    SessionLogAggregator, SessionLogSource, UsageMonitor, UsageSource, MAX_RETRY_ATTEMPTS,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the library version
pub fn version() -> &'static str {
    VERSION
}
