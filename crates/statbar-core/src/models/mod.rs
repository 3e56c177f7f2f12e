//! Data models shared across the monitoring services

pub mod history;
pub mod settings;
pub mod snapshot;

pub use history::{prune_history, HistoryPoint, HISTORY_RETENTION_HOURS};
pub use settings::{
    MonitorSettings, DEFAULT_ALERT_THRESHOLD, DEFAULT_REFRESH_INTERVAL_SECS,
    REFRESH_INTERVAL_PRESETS,
};
pub use snapshot::{SnapshotSource, SourceKind, SourceState, UsageSnapshot, NO_PERCENTAGE};
