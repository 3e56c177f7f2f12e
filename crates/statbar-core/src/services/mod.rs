//! Monitoring services
//!
//! - `monitor` - the polling orchestrator that owns all mutable state
//! - `oauth` / `sessions` - the two usage sources
//! - `source` / `credentials` - the traits at the external seams
//! - `burn_rate` / `forecast` / `analytics` - pure derived-metric engines

pub mod analytics;
pub mod burn_rate;
pub mod credentials;
pub mod forecast;
pub mod monitor;
pub mod oauth;
pub mod sessions;
pub mod source;

pub use analytics::{summaries, Granularity, PeriodSummary};
pub use burn_rate::{burn_rate, time_to_threshold, BurnLevel};
pub use credentials::{CredentialStore, Credentials, FileCredentialStore, MemoryCredentialStore};
pub use forecast::{
    daily_spend_rate, forecast, pace, predicted_monthly_spend, time_to_limit, ForecastResult, Pace,
};
pub use monitor::{MonitorEvent, UsageMonitor, MAX_RETRY_ATTEMPTS};
pub use oauth::{fetch_combined_usage, CombinedUsage, OAuthConfig, OAuthUsageSource};
pub use sessions::{AggregateUsage, SessionLogAggregator, SessionLogSource};
pub use source::UsageSource;
