//! OAuth usage source
//!
//! Fetches utilization data from the remote usage API with the account's
//! OAuth access token.
//!
//! # Token Refresh
//!
//! The usage call is made at most twice per fetch. On an auth-rejection
//! (HTTP 401/403) the client performs exactly one token-refresh call with the
//! stored refresh token, persists the rotated credential through the
//! [`CredentialStore`], and retries the usage call once. A second rejection
//! surfaces as [`SourceError::TokenExpired`] (refresh failed or the retried
//! call was rejected again) or [`SourceError::InsufficientScope`] (the server
//! reports a missing grant) - never as a generic error, so the monitor knows
//! not to burn its retry budget on it.
//!
//! Network failures and 5xx responses stay generic and are subject to the
//! monitor's retry counter. There is no retry policy below a single HTTP
//! call: TLS/DNS failures are opaque "fetch failed" outcomes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;

use super::credentials::{CredentialStore, Credentials};
use super::source::UsageSource;
use crate::error::SourceError;
use crate::models::{SnapshotSource, SourceKind, UsageSnapshot, NO_PERCENTAGE};

// ============================================================================
// Constants
// ============================================================================

/// Default usage API endpoint
const DEFAULT_USAGE_URL: &str = "https://api.statbar.dev/v1/oauth/usage";

/// Default token refresh endpoint
const DEFAULT_REFRESH_URL: &str = "https://api.statbar.dev/v1/oauth/token";

/// OAuth client id sent with refresh requests
const DEFAULT_CLIENT_ID: &str = "statbar-desktop";

/// Service name used to key the credential store
const DEFAULT_SERVICE: &str = "statbar";

/// HTTP request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Configuration
// ============================================================================

/// Endpoint configuration for the OAuth usage client
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// Usage endpoint (POST, bearer auth)
    pub usage_url: String,
    /// Token refresh endpoint (POST, refresh token + client id)
    pub refresh_url: String,
    /// OAuth client id
    pub client_id: String,
    /// Credential-store service name
    pub service: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            usage_url: DEFAULT_USAGE_URL.to_string(),
            refresh_url: DEFAULT_REFRESH_URL.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            service: DEFAULT_SERVICE.to_string(),
        }
    }
}

// ============================================================================
// Wire Types
// ============================================================================

/// Response from the usage endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct UsageResponse {
    /// 5-hour rolling window
    pub five_hour: Option<UsageWindow>,
    /// 7-day rolling window (all models)
    pub seven_day: Option<UsageWindow>,
    /// 7-day window for the dominant model
    pub seven_day_model: Option<UsageWindow>,
    /// Name of the dominant model
    pub model: Option<String>,
    /// Monthly billing block, present on metered plans
    pub billing: Option<BillingBlock>,
}

/// A single usage window from the API
#[derive(Debug, Clone, Deserialize)]
pub struct UsageWindow {
    /// Utilization as a percentage (0.0 - 100.0)
    pub utilization: Option<f64>,
    /// When this window resets (RFC3339)
    pub resets_at: Option<String>,
}

/// Monthly billing information
#[derive(Debug, Clone, Deserialize)]
pub struct BillingBlock {
    /// Spend so far this month
    pub spent: Option<f64>,
    /// Monthly limit
    pub monthly_limit: Option<f64>,
}

/// Error body returned alongside 4xx responses
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
}

/// Request body for the refresh endpoint
#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    grant_type: &'static str,
    refresh_token: &'a str,
    client_id: &'a str,
}

/// Response from the refresh endpoint
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    refresh_token: Option<String>,
    /// Lifetime of the new access token in seconds
    expires_in: Option<i64>,
}

// ============================================================================
// OAuth Usage Source
// ============================================================================

/// Usage source backed by the remote OAuth usage API
pub struct OAuthUsageSource {
    config: OAuthConfig,
    client: Client,
    store: Arc<dyn CredentialStore>,
}

impl OAuthUsageSource {
    /// Create a source with default endpoints
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self::with_config(store, OAuthConfig::default())
    }

    /// Create a source with custom endpoints (tests, staging)
    pub fn with_config(store: Arc<dyn CredentialStore>, config: OAuthConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        Self {
            config,
            client,
            store,
        }
    }

    /// One usage fetch with the single-refresh recovery path.
    ///
    /// Call sequence: usage -> (on 401/403) refresh -> persist -> usage.
    pub async fn fetch_usage_with_refresh(&self) -> Result<UsageSnapshot, SourceError> {
        let credentials = self
            .store
            .read(&self.config.service)
            .await?
            .ok_or_else(|| {
                SourceError::NotConfigured("no stored credentials for usage API".to_string())
            })?;

        match self.call_usage_api(&credentials.access_token).await {
            Ok(response) => Ok(response_to_snapshot(response)),
            Err(AuthRejection::Other(err)) => Err(err),
            Err(AuthRejection::Rejected { scope_missing }) => {
                if scope_missing {
                    return Err(SourceError::InsufficientScope);
                }
                log::info!("[oauth] usage call rejected, attempting token refresh");
                let refreshed = self.refresh_credentials(&credentials).await?;
                self.store.write(&self.config.service, &refreshed).await?;

                match self.call_usage_api(&refreshed.access_token).await {
                    Ok(response) => Ok(response_to_snapshot(response)),
                    Err(AuthRejection::Rejected { scope_missing }) => {
                        if scope_missing {
                            Err(SourceError::InsufficientScope)
                        } else {
                            Err(SourceError::TokenExpired)
                        }
                    }
                    Err(AuthRejection::Other(err)) => Err(err),
                }
            }
        }
    }

    /// Call the usage endpoint once
    async fn call_usage_api(&self, token: &str) -> Result<UsageResponse, AuthRejection> {
        log::debug!("[oauth] fetching usage from {}", self.config.usage_url);

        let response = self
            .client
            .post(&self.config.usage_url)
            .header("Authorization", format!("Bearer {}", token))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| AuthRejection::Other(e.into()))?;

        let status = response.status();
        log::debug!("[oauth] usage API response status: {}", status);

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            let scope_missing = body_reports_missing_scope(&body);
            log::warn!(
                "[oauth] usage call rejected: HTTP {} (scope_missing={})",
                status,
                scope_missing
            );
            return Err(AuthRejection::Rejected { scope_missing });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::warn!("[oauth] usage API error: HTTP {} - {}", status, body);
            return Err(AuthRejection::Other(SourceError::Api(format!(
                "HTTP {}: {}",
                status, body
            ))));
        }

        let parsed: UsageResponse = response
            .json()
            .await
            .map_err(|e| AuthRejection::Other(SourceError::Parse(e.to_string())))?;
        Ok(parsed)
    }

    /// Exchange the refresh token for new credentials
    async fn refresh_credentials(
        &self,
        current: &Credentials,
    ) -> Result<Credentials, SourceError> {
        let request = RefreshRequest {
            grant_type: "refresh_token",
            refresh_token: &current.refresh_token,
            client_id: &self.config.client_id,
        };

        let response = self
            .client
            .post(&self.config.refresh_url)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            log::warn!("[oauth] token refresh failed: HTTP {}", status);
            // A rejected refresh means the refresh token itself is spent.
            return Err(SourceError::TokenExpired);
        }

        let refreshed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(e.to_string()))?;

        let expires_at = refreshed
            .expires_in
            .map(|secs| Utc::now().timestamp_millis() + secs * 1000);

        Ok(Credentials {
            access_token: refreshed.access_token,
            // The server may rotate the refresh token; keep the old one otherwise
            refresh_token: refreshed
                .refresh_token
                .unwrap_or_else(|| current.refresh_token.clone()),
            expires_at,
        })
    }
}

#[async_trait]
impl UsageSource for OAuthUsageSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Oauth
    }

    fn display_name(&self) -> &'static str {
        "Usage API"
    }

    fn is_configured(&self) -> bool {
        // Configuration is credential presence; checked for real at fetch time.
        !self.config.usage_url.is_empty()
    }

    async fn fetch(&self) -> Result<UsageSnapshot, SourceError> {
        self.fetch_usage_with_refresh().await
    }
}

/// Internal triage of a usage call: auth-rejected vs everything else
enum AuthRejection {
    Rejected { scope_missing: bool },
    Other(SourceError),
}

/// Whether a 401/403 error body names a missing grant
fn body_reports_missing_scope(body: &str) -> bool {
    if let Ok(parsed) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(error) = parsed.error {
            return error.contains("insufficient_scope") || error.contains("missing_scope");
        }
    }
    body.contains("insufficient_scope")
}

/// Convert an API response into the canonical snapshot shape
fn response_to_snapshot(response: UsageResponse) -> UsageSnapshot {
    let five_hour = response.five_hour.as_ref();
    let primary = five_hour
        .and_then(|w| w.utilization)
        .unwrap_or(NO_PERCENTAGE);

    let mut snapshot = UsageSnapshot::new(SnapshotSource::Oauth, primary);
    snapshot.five_hour_percent = five_hour.and_then(|w| w.utilization);
    snapshot.five_hour_resets_at = five_hour.and_then(|w| parse_reset(w.resets_at.as_deref()));
    snapshot.seven_day_percent = response.seven_day.as_ref().and_then(|w| w.utilization);
    snapshot.seven_day_resets_at = response
        .seven_day
        .as_ref()
        .and_then(|w| parse_reset(w.resets_at.as_deref()));
    snapshot.model_percent = response.seven_day_model.as_ref().and_then(|w| w.utilization);

    if let Some(model) = response.model {
        snapshot = snapshot.with_model(model);
    }

    if let Some(billing) = response.billing {
        if let (Some(spent), Some(limit)) = (billing.spent, billing.monthly_limit) {
            snapshot = snapshot.with_billing(spent, limit);
        }
    }

    snapshot
}

fn parse_reset(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    match DateTime::parse_from_rfc3339(raw) {
        Ok(parsed) => Some(parsed.with_timezone(&Utc)),
        Err(_) => {
            log::warn!("[oauth] failed to parse resets_at: {}", raw);
            None
        }
    }
}

// ============================================================================
// Combined Usage Across Accounts
// ============================================================================

/// Aggregate of concurrent per-account fetches
#[derive(Debug, Default)]
pub struct CombinedUsage {
    /// Successful per-account snapshots, keyed by account label
    pub accounts: Vec<(String, UsageSnapshot)>,
    /// Number of accounts whose fetch failed and was omitted
    pub failed_accounts: usize,
}

impl CombinedUsage {
    /// Highest primary percentage across all successful accounts
    pub fn peak_percent(&self) -> Option<f64> {
        self.accounts
            .iter()
            .filter(|(_, s)| s.has_percentage())
            .map(|(_, s)| s.primary_percent)
            .max_by(|a, b| a.total_cmp(b))
    }
}

/// Fetch usage for several accounts concurrently.
///
/// One fetch per account, joined; a failed account is logged and omitted from
/// the aggregate rather than failing the whole operation.
pub async fn fetch_combined_usage(sources: Vec<(String, Arc<dyn UsageSource>)>) -> CombinedUsage {
    let mut tasks = JoinSet::new();
    for (label, source) in sources {
        tasks.spawn(async move {
            let result = source.fetch().await;
            (label, result)
        });
    }

    let mut combined = CombinedUsage::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((label, Ok(snapshot))) => combined.accounts.push((label, snapshot)),
            Ok((label, Err(err))) => {
                log::warn!("[oauth] account '{}' omitted from combined usage: {}", label, err);
                combined.failed_accounts += 1;
            }
            Err(join_err) => {
                log::warn!("[oauth] combined usage task failed: {}", join_err);
                combined.failed_accounts += 1;
            }
        }
    }

    combined.accounts.sort_by(|a, b| a.0.cmp(&b.0));
    combined
}

// ============================================================================
// Tests
// ============================================================================
