//! Unified error handling for statbar-core
//!
//! Two layers of typed errors:
//!
//! 1. [`SourceError`] - produced at the source-client boundary. Every failure
//!    inside the OAuth client or the session-log aggregator is converted to
//!    one of these variants before it reaches the monitor; nothing propagates
//!    uncaught.
//! 2. [`MonitorError`] - the per-cycle outcome surfaced to consumers. It is
//!    overwritten every cycle and cleared on full success.

use std::path::PathBuf;

use thiserror::Error;

// ============================================================================
// Source-Level Errors
// ============================================================================

/// Errors produced by a single usage source attempt
#[derive(Error, Debug, Clone)]
pub enum SourceError {
    /// OAuth token was rejected and could not be refreshed
    #[error("Token expired")]
    TokenExpired,

    /// The server reports the token lacks the required grant
    #[error("Insufficient scope")]
    InsufficientScope,

    /// Source is not configured (missing credentials, missing root path)
    #[error("Not configured: {0}")]
    NotConfigured(String),

    /// Network request failed (timeout, connect, TLS - all opaque)
    #[error("Network error: {0}")]
    Network(String),

    /// API returned an unexpected status or body
    #[error("API error: {0}")]
    Api(String),

    /// Failed to parse a response or credential payload
    #[error("Parse error: {0}")]
    Parse(String),

    /// Session-log root directory does not exist
    #[error("No projects directory: {}", .0.display())]
    NoProjectsDirectory(PathBuf),

    /// Session-log root exists but contains no session files
    #[error("No session files under {}", .0.display())]
    NoSessionFiles(PathBuf),

    /// I/O error while reading local files
    #[error("IO error: {0}")]
    Io(String),
}

impl SourceError {
    /// Whether this failure requires out-of-band re-authentication.
    ///
    /// Auth-fatal failures never count toward the monitor's silent retry
    /// budget.
    pub fn is_auth_fatal(&self) -> bool {
        matches!(
            self,
            SourceError::TokenExpired | SourceError::InsufficientScope
        )
    }
}

impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        SourceError::Io(err.to_string())
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SourceError::Network("Request timed out".to_string())
        } else if err.is_connect() {
            SourceError::Network("Connection failed".to_string())
        } else if err.is_status() {
            match err.status() {
                Some(status) => SourceError::Api(format!("HTTP {}", status)),
                None => SourceError::Network(err.to_string()),
            }
        } else {
            SourceError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(err.to_string())
    }
}

// ============================================================================
// Cycle-Level Errors
// ============================================================================

/// The latest polling cycle's failure, surfaced to consumers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    /// The remote usage API failed for a transient reason (auto-retried)
    #[error("Usage API failed: {0}")]
    OauthFailed(String),

    /// The local session-log aggregation failed (never auto-retried)
    #[error("Session log aggregation failed: {0}")]
    JsonlFailed(String),

    /// Both sources failed in the same cycle
    #[error("All usage sources failed: {0}")]
    BothSourcesFailed(String),

    /// OAuth token expired and the single refresh attempt did not recover it
    #[error("Token expired - re-authentication required")]
    TokenExpired,

    /// The OAuth token is valid but lacks the usage grant
    #[error("Token lacks the usage scope - re-authentication required")]
    InsufficientScope,
}

impl MonitorError {
    /// Map an OAuth-source failure into the cycle-level taxonomy
    pub fn from_oauth(err: &SourceError) -> Self {
        match err {
            SourceError::TokenExpired => MonitorError::TokenExpired,
            SourceError::InsufficientScope => MonitorError::InsufficientScope,
            other => MonitorError::OauthFailed(other.to_string()),
        }
    }

    /// Map a session-log failure into the cycle-level taxonomy
    pub fn from_jsonl(err: &SourceError) -> Self {
        MonitorError::JsonlFailed(err.to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: SourceError = io_err.into();
        assert!(matches!(err, SourceError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_source_error_from_serde() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: SourceError = json_err.into();
        assert!(matches!(err, SourceError::Parse(_)));
    }

    #[test]
    fn test_auth_fatal_classification() {
        assert!(SourceError::TokenExpired.is_auth_fatal());
        assert!(SourceError::InsufficientScope.is_auth_fatal());
        assert!(!SourceError::Network("timeout".into()).is_auth_fatal());
        assert!(!SourceError::Api("HTTP 500".into()).is_auth_fatal());
        assert!(!SourceError::NoSessionFiles(PathBuf::from("/tmp")).is_auth_fatal());
    }

    #[test]
    fn test_monitor_error_from_oauth() {
        assert_eq!(
            MonitorError::from_oauth(&SourceError::TokenExpired),
            MonitorError::TokenExpired
        );
        assert_eq!(
            MonitorError::from_oauth(&SourceError::InsufficientScope),
            MonitorError::InsufficientScope
        );
        let generic = MonitorError::from_oauth(&SourceError::Api("HTTP 503".into()));
        assert!(matches!(generic, MonitorError::OauthFailed(msg) if msg.contains("503")));
    }

    #[test]
    fn test_monitor_error_from_jsonl() {
        let err = MonitorError::from_jsonl(&SourceError::NoProjectsDirectory(PathBuf::from(
            "/home/user/.agent/projects",
        )));
        assert!(matches!(err, MonitorError::JsonlFailed(msg) if msg.contains("projects")));
    }

    #[test]
    fn test_monitor_error_display() {
        assert_eq!(
            MonitorError::TokenExpired.to_string(),
            "Token expired - re-authentication required"
        );
        assert!(MonitorError::BothSourcesFailed("x".into())
            .to_string()
            .contains("All usage sources failed"));
    }
}
