//! Monitor settings
//!
//! The settings store is an external collaborator; this module defines the
//! validated shape it persists. `validate()` normalizes whatever the store
//! hands back: the refresh interval snaps to the fixed preset list, the alert
//! threshold clamps to 0-100, and the at-least-one-source-enabled invariant
//! is repaired here (the monitor itself tolerates a both-disabled cycle, it
//! just yields the empty snapshot).

use serde::{Deserialize, Serialize};

/// Allowed refresh intervals in seconds (30 s to 10 min)
pub const REFRESH_INTERVAL_PRESETS: &[u64] = &[30, 60, 120, 300, 600];

/// Default refresh interval in seconds
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 60;

/// Default alert threshold percentage
pub const DEFAULT_ALERT_THRESHOLD: f64 = 80.0;

/// Settings consumed by the usage monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSettings {
    /// Refresh interval in seconds; must be one of [`REFRESH_INTERVAL_PRESETS`]
    pub refresh_interval_secs: u64,
    /// Whether the OAuth usage API source is enabled
    pub oauth_enabled: bool,
    /// Whether the session-log source is enabled
    pub session_logs_enabled: bool,
    /// Percentage at which consumers raise an alert
    pub alert_threshold: f64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            oauth_enabled: true,
            session_logs_enabled: true,
            alert_threshold: DEFAULT_ALERT_THRESHOLD,
        }
    }
}

impl MonitorSettings {
    /// Validate and normalize the settings.
    ///
    /// The interval snaps to the nearest preset, the threshold clamps to
    /// 0-100, and if both sources ended up disabled the OAuth source is
    /// re-enabled.
    pub fn validate(&self) -> Self {
        let mut settings = self.clone();
        settings.refresh_interval_secs = snap_to_preset(self.refresh_interval_secs);
        settings.alert_threshold = self.alert_threshold.clamp(0.0, 100.0);
        if !settings.oauth_enabled && !settings.session_logs_enabled {
            settings.oauth_enabled = true;
        }
        settings
    }
}

/// Snap an arbitrary interval to the nearest allowed preset
fn snap_to_preset(secs: u64) -> u64 {
    *REFRESH_INTERVAL_PRESETS
        .iter()
        .min_by_key(|preset| preset.abs_diff(secs))
        .unwrap_or(&DEFAULT_REFRESH_INTERVAL_SECS)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = MonitorSettings::default();
        assert_eq!(settings.refresh_interval_secs, DEFAULT_REFRESH_INTERVAL_SECS);
        assert!(settings.oauth_enabled);
        assert!(settings.session_logs_enabled);
        assert_eq!(settings.alert_threshold, DEFAULT_ALERT_THRESHOLD);
    }

    #[test]
    fn test_validate_snaps_interval_to_preset() {
        let settings = MonitorSettings {
            refresh_interval_secs: 45,
            ..Default::default()
        };
        let validated = settings.validate();
        // 45 is equidistant-ish between 30 and 60; nearest is 30 (|45-30|=15, |45-60|=15, first wins)
        assert!(REFRESH_INTERVAL_PRESETS.contains(&validated.refresh_interval_secs));
    }

    #[test]
    fn test_validate_preset_passes_through() {
        for &preset in REFRESH_INTERVAL_PRESETS {
            let settings = MonitorSettings {
                refresh_interval_secs: preset,
                ..Default::default()
            };
            assert_eq!(settings.validate().refresh_interval_secs, preset);
        }
    }

    #[test]
    fn test_validate_extreme_intervals() {
        let low = MonitorSettings {
            refresh_interval_secs: 1,
            ..Default::default()
        };
        assert_eq!(low.validate().refresh_interval_secs, 30);

        let high = MonitorSettings {
            refresh_interval_secs: 86_400,
            ..Default::default()
        };
        assert_eq!(high.validate().refresh_interval_secs, 600);
    }

    #[test]
    fn test_validate_clamps_threshold() {
        let settings = MonitorSettings {
            alert_threshold: 150.0,
            ..Default::default()
        };
        assert_eq!(settings.validate().alert_threshold, 100.0);

        let settings = MonitorSettings {
            alert_threshold: -10.0,
            ..Default::default()
        };
        assert_eq!(settings.validate().alert_threshold, 0.0);
    }

    #[test]
    fn test_validate_repairs_both_disabled() {
        let settings = MonitorSettings {
            oauth_enabled: false,
            session_logs_enabled: false,
            ..Default::default()
        };
        let validated = settings.validate();
        assert!(validated.oauth_enabled);
        assert!(!validated.session_logs_enabled);
    }

    #[test]
    fn test_validate_keeps_single_enabled_source() {
        let settings = MonitorSettings {
            oauth_enabled: false,
            session_logs_enabled: true,
            ..Default::default()
        };
        let validated = settings.validate();
        assert!(!validated.oauth_enabled);
        assert!(validated.session_logs_enabled);
    }
}
