//! Spend forecasting
//!
//! Budget-pacing projections over a daily cost history: average daily spend,
//! whether the account is ahead of or behind its budget-proportional pace,
//! the projected period-end spend, and the time remaining until the monthly
//! limit at the current rate. All pure; called on demand by consumers.

use serde::Serialize;

/// Tolerance band around the budget-proportional pace.
///
/// A projection within ±5% of the budget counts as on-track.
const PACE_TOLERANCE: f64 = 0.05;

/// Classification of actual vs. budget-proportional spend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Pace {
    /// Spending faster than the budget-proportional pace
    Ahead,
    OnTrack,
    /// Spending slower than the budget-proportional pace
    Behind,
    /// No budget configured or no elapsed days to normalize against
    Unknown,
}

/// Assembled forecast for the current billing period
#[derive(Debug, Clone, Serialize)]
pub struct ForecastResult {
    /// Mean cost per day over the available history
    pub daily_rate: Option<f64>,
    /// Pace classification against the monthly budget
    pub pace: Pace,
    /// Projected spend at period end at the current daily rate
    pub predicted_monthly_spend: Option<f64>,
    /// Seconds until the monthly budget is exhausted at the current rate
    pub time_to_limit_secs: Option<f64>,
}

/// Mean cost per day over the available buckets; `None` if there are none
pub fn daily_spend_rate(daily_costs: &[f64]) -> Option<f64> {
    if daily_costs.is_empty() {
        return None;
    }
    Some(daily_costs.iter().sum::<f64>() / daily_costs.len() as f64)
}

/// Classify spend against the budget-proportional pace.
///
/// The projection `current_spend / (day_of_month / days_in_month)` is what
/// the month would total if spending continued at the observed fraction;
/// comparing it against the budget with a ±5% band yields the class.
pub fn pace(current_spend: f64, monthly_budget: f64, day_of_month: u32, days_in_month: u32) -> Pace {
    if monthly_budget <= 0.0 || day_of_month == 0 || days_in_month == 0 {
        return Pace::Unknown;
    }

    let elapsed_fraction = day_of_month as f64 / days_in_month as f64;
    let projection = current_spend / elapsed_fraction;
    let ratio = projection / monthly_budget;

    if ratio > 1.0 + PACE_TOLERANCE {
        Pace::Ahead
    } else if ratio < 1.0 - PACE_TOLERANCE {
        Pace::Behind
    } else {
        Pace::OnTrack
    }
}

/// Projected period-end spend at the given daily rate
pub fn predicted_monthly_spend(
    current_spend: f64,
    daily_rate: f64,
    day_of_month: u32,
    days_in_month: u32,
) -> f64 {
    let remaining_days = days_in_month.saturating_sub(day_of_month) as f64;
    current_spend + daily_rate * remaining_days
}

/// Seconds until the monthly budget is exhausted at the current daily rate.
///
/// `None` when the rate is zero or negative; `Some(0.0)` when the budget is
/// already spent.
pub fn time_to_limit(current_spend: f64, monthly_budget: f64, daily_rate: f64) -> Option<f64> {
    if current_spend >= monthly_budget {
        return Some(0.0);
    }
    if daily_rate <= 0.0 {
        return None;
    }
    let days = (monthly_budget - current_spend) / daily_rate;
    Some(days * 86_400.0)
}

/// Assemble the full forecast from a daily cost history
pub fn forecast(
    daily_costs: &[f64],
    current_spend: f64,
    monthly_budget: f64,
    day_of_month: u32,
    days_in_month: u32,
) -> ForecastResult {
    let daily_rate = daily_spend_rate(daily_costs);

    ForecastResult {
        daily_rate,
        pace: pace(current_spend, monthly_budget, day_of_month, days_in_month),
        predicted_monthly_spend: daily_rate
            .map(|rate| predicted_monthly_spend(current_spend, rate, day_of_month, days_in_month)),
        time_to_limit_secs: daily_rate
            .and_then(|rate| time_to_limit(current_spend, monthly_budget, rate)),
    }
}

// ============================================================================
// Tests
// ============================================================================
