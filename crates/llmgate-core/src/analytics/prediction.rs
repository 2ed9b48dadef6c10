//! Month-end spend projection

use chrono::{DateTime, Datelike, TimeZone, Utc};

use crate::models::{CostPrediction, MicroUsd};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Days of history after which the day component of confidence is saturated
const FULL_CONFIDENCE_DAYS: f64 = 7.0;

/// Linear projection of the current month's spend.
///
/// `history_len` and `capacity` feed the confidence score; a full history buffer counts as
/// complete data.
#[allow(clippy::cast_precision_loss)]
pub fn project(
    monthly_spend: MicroUsd,
    monthly_budget: MicroUsd,
    history_len: usize,
    capacity: usize,
    now: DateTime<Utc>,
) -> CostPrediction {
    let (days_elapsed, days_in_month) = month_progress(now);
    let days_remaining = (days_in_month - days_elapsed).max(0.0);

    let spend = monthly_spend.as_usd();
    let daily_average = if days_elapsed > 0.0 {
        spend / days_elapsed
    } else {
        0.0
    };
    let predicted = spend + daily_average * days_remaining;

    let budget = monthly_budget.as_usd();
    let will_exceed = budget > 0.0 && predicted > budget;
    let percent_of_budget = if budget > 0.0 {
        predicted / budget * 100.0
    } else {
        0.0
    };

    CostPrediction {
        current_monthly_spend: spend,
        days_elapsed,
        days_remaining,
        daily_average,
        predicted_monthly_total: predicted,
        confidence: confidence(days_elapsed, history_len, capacity),
        monthly_budget: budget,
        percent_of_budget,
        will_exceed_budget: will_exceed,
        overage_percent: will_exceed.then(|| percent_of_budget - 100.0),
    }
}

/// Weighted confidence: 70% from days elapsed (saturating at a week), 30% from history fill
#[allow(clippy::cast_precision_loss)]
pub fn confidence(days_elapsed: f64, history_len: usize, capacity: usize) -> f64 {
    let days = (days_elapsed / FULL_CONFIDENCE_DAYS).clamp(0.0, 1.0);
    let history = if capacity == 0 {
        0.0
    } else {
        (history_len as f64 / capacity as f64).min(1.0)
    };
    0.7 * days + 0.3 * history
}

/// Fractional days since the first of the month and the month's length, both UTC
#[allow(clippy::cast_precision_loss)]
fn month_progress(now: DateTime<Utc>) -> (f64, f64) {
    let (year, month) = (now.year(), now.month());
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };

    let start = Utc
        .with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .unwrap_or(now);
    let end = Utc
        .with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
        .single()
        .unwrap_or(now);

    let elapsed = (now - start).num_milliseconds() as f64 / 1000.0 / SECONDS_PER_DAY;
    let length = (end - start).num_seconds() as f64 / SECONDS_PER_DAY;
    (elapsed.max(0.0), length)
}
