//! Spend and traffic deltas over a window of snapshots

use crate::models::{CostSnapshot, TrendMetrics};

/// Deltas between the earliest and latest snapshot in `window`.
///
/// Returns zeroed metrics for an empty window; hourly rates are zero when the window
/// spans no time. Counters that went backwards (after a reset) report zero change.
#[allow(clippy::cast_precision_loss)]
pub fn trend_metrics<'a>(window: impl IntoIterator<Item = &'a CostSnapshot>) -> TrendMetrics {
    let mut first: Option<&CostSnapshot> = None;
    let mut last: Option<&CostSnapshot> = None;

    for snapshot in window {
        if first.map_or(true, |f| snapshot.timestamp < f.timestamp) {
            first = Some(snapshot);
        }
        if last.map_or(true, |l| snapshot.timestamp >= l.timestamp) {
            last = Some(snapshot);
        }
    }

    let (Some(first), Some(last)) = (first, last) else {
        return TrendMetrics::default();
    };

    let spend_change = last.total_spend.saturating_sub(first.total_spend).as_usd();
    let request_change = last.total_requests.saturating_sub(first.total_requests);
    let token_change = last.total_tokens.saturating_sub(first.total_tokens);
    let duration_hours =
        (last.timestamp - first.timestamp).num_milliseconds() as f64 / 3_600_000.0;

    let (avg_spend_per_hour, avg_requests_per_hour) = if duration_hours > 0.0 {
        (
            spend_change / duration_hours,
            request_change as f64 / duration_hours,
        )
    } else {
        (0.0, 0.0)
    };

    TrendMetrics {
        spend_change,
        request_change,
        token_change,
        duration_hours,
        avg_spend_per_hour,
        avg_requests_per_hour,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MicroUsd;
    use chrono::{Duration, Utc};
    use std::collections::BTreeMap;

    fn snapshot(minutes_ago: i64, spend_usd: f64, requests: u64) -> CostSnapshot {
        CostSnapshot {
            timestamp: Utc::now() - Duration::minutes(minutes_ago),
            total_spend: MicroUsd::from_usd(spend_usd),
            daily_spend: MicroUsd::from_usd(spend_usd),
            monthly_spend: MicroUsd::from_usd(spend_usd),
            total_requests: requests,
            total_tokens: requests * 100,
            providers: BTreeMap::new(),
        }
    }

    #[test]
    fn test_two_hour_window() {
        let window = vec![snapshot(120, 1.0, 10), snapshot(60, 2.0, 20), snapshot(0, 3.0, 50)];
        let metrics = trend_metrics(&window);

        assert!((metrics.spend_change - 2.0).abs() < 1e-9);
        assert_eq!(metrics.request_change, 40);
        assert_eq!(metrics.token_change, 4000);
        assert!((metrics.duration_hours - 2.0).abs() < 1e-6);
        assert!((metrics.avg_spend_per_hour - 1.0).abs() < 1e-6);
        assert!((metrics.avg_requests_per_hour - 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_single_snapshot_has_zero_rates() {
        let window = vec![snapshot(5, 1.0, 10)];
        let metrics = trend_metrics(&window);

        assert_eq!(metrics.duration_hours, 0.0);
        assert_eq!(metrics.avg_spend_per_hour, 0.0);
        assert_eq!(metrics.avg_requests_per_hour, 0.0);
    }

    #[test]
    fn test_empty_window() {
        assert_eq!(trend_metrics(&Vec::new()), TrendMetrics::default());
    }
}
