//! Budget threshold alerts with per-period deduplication

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use uuid::Uuid;

use crate::models::{
    percent_of, AlertKind, AlertScope, BudgetThreshold, CostAlert, MicroUsd,
};

/// Remembers which thresholds already fired in the current day and month.
///
/// A threshold fires at most once per (threshold, scope) per accounting period. The daily
/// set clears at the UTC day boundary and the monthly set at the UTC month boundary.
#[derive(Debug, Default)]
pub struct BudgetAlertTracker {
    day: Option<NaiveDate>,
    month: Option<(i32, u32)>,
    daily: Vec<CostAlert>,
    monthly: Vec<CostAlert>,
}

impl BudgetAlertTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Check spend against a budget and return newly crossed thresholds, lowest first.
    ///
    /// A zero budget never alerts.
    pub fn evaluate(
        &mut self,
        scope: AlertScope,
        spend: MicroUsd,
        budget: MicroUsd,
        now: DateTime<Utc>,
    ) -> Vec<CostAlert> {
        self.roll_over(now);
        if budget == MicroUsd::ZERO {
            return Vec::new();
        }

        let percent = percent_of(spend, budget);
        let fired = match scope {
            AlertScope::Daily => &mut self.daily,
            AlertScope::Monthly => &mut self.monthly,
        };

        let mut new_alerts = Vec::new();
        for threshold in BudgetThreshold::ALL {
            if percent < f64::from(threshold.percent()) {
                break;
            }
            if fired.iter().any(|alert| alert.threshold == threshold) {
                continue;
            }

            let alert = CostAlert {
                id: Uuid::new_v4(),
                kind: AlertKind::Threshold,
                threshold,
                severity: threshold.severity(),
                scope,
                percent,
                spend: spend.as_usd(),
                budget: budget.as_usd(),
                message: threshold_message(scope, threshold),
                fired_at: now,
            };
            fired.push(alert.clone());
            new_alerts.push(alert);
        }
        new_alerts
    }

    /// Alerts fired in the periods containing `now`
    pub fn active(&self, now: DateTime<Utc>) -> Vec<CostAlert> {
        let mut alerts = Vec::new();
        if self.day == Some(now.date_naive()) {
            alerts.extend(self.daily.iter().cloned());
        }
        if self.month == Some((now.year(), now.month())) {
            alerts.extend(self.monthly.iter().cloned());
        }
        alerts
    }

    /// Forget every fired alert
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn roll_over(&mut self, now: DateTime<Utc>) {
        let day = now.date_naive();
        if self.day != Some(day) {
            self.day = Some(day);
            self.daily.clear();
        }

        let month = (now.year(), now.month());
        if self.month != Some(month) {
            self.month = Some(month);
            self.monthly.clear();
        }
    }
}

fn threshold_message(scope: AlertScope, threshold: BudgetThreshold) -> String {
    let period = match scope {
        AlertScope::Daily => "Daily",
        AlertScope::Monthly => "Monthly",
    };
    match threshold {
        BudgetThreshold::Exceeded => format!("{period} budget exceeded"),
        t => format!("{period} budget at {}%", t.percent()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;
    use chrono::TimeZone;

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, d, h, 0, 0).unwrap()
    }

    fn usd(v: f64) -> MicroUsd {
        MicroUsd::from_usd(v)
    }

    #[test]
    fn test_ninety_percent_fires_once() {
        let mut tracker = BudgetAlertTracker::new();

        let first = tracker.evaluate(AlertScope::Daily, usd(9.0), usd(10.0), at(3, 10));
        let thresholds: Vec<_> = first.iter().map(|a| a.threshold.percent()).collect();
        assert_eq!(thresholds, vec![50, 75, 90]);
        assert_eq!(first[2].severity, Severity::Warning);
        assert_eq!(first[2].type_tag(), "daily_budget_90");

        let second = tracker.evaluate(AlertScope::Daily, usd(9.2), usd(10.0), at(3, 11));
        assert!(second.is_empty());
    }

    #[test]
    fn test_exceeded_is_critical() {
        let mut tracker = BudgetAlertTracker::new();
        tracker.evaluate(AlertScope::Monthly, usd(95.0), usd(100.0), at(3, 10));

        let alerts = tracker.evaluate(AlertScope::Monthly, usd(120.0), usd(100.0), at(4, 10));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert_eq!(alerts[0].message, "Monthly budget exceeded");
    }

    #[test]
    fn test_daily_set_resets_at_day_boundary() {
        let mut tracker = BudgetAlertTracker::new();
        tracker.evaluate(AlertScope::Daily, usd(9.0), usd(10.0), at(3, 23));

        let next_day = tracker.evaluate(AlertScope::Daily, usd(9.0), usd(10.0), at(4, 1));
        assert_eq!(next_day.len(), 3);
    }

    #[test]
    fn test_zero_budget_never_alerts() {
        let mut tracker = BudgetAlertTracker::new();
        let alerts = tracker.evaluate(AlertScope::Daily, usd(1_000.0), MicroUsd::ZERO, at(3, 10));
        assert!(alerts.is_empty());
    }

    #[test]
    fn test_active_only_current_period() {
        let mut tracker = BudgetAlertTracker::new();
        tracker.evaluate(AlertScope::Daily, usd(5.0), usd(10.0), at(3, 10));
        tracker.evaluate(AlertScope::Monthly, usd(60.0), usd(100.0), at(3, 10));

        assert_eq!(tracker.active(at(3, 12)).len(), 2);

        let tomorrow = tracker.active(at(4, 12));
        assert_eq!(tomorrow.len(), 1);
        assert_eq!(tomorrow[0].scope, AlertScope::Monthly);
    }
}
