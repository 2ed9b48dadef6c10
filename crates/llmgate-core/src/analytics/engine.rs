//! Cost analytics engine

use std::collections::VecDeque;

use chrono::{DateTime, Datelike, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use super::alerts::BudgetAlertTracker;
use super::prediction;
use super::trends::trend_metrics;
use crate::config::AnalyticsConfig;
use crate::models::{
    AlertKind, AlertScope, BudgetThreshold, CostAlert, CostPrediction, CostSnapshot, MicroUsd,
    RouterTotals, Severity, TrendAnalysis,
};

/// Bounded snapshot history with prediction, budget alerts and trends
#[derive(Debug)]
pub struct CostAnalytics {
    capacity: usize,
    daily_budget: MicroUsd,
    monthly_budget: MicroUsd,
    history: RwLock<VecDeque<CostSnapshot>>,
    alerts: Mutex<BudgetAlertTracker>,
}

impl CostAnalytics {
    /// Create an engine keeping at most `capacity` snapshots.
    ///
    /// A zero budget disables alerts for its period.
    pub fn new(capacity: usize, daily_budget: MicroUsd, monthly_budget: MicroUsd) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            daily_budget,
            monthly_budget,
            history: RwLock::new(VecDeque::with_capacity(capacity)),
            alerts: Mutex::new(BudgetAlertTracker::new()),
        }
    }

    /// Create an engine from configuration
    pub fn from_config(config: &AnalyticsConfig) -> Self {
        Self::new(
            config.history_capacity,
            MicroUsd::from_usd(config.daily_budget_usd),
            MicroUsd::from_usd(config.monthly_budget_usd),
        )
    }

    /// Append a snapshot of `totals` and return the alerts it newly fires
    pub fn record_snapshot(&self, totals: &RouterTotals) -> Vec<CostAlert> {
        let snapshot = totals.to_snapshot();
        let now = snapshot.timestamp;

        let fired = {
            let mut tracker = self.alerts.lock();
            let mut fired = tracker.evaluate(
                AlertScope::Daily,
                snapshot.daily_spend,
                self.daily_budget,
                now,
            );
            fired.extend(tracker.evaluate(
                AlertScope::Monthly,
                snapshot.monthly_spend,
                self.monthly_budget,
                now,
            ));
            fired
        };

        {
            let mut history = self.history.write();
            while history.len() >= self.capacity {
                history.pop_front();
            }
            history.push_back(snapshot);
        }

        debug!(
            timestamp = %now,
            total_spend = %totals.total_cost,
            alerts = fired.len(),
            "Recorded cost snapshot"
        );
        fired
    }

    /// Snapshots taken at or after `since`, oldest first
    pub fn history(&self, since: DateTime<Utc>) -> Vec<CostSnapshot> {
        self.history
            .read()
            .iter()
            .filter(|s| s.timestamp >= since)
            .cloned()
            .collect()
    }

    /// Most recent snapshot
    pub fn latest(&self) -> Option<CostSnapshot> {
        self.history.read().back().cloned()
    }

    /// Number of retained snapshots
    pub fn len(&self) -> usize {
        self.history.read().len()
    }

    /// Whether no snapshot has been recorded
    pub fn is_empty(&self) -> bool {
        self.history.read().is_empty()
    }

    /// Maximum number of retained snapshots
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Month-end projection as of now
    pub fn predict(&self) -> CostPrediction {
        self.predict_at(Utc::now())
    }

    /// Month-end projection as of `now`.
    ///
    /// Spend comes from the latest snapshot when it falls in the same month, else zero.
    pub fn predict_at(&self, now: DateTime<Utc>) -> CostPrediction {
        let (spend, len) = {
            let history = self.history.read();
            let spend = history
                .back()
                .filter(|s| same_month(s.timestamp, now))
                .map_or(MicroUsd::ZERO, |s| s.monthly_spend);
            (spend, history.len())
        };
        prediction::project(spend, self.monthly_budget, len, self.capacity, now)
    }

    /// Alerts for the current periods, plus a projected-overage warning
    pub fn alerts(&self) -> Vec<CostAlert> {
        self.alerts_at(Utc::now())
    }

    /// Alerts for the periods containing `now`
    pub fn alerts_at(&self, now: DateTime<Utc>) -> Vec<CostAlert> {
        let mut alerts = self.alerts.lock().active(now);

        let prediction = self.predict_at(now);
        if prediction.will_exceed_budget {
            alerts.push(CostAlert {
                id: Uuid::new_v4(),
                kind: AlertKind::PredictedOverage,
                threshold: BudgetThreshold::Exceeded,
                severity: Severity::Warning,
                scope: AlertScope::Monthly,
                percent: prediction.percent_of_budget,
                spend: prediction.predicted_monthly_total,
                budget: prediction.monthly_budget,
                message: "Predicted to exceed monthly budget".to_string(),
                fired_at: now,
            });
        }
        alerts
    }

    /// Trends over the last hour, day and week
    pub fn trends(&self) -> TrendAnalysis {
        self.trends_at(Utc::now())
    }

    /// Trends over windows ending at `now`
    pub fn trends_at(&self, now: DateTime<Utc>) -> TrendAnalysis {
        let history = self.history.read();
        let window = |span: Duration| {
            let since = now - span;
            trend_metrics(
                history
                    .iter()
                    .filter(move |s| s.timestamp >= since && s.timestamp <= now),
            )
        };

        TrendAnalysis {
            last_1_hour: window(Duration::hours(1)),
            last_24_hours: window(Duration::hours(24)),
            last_7_days: window(Duration::days(7)),
        }
    }

    /// Drop history and fired alerts
    pub fn reset(&self) {
        self.history.write().clear();
        self.alerts.lock().reset();
    }
}

fn same_month(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    a.year() == b.year() && a.month() == b.month()
}
