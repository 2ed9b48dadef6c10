//! Router metrics data models

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::cost::{CostSnapshot, MicroUsd, ProviderCost};

/// How a request was served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    /// Served from the response cache
    Hit,
    /// Served by a provider
    Miss,
    /// Streamed from a provider, never cached
    Stream,
}

impl CacheStatus {
    /// Metric label value
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::Stream => "stream",
        }
    }
}

/// Per-agent usage counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentUsage {
    /// Calls made by the agent
    pub calls: u64,

    /// Calls served from cache
    pub cache_hits: u64,

    /// Spend in the current UTC day
    pub daily_spend: MicroUsd,
}

impl AgentUsage {
    /// Fraction of calls served from cache
    #[allow(clippy::cast_precision_loss)]
    pub fn cache_hit_rate(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.calls as f64
        }
    }
}

/// Read-only copy of a router's running totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterTotals {
    /// When the totals were read
    pub taken_at: DateTime<Utc>,

    /// All completed calls
    pub total_calls: u64,

    /// Calls that reached a provider
    pub cloud_hits: u64,

    /// Calls served from cache
    pub cache_hits: u64,

    /// Provider calls that failed
    pub provider_errors: u64,

    /// Spend since start (or last reset)
    pub total_cost: MicroUsd,

    /// Spend in the current UTC day
    pub daily_cost: MicroUsd,

    /// Spend in the current UTC month
    pub monthly_cost: MicroUsd,

    /// Cumulative prompt tokens
    pub prompt_tokens: u64,

    /// Cumulative completion tokens
    pub completion_tokens: u64,

    /// Usage per provider
    pub providers: BTreeMap<String, ProviderCost>,

    /// Usage per agent
    pub agents: BTreeMap<String, AgentUsage>,
}

impl RouterTotals {
    /// Prompt plus completion tokens
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }

    /// Fraction of all calls served from cache
    #[allow(clippy::cast_precision_loss)]
    pub fn cache_hit_rate(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.total_calls as f64
        }
    }

    /// Freeze these totals into a cost snapshot
    pub fn to_snapshot(&self) -> CostSnapshot {
        CostSnapshot {
            timestamp: self.taken_at,
            total_spend: self.total_cost,
            daily_spend: self.daily_cost,
            monthly_spend: self.monthly_cost,
            total_requests: self.total_calls,
            total_tokens: self.total_tokens(),
            providers: self.providers.clone(),
        }
    }
}

/// Spend against the configured budgets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetStatus {
    /// Spend today
    pub daily_spend: f64,
    /// Daily budget (0 when unset)
    pub daily_budget: f64,
    /// Budget left today
    pub daily_remaining: f64,
    /// Percent of the daily budget used
    pub daily_percent: f64,

    /// Spend this month
    pub monthly_spend: f64,
    /// Monthly budget (0 when unset)
    pub monthly_budget: f64,
    /// Budget left this month
    pub monthly_remaining: f64,
    /// Percent of the monthly budget used
    pub monthly_percent: f64,

    /// Spend since start
    pub total_spend: f64,
}

impl BudgetStatus {
    /// Compare totals against daily and monthly budgets
    pub fn new(totals: &RouterTotals, daily_budget: MicroUsd, monthly_budget: MicroUsd) -> Self {
        Self {
            daily_spend: totals.daily_cost.as_usd(),
            daily_budget: daily_budget.as_usd(),
            daily_remaining: daily_budget.saturating_sub(totals.daily_cost).as_usd(),
            daily_percent: percent_of(totals.daily_cost, daily_budget),
            monthly_spend: totals.monthly_cost.as_usd(),
            monthly_budget: monthly_budget.as_usd(),
            monthly_remaining: monthly_budget.saturating_sub(totals.monthly_cost).as_usd(),
            monthly_percent: percent_of(totals.monthly_cost, monthly_budget),
            total_spend: totals.total_cost.as_usd(),
        }
    }
}

/// `spend` as a percentage of `budget`, 0 when there is no budget
#[allow(clippy::cast_precision_loss)]
pub fn percent_of(spend: MicroUsd, budget: MicroUsd) -> f64 {
    if budget == MicroUsd::ZERO {
        0.0
    } else {
        spend.micros() as f64 / budget.micros() as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn totals(daily: u64, monthly: u64) -> RouterTotals {
        RouterTotals {
            taken_at: Utc::now(),
            total_calls: 4,
            cloud_hits: 3,
            cache_hits: 1,
            provider_errors: 0,
            total_cost: MicroUsd::from_micros(monthly),
            daily_cost: MicroUsd::from_micros(daily),
            monthly_cost: MicroUsd::from_micros(monthly),
            prompt_tokens: 100,
            completion_tokens: 50,
            providers: BTreeMap::new(),
            agents: BTreeMap::new(),
        }
    }

    #[test]
    fn test_budget_status() {
        let status = BudgetStatus::new(
            &totals(900_000, 5_000_000),
            MicroUsd::from_micros(1_000_000),
            MicroUsd::ZERO,
        );

        assert!((status.daily_percent - 90.0).abs() < 1e-9);
        assert!((status.daily_remaining - 0.1).abs() < 1e-9);
        assert_eq!(status.monthly_percent, 0.0);
        assert_eq!(status.monthly_remaining, 0.0);
    }

    #[test]
    fn test_snapshot_carries_totals() {
        let t = totals(10, 20);
        let snapshot = t.to_snapshot();

        assert_eq!(snapshot.timestamp, t.taken_at);
        assert_eq!(snapshot.total_requests, 4);
        assert_eq!(snapshot.total_tokens, 150);
        assert_eq!(snapshot.monthly_spend.micros(), 20);
        assert!((t.cache_hit_rate() - 0.25).abs() < f64::EPSILON);
    }
}
