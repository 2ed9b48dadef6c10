//! Cost data models

use std::collections::BTreeMap;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A non-negative amount of US dollars in fixed-point millionths.
///
/// All accumulated spend is kept in this unit so sums are exact. Conversion from a
/// floating-point dollar amount rounds half away from zero to six decimal places.
/// On the wire the value is a plain dollar number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MicroUsd(u64);

impl MicroUsd {
    /// Zero dollars
    pub const ZERO: Self = Self(0);

    /// Create from a raw count of micro-dollars
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// Convert a dollar amount, rounding to six decimal places
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_usd(usd: f64) -> Self {
        if !usd.is_finite() || usd <= 0.0 {
            return Self::ZERO;
        }
        Self((usd * 1_000_000.0).round() as u64)
    }

    /// Raw micro-dollar count
    pub const fn micros(self) -> u64 {
        self.0
    }

    /// Dollar value
    #[allow(clippy::cast_precision_loss)]
    pub fn as_usd(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    /// Addition that saturates instead of overflowing
    #[must_use]
    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Subtraction that stops at zero
    #[must_use]
    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

impl Add for MicroUsd {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.saturating_add(rhs)
    }
}

impl AddAssign for MicroUsd {
    fn add_assign(&mut self, rhs: Self) {
        *self = self.saturating_add(rhs);
    }
}

impl Sum for MicroUsd {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl fmt::Display for MicroUsd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}.{:06}", self.0 / 1_000_000, self.0 % 1_000_000)
    }
}

impl Serialize for MicroUsd {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_usd())
    }
}

impl<'de> Deserialize<'de> for MicroUsd {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        f64::deserialize(deserializer).map(Self::from_usd)
    }
}

/// Spend, request and token totals attributed to one provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCost {
    /// Cumulative spend
    pub spend: MicroUsd,
    /// Calls that reached this provider
    pub requests: u64,
    /// Prompt plus completion tokens
    pub tokens: u64,
}

/// Point-in-time record of cumulative cost totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostSnapshot {
    /// When the snapshot was taken
    pub timestamp: DateTime<Utc>,

    /// Spend since the gateway started
    pub total_spend: MicroUsd,

    /// Spend in the current UTC day
    pub daily_spend: MicroUsd,

    /// Spend in the current UTC month
    pub monthly_spend: MicroUsd,

    /// Total calls (cache hits included)
    pub total_requests: u64,

    /// Total prompt plus completion tokens
    pub total_tokens: u64,

    /// Breakdown per provider
    pub providers: BTreeMap<String, ProviderCost>,
}

/// End-of-month spend forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostPrediction {
    /// Spend so far this month
    pub current_monthly_spend: f64,

    /// Fractional days elapsed in the month
    pub days_elapsed: f64,

    /// Fractional days remaining in the month
    pub days_remaining: f64,

    /// Average spend per elapsed day
    pub daily_average: f64,

    /// Linear projection of the month's total
    pub predicted_monthly_total: f64,

    /// Confidence in the projection (0.0 to 1.0)
    pub confidence: f64,

    /// Configured monthly budget (0 when unset)
    pub monthly_budget: f64,

    /// Projection as a percentage of the budget
    pub percent_of_budget: f64,

    /// Whether the projection exceeds the budget
    pub will_exceed_budget: bool,

    /// How far the projection overshoots the budget, in percent
    pub overage_percent: Option<f64>,
}

/// Deltas over a window of snapshots
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendMetrics {
    /// Spend added during the window
    pub spend_change: f64,

    /// Requests added during the window
    pub request_change: u64,

    /// Tokens added during the window
    pub token_change: u64,

    /// Time between the first and last snapshot
    pub duration_hours: f64,

    /// Spend per hour
    pub avg_spend_per_hour: f64,

    /// Requests per hour
    pub avg_requests_per_hour: f64,
}

/// Trend metrics for the standard windows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    /// Last hour
    pub last_1_hour: TrendMetrics,
    /// Last day
    pub last_24_hours: TrendMetrics,
    /// Last week
    pub last_7_days: TrendMetrics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_usd_rounds_to_six_places() {
        assert_eq!(MicroUsd::from_usd(0.0075).micros(), 7_500);
        assert_eq!(MicroUsd::from_usd(0.000_000_4).micros(), 0);
        assert_eq!(MicroUsd::from_usd(0.000_000_6).micros(), 1);
        assert_eq!(MicroUsd::from_usd(-3.0), MicroUsd::ZERO);
        assert_eq!(MicroUsd::from_usd(f64::NAN), MicroUsd::ZERO);
    }

    #[test]
    fn test_display() {
        assert_eq!(MicroUsd::from_micros(7_500).to_string(), "$0.007500");
        assert_eq!(MicroUsd::from_micros(12_345_678).to_string(), "$12.345678");
    }

    #[test]
    fn test_sum_is_exact() {
        let total: MicroUsd = std::iter::repeat(MicroUsd::from_usd(0.1)).take(10).sum();
        assert_eq!(total, MicroUsd::from_micros(1_000_000));
        assert!((total.as_usd() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_serializes_as_dollars() {
        let json = serde_json::to_string(&MicroUsd::from_micros(2_500)).unwrap();
        assert_eq!(json, "0.0025");
        let back: MicroUsd = serde_json::from_str(&json).unwrap();
        assert_eq!(back.micros(), 2_500);
    }
}
