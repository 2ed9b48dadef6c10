//! Budget alert data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Alert severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational
    #[default]
    Info,
    /// Warning
    Warning,
    /// Critical
    Critical,
}

/// Accounting period an alert belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertScope {
    /// Current UTC day
    Daily,
    /// Current UTC month
    Monthly,
}

impl AlertScope {
    /// Lowercase label
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Monthly => "monthly",
        }
    }
}

/// Budget percentage that triggers an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum BudgetThreshold {
    /// 50% of budget
    Half,
    /// 75% of budget
    ThreeQuarters,
    /// 90% of budget
    Ninety,
    /// 100% of budget
    Exceeded,
}

impl BudgetThreshold {
    /// All thresholds, lowest first
    pub const ALL: [Self; 4] = [Self::Half, Self::ThreeQuarters, Self::Ninety, Self::Exceeded];

    /// Threshold as a percentage
    pub fn percent(self) -> u8 {
        match self {
            Self::Half => 50,
            Self::ThreeQuarters => 75,
            Self::Ninety => 90,
            Self::Exceeded => 100,
        }
    }

    /// Severity emitted when this threshold is crossed
    pub fn severity(self) -> Severity {
        match self {
            Self::Half | Self::ThreeQuarters => Severity::Info,
            Self::Ninety => Severity::Warning,
            Self::Exceeded => Severity::Critical,
        }
    }
}

impl From<BudgetThreshold> for u8 {
    fn from(threshold: BudgetThreshold) -> Self {
        threshold.percent()
    }
}

impl TryFrom<u8> for BudgetThreshold {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|t| t.percent() == value)
            .ok_or_else(|| format!("unsupported budget threshold: {value}"))
    }
}

/// What produced an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Actual spend crossed a budget threshold
    Threshold,
    /// The month-end projection exceeds the budget
    PredictedOverage,
}

/// A spending alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostAlert {
    /// Unique identifier
    pub id: Uuid,

    /// What produced the alert
    pub kind: AlertKind,

    /// Threshold that was crossed
    pub threshold: BudgetThreshold,

    /// Severity level
    pub severity: Severity,

    /// Accounting period
    pub scope: AlertScope,

    /// Percentage of budget used (or projected)
    pub percent: f64,

    /// Spend (or projected spend) in dollars
    pub spend: f64,

    /// Budget limit in dollars
    pub budget: f64,

    /// Human-readable message
    pub message: String,

    /// When the alert fired
    pub fired_at: DateTime<Utc>,
}

impl CostAlert {
    /// Stable type tag, e.g. `daily_budget_90` or `monthly_budget_exceeded`
    pub fn type_tag(&self) -> String {
        match (self.kind, self.threshold) {
            (AlertKind::PredictedOverage, _) => "predicted_budget_exceeded".to_string(),
            (AlertKind::Threshold, BudgetThreshold::Exceeded) => {
                format!("{}_budget_exceeded", self.scope.as_str())
            }
            (AlertKind::Threshold, t) => format!("{}_budget_{}", self.scope.as_str(), t.percent()),
        }
    }
}
