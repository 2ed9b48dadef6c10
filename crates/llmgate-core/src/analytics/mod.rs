//! Cost analytics: snapshot history, month-end prediction, budget alerts and trends

mod alerts;
mod engine;
mod prediction;
mod scheduler;
mod trends;

pub use alerts::BudgetAlertTracker;
pub use engine::CostAnalytics;
pub use prediction::{confidence, project};
pub use scheduler::SnapshotTask;
pub use trends::trend_metrics;
