//! Metrics recording and log setup

mod logging;
mod prometheus;

pub use logging::init_tracing;
pub use prometheus::PrometheusSink;

use std::time::Duration;

use crate::models::{CacheStatus, MicroUsd};

/// Which side of a call a token count belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Input tokens
    Prompt,
    /// Output tokens
    Completion,
}

impl TokenKind {
    /// Metric label value
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prompt => "prompt",
            Self::Completion => "completion",
        }
    }
}

/// Destination for router metrics.
///
/// Implementations must not block and must be callable from many threads at once.
pub trait MetricsSink: Send + Sync {
    /// Count a finished request and record its latency
    fn record_request(
        &self,
        provider: &str,
        model: &str,
        agent_id: &str,
        status: CacheStatus,
        duration: Duration,
    );

    /// Add spend for a provider call
    fn record_cost(&self, provider: &str, model: &str, cost: MicroUsd);

    /// Add tokens for a provider call
    fn record_tokens(&self, kind: TokenKind, provider: &str, model: &str, tokens: u64);

    /// Publish an agent's cache hit rate
    fn update_cache_hit_rate(&self, agent_id: &str, rate: f64);

    /// Count a failed provider call
    fn record_provider_error(&self, provider: &str);
}
