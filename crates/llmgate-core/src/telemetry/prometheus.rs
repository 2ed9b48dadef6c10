//! Prometheus-backed metrics sink

use std::time::Duration;

use metrics::{counter, gauge, histogram, with_local_recorder};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

use super::{MetricsSink, TokenKind};
use crate::error::{Error, Result};
use crate::models::{CacheStatus, MicroUsd};

const REQUESTS_TOTAL: &str = "llm_requests_total";
const REQUEST_DURATION: &str = "llm_request_duration_seconds";
const CACHE_HIT_RATE: &str = "llm_cache_hit_rate";
const COST_TOTAL: &str = "llm_cost_micro_usd_total";
const TOKENS_TOTAL: &str = "llm_tokens_total";
const PROVIDER_ERRORS: &str = "llm_provider_errors_total";

const DURATION_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0];

/// Metrics sink with its own Prometheus recorder.
///
/// The recorder is private to the sink rather than installed globally, so several sinks
/// (one per test, say) can coexist in a process.
pub struct PrometheusSink {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
}

impl PrometheusSink {
    /// Create a sink with the request duration buckets configured
    pub fn new() -> Result<Self> {
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full(REQUEST_DURATION.to_string()),
                DURATION_BUCKETS,
            )
            .map_err(|e| Error::config(format!("invalid histogram buckets: {e}")))?
            .build_recorder();
        let handle = recorder.handle();

        Ok(Self { recorder, handle })
    }

    /// Prometheus text exposition of everything recorded so far
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

impl std::fmt::Debug for PrometheusSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusSink").finish_non_exhaustive()
    }
}

impl MetricsSink for PrometheusSink {
    fn record_request(
        &self,
        provider: &str,
        model: &str,
        agent_id: &str,
        status: CacheStatus,
        duration: Duration,
    ) {
        with_local_recorder(&self.recorder, || {
            counter!(
                REQUESTS_TOTAL,
                "provider" => provider.to_string(),
                "model" => model.to_string(),
                "agent_id" => agent_id.to_string(),
                "cache_status" => status.as_str()
            )
            .increment(1);
            histogram!(
                REQUEST_DURATION,
                "provider" => provider.to_string(),
                "model" => model.to_string()
            )
            .record(duration.as_secs_f64());
        });
    }

    fn record_cost(&self, provider: &str, model: &str, cost: MicroUsd) {
        with_local_recorder(&self.recorder, || {
            counter!(
                COST_TOTAL,
                "provider" => provider.to_string(),
                "model" => model.to_string()
            )
            .increment(cost.micros());
        });
    }

    fn record_tokens(&self, kind: TokenKind, provider: &str, model: &str, tokens: u64) {
        with_local_recorder(&self.recorder, || {
            counter!(
                TOKENS_TOTAL,
                "type" => kind.as_str(),
                "provider" => provider.to_string(),
                "model" => model.to_string()
            )
            .increment(tokens);
        });
    }

    fn update_cache_hit_rate(&self, agent_id: &str, rate: f64) {
        with_local_recorder(&self.recorder, || {
            gauge!(CACHE_HIT_RATE, "agent_id" => agent_id.to_string()).set(rate);
        });
    }

    fn record_provider_error(&self, provider: &str) {
        with_local_recorder(&self.recorder, || {
            counter!(PROVIDER_ERRORS, "provider" => provider.to_string()).increment(1);
        });
    }
}
