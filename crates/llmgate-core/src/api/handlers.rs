//! API handlers for the HTTP REST API

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, HeaderMap},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use super::error::{error_body, ApiError};
use crate::agents::{AgentConfig, AgentRegistry};
use crate::analytics::CostAnalytics;
use crate::error::Error;
use crate::models::{
    BudgetStatus, CompletionChunk, CompletionRequest, CompletionResponse, CostAlert,
    CostPrediction, CostSnapshot, RouterTotals, TrendAnalysis,
};
use crate::providers::RequestContext;
use crate::router::Router;
use crate::telemetry::PrometheusSink;

/// Header carrying a per-request deadline in milliseconds
pub const REQUEST_TIMEOUT_HEADER: &str = "x-request-timeout-ms";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Provider router
    pub router: Arc<Router>,
    /// Cost analytics engine fed by the snapshot task
    pub analytics: Arc<CostAnalytics>,
    /// Agent registry, shared with the router
    pub agents: Arc<AgentRegistry>,
    /// Prometheus exporter; `/metrics` is unavailable without one
    pub metrics: Option<Arc<PrometheusSink>>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    /// Always `ok`
    pub status: String,
    /// Crate version
    pub version: String,
}

/// Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Complete a chat request
pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CompletionRequest>, JsonRejection>,
) -> Result<Json<CompletionResponse>, ApiError> {
    let (request, ctx) = admit(&state, &headers, payload)?;

    let response = state.router.complete_with(&request, &ctx).await?;
    Ok(Json(response))
}

/// Stream a chat request as server-sent events.
///
/// Each event carries one JSON chunk. A provider failure mid-stream ends the stream with
/// a `{"error": {"code", "category", "message", "provider"}, "done": true}` event, the
/// same error object a failed request returns.
pub async fn chat_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CompletionRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let (request, ctx) = admit(&state, &headers, payload)?;

    let provider = state.router.route(&request).to_string();
    let chunks = state.router.stream_with(&request, &ctx).await?;
    let agent_id = request.agent_id;

    let events = chunks.map(move |item| {
        let event = match item {
            Ok(chunk) => chunk_event(&chunk),
            Err(source) => {
                let err = Error::provider(provider.as_str(), source);
                warn!(agent_id = %agent_id, error = %err, "Stream failure");
                failure_event(&err)
            }
        };
        Ok(event)
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

fn chunk_event(chunk: &CompletionChunk) -> Event {
    Event::default()
        .json_data(chunk)
        .unwrap_or_else(|e| failure_event(&Error::internal(e.to_string())))
}

fn failure_event(err: &Error) -> Event {
    let data = json!({ "error": error_body(err), "done": true });
    Event::default().data(data.to_string())
}

/// List registered agents
pub async fn list_agents(State(state): State<AppState>) -> Json<Vec<AgentConfig>> {
    Json(state.agents.list())
}

/// Router totals plus budget status
#[derive(Debug, Serialize)]
pub struct RouterMetricsResponse {
    /// Counters, spend and per-agent usage since start or the last reset
    pub totals: RouterTotals,
    /// Share of calls answered from cache, in `[0, 1]`
    pub cache_hit_rate: f64,
    /// Spend against the daily and monthly budgets
    pub budget: BudgetStatus,
}

/// Current router totals
pub async fn router_metrics(State(state): State<AppState>) -> Json<RouterMetricsResponse> {
    let totals = state.router.totals();
    Json(RouterMetricsResponse {
        cache_hit_rate: totals.cache_hit_rate(),
        budget: state.router.budget_status(),
        totals,
    })
}

/// Month-end cost projection
pub async fn cost_prediction(State(state): State<AppState>) -> Json<CostPrediction> {
    Json(state.analytics.predict())
}

/// Cost history query parameters
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// RFC 3339 lower bound; defaults to 24 hours ago
    pub since: Option<DateTime<Utc>>,
}

/// Cost snapshots since a point in time
pub async fn cost_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<CostSnapshot>> {
    let since = query
        .since
        .unwrap_or_else(|| Utc::now() - chrono::Duration::hours(24));
    Json(state.analytics.history(since))
}

/// Active budget alerts
pub async fn cost_alerts(State(state): State<AppState>) -> Json<Vec<CostAlert>> {
    Json(state.analytics.alerts())
}

/// Spend trends
pub async fn cost_trends(State(state): State<AppState>) -> Json<TrendAnalysis> {
    Json(state.analytics.trends())
}

/// Prometheus text exposition
pub async fn prometheus_metrics(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let sink = state
        .metrics
        .as_ref()
        .ok_or_else(|| Error::not_found("metrics exporter", "prometheus"))?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        sink.render(),
    ))
}

/// Parse, validate and rate-limit an incoming completion request
fn admit(
    state: &AppState,
    headers: &HeaderMap,
    payload: Result<Json<CompletionRequest>, JsonRejection>,
) -> Result<(CompletionRequest, RequestContext), ApiError> {
    let Json(request) = payload?;
    let ctx = request_context(headers)?;
    request.validate()?;
    state.agents.check_rate(&request.agent_id)?;
    Ok((request, ctx))
}

fn request_context(headers: &HeaderMap) -> Result<RequestContext, ApiError> {
    let ctx = RequestContext::new();
    let Some(value) = headers.get(REQUEST_TIMEOUT_HEADER) else {
        return Ok(ctx);
    };

    let millis = value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .ok_or_else(|| {
            Error::validation(format!(
                "{REQUEST_TIMEOUT_HEADER} must be a positive integer"
            ))
        })?;

    Ok(ctx.with_timeout(Duration::from_millis(millis)))
}
