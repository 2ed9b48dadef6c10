//! API routes

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{self, AppState};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/health", get(handlers::health))

        // Completions
        .route("/v1/chat", post(handlers::chat))
        .route("/v1/chat/stream", post(handlers::chat_stream))

        // Agents
        .route("/v1/agents", get(handlers::list_agents))

        // Router totals
        .route("/v1/router/metrics", get(handlers::router_metrics))

        // Cost analytics
        .route("/v1/costs/prediction", get(handlers::cost_prediction))
        .route("/v1/costs/history", get(handlers::cost_history))
        .route("/v1/costs/alerts", get(handlers::cost_alerts))
        .route("/v1/costs/trends", get(handlers::cost_trends))

        // Prometheus scrape
        .route("/metrics", get(handlers::prometheus_metrics))

        .with_state(state)
}
