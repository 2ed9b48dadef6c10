//! # llmgate
//!
//! Provider-agnostic gateway for LLM calls made by AI agents.
//!
//! llmgate routes each request to a provider by model name, answers repeated requests
//! from a response cache, and accounts for every call in fixed-point micro-dollars.
//!
//! ## Architecture
//!
//! - **Router**: model-to-provider routing, response cache, per-agent usage counters
//! - **Providers**: the provider trait, an echo provider and a circuit breaker
//! - **Agents**: default models, sampling defaults and per-agent rate limits
//! - **Analytics**: cost snapshots, month-end projection, budget alerts, spend trends
//! - **Telemetry**: Prometheus metrics and structured logging
//! - **API**: REST and server-sent-event endpoints
//!
//! ## Quick Start
//!
//! ```bash
//! # Start the gateway
//! llmgate serve
//!
//! # Show the effective pricing table
//! llmgate pricing
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod agents;
pub mod analytics;
pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod providers;
pub mod router;
pub mod telemetry;

pub use config::Config;
pub use error::{Error, Result};
pub use router::Router;

/// Re-exports for convenience
pub mod prelude {
    pub use crate::agents::{AgentConfig, AgentDirectory, AgentRegistry, ModelTier, RateLimit};
    pub use crate::analytics::CostAnalytics;
    pub use crate::config::Config;
    pub use crate::error::{Error, ProviderError, Result};
    pub use crate::models::*;
    pub use crate::providers::{CircuitBreaker, Provider, ProviderRegistry, RequestContext};
    pub use crate::router::Router;
    pub use crate::telemetry::MetricsSink;
}
