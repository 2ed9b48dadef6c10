//! Configuration management for llmgate
//!
//! Values come from built-in defaults, an optional TOML file and `LLMGATE__SECTION__KEY`
//! environment overrides, in that order.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agents::{DEFAULT_RATE_LIMIT_BURST, DEFAULT_RATE_LIMIT_RPS};
use crate::error::{Error, Result};
use crate::router::ModelPricing;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "LLMGATE";

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Router and cache configuration
    pub router: RouterConfig,

    /// Model-to-provider routing table
    pub routing: RoutingConfig,

    /// Pricing overrides
    pub pricing: PricingConfig,

    /// Cost analytics configuration
    pub analytics: AnalyticsConfig,

    /// Agent registry configuration
    pub agents: AgentsConfig,

    /// Provider configuration
    pub providers: ProvidersConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from an optional file plus environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(Error::config(format!(
                    "configuration file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(config::File::from(path));
        }

        let config: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("providers.echo")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(toml: &str) -> Result<Self> {
        let config: Self = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the gateway cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.analytics.history_capacity == 0 {
            return Err(Error::config("analytics.history_capacity must be positive"));
        }
        if self.analytics.snapshot_interval.is_zero() {
            return Err(Error::config("analytics.snapshot_interval must be positive"));
        }
        if self.analytics.daily_budget_usd < 0.0 || self.analytics.monthly_budget_usd < 0.0 {
            return Err(Error::config("budgets must not be negative"));
        }
        if self.routing.fallback.trim().is_empty() {
            return Err(Error::config("routing.fallback must name a provider"));
        }
        if self.router.cache_enabled && self.router.cache_ttl.is_zero() {
            return Err(Error::config(
                "router.cache_ttl must be positive when caching is enabled",
            ));
        }
        if self.agents.default_rate_limit_rps < 0.0 {
            return Err(Error::config("agents.default_rate_limit_rps must not be negative"));
        }
        let breaker = &self.providers.circuit_breaker;
        if breaker.enabled && (breaker.failure_threshold == 0 || breaker.success_threshold == 0) {
            return Err(Error::config(
                "providers.circuit_breaker thresholds must be positive",
            ));
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// HTTP port
    pub port: u16,
    /// Allowed CORS origins; empty allows any
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origins: Vec::new(),
        }
    }
}

/// Router and response cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Whether completions are cached
    pub cache_enabled: bool,

    /// How long a cached response stays valid
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,

    /// Upper bound on cached entries; unbounded when absent
    pub cache_max_entries: Option<usize>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_ttl: Duration::from_secs(5 * 60),
            cache_max_entries: Some(10_000),
        }
    }
}

/// One routing table entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Provider that serves matching models
    pub provider: String,

    /// Case-insensitive model prefixes
    #[serde(default)]
    pub prefixes: Vec<String>,

    /// Case-insensitive substrings
    #[serde(default)]
    pub contains: Vec<String>,
}

/// Model-to-provider routing table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Entries evaluated in order; the first match wins
    pub routes: Vec<RouteConfig>,

    /// Provider used when no entry matches
    pub fallback: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            routes: vec![
                RouteConfig {
                    provider: "anthropic".to_string(),
                    prefixes: vec!["anthropic/".to_string(), "claude".to_string()],
                    contains: Vec::new(),
                },
                RouteConfig {
                    provider: "openai".to_string(),
                    prefixes: vec![
                        "openai/".to_string(),
                        "gpt".to_string(),
                        "o1".to_string(),
                        "o3".to_string(),
                    ],
                    contains: Vec::new(),
                },
            ],
            fallback: "openrouter".to_string(),
        }
    }
}

/// Pricing overrides layered over the built-in table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    /// Price used for models with no entry
    pub default: Option<ModelPricing>,

    /// Per-model prices
    pub models: HashMap<String, ModelPricing>,
}

/// Cost analytics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Snapshots retained (1440 = 24h at one per minute)
    pub history_capacity: usize,

    /// How often totals are snapshotted
    #[serde(with = "humantime_serde")]
    pub snapshot_interval: Duration,

    /// Daily budget in dollars; 0 disables daily alerts
    pub daily_budget_usd: f64,

    /// Monthly budget in dollars; 0 disables monthly alerts
    pub monthly_budget_usd: f64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            history_capacity: 1440,
            snapshot_interval: Duration::from_secs(60),
            daily_budget_usd: 50.0,
            monthly_budget_usd: 500.0,
        }
    }
}

/// Agent registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    /// Register the built-in system agents
    pub load_builtin: bool,

    /// Directory of `*.json` agent configurations
    pub config_dir: Option<PathBuf>,

    /// Requests per second for agents without their own limit; 0 disables the limit
    pub default_rate_limit_rps: f64,

    /// Burst allowance for agents without their own limit
    pub default_rate_limit_burst: u32,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            load_builtin: true,
            config_dir: None,
            default_rate_limit_rps: DEFAULT_RATE_LIMIT_RPS,
            default_rate_limit_burst: DEFAULT_RATE_LIMIT_BURST,
        }
    }
}

/// Provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Provider identities served by the built-in echo client, in registration order
    pub echo: Vec<String>,

    /// Circuit breaker wrapped around every provider
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            echo: vec!["openrouter".to_string()],
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

/// Per-provider circuit breaker settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Wrap providers in a breaker at all
    pub enabled: bool,

    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,

    /// Time after the last failure before a trial call is let through
    #[serde(with = "humantime_serde")]
    pub reset_timeout: Duration,

    /// Consecutive trial successes that close the circuit
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(60),
            success_threshold: 2,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (json or pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.analytics.history_capacity, 1440);
        assert_eq!(config.router.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.routing.fallback, "openrouter");
    }

    #[test]
    fn test_from_toml_overrides_sections() {
        let config = Config::from_toml(
            r#"
            [router]
            cache_ttl = "30s"

            [analytics]
            daily_budget_usd = 5.0
            snapshot_interval = "10s"

            [routing]
            fallback = "openai"

            [[routing.routes]]
            provider = "anthropic"
            prefixes = ["claude"]

            [pricing.models.my-model]
            input_per_million = 1.0
            output_per_million = 2.0
            "#,
        )
        .unwrap();

        assert_eq!(config.router.cache_ttl, Duration::from_secs(30));
        assert!(config.router.cache_enabled);
        assert_eq!(config.analytics.snapshot_interval, Duration::from_secs(10));
        assert!((config.analytics.daily_budget_usd - 5.0).abs() < f64::EPSILON);
        assert_eq!(config.routing.fallback, "openai");
        assert_eq!(config.routing.routes.len(), 1);
        assert!(config.pricing.models.contains_key("my-model"));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = Config::default();
        config.analytics.history_capacity = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_breaker_and_rate_limit_sections() {
        let config = Config::from_toml(
            r#"
            [agents]
            default_rate_limit_rps = 0.0

            [providers.circuit_breaker]
            failure_threshold = 5
            reset_timeout = "30s"
            "#,
        )
        .unwrap();

        assert!(config.agents.default_rate_limit_rps.abs() < f64::EPSILON);
        assert_eq!(config.agents.default_rate_limit_burst, DEFAULT_RATE_LIMIT_BURST);
        let breaker = config.providers.circuit_breaker;
        assert!(breaker.enabled);
        assert_eq!(breaker.failure_threshold, 5);
        assert_eq!(breaker.reset_timeout, Duration::from_secs(30));
        assert_eq!(breaker.success_threshold, 2);
    }

    #[test]
    fn test_validate_rejects_zero_breaker_threshold() {
        let mut config = Config::default();
        config.providers.circuit_breaker.failure_threshold = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.providers.circuit_breaker.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = Config::load(Some(Path::new("/nonexistent/llmgate.toml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
