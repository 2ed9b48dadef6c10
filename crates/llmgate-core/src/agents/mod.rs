//! Agent configurations
//!
//! Each agent carries the model it uses when a request names none, plus sampling defaults
//! and a request rate limit. Agents without their own limit share the registry default.

mod limiter;

pub use limiter::{RateLimit, DEFAULT_RATE_LIMIT_BURST, DEFAULT_RATE_LIMIT_RPS};

use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use self::limiter::TokenBucket;
use crate::error::{Error, Result};

/// Model used by the built-in agents
pub const BUILTIN_DEFAULT_MODEL: &str = "anthropic/claude-3-haiku";

/// Model used by the built-in protocol adapter agent
pub const ADAPTER_DEFAULT_MODEL: &str = "openai/gpt-5.2-codex";

/// Idle buckets are pruned once this many agents are tracked
const MAX_TRACKED_BUCKETS: usize = 10_000;

/// Where an agent's completions are expected to run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    /// Small model served locally
    LocalSlm,
    /// Hosted large model
    CloudLlm,
    /// Either, decided per request
    #[default]
    Hybrid,
}

/// Per-agent configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent identifier
    #[serde(default)]
    pub id: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Model used when a request leaves the model empty
    #[serde(default)]
    pub default_model: Option<String>,

    /// Applied when a request leaves `max_tokens` unset
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// Applied when a request leaves `temperature` unset
    #[serde(default)]
    pub temperature: Option<f64>,

    /// Serving tier
    #[serde(default)]
    pub model_tier: ModelTier,

    /// Sustained requests per second; the registry default applies when unset
    #[serde(default)]
    pub rate_limit_rps: Option<f64>,

    /// Burst allowance; defaults to the rate rounded up when only the rate is set
    #[serde(default)]
    pub rate_limit_burst: Option<u32>,
}

impl AgentConfig {
    /// Configuration for an agent with no registry entry: no default model, no sampling
    /// defaults
    pub fn unknown(agent_id: impl Into<String>) -> Self {
        let id = agent_id.into();
        Self {
            name: id.clone(),
            id,
            default_model: None,
            max_tokens: None,
            temperature: None,
            model_tier: ModelTier::default(),
            rate_limit_rps: None,
            rate_limit_burst: None,
        }
    }

    /// The agent's own rate limit, if it sets one
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn rate_limit(&self) -> Option<RateLimit> {
        let rps = self.rate_limit_rps?;
        let burst = self
            .rate_limit_burst
            .unwrap_or_else(|| rps.ceil().clamp(1.0, f64::from(u32::MAX)) as u32);
        Some(RateLimit::new(rps, burst))
    }

    /// The default model, if one is set and non-blank
    pub fn default_model(&self) -> Option<&str> {
        self.default_model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }
}

/// Synchronous agent lookup used by the router
pub trait AgentDirectory: Send + Sync {
    /// Configuration for `agent_id`, or a default for unknown agents
    fn get(&self, agent_id: &str) -> AgentConfig;
}

/// In-memory agent registry with per-agent request limits
#[derive(Debug, Default)]
pub struct AgentRegistry {
    configs: RwLock<HashMap<String, AgentConfig>>,
    buckets: Mutex<HashMap<String, TokenBucket>>,
    default_limit: RateLimit,
}

impl AgentRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit applied to agents that set none; a zero rate disables it
    #[must_use]
    pub fn with_default_limit(mut self, limit: RateLimit) -> Self {
        self.default_limit = limit;
        self
    }

    /// Registry pre-loaded with the built-in agents
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.load_builtin();
        registry
    }

    /// Add or replace an agent; its request budget starts over
    pub fn register(&self, config: AgentConfig) {
        debug!(agent_id = %config.id, model = ?config.default_model, "Registered agent");
        self.buckets.lock().remove(&config.id);
        self.configs.write().insert(config.id.clone(), config);
    }

    /// Limit in force for `agent_id`
    pub fn rate_limit(&self, agent_id: &str) -> RateLimit {
        self.configs
            .read()
            .get(agent_id)
            .and_then(AgentConfig::rate_limit)
            .unwrap_or(self.default_limit)
    }

    /// Admit one request from `agent_id` or fail with [`Error::RateLimited`]
    pub fn check_rate(&self, agent_id: &str) -> Result<()> {
        self.check_rate_at(agent_id, Instant::now())
    }

    /// [`check_rate`](Self::check_rate) against an explicit clock reading
    pub fn check_rate_at(&self, agent_id: &str, now: Instant) -> Result<()> {
        let limit = self.rate_limit(agent_id);
        if !limit.is_enabled() {
            return Ok(());
        }

        let mut buckets = self.buckets.lock();
        if buckets.len() >= MAX_TRACKED_BUCKETS && !buckets.contains_key(agent_id) {
            buckets.retain(|_, bucket| !bucket.is_full(now));
        }

        let bucket = buckets
            .entry(agent_id.to_string())
            .or_insert_with(|| TokenBucket::new(limit, now));
        if bucket.limit() != limit {
            *bucket = TokenBucket::new(limit, now);
        }

        bucket.try_acquire(now).map_err(|retry_after| {
            debug!(agent_id, ?retry_after, "Rate limit exceeded");
            Error::RateLimited {
                agent_id: agent_id.to_string(),
                retry_after,
            }
        })
    }

    /// All registered agents, sorted by id
    pub fn list(&self) -> Vec<AgentConfig> {
        let mut agents: Vec<_> = self.configs.read().values().cloned().collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        agents
    }

    /// Number of registered agents
    pub fn len(&self) -> usize {
        self.configs.read().len()
    }

    /// Whether no agent is registered
    pub fn is_empty(&self) -> bool {
        self.configs.read().is_empty()
    }

    /// Register the built-in system agents
    pub fn load_builtin(&self) {
        // (id, name, max_tokens, temperature, rps, burst)
        let builtin: &[(&str, &str, u32, f64, f64, u32)] = &[
            ("ada", "Ada Lovelace - Algorithmic Architect", 8000, 0.7, 10.0, 20),
            ("lea", "Lea Verou - Implementation Reviewer", 4000, 0.5, 15.0, 30),
            ("phil", "Phil Tetlock - Forecast Analyst", 8000, 0.3, 10.0, 20),
            ("david", "David Dunning - Metacognitive Guardian", 8000, 0.7, 5.0, 10),
            ("milton", "Milton Friedman - Ops Caretaker", 4000, 0.3, 10.0, 20),
            ("prompt-engineer", "Prompt Engineer", 4000, 0.5, 10.0, 20),
            ("ai-engineer", "AI Engineer", 4000, 0.5, 10.0, 20),
            ("universal-adapter", "Universal Protocol Adapter", 8192, 0.1, 20.0, 40),
        ];

        for &(id, name, max_tokens, temperature, rps, burst) in builtin {
            let model = if id == "universal-adapter" {
                ADAPTER_DEFAULT_MODEL
            } else {
                BUILTIN_DEFAULT_MODEL
            };
            self.register(AgentConfig {
                id: id.to_string(),
                name: name.to_string(),
                default_model: Some(model.to_string()),
                max_tokens: Some(max_tokens),
                temperature: Some(temperature),
                model_tier: ModelTier::CloudLlm,
                rate_limit_rps: Some(rps),
                rate_limit_burst: Some(burst),
            });
        }
    }

    /// Load every `*.json` file in `dir`; a missing `id` defaults to the file stem.
    ///
    /// Returns the number of agents loaded.
    pub fn load_from_dir(&self, dir: &Path) -> Result<usize> {
        let mut paths: Vec<_> = std::fs::read_dir(dir)
            .map_err(|e| Error::config(format!("read agent dir {}: {e}", dir.display())))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        for path in &paths {
            let data = std::fs::read_to_string(path)?;
            let mut config: AgentConfig = serde_json::from_str(&data)
                .map_err(|e| Error::config(format!("parse {}: {e}", path.display())))?;

            if config.id.trim().is_empty() {
                config.id = path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default();
            }
            if config.name.is_empty() {
                config.name = config.id.clone();
            }
            self.register(config);
        }

        info!(count = paths.len(), dir = %dir.display(), "Loaded agent configurations");
        Ok(paths.len())
    }
}

impl AgentDirectory for AgentRegistry {
    fn get(&self, agent_id: &str) -> AgentConfig {
        self.configs
            .read()
            .get(agent_id)
            .cloned()
            .unwrap_or_else(|| AgentConfig::unknown(agent_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builtin_agents() {
        let registry = AgentRegistry::with_builtin();
        let ada = registry.get("ada");

        assert_eq!(ada.default_model(), Some(BUILTIN_DEFAULT_MODEL));
        assert_eq!(ada.max_tokens, Some(8000));
        assert!(registry.list().iter().any(|a| a.id == "david"));
    }

    #[test]
    fn test_builtin_limits_and_tiers() {
        let registry = AgentRegistry::with_builtin();

        assert_eq!(registry.rate_limit("lea"), RateLimit::new(15.0, 30));
        assert_eq!(registry.rate_limit("universal-adapter"), RateLimit::new(20.0, 40));
        assert_eq!(
            registry.get("universal-adapter").default_model(),
            Some(ADAPTER_DEFAULT_MODEL)
        );
        assert!(registry
            .list()
            .iter()
            .all(|agent| agent.model_tier == ModelTier::CloudLlm));
    }

    #[test]
    fn test_unknown_agent_gets_default_limit() {
        let registry = AgentRegistry::with_builtin();

        assert_eq!(registry.get("ghost").model_tier, ModelTier::Hybrid);
        assert_eq!(
            registry.rate_limit("ghost"),
            RateLimit::new(DEFAULT_RATE_LIMIT_RPS, DEFAULT_RATE_LIMIT_BURST)
        );
    }

    #[test]
    fn test_check_rate_rejects_after_burst() {
        let registry = AgentRegistry::new();
        let mut config = AgentConfig::unknown("scout");
        config.rate_limit_rps = Some(1.0);
        config.rate_limit_burst = Some(1);
        registry.register(config);
        let now = Instant::now();

        assert!(registry.check_rate_at("scout", now).is_ok());
        match registry.check_rate_at("scout", now) {
            Err(Error::RateLimited {
                agent_id,
                retry_after,
            }) => {
                assert_eq!(agent_id, "scout");
                assert_eq!(retry_after, std::time::Duration::from_secs(1));
            }
            other => panic!("unexpected result: {other:?}"),
        }

        // Other agents draw from their own buckets
        assert!(registry.check_rate_at("ghost", now).is_ok());
        assert!(registry
            .check_rate_at("scout", now + std::time::Duration::from_secs(1))
            .is_ok());
    }

    #[test]
    fn test_register_resets_bucket() {
        let registry = AgentRegistry::new();
        let mut config = AgentConfig::unknown("scout");
        config.rate_limit_rps = Some(1.0);
        config.rate_limit_burst = Some(1);
        registry.register(config.clone());
        let now = Instant::now();

        assert!(registry.check_rate_at("scout", now).is_ok());
        assert!(registry.check_rate_at("scout", now).is_err());

        registry.register(config);
        assert!(registry.check_rate_at("scout", now).is_ok());
    }

    #[test]
    fn test_zero_default_rate_disables_limiting() {
        let registry = AgentRegistry::new().with_default_limit(RateLimit::new(0.0, 0));
        let now = Instant::now();

        for _ in 0..100 {
            assert!(registry.check_rate_at("ghost", now).is_ok());
        }
    }

    #[test]
    fn test_rate_only_derives_burst() {
        let mut config = AgentConfig::unknown("x");
        config.rate_limit_rps = Some(2.5);
        assert_eq!(config.rate_limit(), Some(RateLimit::new(2.5, 3)));
        assert_eq!(AgentConfig::unknown("y").rate_limit(), None);
    }

    #[test]
    fn test_unknown_agent_has_no_default_model() {
        let registry = AgentRegistry::new();
        let config = registry.get("ghost");

        assert_eq!(config.id, "ghost");
        assert_eq!(config.default_model(), None);
        assert_eq!(config.max_tokens, None);
    }

    #[test]
    fn test_blank_default_model_is_none() {
        let mut config = AgentConfig::unknown("x");
        config.default_model = Some("  ".to_string());
        assert_eq!(config.default_model(), None);
    }

    #[test]
    fn test_load_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("scout.json"),
            r#"{"default_model": "openai/gpt-4o-mini", "max_tokens": 512}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("other.json"),
            r#"{"id": "planner", "temperature": 0.2, "model_tier": "local_slm"}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let registry = AgentRegistry::new();
        assert_eq!(registry.load_from_dir(dir.path()).unwrap(), 2);

        let scout = registry.get("scout");
        assert_eq!(scout.name, "scout");
        assert_eq!(scout.default_model(), Some("openai/gpt-4o-mini"));
        let planner = registry.get("planner");
        assert_eq!(planner.temperature, Some(0.2));
        assert_eq!(planner.model_tier, ModelTier::LocalSlm);
    }

    #[test]
    fn test_load_from_dir_rejects_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{").unwrap();

        let err = AgentRegistry::new().load_from_dir(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
