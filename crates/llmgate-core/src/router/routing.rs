//! Model-to-provider routing table

use crate::config::RoutingConfig;
use crate::error::{Error, Result};
use crate::providers::ProviderRegistry;

/// Case-insensitive predicate over a model name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelMatcher {
    /// Model starts with the pattern
    Prefix(String),
    /// Model contains the pattern
    Contains(String),
}

impl ModelMatcher {
    /// Prefix matcher
    pub fn prefix(pattern: impl AsRef<str>) -> Self {
        Self::Prefix(pattern.as_ref().to_ascii_lowercase())
    }

    /// Substring matcher
    pub fn contains(pattern: impl AsRef<str>) -> Self {
        Self::Contains(pattern.as_ref().to_ascii_lowercase())
    }

    /// Test a model name that has already been lower-cased
    fn matches(&self, model: &str) -> bool {
        match self {
            Self::Prefix(p) => model.starts_with(p.as_str()),
            Self::Contains(p) => model.contains(p.as_str()),
        }
    }
}

#[derive(Debug, Clone)]
struct Route {
    matcher: ModelMatcher,
    provider: String,
}

/// Ordered routing entries plus a fallback provider.
///
/// Entries are evaluated in insertion order and the first match wins, so overlapping
/// patterns resolve deterministically.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    routes: Vec<Route>,
    fallback: String,
}

impl RoutingTable {
    /// Empty table that sends everything to `fallback`
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            routes: Vec::new(),
            fallback: fallback.into().to_ascii_lowercase(),
        }
    }

    /// Append an entry
    #[must_use]
    pub fn route(mut self, matcher: ModelMatcher, provider: impl Into<String>) -> Self {
        self.routes.push(Route {
            matcher,
            provider: provider.into().to_ascii_lowercase(),
        });
        self
    }

    /// Build a table from configuration, keeping only providers present in `registry`.
    ///
    /// Routes naming unregistered providers are dropped. An unregistered fallback is
    /// replaced by the first registered provider.
    pub fn from_config(config: &RoutingConfig, registry: &ProviderRegistry) -> Result<Self> {
        let mut table = Self::new(config.fallback.trim());
        for route in &config.routes {
            let provider = route.provider.trim();
            for prefix in &route.prefixes {
                table = table.route(ModelMatcher::prefix(prefix), provider);
            }
            for pattern in &route.contains {
                table = table.route(ModelMatcher::contains(pattern), provider);
            }
        }
        table.bind(registry)
    }

    /// Reconcile the table with the registered providers
    pub fn bind(mut self, registry: &ProviderRegistry) -> Result<Self> {
        let Some(first) = registry.ids().first() else {
            return Err(Error::config("no providers registered"));
        };

        self.routes.retain(|route| {
            let known = registry.contains(&route.provider);
            if !known {
                tracing::warn!(
                    provider = %route.provider,
                    matcher = ?route.matcher,
                    "Dropping route to unregistered provider"
                );
            }
            known
        });

        if !registry.contains(&self.fallback) {
            tracing::warn!(
                fallback = %self.fallback,
                replacement = %first,
                "Fallback provider not registered, using first registered provider"
            );
            self.fallback = first.clone();
        }

        Ok(self)
    }

    /// Provider serving `model`
    pub fn resolve(&self, model: &str) -> &str {
        let model = model.trim().to_ascii_lowercase();
        if model.is_empty() {
            return &self.fallback;
        }
        self.routes
            .iter()
            .find(|route| route.matcher.matches(&model))
            .map_or(self.fallback.as_str(), |route| route.provider.as_str())
    }

    /// Fallback provider
    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether the table has no entries
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::EchoProvider;
    use rstest::rstest;
    use std::sync::Arc;

    fn registry(ids: &[&str]) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        for id in ids {
            registry.register(Arc::new(EchoProvider::new(*id))).unwrap();
        }
        registry
    }

    fn default_table() -> RoutingTable {
        RoutingTable::from_config(
            &RoutingConfig::default(),
            &registry(&["openrouter", "anthropic", "openai"]),
        )
        .unwrap()
    }

    #[rstest]
    #[case("anthropic/claude-3-opus", "anthropic")]
    #[case("claude-3-5-sonnet", "anthropic")]
    #[case("Claude-3-Haiku", "anthropic")]
    #[case("openai/gpt-4o", "openai")]
    #[case("gpt-4o-mini", "openai")]
    #[case("o1-preview", "openai")]
    #[case("o3-mini", "openai")]
    #[case("meta-llama/llama-3-70b-instruct", "openrouter")]
    #[case("z-ai/glm-4", "openrouter")]
    #[case("", "openrouter")]
    fn test_default_routes(#[case] model: &str, #[case] provider: &str) {
        assert_eq!(default_table().resolve(model), provider);
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let table = default_table();
        let first = table.resolve("gpt-4o");
        for _ in 0..100 {
            assert_eq!(table.resolve("gpt-4o"), first);
        }
    }

    #[test]
    fn test_overlap_resolves_by_order() {
        let table = RoutingTable::new("openrouter")
            .route(ModelMatcher::contains("gpt"), "openai")
            .route(ModelMatcher::prefix("openrouter/"), "openrouter")
            .bind(&registry(&["openrouter", "openai"]))
            .unwrap();

        assert_eq!(table.resolve("openrouter/gpt-4o"), "openai");
    }

    #[test]
    fn test_unregistered_route_dropped() {
        let table = RoutingTable::from_config(
            &RoutingConfig::default(),
            &registry(&["openrouter", "openai"]),
        )
        .unwrap();

        assert_eq!(table.resolve("claude-3-opus"), "openrouter");
        assert_eq!(table.resolve("gpt-4o"), "openai");
    }

    #[test]
    fn test_unregistered_fallback_replaced() {
        let table =
            RoutingTable::from_config(&RoutingConfig::default(), &registry(&["anthropic"]))
                .unwrap();

        assert_eq!(table.fallback(), "anthropic");
        assert_eq!(table.resolve("mistral-large"), "anthropic");
    }

    #[test]
    fn test_empty_registry_rejected() {
        let err = RoutingTable::from_config(&RoutingConfig::default(), &ProviderRegistry::new())
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
