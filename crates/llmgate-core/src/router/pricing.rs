//! Pricing table for LLM calls
//!
//! Converts reported token usage into spend using per-model prices.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::PricingConfig;
use crate::models::{MicroUsd, Usage};

/// Pricing information for a model (per million tokens)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Cost per million input tokens
    pub input_per_million: f64,
    /// Cost per million output tokens
    pub output_per_million: f64,
}

impl ModelPricing {
    /// Create a price pair
    pub const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    /// Cost of a call, rounded to whole micro-dollars.
    ///
    /// A price per million tokens multiplied by a token count is already an amount in
    /// micro-dollars, so only the final sum is rounded.
    #[allow(clippy::cast_precision_loss)]
    pub fn cost(&self, usage: &Usage) -> MicroUsd {
        let micros = usage.prompt_tokens as f64 * self.input_per_million
            + usage.completion_tokens as f64 * self.output_per_million;
        MicroUsd::from_usd(micros / 1_000_000.0)
    }
}

/// Price applied to models with no table entry
pub const DEFAULT_PRICING: ModelPricing = ModelPricing::new(1.00, 3.00);

/// Per-model price lookup
#[derive(Debug, Clone)]
pub struct PricingTable {
    pricing: HashMap<String, ModelPricing>,
    default: ModelPricing,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PricingTable {
    /// Create a table with the built-in prices
    pub fn new() -> Self {
        let builtin: &[(&str, f64, f64)] = &[
            // Anthropic
            ("claude-3-opus", 15.0, 75.0),
            ("claude-3-5-sonnet", 3.0, 15.0),
            ("claude-3-5-haiku", 0.80, 4.0),
            ("claude-3-haiku", 0.25, 1.25),
            ("claude-sonnet-4", 3.0, 15.0),
            ("claude-opus-4", 15.0, 75.0),
            // OpenAI
            ("gpt-4", 30.0, 60.0),
            ("gpt-4-turbo", 10.0, 30.0),
            ("gpt-4o", 2.50, 10.0),
            ("gpt-4o-mini", 0.15, 0.60),
            ("gpt-3.5-turbo", 0.50, 1.50),
            ("o1", 15.0, 60.0),
            ("o1-mini", 3.0, 12.0),
            // Google
            ("gemini-1.5-pro", 1.25, 5.0),
            ("gemini-1.5-flash", 0.075, 0.30),
            ("gemini-2.0-flash", 0.10, 0.40),
            ("gemini-pro-1.5", 1.25, 5.0),
            // Open models commonly served through aggregators
            ("llama-3-70b-instruct", 0.59, 0.79),
            ("mistral-large", 2.0, 6.0),
            ("mistral-small", 0.2, 0.6),
        ];

        let pricing = builtin
            .iter()
            .map(|&(model, input, output)| (model.to_string(), ModelPricing::new(input, output)))
            .collect();

        Self {
            pricing,
            default: DEFAULT_PRICING,
        }
    }

    /// Built-in prices with configuration overrides applied
    pub fn from_config(config: &PricingConfig) -> Self {
        let mut table = Self::new();
        if let Some(default) = config.default {
            table.default = default;
        }
        for (model, pricing) in &config.models {
            table.set_pricing(model.clone(), *pricing);
        }
        table
    }

    /// Cost of a call against `model`
    pub fn cost(&self, model: &str, usage: &Usage) -> MicroUsd {
        let pricing = self.get_pricing(model).unwrap_or_else(|| {
            tracing::debug!(model, "No pricing entry, using default price");
            &self.default
        });
        pricing.cost(usage)
    }

    /// Find pricing for a model.
    ///
    /// Tries the exact name, then the name without a `vendor/` prefix, then the longest
    /// table key the name starts with (e.g. "claude-3-5-sonnet-20241022" matches
    /// "claude-3-5-sonnet").
    pub fn get_pricing(&self, model: &str) -> Option<&ModelPricing> {
        let model = model.trim().to_ascii_lowercase();
        let bare = model.rsplit('/').next().unwrap_or(&model);

        for candidate in [model.as_str(), bare] {
            if let Some(pricing) = self.pricing.get(candidate) {
                return Some(pricing);
            }
        }

        self.pricing
            .iter()
            .filter(|(key, _)| model.starts_with(key.as_str()) || bare.starts_with(key.as_str()))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, pricing)| pricing)
    }

    /// Add or update pricing for a model
    pub fn set_pricing(&mut self, model: impl Into<String>, pricing: ModelPricing) {
        self.pricing
            .insert(model.into().to_ascii_lowercase(), pricing);
    }

    /// Price used for unknown models
    pub fn default_pricing(&self) -> ModelPricing {
        self.default
    }

    /// All entries, sorted by model name
    pub fn entries(&self) -> Vec<(&str, ModelPricing)> {
        let mut entries: Vec<_> = self
            .pricing
            .iter()
            .map(|(model, pricing)| (model.as_str(), *pricing))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }
}
