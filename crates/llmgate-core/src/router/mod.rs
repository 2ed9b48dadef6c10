//! Provider router
//!
//! The router turns a [`CompletionRequest`] into a provider call:
//!
//! 1. The model is taken from the request, or from the agent's default when the request
//!    leaves it empty. Agent sampling defaults fill unset parameters.
//! 2. The [`RoutingTable`] maps the model to a registered provider.
//! 3. The response cache is consulted under a fingerprint of the resolved request.
//! 4. On a miss the provider is called, the response is cached and its cost and tokens are
//!    added to the running totals.
//!
//! Cancellation and deadlines are honored until the provider produces an outcome; a request
//! abandoned before then leaves no trace in the totals or the cache.

mod cache;
mod fingerprint;
mod pricing;
mod routing;
mod state;
mod stream;

pub use cache::{ResponseCache, ResponseStore};
pub use fingerprint::Fingerprint;
pub use pricing::{ModelPricing, PricingTable, DEFAULT_PRICING};
pub use routing::{ModelMatcher, RoutingTable};
pub use state::{CloudOutcome, RouterMetricsState};

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, warn};

use self::stream::{MeteredStream, StreamEnd};
use crate::agents::{AgentDirectory, AgentRegistry};
use crate::config::{Config, RouterConfig, RoutingConfig};
use crate::error::{Error, Result};
use crate::models::{
    AgentUsage, BudgetStatus, CacheStatus, CompletionRequest, CompletionResponse, MicroUsd,
    RouterTotals, Usage,
};
use crate::providers::{ChunkStream, ProviderRegistry, RequestContext};
use crate::telemetry::{MetricsSink, TokenKind};

/// A request after model, provider and sampling defaults have been applied
#[derive(Debug, Clone)]
struct Resolved {
    provider: String,
    model: String,
    request: CompletionRequest,
}

/// Builder for [`Router`]
pub struct RouterBuilder {
    providers: ProviderRegistry,
    agents: Option<Arc<dyn AgentDirectory>>,
    routing: RoutingConfig,
    table: Option<RoutingTable>,
    pricing: PricingTable,
    cache: RouterConfig,
    store: Option<Arc<dyn ResponseStore>>,
    sink: Option<Arc<dyn MetricsSink>>,
    daily_budget: MicroUsd,
    monthly_budget: MicroUsd,
}

impl RouterBuilder {
    fn new(providers: ProviderRegistry) -> Self {
        Self {
            providers,
            agents: None,
            routing: RoutingConfig::default(),
            table: None,
            pricing: PricingTable::new(),
            cache: RouterConfig::default(),
            store: None,
            sink: None,
            daily_budget: MicroUsd::ZERO,
            monthly_budget: MicroUsd::ZERO,
        }
    }

    /// Agent directory consulted for default models
    #[must_use]
    pub fn agents(mut self, agents: Arc<dyn AgentDirectory>) -> Self {
        self.agents = Some(agents);
        self
    }

    /// Routing table described by configuration
    #[must_use]
    pub fn routing(mut self, routing: RoutingConfig) -> Self {
        self.routing = routing;
        self.table = None;
        self
    }

    /// Prebuilt routing table
    #[must_use]
    pub fn routing_table(mut self, table: RoutingTable) -> Self {
        self.table = Some(table);
        self
    }

    /// Pricing used to cost provider calls
    #[must_use]
    pub fn pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = pricing;
        self
    }

    /// Cache switch, TTL and capacity
    #[must_use]
    pub fn cache(mut self, config: RouterConfig) -> Self {
        self.cache = config;
        self
    }

    /// Replace the in-memory response store
    #[must_use]
    pub fn store(mut self, store: Arc<dyn ResponseStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Metrics destination
    #[must_use]
    pub fn metrics(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Budgets reported by [`Router::budget_status`]
    #[must_use]
    pub fn budgets(mut self, daily: MicroUsd, monthly: MicroUsd) -> Self {
        self.daily_budget = daily;
        self.monthly_budget = monthly;
        self
    }

    /// Validate and build the router
    pub fn build(self) -> Result<Router> {
        if self.providers.is_empty() {
            return Err(Error::config("router needs at least one registered provider"));
        }

        let routing = match self.table {
            Some(table) => table.bind(&self.providers)?,
            None => RoutingTable::from_config(&self.routing, &self.providers)?,
        };

        let cache = if self.cache.cache_enabled {
            Some(self.store.unwrap_or_else(|| {
                let cache = match self.cache.cache_max_entries {
                    Some(max) => ResponseCache::with_capacity(max),
                    None => ResponseCache::new(),
                };
                Arc::new(cache) as Arc<dyn ResponseStore>
            }))
        } else {
            None
        };

        let agents = self
            .agents
            .unwrap_or_else(|| Arc::new(AgentRegistry::new()) as Arc<dyn AgentDirectory>);

        debug!(
            providers = ?self.providers.ids(),
            routes = routing.len(),
            fallback = routing.fallback(),
            cache_enabled = cache.is_some(),
            "Router built"
        );

        Ok(Router {
            providers: self.providers,
            routing,
            agents,
            pricing: Arc::new(self.pricing),
            cache,
            cache_ttl: self.cache.cache_ttl,
            state: Arc::new(RouterMetricsState::new()),
            sink: self.sink,
            daily_budget: self.daily_budget,
            monthly_budget: self.monthly_budget,
        })
    }
}

/// Routes completion requests to providers, with caching and cost accounting
pub struct Router {
    providers: ProviderRegistry,
    routing: RoutingTable,
    agents: Arc<dyn AgentDirectory>,
    pricing: Arc<PricingTable>,
    cache: Option<Arc<dyn ResponseStore>>,
    cache_ttl: Duration,
    state: Arc<RouterMetricsState>,
    sink: Option<Arc<dyn MetricsSink>>,
    daily_budget: MicroUsd,
    monthly_budget: MicroUsd,
}

impl Router {
    /// Start building a router over `providers`
    pub fn builder(providers: ProviderRegistry) -> RouterBuilder {
        RouterBuilder::new(providers)
    }

    /// Router with default routing, pricing and cache settings
    pub fn new(providers: ProviderRegistry, agents: Arc<dyn AgentDirectory>) -> Result<Self> {
        Self::builder(providers).agents(agents).build()
    }

    /// Router configured from the gateway configuration
    pub fn from_config(
        config: &Config,
        providers: ProviderRegistry,
        agents: Arc<dyn AgentDirectory>,
        sink: Option<Arc<dyn MetricsSink>>,
    ) -> Result<Self> {
        let mut builder = Self::builder(providers)
            .agents(agents)
            .routing(config.routing.clone())
            .pricing(PricingTable::from_config(&config.pricing))
            .cache(config.router.clone())
            .budgets(
                MicroUsd::from_usd(config.analytics.daily_budget_usd),
                MicroUsd::from_usd(config.analytics.monthly_budget_usd),
            );
        if let Some(sink) = sink {
            builder = builder.metrics(sink);
        }
        builder.build()
    }

    /// Complete a request with no cancellation or deadline
    pub async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        self.complete_with(request, &RequestContext::new()).await
    }

    /// Complete a request, serving it from cache when possible
    pub async fn complete_with(
        &self,
        request: &CompletionRequest,
        ctx: &RequestContext,
    ) -> Result<CompletionResponse> {
        request.validate()?;
        let started = Instant::now();
        let resolved = self.resolve_request(request);

        let fingerprint = self.cache.as_ref().map(|_| {
            Fingerprint::compute(
                &resolved.request.agent_id,
                &resolved.provider,
                &resolved.model,
                &resolved.request.messages,
                &resolved.request.sampling,
            )
        });

        if let (Some(cache), Some(fingerprint)) = (&self.cache, &fingerprint) {
            match cache.get(fingerprint) {
                Ok(Some(response)) => {
                    let agent = self.state.record_hit(&resolved.request.agent_id, Utc::now());
                    self.observe(&resolved, &response.model, CacheStatus::Hit, started, agent);
                    debug!(
                        agent_id = %resolved.request.agent_id,
                        provider = %resolved.provider,
                        model = %response.model,
                        "Cache hit"
                    );
                    return Ok(response);
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Cache lookup failed, treating as miss"),
            }
        }

        let provider = self
            .providers
            .get(&resolved.provider)
            .ok_or_else(|| Error::not_found("provider", &resolved.provider))?;

        let outcome = guard(ctx, provider.complete(&resolved.request, ctx)).await?;

        let response = match outcome {
            Ok(response) => response,
            Err(source) => {
                self.record_failure(&resolved);
                return Err(Error::provider(&resolved.provider, source));
            }
        };

        if let (Some(cache), Some(fingerprint)) = (&self.cache, fingerprint) {
            if let Err(e) = cache.put(fingerprint, response.clone(), self.cache_ttl) {
                warn!(error = %e, "Cache write failed");
            }
        }

        let model = billed_model(&resolved, &response.model);
        let cost = self.pricing.cost(model, &response.usage);
        let agent = self.state.record_cloud(
            &resolved.request.agent_id,
            &resolved.provider,
            CloudOutcome::Completed {
                usage: response.usage,
                cost,
            },
            Utc::now(),
        );
        self.observe(&resolved, model, CacheStatus::Miss, started, agent);
        record_usage(self.sink.as_deref(), &resolved.provider, model, &response.usage, cost);

        debug!(
            agent_id = %resolved.request.agent_id,
            provider = %resolved.provider,
            model,
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            cost = %cost,
            "Provider call completed"
        );

        Ok(response)
    }

    /// Stream a request with no cancellation or deadline
    pub async fn stream(&self, request: &CompletionRequest) -> Result<ChunkStream> {
        self.stream_with(request, &RequestContext::new()).await
    }

    /// Stream a request from its provider.
    ///
    /// Streams bypass the cache. The call is accounted for when the stream yields its
    /// terminal chunk or an error.
    pub async fn stream_with(
        &self,
        request: &CompletionRequest,
        ctx: &RequestContext,
    ) -> Result<ChunkStream> {
        request.validate()?;
        let started = Instant::now();
        let resolved = self.resolve_request(request);

        let provider = self
            .providers
            .get(&resolved.provider)
            .ok_or_else(|| Error::not_found("provider", &resolved.provider))?;

        let inner = match guard(ctx, provider.stream(&resolved.request, ctx)).await? {
            Ok(inner) => inner,
            Err(source) => {
                self.record_failure(&resolved);
                return Err(Error::provider(&resolved.provider, source));
            }
        };

        let state = Arc::clone(&self.state);
        let pricing = Arc::clone(&self.pricing);
        let sink = self.sink.clone();
        let agent_id = resolved.request.agent_id.clone();
        let provider_id = resolved.provider.clone();
        let resolved_model = resolved.model.clone();

        let finalize = move |end: StreamEnd| {
            let now = Utc::now();
            match end {
                StreamEnd::Completed { usage, model } => {
                    let usage = usage.unwrap_or_default();
                    let model = if resolved_model.is_empty() {
                        model.unwrap_or_default()
                    } else {
                        resolved_model
                    };
                    let cost = pricing.cost(&model, &usage);
                    let agent = state.record_cloud(
                        &agent_id,
                        &provider_id,
                        CloudOutcome::Completed { usage, cost },
                        now,
                    );
                    if let Some(sink) = sink.as_deref() {
                        sink.record_request(
                            &provider_id,
                            &model,
                            &agent_id,
                            CacheStatus::Stream,
                            started.elapsed(),
                        );
                        sink.update_cache_hit_rate(&agent_id, agent.cache_hit_rate());
                    }
                    record_usage(sink.as_deref(), &provider_id, &model, &usage, cost);
                }
                StreamEnd::Failed => {
                    let agent =
                        state.record_cloud(&agent_id, &provider_id, CloudOutcome::Failed, now);
                    if let Some(sink) = sink.as_deref() {
                        sink.record_provider_error(&provider_id);
                        sink.update_cache_hit_rate(&agent_id, agent.cache_hit_rate());
                    }
                    warn!(agent_id = %agent_id, provider = %provider_id, "Stream failed");
                }
            }
        };

        Ok(Box::pin(MeteredStream::new(
            inner,
            resolved.provider,
            resolved.model,
            ctx.cancellation().clone(),
            finalize,
        )))
    }

    /// Provider that would serve `model`
    pub fn resolve(&self, model: &str) -> &str {
        self.routing.resolve(model)
    }

    /// Provider that would serve `request`, after the agent's default model applies
    pub fn route(&self, request: &CompletionRequest) -> &str {
        let agent = self.agents.get(&request.agent_id);
        let model = request
            .requested_model()
            .or_else(|| agent.default_model())
            .unwrap_or_default();
        self.routing.resolve(model)
    }

    /// Running totals as of now
    pub fn totals(&self) -> RouterTotals {
        self.state.totals(Utc::now())
    }

    /// Current spend against the configured budgets
    pub fn budget_status(&self) -> BudgetStatus {
        BudgetStatus::new(&self.totals(), self.daily_budget, self.monthly_budget)
    }

    /// Zero all totals and drop cached responses
    pub fn reset(&self) {
        self.state.reset(Utc::now());
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    /// Registered providers
    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Pricing table in use
    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    fn resolve_request(&self, request: &CompletionRequest) -> Resolved {
        let agent = self.agents.get(&request.agent_id);
        let model = request
            .requested_model()
            .or_else(|| agent.default_model())
            .unwrap_or_default()
            .to_string();
        let provider = self.routing.resolve(&model).to_string();

        let mut request = request.clone();
        request.model = (!model.is_empty()).then(|| model.clone());
        if request.sampling.max_tokens.is_none() {
            request.sampling.max_tokens = agent.max_tokens;
        }
        if request.sampling.temperature.is_none() {
            request.sampling.temperature = agent.temperature;
        }

        Resolved {
            provider,
            model,
            request,
        }
    }

    fn record_failure(&self, resolved: &Resolved) {
        let agent = self.state.record_cloud(
            &resolved.request.agent_id,
            &resolved.provider,
            CloudOutcome::Failed,
            Utc::now(),
        );
        if let Some(sink) = &self.sink {
            sink.record_provider_error(&resolved.provider);
            sink.update_cache_hit_rate(&resolved.request.agent_id, agent.cache_hit_rate());
        }
        warn!(
            agent_id = %resolved.request.agent_id,
            provider = %resolved.provider,
            model = %resolved.model,
            "Provider call failed"
        );
    }

    fn observe(
        &self,
        resolved: &Resolved,
        model: &str,
        status: CacheStatus,
        started: Instant,
        agent: AgentUsage,
    ) {
        if let Some(sink) = &self.sink {
            sink.record_request(
                &resolved.provider,
                model,
                &resolved.request.agent_id,
                status,
                started.elapsed(),
            );
            sink.update_cache_hit_rate(&resolved.request.agent_id, agent.cache_hit_rate());
        }
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("providers", &self.providers)
            .field("routing", &self.routing)
            .field("cache_enabled", &self.cache.is_some())
            .field("cache_ttl", &self.cache_ttl)
            .finish_non_exhaustive()
    }
}

/// Model used for pricing and labels: the resolved model, or the provider's own choice
/// when none was resolved
fn billed_model<'a>(resolved: &'a Resolved, reported: &'a str) -> &'a str {
    if resolved.model.is_empty() {
        reported
    } else {
        &resolved.model
    }
}

fn record_usage(
    sink: Option<&dyn MetricsSink>,
    provider: &str,
    model: &str,
    usage: &Usage,
    cost: MicroUsd,
) {
    if let Some(sink) = sink {
        sink.record_tokens(TokenKind::Prompt, provider, model, usage.prompt_tokens);
        sink.record_tokens(TokenKind::Completion, provider, model, usage.completion_tokens);
        sink.record_cost(provider, model, cost);
    }
}

/// Run `fut` unless the caller cancels or the deadline passes first
async fn guard<T>(ctx: &RequestContext, fut: impl Future<Output = T>) -> Result<T> {
    let deadline = async {
        match ctx.deadline() {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        biased;
        () = ctx.cancellation().cancelled() => Err(Error::Cancelled),
        () = deadline => Err(Error::DeadlineExceeded),
        out = fut => Ok(out),
    }
}
