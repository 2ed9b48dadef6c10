//! Running call, cost and token totals for the router

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use parking_lot::RwLock;

use crate::models::{AgentUsage, MicroUsd, ProviderCost, RouterTotals, Usage};

/// Result of a call that reached a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudOutcome {
    /// The provider answered
    Completed {
        /// Reported usage
        usage: Usage,
        /// Priced cost of the call
        cost: MicroUsd,
    },
    /// The provider failed
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Period {
    day: NaiveDate,
    year: i32,
    month: u32,
}

impl Period {
    fn at(now: DateTime<Utc>) -> Self {
        let day = now.date_naive();
        Self {
            day,
            year: day.year(),
            month: day.month(),
        }
    }

    fn same_month(&self, other: &Self) -> bool {
        self.year == other.year && self.month == other.month
    }
}

#[derive(Debug)]
struct Counters {
    total_calls: u64,
    cloud_hits: u64,
    cache_hits: u64,
    provider_errors: u64,
    total_cost: MicroUsd,
    prompt_tokens: u64,
    completion_tokens: u64,
    period: Period,
    daily_cost: MicroUsd,
    monthly_cost: MicroUsd,
    providers: BTreeMap<String, ProviderCost>,
    agents: HashMap<String, AgentUsage>,
}

impl Counters {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            total_calls: 0,
            cloud_hits: 0,
            cache_hits: 0,
            provider_errors: 0,
            total_cost: MicroUsd::ZERO,
            prompt_tokens: 0,
            completion_tokens: 0,
            period: Period::at(now),
            daily_cost: MicroUsd::ZERO,
            monthly_cost: MicroUsd::ZERO,
            providers: BTreeMap::new(),
            agents: HashMap::new(),
        }
    }

    /// Zero the period spend whose UTC boundary has passed
    fn roll_over(&mut self, now: DateTime<Utc>) {
        let current = Period::at(now);
        if current.day <= self.period.day {
            return;
        }

        self.daily_cost = MicroUsd::ZERO;
        for usage in self.agents.values_mut() {
            usage.daily_spend = MicroUsd::ZERO;
        }
        if !current.same_month(&self.period) {
            self.monthly_cost = MicroUsd::ZERO;
        }
        self.period = current;
    }

    fn agent(&mut self, agent_id: &str) -> &mut AgentUsage {
        self.agents.entry(agent_id.to_string()).or_default()
    }
}

/// Thread-safe router totals.
///
/// Every outcome updates all affected counters inside one write section, so a reader
/// always sees `cache_hits + cloud_hits == total_calls`.
#[derive(Debug)]
pub struct RouterMetricsState {
    inner: RwLock<Counters>,
}

impl Default for RouterMetricsState {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterMetricsState {
    /// Empty totals for the current periods
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Counters::new(Utc::now())),
        }
    }

    /// Count a call served from cache, returning the agent's updated usage
    pub fn record_hit(&self, agent_id: &str, now: DateTime<Utc>) -> AgentUsage {
        let mut counters = self.inner.write();
        counters.roll_over(now);

        counters.total_calls += 1;
        counters.cache_hits += 1;

        let agent = counters.agent(agent_id);
        agent.calls += 1;
        agent.cache_hits += 1;
        *agent
    }

    /// Count a call that reached `provider`, returning the agent's updated usage
    pub fn record_cloud(
        &self,
        agent_id: &str,
        provider: &str,
        outcome: CloudOutcome,
        now: DateTime<Utc>,
    ) -> AgentUsage {
        let mut counters = self.inner.write();
        counters.roll_over(now);

        counters.total_calls += 1;
        counters.cloud_hits += 1;

        let (usage, cost) = match outcome {
            CloudOutcome::Completed { usage, cost } => (usage, cost),
            CloudOutcome::Failed => {
                counters.provider_errors += 1;
                (Usage::default(), MicroUsd::ZERO)
            }
        };

        counters.total_cost += cost;
        counters.daily_cost += cost;
        counters.monthly_cost += cost;
        counters.prompt_tokens += usage.prompt_tokens;
        counters.completion_tokens += usage.completion_tokens;

        let entry = counters.providers.entry(provider.to_string()).or_default();
        entry.requests += 1;
        entry.spend += cost;
        entry.tokens += usage.prompt_tokens + usage.completion_tokens;

        let agent = counters.agent(agent_id);
        agent.calls += 1;
        agent.daily_spend += cost;
        *agent
    }

    /// Copy of the totals as of `now`, with period spend rolled over for that instant
    pub fn totals(&self, now: DateTime<Utc>) -> RouterTotals {
        let counters = self.inner.read();
        let current = Period::at(now);
        let new_day = current.day > counters.period.day;
        let new_month = new_day && !current.same_month(&counters.period);

        let agents = counters
            .agents
            .iter()
            .map(|(id, usage)| {
                let mut usage = *usage;
                if new_day {
                    usage.daily_spend = MicroUsd::ZERO;
                }
                (id.clone(), usage)
            })
            .collect();

        RouterTotals {
            taken_at: now,
            total_calls: counters.total_calls,
            cloud_hits: counters.cloud_hits,
            cache_hits: counters.cache_hits,
            provider_errors: counters.provider_errors,
            total_cost: counters.total_cost,
            daily_cost: if new_day { MicroUsd::ZERO } else { counters.daily_cost },
            monthly_cost: if new_month { MicroUsd::ZERO } else { counters.monthly_cost },
            prompt_tokens: counters.prompt_tokens,
            completion_tokens: counters.completion_tokens,
            providers: counters.providers.clone(),
            agents,
        }
    }

    /// Zero every counter
    pub fn reset(&self, now: DateTime<Utc>) {
        *self.inner.write() = Counters::new(now);
    }
}
