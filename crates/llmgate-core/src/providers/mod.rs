//! Provider clients and the provider registry
//!
//! Real HTTP clients for hosted providers live outside this crate; they plug in through
//! the [`Provider`] trait. The registry is filled once at startup and only read afterwards.

mod circuit;
mod echo;

pub use circuit::{CircuitBreaker, CircuitSnapshot, CircuitState};
pub use echo::EchoProvider;

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, ProviderError, Result};
use crate::models::{CompletionChunk, CompletionRequest, CompletionResponse};

/// Stream of chunks produced by a provider
pub type ChunkStream =
    Pin<Box<dyn Stream<Item = std::result::Result<CompletionChunk, ProviderError>> + Send>>;

/// Caller-supplied cancellation signal and deadline, passed through to providers
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// A context that is never cancelled and has no deadline
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an existing cancellation token
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Set a deadline relative to now
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Set an absolute deadline
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Cancellation token for this request
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the caller has cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Time left before the deadline
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

/// A hosted LLM backend
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    /// Identity token used for routing and as a metrics label
    fn id(&self) -> &str;

    /// Produce a complete response
    async fn complete(
        &self,
        request: &CompletionRequest,
        ctx: &RequestContext,
    ) -> std::result::Result<CompletionResponse, ProviderError>;

    /// Produce a stream of chunks ending with a `done` chunk
    async fn stream(
        &self,
        request: &CompletionRequest,
        ctx: &RequestContext,
    ) -> std::result::Result<ChunkStream, ProviderError>;
}

/// Registered providers, in registration order
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    order: Vec<String>,
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own id
    pub fn register(&mut self, provider: Arc<dyn Provider>) -> Result<()> {
        let id = provider.id().trim().to_ascii_lowercase();
        if id.is_empty() {
            return Err(Error::config("provider id must not be empty"));
        }
        if self.providers.contains_key(&id) {
            return Err(Error::config(format!("provider {id} registered twice")));
        }

        tracing::info!(provider = %id, "Registered provider");
        self.order.push(id.clone());
        self.providers.insert(id, provider);
        Ok(())
    }

    /// Builder-style registration
    pub fn with(mut self, provider: Arc<dyn Provider>) -> Result<Self> {
        self.register(provider)?;
        Ok(self)
    }

    /// Look up a provider
    pub fn get(&self, id: &str) -> Option<&Arc<dyn Provider>> {
        self.providers.get(id)
    }

    /// Whether a provider is registered
    pub fn contains(&self, id: &str) -> bool {
        self.providers.contains_key(id)
    }

    /// Provider ids in registration order
    pub fn ids(&self) -> &[String] {
        &self.order
    }

    /// Number of providers
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether no provider is registered
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.order)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_order_and_duplicates() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(EchoProvider::new("OpenRouter"))).unwrap();
        registry.register(Arc::new(EchoProvider::new("anthropic"))).unwrap();

        assert_eq!(registry.ids(), ["openrouter", "anthropic"]);
        assert!(registry.contains("openrouter"));

        let err = registry
            .register(Arc::new(EchoProvider::new("anthropic")))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_context_deadline() {
        let ctx = RequestContext::new().with_timeout(Duration::from_secs(30));
        assert!(ctx.remaining().unwrap() <= Duration::from_secs(30));
        assert!(!ctx.is_cancelled());

        ctx.cancellation().cancel();
        assert!(ctx.is_cancelled());
    }
}
